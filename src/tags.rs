use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::error::AppError;
use crate::models::{CondensedTag, DetailedTag, Repository};
use crate::pool::fan_out;
use crate::registry::GitLabClient;

/// Outcome of the detail fetch stage
#[derive(Debug)]
pub enum Details {
    Complete(Vec<DetailedTag>),
    /// No detail could be fetched; timestamps are placeholders.
    Degraded(Vec<DetailedTag>),
}

impl Details {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Details::Degraded(_))
    }

    pub fn into_tags(self) -> Vec<DetailedTag> {
        match self {
            Details::Complete(tags) | Details::Degraded(tags) => tags,
        }
    }
}

/// Fetch every tag of `repository`, spreading pages over `concurrency` workers.
#[instrument(skip(client, repository), fields(repository = repository.id))]
pub async fn list_tags(
    client: &GitLabClient,
    repository: &Repository,
    page_size: u32,
    concurrency: usize,
) -> Result<Vec<CondensedTag>, AppError> {
    let page_size = page_size.max(1);

    let total_pages = match repository.tags_count {
        Some(0) => return Ok(Vec::new()),
        Some(count) => u32::try_from(count.div_ceil(u64::from(page_size))).map_err(|_| {
            AppError::TagCountOutOfRange {
                repository: repository.path.clone(),
                count,
            }
        })?,
        None => return walk_pages(client, repository, page_size).await,
    };
    debug!("Fetching {} pages of tags for {}", total_pages, repository.path);

    let pages = (1..=total_pages).collect::<Vec<_>>();
    let results = fan_out(pages, concurrency, |chunk| async move {
        let mut fetched = Vec::with_capacity(chunk.len());
        for page in chunk {
            fetched.push(client.list_tags_page(repository, page, page_size).await);
        }
        fetched
    })
    .await;

    let mut tags = Vec::new();
    for page in results {
        tags.extend(page?);
    }
    Ok(tags)
}

/// Used when the repository did not report a tag count.
async fn walk_pages(
    client: &GitLabClient,
    repository: &Repository,
    page_size: u32,
) -> Result<Vec<CondensedTag>, AppError> {
    let mut tags = Vec::new();
    let mut page = 1;
    loop {
        let batch = client.list_tags_page(repository, page, page_size).await?;
        let last = batch.len() < page_size as usize;
        tags.extend(batch);
        if last {
            break;
        }
        page += 1;
    }
    Ok(tags)
}

/// Fetch details for `tags` in `concurrency` contiguous chunks.
#[instrument(skip_all, fields(repository = repository.id, tags = tags.len()))]
pub async fn fetch_details(
    client: &GitLabClient,
    repository: &Repository,
    tags: Vec<CondensedTag>,
    concurrency: usize,
    now: DateTime<Utc>,
) -> Details {
    if tags.is_empty() {
        return Details::Complete(Vec::new());
    }

    let names = tags.iter().map(|t| t.name.clone()).collect::<Vec<_>>();
    let details = fan_out(names, concurrency, |chunk| async move {
        let mut fetched = Vec::with_capacity(chunk.len());
        for name in chunk {
            match client.show_tag(repository, &name).await {
                Ok(tag) => fetched.push(tag),
                Err(AppError::NotFound(_)) => {
                    warn!("Tag {}:{} has no details, skipping", repository.path, name);
                }
                Err(e) => {
                    warn!("Failed to fetch details for {}:{}: {}", repository.path, name, e);
                }
            }
        }
        fetched
    })
    .await;

    if details.is_empty() {
        warn!(
            "No tag details could be retrieved for {}; ordering by version and skipping age filtering",
            repository.path
        );
        let placeholders = tags
            .into_iter()
            .map(|tag| DetailedTag::placeholder(tag, now))
            .collect();
        return Details::Degraded(placeholders);
    }

    if details.len() < tags.len() {
        debug!("Dropped {} of {} tags without details", tags.len() - details.len(), tags.len());
    }
    Details::Complete(details)
}
