use tracing::{debug, error, info, instrument};

use crate::error::AppError;
use crate::models::{DetailedTag, Repository};
use crate::pool::fan_out;
use crate::registry::GitLabClient;

/// Per-tag result of a deletion batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Deleted,
    AlreadyGone,
    Skipped,
    Failed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeletionReport {
    pub deleted: usize,
    pub already_gone: usize,
    /// Tags that would have been deleted outside dry-run
    pub skipped: usize,
    pub failed: usize,
}

impl DeletionReport {
    pub fn merge(&mut self, other: DeletionReport) {
        self.deleted += other.deleted;
        self.already_gone += other.already_gone;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

/// Delete `tags` from `repository` in `concurrency` contiguous chunks.
///
/// Nothing is sent to the API in dry-run mode. There is no rollback: a
/// failure leaves earlier deletions in place.
#[instrument(skip_all, fields(repository = repository.id, tags = tags.len(), dry_run = dry_run))]
pub async fn delete_tags(
    client: &GitLabClient,
    repository: &Repository,
    tags: &[DetailedTag],
    dry_run: bool,
    concurrency: usize,
) -> DeletionReport {
    let names = tags.iter().map(|t| t.name.as_str()).collect::<Vec<_>>();

    let outcomes = fan_out(names, concurrency, |chunk| async move {
        let mut outcomes = Vec::with_capacity(chunk.len());
        for name in chunk {
            if dry_run {
                info!("[dry-run] Would delete {}:{}", repository.path, name);
                outcomes.push(Outcome::Skipped);
                continue;
            }

            let outcome = match client.delete_tag(repository, name).await {
                Ok(()) => {
                    info!("Deleted {}:{}", repository.path, name);
                    Outcome::Deleted
                }
                Err(AppError::NotFound(_)) => {
                    debug!("Tag {}:{} was already gone", repository.path, name);
                    Outcome::AlreadyGone
                }
                Err(e) => {
                    error!("Failed to delete {}:{}: {}", repository.path, name, e);
                    Outcome::Failed
                }
            };
            outcomes.push(outcome);
        }
        outcomes
    })
    .await;

    let mut report = DeletionReport::default();
    for outcome in outcomes {
        match outcome {
            Outcome::Deleted => report.deleted += 1,
            Outcome::AlreadyGone => report.already_gone += 1,
            Outcome::Skipped => report.skipped += 1,
            Outcome::Failed => report.failed += 1,
        }
    }
    report
}
