use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Response, StatusCode, Url};
use tracing::{debug, instrument, trace};

use crate::error::AppError;
use crate::models::{CondensedTag, DetailedTag, Repository};

const TOKEN_HEADER: &str = "private-token";
const NEXT_PAGE_HEADER: &str = "x-next-page";
const LISTING_PAGE_SIZE: u32 = 100;

/// Which kind of namespace owns a set of repositories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Project,
    Group,
}

impl Scope {
    fn segment(self) -> &'static str {
        match self {
            Scope::Project => "projects",
            Scope::Group => "groups",
        }
    }
}

pub struct GitLabClient {
    client: Client,
    base_url: Url,
}

impl GitLabClient {
    pub fn new(host: &str, token: &str) -> Result<Self, AppError> {
        let base_url = normalize_host(host)?;

        let mut token_value =
            HeaderValue::from_str(token).map_err(|_| AppError::InvalidToken)?;
        token_value.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(TOKEN_HEADER, token_value);

        let client = Client::builder().default_headers(headers).build()?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET /api/v4/registry/repositories/:id?tags_count=true
    #[instrument(skip(self))]
    pub async fn show_repository(&self, id: u64) -> Result<Repository, AppError> {
        let mut url = self.api_url(&["registry", "repositories", &id.to_string()])?;
        url.query_pairs_mut().append_pair("tags_count", "true");

        let resp = self.get(url).await?;
        let resp = check_status(resp, &format!("repository {}", id)).await?;
        Ok(resp.json().await?)
    }

    /// GET /api/v4/{projects,groups}/:id/registry/repositories, all pages
    #[instrument(skip(self))]
    pub async fn list_scope_repositories(
        &self,
        scope: Scope,
        id: &str,
    ) -> Result<Vec<Repository>, AppError> {
        let resource = format!("{} {}", scope.segment(), id);
        let mut repositories = Vec::new();
        let mut page = 1u32;

        loop {
            let mut url = self.api_url(&[scope.segment(), id, "registry", "repositories"])?;
            url.query_pairs_mut()
                .append_pair("tags_count", "true")
                .append_pair("per_page", &LISTING_PAGE_SIZE.to_string())
                .append_pair("page", &page.to_string());

            let resp = self.get(url).await?;
            let resp = check_status(resp, &resource).await?;
            let next_page = parse_next_page(&resp);

            let batch: Vec<Repository> = resp.json().await?;
            debug!("Fetched {} repositories from page {} of {}", batch.len(), page, resource);
            repositories.extend(batch);

            match next_page {
                Some(next) if next > page => page = next,
                _ => break,
            }
        }

        Ok(repositories)
    }

    /// GET /api/v4/projects/:pid/registry/repositories/:rid/tags?page=&per_page=
    #[instrument(skip(self, repository), fields(repository = repository.id))]
    pub async fn list_tags_page(
        &self,
        repository: &Repository,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<CondensedTag>, AppError> {
        let mut url = self.tags_url(repository, None)?;
        url.query_pairs_mut()
            .append_pair("per_page", &per_page.to_string())
            .append_pair("page", &page.to_string());

        let resp = self.get(url).await?;
        let resp = check_status(resp, &format!("tags of repository {}", repository.id)).await?;
        Ok(resp.json().await?)
    }

    /// GET /api/v4/projects/:pid/registry/repositories/:rid/tags/:name
    #[instrument(skip(self, repository), fields(repository = repository.id))]
    pub async fn show_tag(&self, repository: &Repository, name: &str) -> Result<DetailedTag, AppError> {
        let url = self.tags_url(repository, Some(name))?;
        let resp = self.get(url).await?;
        let resp = check_status(resp, &format!("tag {}:{}", repository.path, name)).await?;
        Ok(resp.json().await?)
    }

    /// DELETE /api/v4/projects/:pid/registry/repositories/:rid/tags/:name
    #[instrument(skip(self, repository), fields(repository = repository.id))]
    pub async fn delete_tag(&self, repository: &Repository, name: &str) -> Result<(), AppError> {
        let url = self.tags_url(repository, Some(name))?;
        debug!("DELETE {}", url);
        let resp = self.client.delete(url).send().await?;
        check_status(resp, &format!("tag {}:{}", repository.path, name)).await?;
        Ok(())
    }

    async fn get(&self, url: Url) -> Result<Response, AppError> {
        trace!("GET {}", url);
        Ok(self.client.get(url).send().await?)
    }

    fn tags_url(&self, repository: &Repository, name: Option<&str>) -> Result<Url, AppError> {
        let project_id = repository.project_id.to_string();
        let repository_id = repository.id.to_string();
        let mut segments = vec![
            "projects",
            project_id.as_str(),
            "registry",
            "repositories",
            repository_id.as_str(),
            "tags",
        ];
        if let Some(name) = name {
            segments.push(name);
        }
        self.api_url(&segments)
    }

    /// Append percent-encoded segments below /api/v4 of the base URL.
    fn api_url(&self, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::InvalidHost(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(["api", "v4"])
            .extend(segments);
        Ok(url)
    }
}

/// Accept hosts with or without scheme and with trailing slashes.
fn normalize_host(host: &str) -> Result<Url, AppError> {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(AppError::MissingHost);
    }

    let with_scheme = if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let url = Url::parse(&with_scheme).map_err(|_| AppError::InvalidHost(host.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(AppError::InvalidHost(host.to_string()));
    }
    Ok(url)
}

/// Map non-success statuses onto the error taxonomy.
async fn check_status(resp: Response, resource: &str) -> Result<Response, AppError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(AppError::Unauthorized(resource.to_string())),
        StatusCode::FORBIDDEN => Err(AppError::Forbidden(resource.to_string())),
        StatusCode::NOT_FOUND => Err(AppError::NotFound(resource.to_string())),
        _ => {
            let body = resp.text().await.unwrap_or_default();
            Err(AppError::Api {
                resource: resource.to_string(),
                status,
                body,
            })
        }
    }
}

/// GitLab sends an empty X-Next-Page header on the last page.
fn parse_next_page(resp: &Response) -> Option<u32> {
    resp.headers()
        .get(NEXT_PAGE_HEADER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
