use reqwest::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("GitLab host is not configured. Set GITLAB_HOST or pass --host")]
    MissingHost,

    #[error("GitLab API token is not configured. Set GITLAB_TOKEN or pass --token")]
    MissingToken,

    #[error("Invalid GitLab host '{0}'")]
    InvalidHost(String),

    #[error("API token contains characters that are not valid in an HTTP header")]
    InvalidToken,

    #[error("Invalid repository ID range: start {start} is greater than end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("Repository ID range {start}..={end} is too large (at most {max} IDs per run)")]
    RangeTooLarge { start: u64, end: u64, max: u64 },

    #[error("--older-than must be at most {max} days, got {days}")]
    InvalidAge { days: u64, max: u64 },

    #[error("Concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("Page size must be between 1 and 100, got {0}")]
    InvalidPageSize(u32),

    #[error("Invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("GitLab API returned status {status} for {resource}: {body}")]
    Api {
        resource: String,
        status: StatusCode,
        body: String,
    },

    #[error("Repository {repository} reports {count} tags, too many pages to list")]
    TagCountOutOfRange { repository: String, count: u64 },

    #[error("No container repositories found")]
    NoRepositories,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// 404 and 403 mean "this ID does not exist for us" during discovery.
    pub fn is_expected_absence(&self) -> bool {
        matches!(self, AppError::NotFound(_) | AppError::Forbidden(_))
    }
}
