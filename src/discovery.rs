use std::path::Path;

use tracing::{debug, info, instrument, warn};

use crate::error::AppError;
use crate::models::Repository;
use crate::output::read_json_file;
use crate::pool::fan_out;
use crate::registry::{GitLabClient, Scope};

/// Most IDs a single ranged scan may cover
pub const MAX_RANGE_IDS: u64 = 10_000_000;

/// Where the repositories to work on come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// Check every ID of an inclusive range
    Range { start: u64, end: u64 },
    Project(String),
    Group(String),
    /// JSON array exported by an earlier `list --output`
    File(std::path::PathBuf),
}

pub async fn discover(
    client: &GitLabClient,
    source: &Source,
    concurrency: usize,
) -> Result<Vec<Repository>, AppError> {
    match source {
        Source::Range { start, end } => discover_range(client, *start, *end, concurrency).await,
        Source::Project(project) => discover_scope(client, Scope::Project, project).await,
        Source::Group(group) => discover_scope(client, Scope::Group, group).await,
        Source::File(path) => load_repositories(path),
    }
}

/// Look up each ID in `start..=end` and keep the ones that resolve.
#[instrument(skip(client))]
pub async fn discover_range(
    client: &GitLabClient,
    start: u64,
    end: u64,
    concurrency: usize,
) -> Result<Vec<Repository>, AppError> {
    if start > end {
        return Err(AppError::InvalidRange { start, end });
    }
    if end - start >= MAX_RANGE_IDS {
        return Err(AppError::RangeTooLarge {
            start,
            end,
            max: MAX_RANGE_IDS,
        });
    }

    let ids = (start..=end).collect::<Vec<_>>();
    info!("Scanning {} repository IDs with {} workers", ids.len(), concurrency);

    let mut repositories = fan_out(ids, concurrency, |chunk| async move {
        let mut found = Vec::new();
        for id in chunk {
            match client.show_repository(id).await {
                Ok(repository) => {
                    debug!("Found repository {} ({})", id, repository.path);
                    found.push(repository);
                }
                Err(e) if e.is_expected_absence() => {
                    debug!("Skipping repository {}: {}", id, e);
                }
                Err(e) => {
                    warn!("Failed to fetch repository {}: {}", id, e);
                }
            }
        }
        found
    })
    .await;

    if repositories.is_empty() {
        return Err(AppError::NoRepositories);
    }

    repositories.sort_by_key(|r| r.id);
    info!("Found {} repositories", repositories.len());
    Ok(repositories)
}

pub async fn discover_scope(
    client: &GitLabClient,
    scope: Scope,
    id: &str,
) -> Result<Vec<Repository>, AppError> {
    let repositories = client.list_scope_repositories(scope, id).await?;
    if repositories.is_empty() {
        return Err(AppError::NoRepositories);
    }
    info!("Found {} repositories in {}", repositories.len(), id);
    Ok(repositories)
}

pub fn load_repositories(path: &Path) -> Result<Vec<Repository>, AppError> {
    let repositories: Vec<Repository> = read_json_file(path)?;
    if repositories.is_empty() {
        return Err(AppError::NoRepositories);
    }
    debug!("Loaded {} repositories from {}", repositories.len(), path.display());
    Ok(repositories)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::write_json_file;
    use crate::registry::tests::{repository, repository_json};
    use mockito::Matcher;

    async fn mock_repository(server: &mut mockito::ServerGuard, id: u64, status: usize) -> mockito::Mock {
        let body = if status == 200 {
            repository_json(id, 1)
        } else {
            r#"{"message":"404 Not Found"}"#.to_string()
        };
        server
            .mock("GET", format!("/api/v4/registry/repositories/{}", id).as_str())
            .match_query(Matcher::Any)
            .with_status(status)
            .with_body(body)
            .create_async()
            .await
    }

    #[tokio::test]
    async fn test_discover_range_skips_missing_ids() {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for (id, status) in [(1, 200), (2, 404), (3, 403), (4, 200), (5, 500)] {
            mocks.push(mock_repository(&mut server, id, status).await);
        }

        let client = GitLabClient::new(&server.url(), "t").unwrap();
        let repos = discover_range(&client, 1, 5, 2).await.unwrap();

        for mock in mocks {
            mock.assert_async().await;
        }
        assert_eq!(repos.iter().map(|r| r.id).collect::<Vec<_>>(), vec![1, 4]);
    }

    #[tokio::test]
    async fn test_discover_range_fails_when_nothing_exists() {
        let mut server = mockito::Server::new_async().await;
        let mut mocks = Vec::new();
        for id in 10..=12 {
            mocks.push(mock_repository(&mut server, id, 404).await);
        }

        let client = GitLabClient::new(&server.url(), "t").unwrap();
        let result = discover_range(&client, 10, 12, 20).await;

        for mock in mocks {
            mock.assert_async().await;
        }
        assert!(matches!(result, Err(AppError::NoRepositories)));
    }

    #[tokio::test]
    async fn test_discover_range_rejects_inverted_range() {
        let client = GitLabClient::new("http://localhost:1", "t").unwrap();
        let result = discover_range(&client, 5, 1, 4).await;
        assert!(matches!(result, Err(AppError::InvalidRange { start: 5, end: 1 })));
    }

    #[tokio::test]
    async fn test_discover_range_rejects_oversized_range() {
        let client = GitLabClient::new("http://localhost:1", "t").unwrap();
        let result = discover_range(&client, 0, u64::MAX, 4).await;
        assert!(matches!(result, Err(AppError::RangeTooLarge { start: 0, end: u64::MAX, .. })));
    }

    #[tokio::test]
    async fn test_discover_group_empty_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/v4/groups/team/registry/repositories")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("[]")
            .create_async()
            .await;

        let client = GitLabClient::new(&server.url(), "t").unwrap();
        let result = discover(&client, &Source::Group("team".to_string()), 4).await;
        assert!(matches!(result, Err(AppError::NoRepositories)));
    }

    #[tokio::test]
    async fn test_discover_from_file_bypasses_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repos.json");
        write_json_file(&path, &vec![repository(3, Some(2)), repository(9, None)]).unwrap();

        let client = GitLabClient::new("http://localhost:1", "t").unwrap();
        let repos = discover(&client, &Source::File(path), 4).await.unwrap();

        assert_eq!(repos.len(), 2);
        assert_eq!(repos[1].id, 9);
    }
}
