//! The `clean` stages wired together: discover, list, fetch details, filter,
//! then delete. Prompts and process exit stay in `main`.

use std::path::Path;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::config::{CleanOptions, Options};
use crate::deleter::{delete_tags, DeletionReport};
use crate::discovery::{discover, Source};
use crate::error::AppError;
use crate::models::CleanupPlan;
use crate::output::{print_plan, read_json_file};
use crate::registry::GitLabClient;
use crate::retention::Recency;
use crate::tags::{fetch_details, list_tags};

/// Deletion sets computed for a run
#[derive(Debug, Default)]
pub struct Plans {
    pub plans: Vec<CleanupPlan>,
    /// Repositories whose tags could not be listed
    pub errors: usize,
}

impl Plans {
    pub fn planned(&self) -> usize {
        self.plans.iter().map(|p| p.to_delete.len()).sum()
    }
}

/// Discover, list, fetch details and filter, one repository at a time.
///
/// A repository whose tags cannot be listed is counted in
/// [`Plans::errors`] and skipped; the run goes on with the next one.
pub async fn build_plans(
    client: &GitLabClient,
    options: &Options,
    clean: &CleanOptions,
    source: &Source,
) -> Result<Plans, AppError> {
    let repositories = discover(client, source, options.concurrency).await?;
    let now = Utc::now();

    let mut result = Plans {
        plans: Vec::with_capacity(repositories.len()),
        errors: 0,
    };

    for repository in repositories {
        debug!("Processing repository {} ({})", repository.id, repository.path);

        let condensed = match list_tags(client, &repository, clean.page_size, options.concurrency).await {
            Ok(tags) => tags,
            Err(e) => {
                error!("Failed to list tags for {}: {}", repository.path, e);
                result.errors += 1;
                continue;
            }
        };

        if condensed.is_empty() {
            debug!("No tags found for {}", repository.path);
            continue;
        }

        let details = fetch_details(client, &repository, condensed, options.concurrency, now).await;
        let degraded = details.is_degraded();
        let recency = if degraded {
            if clean.policy.older_than_days.is_some() {
                warn!("Skipping age filter for {}: creation dates unavailable", repository.path);
            }
            Recency::Version
        } else {
            Recency::Created
        };

        let selection = clean.policy.apply(details.into_tags(), recency, now);
        let plan = CleanupPlan {
            repository,
            to_delete: selection.to_delete,
            kept: selection.to_keep.len(),
            degraded,
        };
        print_plan(&plan, clean.dry_run);
        result.plans.push(plan);
    }

    Ok(result)
}

/// Read a deletion set written by `clean --output`.
pub fn load_plans(path: &Path) -> Result<Plans, AppError> {
    let plans: Vec<CleanupPlan> = read_json_file(path)?;
    info!("Loaded {} plans from {}", plans.len(), path.display());
    Ok(Plans { plans, errors: 0 })
}

/// Delete every planned tag, repository by repository.
pub async fn execute(
    client: &GitLabClient,
    options: &Options,
    clean: &CleanOptions,
    plans: &[CleanupPlan],
) -> DeletionReport {
    let mut report = DeletionReport::default();
    for plan in plans.iter().filter(|p| !p.to_delete.is_empty()) {
        let result = delete_tags(
            client,
            &plan.repository,
            &plan.to_delete,
            clean.dry_run,
            options.concurrency,
        )
        .await;
        report.merge(result);
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CleanInput;
    use crate::models::{CondensedTag, DetailedTag, Repository};
    use crate::output::write_json_file;
    use crate::registry::tests::repository;
    use crate::retention::RetentionPolicy;
    use mockito::Matcher;

    fn options() -> Options {
        Options {
            host: "unused".to_string(),
            token: "t".to_string(),
            concurrency: 2,
            assume_yes: true,
        }
    }

    fn clean_options(policy: RetentionPolicy, dry_run: bool) -> CleanOptions {
        CleanOptions {
            input: CleanInput::Discover(Source::Project("group/app".to_string())),
            page_size: 100,
            policy,
            dry_run,
            output: None,
        }
    }

    /// Repositories from a JSON file, so discovery makes no requests.
    fn repositories_file(dir: &tempfile::TempDir, repositories: &[Repository]) -> Source {
        let path = dir.path().join("repos.json");
        write_json_file(&path, repositories).unwrap();
        Source::File(path)
    }

    fn tag_list_json(id: u64, names: &[&str]) -> String {
        let entries = names
            .iter()
            .map(|n| {
                format!(
                    r#"{{"name":"{n}","path":"group/app-{id}:{n}","location":"registry.example.com/group/app-{id}:{n}"}}"#
                )
            })
            .collect::<Vec<_>>();
        format!("[{}]", entries.join(","))
    }

    fn tag_detail_json(id: u64, name: &str, created_at: &str) -> String {
        format!(
            r#"{{"name":"{name}","path":"group/app-{id}:{name}","location":"registry.example.com/group/app-{id}:{name}","digest":"sha256:{name}","created_at":"{created_at}","total_size":10}}"#
        )
    }

    fn planned_tag(id: u64, name: &str) -> DetailedTag {
        DetailedTag::placeholder(
            CondensedTag {
                name: name.to_string(),
                path: format!("group/app-{}:{}", id, name),
                location: format!("registry.example.com/group/app-{}:{}", id, name),
            },
            Utc::now(),
        )
    }

    fn names(plan: &CleanupPlan) -> Vec<&str> {
        plan.to_delete.iter().map(|t| t.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_missing_details_order_by_version_and_ignore_age() {
        let mut server = mockito::Server::new_async().await;
        let list = server
            .mock("GET", "/api/v4/projects/7/registry/repositories/5/tags")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(tag_list_json(5, &["1.0.0", "2.0.0", "latest", "1.2.0"]))
            .expect(1)
            .create_async()
            .await;
        let details = server
            .mock("GET", Matcher::Regex(r"^/api/v4/projects/7/registry/repositories/5/tags/.+$".into()))
            .with_status(404)
            .expect(4)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = repositories_file(&dir, &[repository(5, Some(4))]);
        let policy = RetentionPolicy::new("^latest$", ".*", Some(30), 2).unwrap();
        let client = GitLabClient::new(&server.url(), "t").unwrap();

        let result = build_plans(&client, &options(), &clean_options(policy, true), &source)
            .await
            .unwrap();

        list.assert_async().await;
        details.assert_async().await;
        assert_eq!(result.errors, 0);
        assert_eq!(result.plans.len(), 1);
        let plan = &result.plans[0];
        assert!(plan.degraded);
        // 2.0.0 and 1.2.0 are the reserved highest versions; the placeholder
        // timestamps would fail a 30-day age check if it were applied.
        assert_eq!(names(plan), vec!["1.0.0"]);
        assert_eq!(plan.kept, 3);
    }

    #[tokio::test]
    async fn test_failed_tag_listing_counts_as_error_and_continues() {
        let mut server = mockito::Server::new_async().await;
        let broken = server
            .mock("GET", "/api/v4/projects/7/registry/repositories/5/tags")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .expect(1)
            .create_async()
            .await;
        let healthy = server
            .mock("GET", "/api/v4/projects/7/registry/repositories/6/tags")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(tag_list_json(6, &["old", "new"]))
            .expect(1)
            .create_async()
            .await;
        let _old = server
            .mock("GET", "/api/v4/projects/7/registry/repositories/6/tags/old")
            .with_status(200)
            .with_body(tag_detail_json(6, "old", "2020-01-01T00:00:00Z"))
            .create_async()
            .await;
        let _new = server
            .mock("GET", "/api/v4/projects/7/registry/repositories/6/tags/new")
            .with_status(200)
            .with_body(tag_detail_json(6, "new", "2099-01-01T00:00:00Z"))
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = repositories_file(&dir, &[repository(5, Some(3)), repository(6, Some(2))]);
        let policy = RetentionPolicy::new("^$", ".*", Some(7), 0).unwrap();
        let client = GitLabClient::new(&server.url(), "t").unwrap();

        let result = build_plans(&client, &options(), &clean_options(policy, true), &source)
            .await
            .unwrap();

        broken.assert_async().await;
        healthy.assert_async().await;
        assert_eq!(result.errors, 1);
        assert_eq!(result.plans.len(), 1);
        assert_eq!(result.plans[0].repository.id, 6);
        assert!(!result.plans[0].degraded);
        assert_eq!(names(&result.plans[0]), vec!["old"]);
        assert_eq!(result.planned(), 1);
    }

    #[tokio::test]
    async fn test_plan_replay_deletes_exactly_the_listed_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        let plans = vec![
            CleanupPlan {
                repository: repository(5, Some(4)),
                to_delete: vec![planned_tag(5, "old-1"), planned_tag(5, "old-2")],
                kept: 2,
                degraded: false,
            },
            CleanupPlan {
                repository: repository(6, Some(1)),
                to_delete: Vec::new(),
                kept: 1,
                degraded: false,
            },
        ];
        write_json_file(&path, &plans).unwrap();

        let mut server = mockito::Server::new_async().await;
        let base = "/api/v4/projects/7/registry/repositories/5/tags";
        let first = server
            .mock("DELETE", format!("{}/old-1", base).as_str())
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("DELETE", format!("{}/old-2", base).as_str())
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let unlisted = server
            .mock("DELETE", Matcher::Regex(r"/tags/(current|latest)$".into()))
            .with_status(200)
            .expect(0)
            .create_async()
            .await;
        let other_repository = server
            .mock("DELETE", Matcher::Regex(r"/repositories/6/".into()))
            .with_status(200)
            .expect(0)
            .create_async()
            .await;
        let reads = server
            .mock("GET", Matcher::Any)
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let loaded = load_plans(&path).unwrap();
        let policy = RetentionPolicy::new("^$", "^$", None, 0).unwrap();
        let client = GitLabClient::new(&server.url(), "t").unwrap();
        let report = execute(&client, &options(), &clean_options(policy, false), &loaded.plans).await;

        first.assert_async().await;
        second.assert_async().await;
        unlisted.assert_async().await;
        other_repository.assert_async().await;
        reads.assert_async().await;
        assert_eq!(loaded.planned(), 2);
        assert_eq!(
            report,
            DeletionReport {
                deleted: 2,
                ..Default::default()
            }
        );
    }

    #[tokio::test]
    async fn test_dry_run_clean_sends_no_deletes() {
        let mut server = mockito::Server::new_async().await;
        let _list = server
            .mock("GET", "/api/v4/projects/7/registry/repositories/5/tags")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(tag_list_json(5, &["a", "b"]))
            .create_async()
            .await;
        let _a = server
            .mock("GET", "/api/v4/projects/7/registry/repositories/5/tags/a")
            .with_status(200)
            .with_body(tag_detail_json(5, "a", "2020-01-01T00:00:00Z"))
            .create_async()
            .await;
        let _b = server
            .mock("GET", "/api/v4/projects/7/registry/repositories/5/tags/b")
            .with_status(200)
            .with_body(tag_detail_json(5, "b", "2020-02-01T00:00:00Z"))
            .create_async()
            .await;
        let deletes = server
            .mock("DELETE", Matcher::Any)
            .with_status(200)
            .expect(0)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let source = repositories_file(&dir, &[repository(5, Some(2))]);
        let clean = clean_options(RetentionPolicy::new("^$", ".*", None, 0).unwrap(), true);
        let client = GitLabClient::new(&server.url(), "t").unwrap();

        let result = build_plans(&client, &options(), &clean, &source).await.unwrap();
        let report = execute(&client, &options(), &clean, &result.plans).await;

        deletes.assert_async().await;
        assert_eq!(result.planned(), 2);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.deleted, 0);
    }

    #[tokio::test]
    async fn test_dry_run_replay_makes_no_requests() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        let plans = vec![CleanupPlan {
            repository: repository(5, Some(2)),
            to_delete: vec![planned_tag(5, "a"), planned_tag(5, "b")],
            kept: 0,
            degraded: false,
        }];
        write_json_file(&path, &plans).unwrap();

        let mut server = mockito::Server::new_async().await;
        let reads = server.mock("GET", Matcher::Any).expect(0).create_async().await;
        let deletes = server.mock("DELETE", Matcher::Any).expect(0).create_async().await;

        let loaded = load_plans(&path).unwrap();
        let clean = clean_options(RetentionPolicy::new("^$", "^$", None, 0).unwrap(), true);
        let client = GitLabClient::new(&server.url(), "t").unwrap();
        let report = execute(&client, &options(), &clean, &loaded.plans).await;

        reads.assert_async().await;
        deletes.assert_async().await;
        assert_eq!(report.skipped, 2);
    }
}
