use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use colored::Colorize;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::deleter::DeletionReport;
use crate::error::AppError;
use crate::models::{CleanupPlan, DetailedTag, Repository};

/// Print discovered repositories as a table
pub fn print_repositories(repositories: &[Repository]) {
    println!(
        "\n{:>8}  {:>8}  {:>6}  {}",
        "ID".bold(),
        "PROJECT".bold(),
        "TAGS".bold(),
        "PATH".bold()
    );
    println!("{}", "─".repeat(60));
    for repo in repositories {
        let tags = repo
            .tags_count
            .map(|c| c.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!(
            "{:>8}  {:>8}  {:>6}  {}",
            repo.id, repo.project_id, tags, repo.path
        );
    }
    println!("\n{} repositories.", repositories.len());
}

/// Print the cleanup plan for a repository
pub fn print_plan(plan: &CleanupPlan, dry_run: bool) {
    let header = if dry_run {
        format!(" {} ", "DRY RUN".yellow().bold())
    } else {
        String::new()
    };

    println!(
        "\n{}Repository: {} (id {}){}",
        header,
        plan.repository.path.bold(),
        plan.repository.id,
        if dry_run { " (no changes will be made)" } else { "" }
    );
    println!("{}", "─".repeat(60));

    if plan.degraded {
        println!(
            "  {} tag details unavailable; ranked by version, age filter skipped",
            "WARNING:".yellow().bold()
        );
    }

    if plan.to_delete.is_empty() {
        println!("  {} ({} kept)", "Nothing to delete.".green(), plan.kept);
        return;
    }

    println!("  {} ({}):", "TO DELETE".red().bold(), plan.to_delete.len());
    for tag in &plan.to_delete {
        print_tag_line(tag, plan.degraded);
    }
    println!("  {} {}", "KEEP".green().bold(), plan.kept);
}

fn print_tag_line(tag: &DetailedTag, degraded: bool) {
    let created_str = if degraded {
        "unknown".to_string()
    } else {
        tag.created_at.format("%Y-%m-%d %H:%M:%S UTC").to_string()
    };
    let digest = tag.digest.as_deref().map(truncate_digest).unwrap_or("-");

    println!(
        "    [{}] {:<30} {} {}",
        "DELETE".red().bold(),
        tag.name,
        digest.dimmed(),
        created_str.dimmed(),
    );
}

fn truncate_digest(digest: &str) -> &str {
    if digest.len() > 19 {
        &digest[..19]
    } else {
        digest
    }
}

/// Print final summary
pub fn print_summary(report: &DeletionReport, planned: usize, errors: usize, dry_run: bool) {
    let errors_str = if errors + report.failed > 0 {
        (errors + report.failed).to_string().red().bold().to_string()
    } else {
        "0".to_string()
    };

    println!("\n{}", "═".repeat(60));
    if dry_run {
        println!(
            "{} Would delete {} tags, {} errors",
            "DRY RUN SUMMARY:".yellow().bold(),
            planned.to_string().red().bold(),
            errors_str
        );
    } else {
        println!(
            "{} Deleted {} of {} tags ({} already gone), {} errors",
            "SUMMARY:".bold(),
            report.deleted.to_string().red().bold(),
            planned,
            report.already_gone,
            errors_str
        );
        if report.deleted > 0 {
            println!(
                "\n{} GitLab removes the image data on its next registry garbage collection.",
                "REMINDER:".yellow().bold()
            );
        }
    }
}

/// Write `value` as pretty JSON to `path`
pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), AppError> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read JSON written by an earlier invocation
pub fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T, AppError> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::repository;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_truncate_digest() {
        assert_eq!(truncate_digest("sha256:0123456789abcdef0123"), "sha256:0123456789ab");
        assert_eq!(truncate_digest("short"), "short");
    }

    #[test]
    fn test_plan_file_round_trip() {
        let plan = CleanupPlan {
            repository: repository(5, Some(2)),
            to_delete: vec![DetailedTag {
                name: "dev-1".into(),
                path: "group/app-5:dev-1".into(),
                location: "registry.example.com/group/app-5:dev-1".into(),
                created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                digest: Some("sha256:abc".into()),
                total_size: 42,
            }],
            kept: 1,
            degraded: false,
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        write_json_file(&path, &vec![plan]).unwrap();

        let loaded: Vec<CleanupPlan> = read_json_file(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].repository.id, 5);
        assert_eq!(loaded[0].to_delete[0].name, "dev-1");
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result: Result<Vec<Repository>, _> = read_json_file(&dir.path().join("missing.json"));
        assert!(matches!(result, Err(AppError::Io(_))));
    }
}
