use std::path::PathBuf;

use clap::{ArgAction, ArgGroup, Args, Parser, Subcommand};

use crate::retention::{DEFAULT_DELETE_REGEX, DEFAULT_KEEP_REGEX};

/// gitlab-registry-cleaner: list and clean up GitLab container registry tags
#[derive(Parser, Debug)]
#[command(name = "gitlab-registry-cleaner", version, about)]
pub struct Cli {
    /// GitLab host (e.g., https://gitlab.example.com)
    #[arg(long, env = "GITLAB_HOST", global = true)]
    pub host: Option<String>,

    /// API token with the read_registry/api scope
    #[arg(long, env = "GITLAB_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Number of concurrent requests per stage
    #[arg(short, long, default_value_t = 20, global = true)]
    pub concurrency: usize,

    /// Skip interactive confirmations
    #[arg(short, long, default_value_t = false, global = true)]
    pub yes: bool,

    /// Verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List container repositories
    List(ListArgs),
    /// Delete tags according to the retention rules
    Clean(CleanArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Write the repositories as JSON to this file
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub target: ListTarget,
}

#[derive(Subcommand, Debug)]
pub enum ListTarget {
    /// Scan every repository ID in a range
    All(RangeArgs),
    /// Repositories of one project (ID or full path)
    Project { project: String },
    /// Repositories of every project in a group (ID or full path)
    Group { group: String },
}

#[derive(Args, Debug)]
pub struct RangeArgs {
    /// First repository ID to scan
    #[arg(long, default_value_t = 1)]
    pub start_id: u64,

    /// Last repository ID to scan (inclusive)
    #[arg(long)]
    pub end_id: u64,
}

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["project", "group", "input", "plan", "end_id"])
))]
pub struct CleanArgs {
    /// Clean repositories of this project
    #[arg(long)]
    pub project: Option<String>,

    /// Clean repositories of every project in this group
    #[arg(long)]
    pub group: Option<String>,

    /// Read repositories from a JSON file written by `list --output`
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Delete exactly the tags of a JSON plan written by `clean --output`
    #[arg(long)]
    pub plan: Option<PathBuf>,

    /// First repository ID to scan
    #[arg(long, default_value_t = 1, conflicts_with_all = ["project", "group", "input", "plan"])]
    pub start_id: u64,

    /// Last repository ID to scan (inclusive)
    #[arg(long)]
    pub end_id: Option<u64>,

    // Listing and retention flags only apply when the deletion set is computed.

    /// Tags per page when listing tags (max 100)
    #[arg(long, default_value_t = 100, conflicts_with = "plan")]
    pub page_size: u32,

    /// Tags matching this regex are always kept
    #[arg(long, default_value = DEFAULT_KEEP_REGEX, conflicts_with = "plan")]
    pub keep_regex: String,

    /// Only tags matching this regex may be deleted
    #[arg(long, default_value = DEFAULT_DELETE_REGEX, conflicts_with = "plan")]
    pub delete_regex: String,

    /// Only delete tags older than N days
    #[arg(long, conflicts_with = "plan")]
    pub older_than: Option<u64>,

    /// Always keep the N most recent tags
    #[arg(long, default_value_t = 0, conflicts_with = "plan")]
    pub keep_most_recent: usize,

    /// Actually delete tags (dry run is the default)
    #[arg(long = "no-dry-run", action = ArgAction::SetFalse)]
    pub dry_run: bool,

    /// Write the computed deletion set as JSON to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}
