//! Validated options built from the command line.
//!
//! Everything below `main` receives these structures instead of reading the
//! environment, so every check here runs before the first network call.

use std::path::PathBuf;

use crate::cli::{CleanArgs, Cli, ListArgs, ListTarget};
use crate::discovery::{Source, MAX_RANGE_IDS};
use crate::error::AppError;
use crate::retention::{RetentionPolicy, MAX_OLDER_THAN_DAYS};

const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct Options {
    pub host: String,
    pub token: String,
    pub concurrency: usize,
    pub assume_yes: bool,
}

impl Options {
    pub fn from_cli(cli: &Cli) -> Result<Self, AppError> {
        let host = non_blank(cli.host.as_deref()).ok_or(AppError::MissingHost)?;
        let token = non_blank(cli.token.as_deref()).ok_or(AppError::MissingToken)?;
        if cli.concurrency == 0 {
            return Err(AppError::InvalidConcurrency);
        }

        Ok(Self {
            host,
            token,
            concurrency: cli.concurrency,
            assume_yes: cli.yes,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ListOptions {
    pub source: Source,
    pub output: Option<PathBuf>,
}

impl ListOptions {
    pub fn from_args(args: &ListArgs) -> Result<Self, AppError> {
        let source = match &args.target {
            ListTarget::All(range) => range_source(range.start_id, range.end_id)?,
            ListTarget::Project { project } => Source::Project(project.clone()),
            ListTarget::Group { group } => Source::Group(group.clone()),
        };
        Ok(Self {
            source,
            output: args.output.clone(),
        })
    }
}

#[derive(Debug, Clone)]
pub enum CleanInput {
    /// Discover repositories and compute the deletion set
    Discover(Source),
    /// Replay a deletion set exported by an earlier run
    Plan(PathBuf),
}

#[derive(Debug, Clone)]
pub struct CleanOptions {
    pub input: CleanInput,
    pub page_size: u32,
    pub policy: RetentionPolicy,
    pub dry_run: bool,
    pub output: Option<PathBuf>,
}

impl CleanOptions {
    pub fn from_args(args: &CleanArgs) -> Result<Self, AppError> {
        let input = if let Some(plan) = &args.plan {
            CleanInput::Plan(plan.clone())
        } else if let Some(project) = &args.project {
            CleanInput::Discover(Source::Project(project.clone()))
        } else if let Some(group) = &args.group {
            CleanInput::Discover(Source::Group(group.clone()))
        } else if let Some(path) = &args.input {
            CleanInput::Discover(Source::File(path.clone()))
        } else {
            // clap guarantees one source; without the others this is the range
            let end = args.end_id.unwrap_or(args.start_id);
            CleanInput::Discover(range_source(args.start_id, end)?)
        };

        if args.page_size == 0 || args.page_size > MAX_PAGE_SIZE {
            return Err(AppError::InvalidPageSize(args.page_size));
        }

        if let Some(days) = args.older_than.filter(|&days| days > MAX_OLDER_THAN_DAYS) {
            return Err(AppError::InvalidAge {
                days,
                max: MAX_OLDER_THAN_DAYS,
            });
        }

        let policy = RetentionPolicy::new(
            &args.keep_regex,
            &args.delete_regex,
            args.older_than,
            args.keep_most_recent,
        )?;

        Ok(Self {
            input,
            page_size: args.page_size,
            policy,
            dry_run: args.dry_run,
            output: args.output.clone(),
        })
    }
}

fn range_source(start: u64, end: u64) -> Result<Source, AppError> {
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
    Ok(Source::Range { start, end })
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
