mod cli;
mod config;
mod deleter;
mod discovery;
mod error;
mod models;
mod output;
mod pipeline;
mod pool;
mod registry;
mod retention;
mod tags;

use std::io::{self, Write};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn, Level};

use cli::{Cli, Command};
use config::{CleanInput, CleanOptions, ListOptions, Options};
use discovery::{discover, Source};
use output::{print_plan, print_repositories, print_summary, write_json_file};
use pipeline::{build_plans, execute, load_plans};
use registry::GitLabClient;

/// Ranges larger than this ask for confirmation before scanning.
const LARGE_RANGE: u64 = 5000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    configure_tracing(cli.verbose)?;

    let options = Options::from_cli(&cli)?;
    let client = GitLabClient::new(&options.host, &options.token)?;
    debug!("Using GitLab API at {}", client.base_url());

    match &cli.command {
        Command::List(args) => {
            let list = ListOptions::from_args(args)?;
            run_list(&client, &options, &list).await
        }
        Command::Clean(args) => {
            let clean = CleanOptions::from_args(args)?;
            run_clean(&client, &options, &clean).await
        }
    }
}

async fn run_list(client: &GitLabClient, options: &Options, list: &ListOptions) -> Result<()> {
    if !confirm_range(&list.source, options)? {
        println!("Aborted.");
        return Ok(());
    }

    let repositories = discover(client, &list.source, options.concurrency).await?;
    print_repositories(&repositories);

    if let Some(path) = &list.output {
        write_json_file(path, &repositories)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote {} repositories to {}", repositories.len(), path.display());
    }

    Ok(())
}

async fn run_clean(client: &GitLabClient, options: &Options, clean: &CleanOptions) -> Result<()> {
    debug!("Retention policy: {:?}", clean.policy);
    if clean.dry_run {
        warn!("Dry run is enabled. No tags will be deleted!");
    }

    let result = match &clean.input {
        CleanInput::Plan(path) => {
            let loaded =
                load_plans(path).with_context(|| format!("Failed to read plan {}", path.display()))?;
            for plan in &loaded.plans {
                print_plan(plan, clean.dry_run);
            }
            loaded
        }
        CleanInput::Discover(source) => {
            if !confirm_range(source, options)? {
                println!("Aborted.");
                return Ok(());
            }
            build_plans(client, options, clean, source).await?
        }
    };

    if let Some(path) = &clean.output {
        write_json_file(path, &result.plans)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote deletion set to {}", path.display());
    }

    let planned = result.planned();

    if !clean.dry_run && planned > 0 && !options.assume_yes {
        let prompt = format!("Delete {} tags from {} repositories?", planned, result.plans.len());
        if !confirm(&prompt)? {
            println!("Aborted.");
            return Ok(());
        }
    }

    let report = execute(client, options, clean, &result.plans).await;
    print_summary(&report, planned, result.errors, clean.dry_run);

    if result.errors + report.failed > 0 {
        process::exit(1);
    }

    Ok(())
}

fn confirm_range(source: &Source, options: &Options) -> Result<bool> {
    match source {
        Source::Range { start, end }
            if end.saturating_sub(*start) >= LARGE_RANGE && !options.assume_yes =>
        {
            confirm(&format!(
                "Scan {} repository IDs ({}..={})?",
                end.saturating_sub(*start).saturating_add(1),
                start,
                end
            ))
        }
        _ => Ok(true),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N]: ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .context("Failed to read confirmation")?;

    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn configure_tracing(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Setting tracing subscriber")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(assume_yes: bool) -> Options {
        Options {
            host: "https://gitlab.example.com".to_string(),
            token: "t".to_string(),
            concurrency: 4,
            assume_yes,
        }
    }

    #[test]
    fn test_small_range_needs_no_confirmation() {
        let source = Source::Range { start: 1, end: LARGE_RANGE };
        assert!(confirm_range(&source, &options(false)).unwrap());
    }

    #[test]
    fn test_yes_skips_confirmation_for_any_range() {
        let source = Source::Range { start: 0, end: u64::MAX };
        assert!(confirm_range(&source, &options(true)).unwrap());
    }

    #[test]
    fn test_scoped_sources_need_no_confirmation() {
        let source = Source::Group("team".to_string());
        assert!(confirm_range(&source, &options(false)).unwrap());
    }
}
