//! Sumi-Harvest main entry point
//!
//! Command-line interface for submitting URLs and running extraction workers.

use anyhow::{bail, Context};
use clap::Parser;
use std::path::PathBuf;
use sumi_harvest::config::{load_config_with_hash, Config};
use sumi_harvest::output::{load_statistics, print_statistics};
use sumi_harvest::storage::{self, JobId};
use sumi_harvest::worker::{run_harvest, Harvester};
use sumi_harvest::{OrchestratorError, SourceType};
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: out-of-band content extraction
///
/// Accepts URLs as jobs and extracts their content on a bounded pool of
/// workers. Every job's lifecycle is kept in a SQLite database, so jobs
/// survive restarts and can be inspected at any time.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "Asynchronous URL content extraction", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Submit a URL as a new job and exit
    #[arg(long, value_name = "URL", conflicts_with_all = ["status", "result", "history", "stats", "drain"])]
    submit: Option<String>,

    /// Source type for --submit (news, social, generic); classified from the URL if omitted
    #[arg(long, value_name = "TYPE", requires = "submit")]
    source_type: Option<SourceType>,

    /// Show a job's current status and exit
    #[arg(long, value_name = "ID", conflicts_with_all = ["submit", "result", "history", "stats", "drain"])]
    status: Option<JobId>,

    /// Print a completed job's extracted content as JSON and exit
    #[arg(long, value_name = "ID", conflicts_with_all = ["submit", "status", "history", "stats", "drain"])]
    result: Option<JobId>,

    /// Show every status change of a job and exit
    #[arg(long, value_name = "ID", conflicts_with_all = ["submit", "status", "result", "stats", "drain"])]
    history: Option<JobId>,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["submit", "status", "result", "history", "drain"])]
    stats: bool,

    /// Run workers until no job is pending or processing, then exit
    #[arg(long, conflicts_with_all = ["submit", "status", "result", "history", "stats"])]
    drain: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if let Some(url) = &cli.submit {
        handle_submit(config, url, cli.source_type)?;
    } else if let Some(job_id) = cli.status {
        handle_status(config, job_id)?;
    } else if let Some(job_id) = cli.result {
        handle_result(config, job_id)?;
    } else if let Some(job_id) = cli.history {
        handle_history(config, job_id)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.drain {
        tracing::info!("Draining queue");
        Harvester::new(config)?.drain().await?;
        tracing::info!("No jobs left to process");
    } else {
        tracing::info!(
            "Starting {} workers (Ctrl-C to stop)",
            config.worker.concurrency
        );
        run_harvest(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn handle_submit(config: Config, url: &str, source_type: Option<SourceType>) -> anyhow::Result<()> {
    let harvester = Harvester::new(config)?;
    let job = harvester.orchestrator().submit(url, source_type)?;

    println!("Submitted job {}", job.id);
    println!("  URL: {}", job.url);
    match job.source_type {
        Some(source_type) => println!("  Source type: {}", source_type),
        None => println!("  Source type: (classified when claimed)"),
    }
    Ok(())
}

fn handle_status(config: Config, job_id: JobId) -> anyhow::Result<()> {
    let harvester = Harvester::new(config)?;
    let job = harvester.orchestrator().get_job(job_id)?;

    println!("Job {}", job.id);
    println!("  URL: {}", job.url);
    println!("  Status: {}", job.status);
    println!(
        "  Source type: {}",
        job.source_type
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  Attempts: {}", job.attempt_count);
    println!("  Created: {}", job.created_at.to_rfc3339());
    println!("  Updated: {}", job.updated_at.to_rfc3339());
    if let Some(error) = &job.error_message {
        println!("  Error: {}", error);
    }
    if let Some(result_ref) = job.result_ref {
        println!("  Result: content #{}", result_ref);
    }
    Ok(())
}

fn handle_result(config: Config, job_id: JobId) -> anyhow::Result<()> {
    let harvester = Harvester::new(config)?;
    let content = match harvester.orchestrator().get_result(job_id) {
        Ok(content) => content,
        Err(OrchestratorError::NotReady { status, .. }) => {
            bail!("job {} has no result yet (status {})", job_id, status)
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", serde_json::to_string_pretty(&content)?);
    Ok(())
}

fn handle_history(config: Config, job_id: JobId) -> anyhow::Result<()> {
    let harvester = Harvester::new(config)?;
    let history = harvester.orchestrator().history(job_id)?;

    println!("History of job {}:", job_id);
    for entry in history {
        let from = entry
            .from
            .map(|s| s.to_string())
            .unwrap_or_else(|| "(new)".to_string());
        print!(
            "  {}  {} -> {}  (attempt {})",
            entry.at.to_rfc3339(),
            from,
            entry.to,
            entry.attempt
        );
        match entry.detail {
            Some(detail) => println!("  {}", detail),
            None => println!(),
        }
    }
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    use std::path::Path;

    println!("Database: {}\n", config.output.database_path);

    let storage = storage::open_shared(Path::new(&config.output.database_path))?;
    let stats = load_statistics(&*storage::lock(&storage)?)?;
    print_statistics(&stats);

    Ok(())
}
