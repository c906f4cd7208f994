//! Profsumma CLI - professor review summarisation
//!
//! The application logic is contained in lib.rs, and this file is responsible
//! for parsing arguments and handling top-level errors.

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use profsumma::{
    agent, aggregate, fetch, logging, AggregateOptions, BatchController, BatchOptions, Config,
    JsonFileStore, ProfessorRecord, RunMode, RunReport, StateStore, SummaryClient,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "profsumma")]
#[command(author, version, about = "Batch summarisation of professor reviews", long_about = None)]
struct Cli {
    /// Path to profsumma.toml (defaults to ./profsumma.toml, then ~/.config/profsumma/)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, aggregate and summarise the next batch (or everything in full mode).
    ///
    /// Do not run two instances against the same storage directory at once.
    Run {
        /// Override the configured run mode
        #[arg(long, value_enum)]
        mode: Option<RunMode>,
    },
    /// Fetch and aggregate the CSV sources, printing records as JSON
    Aggregate {
        /// Only print the first N records
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Show the persisted cursor and stored summaries
    Status,
    /// Generate shell completions
    Completions {
        /// Target shell
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli.command {
        Some(Commands::Run { mode }) => run(cli.config, mode).await?,
        None => run(cli.config, None).await?,
        Some(Commands::Aggregate { limit }) => {
            let config = load_config(cli.config)?;
            let records = fetch_records(&config).await?;
            let shown = limit.unwrap_or(records.len()).min(records.len());
            println!("{}", serde_json::to_string_pretty(&records[..shown])?);
            eprintln!("--- {} of {} professors ---", shown, records.len());
        }
        Some(Commands::Status) => {
            let config = load_config(cli.config)?;
            let store = JsonFileStore::new(config.results_path(), config.state_path());
            let results = store.load_results();
            let cursor = store.load_cursor();

            println!("📁 Storage: {}", config.storage.path.display());
            println!("⚙️  Mode: {}", config.batch.mode);
            println!("📍 Next batch starts at: {}", cursor.last_index);
            println!("📄 Stored summaries: {}", results.len());
            let fallbacks = results.fallback_count();
            if fallbacks > 0 {
                println!("{}", format!("⚠️  Awaiting retry: {}", fallbacks).yellow());
            }
        }
        Some(Commands::Completions { shell }) => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "profsumma", &mut std::io::stdout());
        }
    }

    Ok(())
}

async fn run(config_path: Option<PathBuf>, mode: Option<RunMode>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let mode = config.run_mode(mode);

    // Fail on a missing key before touching the network.
    config.api_key()?;

    let client = fetch::create_client()?;
    let records = fetch_records_with(&config, &client).await?;

    let backend = agent::backend_from_config(&config, client)?;
    let summarizer = SummaryClient::from_config(backend, &config);
    let store = JsonFileStore::new(config.results_path(), config.state_path());
    let options = BatchOptions {
        mode,
        batch_size: config.batch.batch_size,
        request_delay: config.request_delay(),
    };

    let report = BatchController::new(summarizer, store, options)
        .run(&records)
        .await?;
    print_report(&report, &config);
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(&path)?,
        None => Config::load()?,
    };
    Ok(config)
}

async fn fetch_records(config: &Config) -> anyhow::Result<Vec<ProfessorRecord>> {
    let client = fetch::create_client()?;
    fetch_records_with(config, &client).await
}

async fn fetch_records_with(
    config: &Config,
    client: &reqwest::Client,
) -> anyhow::Result<Vec<ProfessorRecord>> {
    let (ratings, comments) =
        fetch::fetch_sources(client, &config.sources.ratings_url, &config.sources.comments_url)
            .await
            .context("could not load the CSV sources")?;
    info!(
        "fetched {} ratings rows and {} comment rows",
        ratings.len(),
        comments.len()
    );

    let options = AggregateOptions {
        profile_base_url: config.sources.profile_base_url.clone(),
        max_comment_chars: config.aggregate.max_comment_chars,
        separator: config.aggregate.separator.clone(),
    };
    Ok(aggregate(&ratings, &comments, &options))
}

fn print_report(report: &RunReport, config: &Config) {
    let elapsed = report.finished_at - report.started_at;

    println!("\n=== {} run complete ===\n", report.mode);
    println!(
        "📋 Records {}..{} of {}",
        report.range.start, report.range.end, report.total
    );
    println!("{}", format!("✅ Generated: {}", report.generated).green());
    if report.skipped > 0 {
        println!("⏭️  Skipped (already summarised): {}", report.skipped);
    }
    if report.retained > 0 {
        println!("🛡️  Kept previous summary: {}", report.retained);
    }
    if report.fallbacks > 0 {
        println!("{}", format!("❌ Fallbacks: {}", report.fallbacks).red());
    }
    println!("📍 Next batch starts at: {}", report.next_cursor);
    println!(
        "⏱️  Took {}s, finished {}",
        elapsed.num_seconds(),
        report.finished_at.format("%Y-%m-%d %H:%M")
    );
    println!("💾 Results: {}", config.results_path().display());
}
