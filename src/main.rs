//! Rill main entry point
//!
//! Command-line interface for running fetchers and dispatchers against a
//! shared crawl database, and for seeding and excluding domains.

use anyhow::Context;
use clap::{Parser, Subcommand};
use rill::config::{load_config_with_hash, Config};
use rill::fetcher::{FetchManager, LoggingHandler};
use rill::storage::SqliteDatastore;
use rill::url::CrawlUrl;
use rill::Dispatcher;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Rill: a distributed, segment-based web crawler
///
/// Any number of Rill processes can share one database. Dispatchers cut
/// per-domain segments of uncrawled links; fetchers claim domains and crawl
/// their segments politely.
#[derive(Parser, Debug)]
#[command(name = "rill")]
#[command(version)]
#[command(about = "A distributed, segment-based web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run fetch workers until interrupted
    Fetch,

    /// Run the segment dispatcher until interrupted
    Dispatch {
        /// Run a single pass and exit
        #[arg(long)]
        once: bool,
    },

    /// Run fetch workers and the dispatcher in one process
    Crawl,

    /// Add URLs (and their domains) as uncrawled links
    Seed {
        #[arg(value_name = "URL", required = true)]
        urls: Vec<String>,
    },

    /// Exclude a domain from crawling
    Exclude {
        domain: String,
        reason: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    let store = Arc::new(
        SqliteDatastore::open(&config.datastore)
            .with_context(|| format!("failed to open {}", config.datastore.database_path))?,
    );

    match cli.command {
        Command::Fetch => run_fetch(config, store).await,
        Command::Dispatch { once: true } => {
            let dispatcher = Dispatcher::new(config.dispatcher.clone(), store);
            let count = dispatcher.dispatch_once().await?;
            tracing::info!("Dispatched {} domains", count);
            Ok(())
        }
        Command::Dispatch { once: false } => run_dispatch(config, store).await,
        Command::Crawl => run_crawl(config, store).await,
        Command::Seed { urls } => seed(&store, &urls),
        Command::Exclude { domain, reason } => {
            store.exclude_domain(&domain, &reason)?;
            println!("Excluded {}: {}", domain, reason);
            Ok(())
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("rill=info,warn"),
            1 => EnvFilter::new("rill=debug,info"),
            2 => EnvFilter::new("rill=trace,debug"),
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

fn fetch_manager(config: &Config, store: Arc<SqliteDatastore>) -> anyhow::Result<Arc<FetchManager>> {
    let manager = Arc::new(FetchManager::new(config.clone()));
    manager.set_datastore(store)?;
    manager.add_handler(Arc::new(LoggingHandler))?;
    Ok(manager)
}

async fn run_fetch(config: Config, store: Arc<SqliteDatastore>) -> anyhow::Result<()> {
    let manager = fetch_manager(&config, store)?;

    let running = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.start().await }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C, shutting down");
    manager.stop().await?;
    running.await??;
    Ok(())
}

async fn run_dispatch(config: Config, store: Arc<SqliteDatastore>) -> anyhow::Result<()> {
    let dispatcher = Arc::new(Dispatcher::new(config.dispatcher.clone(), store));

    let running = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.start().await }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C, shutting down");
    dispatcher.stop().await?;
    running.await??;
    Ok(())
}

async fn run_crawl(config: Config, store: Arc<SqliteDatastore>) -> anyhow::Result<()> {
    let manager = fetch_manager(&config, Arc::clone(&store))?;
    let dispatcher = Arc::new(Dispatcher::new(config.dispatcher.clone(), store));

    let fetching = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { manager.start().await }
    });
    let dispatching = tokio::spawn({
        let dispatcher = Arc::clone(&dispatcher);
        async move { dispatcher.start().await }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C, shutting down");

    dispatcher.stop().await?;
    manager.stop().await?;
    dispatching.await??;
    fetching.await??;
    Ok(())
}

fn seed(store: &SqliteDatastore, urls: &[String]) -> anyhow::Result<()> {
    let mut added = 0;
    for raw in urls {
        match CrawlUrl::parse(raw) {
            Ok(url) => {
                store.seed(&url)?;
                added += 1;
            }
            Err(e) => tracing::warn!("Skipping {}: {}", raw, e),
        }
    }
    println!("Seeded {} of {} URLs", added, urls.len());
    Ok(())
}
