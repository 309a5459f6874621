//! Armory-Spyder main entry point
//!
//! Command-line interface for the Armory crawler.

use armory_spyder::config::{default_config, load_config, Config};
use armory_spyder::crawler::seed::{apply_seed, load_seed};
use armory_spyder::fetch::build_http_client;
use armory_spyder::pool::{DownloadPool, FetcherFactory};
use armory_spyder::storage::Storage;
use armory_spyder::{
    ArmoryFetcher, ArmoryUrls, CacheStore, CallerIdentity, Crawler, Downloader, QueueManager, Site,
    SqliteStorage,
};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Armory-Spyder: a polite Armory crawler
///
/// Crawls a regional Armory site realm by realm, discovering guilds
/// through the arena ladders and downloading their rosters. Multiple
/// instances may share one database; a locking work queue keeps them
/// off each other's realms.
#[derive(Parser, Debug)]
#[command(name = "armory-spyder")]
#[command(version)]
#[command(about = "A polite Armory crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (built-in defaults when omitted)
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Crawl this site, overriding the configuration
    #[arg(long, value_name = "SITE")]
    site: Option<Site>,

    /// Load a realm seed file into the database and exit
    #[arg(long, value_name = "FILE", conflicts_with = "stats")]
    seed: Option<PathBuf>,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "seed")]
    stats: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    let config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            load_config(path)?
        }
        None => {
            tracing::info!("No configuration file given, using defaults");
            default_config()
        }
    };

    // Handle different modes
    if let Some(seed_path) = &cli.seed {
        handle_seed(&config, seed_path)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else {
        handle_crawl(config, cli.site).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("armory_spyder=info,warn"),
            1 => EnvFilter::new("armory_spyder=debug,info"),
            2 => EnvFilter::new("armory_spyder=trace,debug"),
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

/// Handles the --seed mode: loads realm topology into the database
fn handle_seed(config: &Config, seed_path: &Path) -> anyhow::Result<()> {
    println!("Database: {}", config.storage.database_path);
    println!("Seed file: {}\n", seed_path.display());

    let seed = load_seed(seed_path)?;
    let mut storage = SqliteStorage::new(Path::new(&config.storage.database_path))?;
    let (battlegroups, realms) = apply_seed(&mut storage, &seed)?;

    println!("Seeded {} battlegroups, {} realms", battlegroups, realms);
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = SqliteStorage::new(Path::new(&config.storage.database_path))?;
    let counts = storage.counts()?;

    println!("Battlegroups: {}", counts.battlegroups);
    println!(
        "Realms:       {} ({} refreshed, {} locked)",
        counts.realms, counts.refreshed_realms, counts.locked_realms
    );
    println!(
        "Guilds:       {} ({} refreshed)",
        counts.guilds, counts.refreshed_guilds
    );
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config, site_override: Option<Site>) -> anyhow::Result<()> {
    let storage = Arc::new(Mutex::new(SqliteStorage::new(Path::new(
        &config.storage.database_path,
    ))?));

    let identity = match &config.crawler.identity {
        Some(name) => CallerIdentity::named(name.clone()),
        None => CallerIdentity::from_hostname(),
    };
    tracing::info!("Locking realms as {:?}", identity.as_str());

    let site = site_override.or(config.crawler.site);
    let queue = QueueManager::new(Arc::clone(&storage), site, identity);
    let site = queue.site();

    let urls = ArmoryUrls::new(&config.armory.scheme, &config.armory.domain);
    let user_agent = config.user_agent.header_value();

    // Fail fast on a bad client configuration before any worker needs one.
    build_http_client(&user_agent)?;

    let cache = CacheStore::new();
    let policy = config.downloader.backoff_policy();
    let probe = urls.login_status(site);
    let factory: FetcherFactory = {
        let cache = cache.clone();
        Arc::new(move || {
            let client = build_http_client(&user_agent)
                .expect("HTTP client configuration was validated at startup");
            Box::new(ArmoryFetcher::new(
                client,
                cache.clone(),
                policy.clone(),
                Some(probe.clone()),
            ))
        })
    };

    let pool = Arc::new(DownloadPool::start(
        config.downloader.pool_config(),
        cache,
        factory,
    ));
    let downloader = Downloader::new(Arc::clone(&pool));

    let crawler = Crawler::new(
        urls,
        downloader,
        queue,
        storage,
        config.crawler.refresh_all,
    );

    tracing::info!("Starting crawl of site {}", site);
    let result = crawler.run().await;
    pool.shutdown();

    match result {
        Ok(finished) => {
            tracing::info!("Crawl completed, {} realms finished", finished);
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            Err(e.into())
        }
    }
}
