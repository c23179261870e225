//! Catalog-Harvest main entry point
//!
//! This is the command-line interface for the Catalog-Harvest catalog mirror.

use anyhow::{Context, Result};
use catalog_harvest::config::{load_config_with_hash, Config};
use catalog_harvest::crawler::{CategorySync, ListingCrawler, ProductCrawler};
use catalog_harvest::output::{
    load_statistics, print_listing_report, print_product_report, print_statistics,
    print_sync_report,
};
use catalog_harvest::portal::PortalClient;
use catalog_harvest::storage::{Database, Storage};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Catalog-Harvest: incremental marketplace catalog mirror
///
/// Catalog-Harvest keeps a local SQLite copy of a remote marketplace
/// catalog: the category tree, product listings and full product detail.
#[derive(Parser, Debug)]
#[command(name = "catalog-harvest")]
#[command(version = "1.0.0")]
#[command(about = "Incremental marketplace catalog mirror", long_about = None)]
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
    /// Fetch the remote category tree and reconcile it locally
    SyncCategories,

    /// Collect product stubs from the leaf categories under a root
    CrawlListings {
        /// Local id of the root category
        #[arg(long)]
        root: i64,
    },

    /// Fetch full detail for fresh unparsed stubs under a root
    CrawlProducts {
        /// Local id of the root category
        #[arg(long)]
        root: i64,
    },

    /// Crawl listings, then products, under a root
    Crawl {
        /// Local id of the root category
        #[arg(long)]
        root: i64,
    },

    /// Print the root categories as JSON
    Roots,

    /// Print the leaf categories under a root as JSON
    Leaves {
        /// Local id of the root category
        #[arg(long)]
        root: i64,
    },

    /// Show statistics from the database and exit
    Stats,

    /// Validate the configuration and exit
    CheckConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command {
        Command::CheckConfig => handle_check_config(&config),
        Command::Stats => handle_stats(&config),
        Command::Roots => handle_roots(&config),
        Command::Leaves { root } => handle_leaves(&config, root),
        Command::SyncCategories => handle_sync(&config),
        Command::CrawlListings { root } => handle_listings(&config, root),
        Command::CrawlProducts { root } => handle_products(&config, root),
        Command::Crawl { root } => {
            handle_listings(&config, root)?;
            handle_products(&config, root)
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
///
/// `RUST_LOG` takes precedence when set.
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if quiet {
            // Only show errors
            EnvFilter::new("error")
        } else {
            match verbose {
                0 => EnvFilter::new("catalog_harvest=info,warn"),
                1 => EnvFilter::new("catalog_harvest=debug,info"),
                2 => EnvFilter::new("catalog_harvest=trace,debug"),
                _ => EnvFilter::new("trace"),
            }
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .with_file(false)
        .init();
}

fn open_database(config: &Config) -> Result<Database> {
    let database = Database::open(&config.storage.database_path)
        .with_context(|| format!("failed to open {}", config.storage.database_path))?;
    Ok(database.with_lock_ttl(config.crawler.lock_ttl()))
}

fn portal_client(config: &Config) -> Result<PortalClient> {
    PortalClient::new(&config.portal).context("failed to build the portal client")
}

/// Handles check-config: shows the effective configuration
fn handle_check_config(config: &Config) -> Result<()> {
    println!("=== Catalog-Harvest Configuration ===\n");

    println!("Portal:");
    println!("  API base: {}", config.portal.api_base);
    println!("  Site URL: {}", config.portal.site_url);
    println!("  Root category (portal id): {}", config.portal.root_category_id);
    println!("  Timeout: {}s", config.portal.timeout_secs);
    println!("  Referer paths: {}", config.portal.referer_paths.len());

    println!("\nCrawler:");
    println!("  Listing workers: {}", config.crawler.listing_workers);
    println!("  Category workers: {}", config.crawler.category_workers);
    println!("  Product workers: {}", config.crawler.product_workers);
    println!("  Batch size: {}", config.crawler.batch_size);
    println!("  Page size: {}", config.crawler.page_size);
    println!("  Max page delay: {}ms", config.crawler.max_page_delay_ms);
    println!("  Max product delay: {}ms", config.crawler.max_product_delay_ms);
    println!("  Session max age: {}h", config.crawler.session_max_age_hours);
    println!("  Lock TTL: {}s", config.crawler.lock_ttl_secs);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles stats: shows statistics from the database
fn handle_stats(config: &Config) -> Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_database(config)?.connect()?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

fn handle_roots(config: &Config) -> Result<()> {
    let storage = open_database(config)?.connect()?;
    let roots = storage.root_categories()?;
    println!("{}", serde_json::to_string_pretty(&roots)?);
    Ok(())
}

fn handle_leaves(config: &Config, root: i64) -> Result<()> {
    let storage = open_database(config)?.connect()?;
    if storage.get_category(root)?.is_none() {
        anyhow::bail!("category {} does not exist", root);
    }
    let leaves = storage.category_leaves(root)?;
    println!("{}", serde_json::to_string_pretty(&leaves)?);
    Ok(())
}

fn handle_sync(config: &Config) -> Result<()> {
    let database = open_database(config)?;
    let client = portal_client(config)?;

    let report = CategorySync::new(client, database)
        .sync()
        .context("category sync failed")?;
    print_sync_report(&report);
    Ok(())
}

fn handle_listings(config: &Config, root: i64) -> Result<()> {
    let database = open_database(config)?;
    let client = portal_client(config)?;

    let report = ListingCrawler::new(client, database, config.crawler.clone())
        .crawl_listings(root)
        .with_context(|| format!("listing crawl under category {} failed", root))?;
    print_listing_report(&report);
    Ok(())
}

fn handle_products(config: &Config, root: i64) -> Result<()> {
    let database = open_database(config)?;
    let client = portal_client(config)?;

    let report = ProductCrawler::new(client, database, config.crawler.clone())
        .crawl_products(root)
        .with_context(|| format!("product crawl under category {} failed", root))?;
    print_product_report(&report);
    Ok(())
}
