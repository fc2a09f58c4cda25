//! Site auditor main entry point
//!
//! This is the command-line interface for the site auditor crawl engine.

use anyhow::Context;
use clap::Parser;
use site_auditor::config::{load_config_with_hash, Config};
use site_auditor::crawler::run_queue;
use site_auditor::output::{load_statistics, print_statistics};
use site_auditor::scan::{has_active_scan, register_site, schedule_site_scan};
use site_auditor::state::ScanType;
use site_auditor::storage::{lock, open_storage, SqliteStorage, Storage};
use site_auditor::url::canonical_base_url;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Site auditor: crawls registered sites into per-scan page inventories
///
/// Every configured site gets a scan unless one is already in flight. Pages
/// of a scan are downloaded by a worker pool that drains the job queue.
#[derive(Parser, Debug)]
#[command(name = "site-auditor")]
#[command(version = "1.0.0")]
#[command(about = "Crawl scheduling and download reconciliation for site audits", long_about = None)]
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

    /// Register and scan an extra site by base URL (repeatable)
    #[arg(long = "scan", value_name = "URL")]
    scan: Vec<String>,

    /// Schedule the --scan sites as user-requested scans
    #[arg(long, requires = "scan")]
    user: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    stats: bool,

    /// Validate config and show what would be scanned without crawling
    #[arg(long, conflicts_with = "stats")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    if cli.dry_run {
        handle_dry_run(&config, &cli.scan)
    } else if cli.stats {
        handle_stats(&config)
    } else {
        let extra_type = if cli.user {
            ScanType::User
        } else {
            ScanType::Auto
        };
        handle_audit(config, &cli.scan, extra_type).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("site_auditor=info,warn"),
            1 => EnvFilter::new("site_auditor=debug,info"),
            2 => EnvFilter::new("site_auditor=trace,debug"),
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

/// Handles the --dry-run mode: shows the configuration and the sites to scan
fn handle_dry_run(config: &Config, extra: &[String]) -> anyhow::Result<()> {
    println!("=== Site Auditor Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!(
        "  Timeouts: connect {}s, total {}s",
        config.crawler.connect_timeout, config.crawler.timeout
    );
    println!("  Max redirects: {}", config.crawler.max_redirects);
    println!(
        "  Fragment retries: {} (delay {}ms)",
        config.crawler.max_fragment_retries, config.crawler.fragment_retry_delay
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Database: {}", config.output.database_path);

    println!("\nSites ({}):", config.sites.len() + extra.len());
    let configured = config.sites.iter().map(|s| s.base_url.as_str());
    for raw in configured.chain(extra.iter().map(String::as_str)) {
        let base_url = canonical_base_url(raw).with_context(|| format!("invalid site {}", raw))?;
        println!("  - {}", base_url);
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_database(&config.output.database_path)?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the default mode: schedule scans, drain the queue, report
async fn handle_audit(config: Config, extra: &[String], extra_type: ScanType) -> anyhow::Result<()> {
    let mut storage = open_database(&config.output.database_path)?;

    let configured = config.sites.iter().map(|s| (s.base_url.as_str(), ScanType::Auto));
    let requested = extra.iter().map(|url| (url.as_str(), extra_type));

    let mut scheduled = 0;
    for (raw, scan_type) in configured.chain(requested) {
        let site = register_site(&mut storage, raw)
            .with_context(|| format!("failed to register site {}", raw))?;

        if has_active_scan(&storage, site.id)? {
            tracing::info!(site_id = site.id, "Scan already in flight for {}", site.base_url);
            continue;
        }

        let scan = schedule_site_scan(&mut storage, &site, scan_type)?;
        tracing::debug!(scan_id = scan.id, site_id = site.id, "Scheduled {} scan", scan_type);
        scheduled += 1;
    }
    tracing::info!("Scheduled {} new scans", scheduled);

    let storage = Arc::new(Mutex::new(storage));
    let summary = run_queue(&config, Arc::clone(&storage))
        .await
        .context("worker pool failed")?;

    tracing::info!(
        done = summary.done,
        failed = summary.failed,
        superseded = summary.superseded,
        requeued = summary.requeued,
        "Queue drained after {} jobs, {} pages discovered",
        summary.jobs_run(),
        summary.pages_scheduled
    );

    let stats = {
        let storage = lock(&storage)?;
        load_statistics(&*storage)?
    };
    print_statistics(&stats);

    Ok(())
}

fn open_database(path: &str) -> anyhow::Result<SqliteStorage> {
    let storage = open_storage(Path::new(path))
        .with_context(|| format!("failed to open database {}", path))?;
    tracing::debug!("Database opened with {} sites", storage.list_sites()?.len());
    Ok(storage)
}
