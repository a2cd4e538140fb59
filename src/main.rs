mod config;
mod error;
mod filter;
mod loader;
mod models;
mod notifier;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::AppConfig;
use crate::loader::{discover_html_files, load_snapshot, write_offers_csv};
use crate::pipeline::Pipeline;
use crate::scraper::extractor::OfferExtractor;
use crate::storage::SeenStore;

#[derive(Parser)]
#[command(name = "lease-watch", about = "Leasing offer monitor", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Extra TOML config file, applied after config/default and config/local
    #[arg(long, env = "LEASE_WATCH_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log notifications instead of posting them
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Check now, then keep checking on the configured interval (Ctrl-C to stop)
    Watch,

    /// Run a single check cycle
    Check,

    /// Walk all listing pages and print every offer, unfiltered
    Scan {
        /// Also write the offers to this CSV file
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run the extractor over a saved HTML page or a directory of them
    Parse {
        path: PathBuf,

        /// Base URL used to resolve relative links
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Show the persisted seen-offer set
    Seen {
        /// Print every id
        #[arg(short, long)]
        list: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "lease_watch=info,warn",
        1 => "lease_watch=debug,info",
        _ => "trace",
    };

    let config = AppConfig::load(cli.config.as_deref())?;

    let log_file = match &config.logging.file {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {:?}", path))?,
        ),
        None => None,
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(log_file.map(|f| fmt::layer().with_ansi(false).with_target(false).with_writer(Arc::new(f))))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match cli.command {
        Command::Watch => {
            let pipeline = Arc::new(Pipeline::from_config(config, cli.dry_run)?);
            let (tx, rx) = tokio::sync::watch::channel(false);

            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Stop requested, finishing current step"),
                    Err(e) => error!("Could not listen for Ctrl-C: {}", e),
                }
                let _ = tx.send(true);
                // Keep the sender alive so the loop never sees a closed channel.
                std::future::pending::<()>().await;
            });

            pipeline.watch(rx).await;
        }

        Command::Check => {
            let stats = Pipeline::from_config(config, cli.dry_run)?.run_check_cycle().await?;
            println!(
                "{} pages | {} offers | {} in range | {} new | {} failed sends | {} tracked",
                stats.pages,
                stats.offers_scraped,
                stats.offers_in_range,
                stats.new_offers,
                stats.failed_notifications,
                stats.tracked
            );
        }

        Command::Scan { out } => {
            let pipeline = Pipeline::from_config(config, true)?;
            let (offers, reason) = pipeline.scan().await;
            for o in &offers {
                println!(
                    "{:>8.2} €  {:<40} {:<30} {}",
                    o.monthly_price,
                    o.model,
                    o.dealer,
                    o.terms.as_deref().unwrap_or("-")
                );
            }
            if let Some(reason) = reason {
                println!("{} offers ({})", offers.len(), reason);
            }
            if let Some(path) = out {
                write_offers_csv(&path, &offers)?;
            }
        }

        Command::Parse { path, base_url } => {
            let base_url = base_url.unwrap_or_else(|| config.scraper.base_url.clone());
            let extractor = OfferExtractor::new(&base_url, &config.extraction)?;
            let mut offers = Vec::new();
            for file in discover_html_files(&path)? {
                offers.extend(load_snapshot(&file, &extractor)?);
            }
            println!("{}", serde_json::to_string_pretty(&offers)?);
        }

        Command::Seen { list } => {
            let store = SeenStore::new(&config.storage);
            let seen = store.load();
            println!("{} seen offers in {:?}", seen.len(), store.path());
            if list {
                for id in &seen {
                    println!("  {}", id);
                }
            }
        }
    }

    Ok(())
}
