//! Check-cycle orchestrator: walker → extractor → filter → notifier → store.
//!
//! ## One cycle
//!   1. Load the seen-set.
//!   2. Walk listing pages in order. Per page: filter, notify every in-range
//!      offer whose id is unseen, mark all in-range ids seen, save if anything
//!      was notified.
//!   3. Stop early when a page is entirely above the price ceiling, or when
//!      too many pages produced nothing in range.
//!   4. Save once more if the set grew since the last save.
//!
//! Delivery failures still mark the offer seen, so a dead webhook cannot cause
//! a notification storm on the next cycle.
//!
//! `watch()` runs cycles forever, one at a time, until the shutdown flag flips.

use crate::config::AppConfig;
use crate::filter::OfferFilter;
use crate::models::Offer;
use crate::notifier::{format_offer, DiscordWebhook, LogSink, NotificationSink};
use crate::scraper::extractor::OfferExtractor;
use crate::scraper::pagination::{PageWalker, StopReason};
use crate::scraper::{LeaseStoreScraper, ListingSource};
use crate::storage::{SeenSet, SeenStore};
use crate::utils::Timer;
use anyhow::{Context, Result};
use chrono::Local;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info, warn};

pub struct Pipeline {
    config: AppConfig,
    source: Box<dyn ListingSource>,
    sink: Box<dyn NotificationSink>,
    store: SeenStore,
    extractor: OfferExtractor,
    filter: OfferFilter,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleStats {
    pub pages: u32,
    pub offers_scraped: usize,
    pub offers_in_range: usize,
    pub new_offers: usize,
    pub failed_notifications: usize,
    pub tracked: usize,
    pub stop_reason: Option<StopReason>,
}

impl Pipeline {
    /// Wire the HTTP scraper and the configured sink.
    pub fn from_config(config: AppConfig, dry_run: bool) -> Result<Self> {
        let source = LeaseStoreScraper::new(&config.scraper).context("Failed to build scraper")?;

        let sink: Box<dyn NotificationSink> = match (&config.notifier.webhook_url, dry_run) {
            (Some(url), false) => Box::new(DiscordWebhook::new(url, &config.notifier)?),
            (None, false) => {
                warn!("No webhook URL configured, notifications will only be logged");
                Box::new(LogSink)
            }
            (_, true) => Box::new(LogSink),
        };

        Self::new(config, Box::new(source), sink)
    }

    pub fn new(config: AppConfig, source: Box<dyn ListingSource>, sink: Box<dyn NotificationSink>) -> Result<Self> {
        let extractor = OfferExtractor::new(source.base_url(), &config.extraction)?;
        Ok(Self {
            store: SeenStore::new(&config.storage),
            filter: OfferFilter::new(&config.filter),
            extractor,
            source,
            sink,
            config,
        })
    }

    /// Walk every page without filtering or notifying.
    pub async fn scan(&self) -> (Vec<Offer>, Option<StopReason>) {
        PageWalker::new(self.source.as_ref(), &self.extractor, &self.config.scraper)
            .collect_all()
            .await
    }

    pub async fn run_check_cycle(&self) -> Result<CycleStats> {
        let _t = Timer::start("Offer check");

        let mut seen = self.store.load();
        info!("Previously seen offers: {}", seen.len());
        let mut saved_len = seen.len();

        let mut stats = CycleStats::default();
        let mut walker = PageWalker::new(self.source.as_ref(), &self.extractor, &self.config.scraper);

        while let Some(page) = walker.next_page().await {
            stats.pages += 1;
            stats.offers_scraped += page.offers.len();
            info!(
                "Found {} offers on page {} (total so far: {})",
                page.offers.len(),
                page.number,
                stats.offers_scraped
            );

            let in_range = self.filter.apply(&page.offers);
            stats.offers_in_range += in_range.len();

            if self.filter.all_above_max(&page.offers) {
                walker.stop(StopReason::AllAboveMax(page.number));
                break;
            }
            if page.number > self.config.filter.max_pages_without_match && stats.offers_in_range == 0 {
                walker.stop(StopReason::NoMatchesInRange(page.number));
                break;
            }
            if in_range.is_empty() {
                continue;
            }

            info!("  → {} offers in range ({}) on this page", in_range.len(), self.filter.describe());

            let mut notified_here = 0usize;
            for offer in &in_range {
                if seen.contains(&offer.id) {
                    continue;
                }
                notified_here += 1;
                info!(
                    "  📢 {} - €{:.2}/month{}",
                    offer.model,
                    offer.monthly_price,
                    offer.km_per_year.map(|km| format!(" ({km} km/year)")).unwrap_or_default()
                );

                let message = format_offer(offer, &self.config.notifier, Local::now().naive_local());
                match self.sink.send(&message).await {
                    Ok(()) => info!("Notification sent via {} for {}", self.sink.name(), offer.model),
                    Err(e) => {
                        error!("Failed to notify about {}: {}", offer.id, e);
                        stats.failed_notifications += 1;
                    }
                }
                seen.insert(offer.id.clone());

                if self.config.notifier.delay_ms > 0 {
                    sleep(Duration::from_millis(self.config.notifier.delay_ms)).await;
                }
            }

            seen.extend(in_range.iter().map(|o| o.id.clone()));

            if notified_here > 0 {
                stats.new_offers += notified_here;
                self.persist(&seen);
                saved_len = seen.len();
                info!("  ✅ {} new offers notified on page {}", notified_here, page.number);
            } else {
                info!("  → All {} offers on this page were already seen", in_range.len());
            }
        }

        if seen.len() != saved_len {
            self.persist(&seen);
        }

        stats.tracked = seen.len();
        stats.stop_reason = walker.stop_reason().cloned();

        info!("{}", "=".repeat(60));
        info!("Scraping complete ({})", stats.stop_reason.as_ref().map(ToString::to_string).unwrap_or_else(|| "stopped".into()));
        info!("Pages scraped: {}", stats.pages);
        info!("Total offers scraped: {}", stats.offers_scraped);
        info!("Offers in range ({}): {}", self.filter.describe(), stats.offers_in_range);
        info!("New offers found and notified: {}", stats.new_offers);
        info!("Total offers tracked: {}", stats.tracked);
        info!("{}", "=".repeat(60));

        Ok(stats)
    }

    /// Failures are logged; the in-memory set stays authoritative.
    fn persist(&self, seen: &SeenSet) {
        if let Err(e) = self.store.save(seen) {
            error!("Error saving seen offers: {:#}", e);
        }
    }

    /// Run one cycle in its own task so a panic is contained like an error.
    async fn guarded_cycle(self: &Arc<Self>) -> Result<CycleStats> {
        let this = Arc::clone(self);
        match tokio::spawn(async move { this.run_check_cycle().await }).await {
            Ok(result) => result,
            Err(e) => Err(anyhow::anyhow!("check cycle panicked: {e}")),
        }
    }

    /// Check now, then every `watch.interval_secs`, until `shutdown` is true.
    pub async fn watch(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.watch.interval_secs);
        let backoff = Duration::from_secs(self.config.watch.error_backoff_secs);

        info!("Lease monitor started");
        info!("Monitoring price range: {}", self.filter.describe());
        info!("Check interval: {} seconds ({} minutes)", interval.as_secs(), interval.as_secs() / 60);

        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = self.guarded_cycle().await {
                error!("Error during offer check: {:#}", e);
                info!("Continuing after error, backing off {:?}", backoff);
                if !pause(&mut shutdown, backoff).await {
                    break;
                }
            }

            info!("Waiting {} seconds until next check...", interval.as_secs());
            if !pause(&mut shutdown, interval).await {
                break;
            }
        }

        info!("Monitor stopped");
    }
}

/// Sleep unless shutdown is requested first. Returns false on shutdown.
async fn pause(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *shutdown.borrow() {
        return false;
    }
    tokio::select! {
        _ = sleep(duration) => true,
        changed = shutdown.changed() => match changed {
            Ok(()) => !*shutdown.borrow(),
            // Sender gone: nobody can ask us to stop any more.
            Err(_) => {
                sleep(duration).await;
                true
            }
        },
    }
}
