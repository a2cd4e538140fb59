//! Sequential page walk with heuristic termination.
//!
//! After a page yields offers, continuation is decided in this order:
//!   1. a next-page control: continue unless it is disabled
//!   2. a "n von m" indicator: stop once n >= m
//!   3. fewer offers than a full page: treat as the last page
//!
//! A page with no offers, a failed fetch or the page ceiling always ends the walk.

use crate::config::ScraperConfig;
use crate::models::{NextControl, Offer, PaginationSignals};
use crate::scraper::extractor::OfferExtractor;
use crate::scraper::ListingSource;
use std::fmt;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    NoOffers(u32),
    NextDisabled,
    LastPage { current: u32, total: u32 },
    FewOffers(usize),
    PageLimit(u32),
    FetchFailed(String),
    AllAboveMax(u32),
    NoMatchesInRange(u32),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::NoOffers(page) => write!(f, "no offers on page {page}"),
            StopReason::NextDisabled => write!(f, "next-page control disabled"),
            StopReason::LastPage { current, total } => write!(f, "page {current} of {total}"),
            StopReason::FewOffers(n) => write!(f, "only {n} offers, likely the last page"),
            StopReason::PageLimit(max) => write!(f, "page limit ({max}) reached"),
            StopReason::FetchFailed(e) => write!(f, "fetch failed: {e}"),
            StopReason::AllAboveMax(page) => write!(f, "every offer on page {page} above max price"),
            StopReason::NoMatchesInRange(pages) => write!(f, "{pages} pages without an offer in range"),
        }
    }
}

/// One successfully fetched page with at least one offer.
#[derive(Debug, Clone)]
pub struct Page {
    pub number: u32,
    pub offers: Vec<Offer>,
}

/// `None` means keep going.
pub fn decide(signals: &PaginationSignals, offer_count: usize, expected_per_page: usize) -> Option<StopReason> {
    match signals.next_control {
        Some(NextControl::Enabled) => None,
        Some(NextControl::Disabled) => Some(StopReason::NextDisabled),
        None => {
            if let Some((current, total)) = signals.page_indicator {
                if current >= total {
                    return Some(StopReason::LastPage { current, total });
                }
            }
            if offer_count < expected_per_page {
                return Some(StopReason::FewOffers(offer_count));
            }
            None
        }
    }
}

pub struct PageWalker<'a> {
    source: &'a dyn ListingSource,
    extractor: &'a OfferExtractor,
    max_pages: u32,
    expected_per_page: usize,
    next_page: u32,
    pending: Option<StopReason>,
    stopped: Option<StopReason>,
}

impl<'a> PageWalker<'a> {
    pub fn new(source: &'a dyn ListingSource, extractor: &'a OfferExtractor, config: &ScraperConfig) -> Self {
        Self {
            source,
            extractor,
            max_pages: config.max_pages.max(1),
            expected_per_page: config.expected_per_page,
            next_page: 1,
            pending: None,
            stopped: None,
        }
    }

    /// Fetch and extract the next page, or `None` once the walk is over.
    pub async fn next_page(&mut self) -> Option<Page> {
        if self.stopped.is_some() {
            return None;
        }
        if let Some(reason) = self.pending.take() {
            self.stop(reason);
            return None;
        }

        let number = self.next_page;
        let html = match self.source.fetch_page(number).await {
            Ok(html) => html,
            Err(e) => {
                error!("Error fetching page {}: {}", number, e);
                self.stop(StopReason::FetchFailed(e.to_string()));
                return None;
            }
        };

        let parsed = self.extractor.parse_page(&html);
        if parsed.offers.is_empty() {
            info!("No offers found on page {}, stopping pagination", number);
            self.stop(StopReason::NoOffers(number));
            return None;
        }

        match decide(&parsed.signals, parsed.offers.len(), self.expected_per_page) {
            Some(reason) => self.pending = Some(reason),
            None if number >= self.max_pages => {
                warn!("Reached page limit ({}), stopping", self.max_pages);
                self.pending = Some(StopReason::PageLimit(self.max_pages));
            }
            None => self.next_page += 1,
        }

        Some(Page { number, offers: parsed.offers })
    }

    /// End the walk early. The first recorded reason wins.
    pub fn stop(&mut self, reason: StopReason) {
        self.pending = None;
        if self.stopped.is_none() {
            info!("Stopping pagination: {}", reason);
            self.stopped = Some(reason);
        }
    }

    pub fn stop_reason(&self) -> Option<&StopReason> {
        self.stopped.as_ref()
    }

    /// Walk every page without any per-page early exit.
    pub async fn collect_all(mut self) -> (Vec<Offer>, Option<StopReason>) {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await {
            info!("Found {} offers on page {} (total so far: {})", page.offers.len(), page.number, all.len() + page.offers.len());
            all.extend(page.offers);
        }
        info!("Total offers scraped: {}", all.len());
        (all, self.stopped)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ExtractionConfig;
    use crate::error::FetchError;
    use crate::scraper::extractor::tests::{card, page, BASE};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Serves canned pages; `None` entries fail with HTTP 503.
    pub(crate) struct FakeSource {
        pub pages: Vec<Option<String>>,
        pub fetches: AtomicU32,
    }

    impl FakeSource {
        pub(crate) fn new(pages: Vec<Option<String>>) -> Self {
            Self { pages, fetches: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl ListingSource for FakeSource {
        fn base_url(&self) -> &str {
            BASE
        }

        async fn fetch_page(&self, page: u32) -> Result<String, FetchError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            match self.pages.get(page as usize - 1) {
                Some(Some(html)) => Ok(html.clone()),
                Some(None) => Err(FetchError::Status { status: 503, url: format!("{BASE}?page={page}") }),
                None => Ok("<html><body><p>Keine Treffer</p></body></html>".to_string()),
            }
        }
    }

    pub(crate) const NEXT: &str = r#"<nav><a href="?page=next">weiter</a></nav>"#;

    pub(crate) fn cards(prices: &[&str]) -> Vec<String> {
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| {
                card(
                    &format!("308 SW Allure Pack Nr. {i}"),
                    &format!("{p} € / Monat"),
                    "Autohaus Beispiel GmbH",
                    "24 Mon. / 15.000 km",
                    &format!("/angebot/{i}"),
                )
            })
            .collect()
    }

    fn extractor() -> OfferExtractor {
        OfferExtractor::new(BASE, &ExtractionConfig::default()).unwrap()
    }

    fn walk(source: &FakeSource, max_pages: u32) -> (Vec<u32>, Option<StopReason>) {
        let ex = extractor();
        let cfg = ScraperConfig { max_pages, ..ScraperConfig::default() };
        tokio_test::block_on(async {
            let mut walker = PageWalker::new(source, &ex, &cfg);
            let mut numbers = Vec::new();
            while let Some(p) = walker.next_page().await {
                numbers.push(p.number);
            }
            (numbers, walker.stop_reason().cloned())
        })
    }

    #[test]
    fn test_decide_precedence() {
        let enabled = PaginationSignals { next_control: Some(NextControl::Enabled), page_indicator: Some((5, 5)) };
        assert_eq!(decide(&enabled, 1, 10), None);

        let disabled = PaginationSignals { next_control: Some(NextControl::Disabled), page_indicator: None };
        assert_eq!(decide(&disabled, 20, 10), Some(StopReason::NextDisabled));

        let last = PaginationSignals { next_control: None, page_indicator: Some((3, 3)) };
        assert_eq!(decide(&last, 20, 10), Some(StopReason::LastPage { current: 3, total: 3 }));

        let middle = PaginationSignals { next_control: None, page_indicator: Some((2, 3)) };
        assert_eq!(decide(&middle, 20, 10), None);
        assert_eq!(decide(&middle, 4, 10), Some(StopReason::FewOffers(4)));

        assert_eq!(decide(&PaginationSignals::default(), 10, 10), None);
    }

    #[test]
    fn test_empty_page_ends_walk() {
        let source = FakeSource::new(vec![Some(page(&cards(&["120,00"]), NEXT)), Some(page(&[], NEXT))]);
        let (pages, reason) = walk(&source, 50);
        assert_eq!(pages, vec![1]);
        assert_eq!(reason, Some(StopReason::NoOffers(2)));
    }

    #[test]
    fn test_follows_next_control_until_disabled() {
        let disabled = r#"<a class="disabled" href="">»</a>"#;
        let source = FakeSource::new(vec![
            Some(page(&cards(&["120,00"]), NEXT)),
            Some(page(&cards(&["130,00"]), NEXT)),
            Some(page(&cards(&["140,00"]), disabled)),
        ]);
        let (pages, reason) = walk(&source, 50);
        assert_eq!(pages, vec![1, 2, 3]);
        assert_eq!(reason, Some(StopReason::NextDisabled));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_few_offers_without_next_control_is_last_page() {
        let source = FakeSource::new(vec![Some(page(&cards(&["120,00", "99,00"]), ""))]);
        let (pages, reason) = walk(&source, 50);
        assert_eq!(pages, vec![1]);
        assert_eq!(reason, Some(StopReason::FewOffers(2)));
    }

    #[test]
    fn test_short_page_with_labelled_next_link_continues() {
        let weiter = r#"<nav><a href="?page=2">Weiter ›</a></nav>"#;
        let six = cards(&["120,00", "121,00", "122,00", "123,00", "124,00", "125,00"]);
        let source = FakeSource::new(vec![Some(page(&six, weiter)), Some(page(&cards(&["130,00"]), ""))]);
        let (pages, reason) = walk(&source, 50);
        assert_eq!(pages, vec![1, 2]);
        assert_eq!(reason, Some(StopReason::FewOffers(1)));
    }

    #[test]
    fn test_page_ceiling_bounds_the_walk() {
        let pages_html = (0..10).map(|_| Some(page(&cards(&["120,00"]), NEXT))).collect();
        let source = FakeSource::new(pages_html);
        let (pages, reason) = walk(&source, 3);
        assert_eq!(pages, vec![1, 2, 3]);
        assert_eq!(reason, Some(StopReason::PageLimit(3)));
        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_fetch_failure_keeps_earlier_pages() {
        let source = FakeSource::new(vec![Some(page(&cards(&["120,00"]), NEXT)), None]);
        let (pages, reason) = walk(&source, 50);
        assert_eq!(pages, vec![1]);
        assert!(matches!(reason, Some(StopReason::FetchFailed(_))));
    }
}
