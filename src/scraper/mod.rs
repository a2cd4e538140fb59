pub mod cleaner;
pub mod extractor;
pub mod http_client;
pub mod pagination;

use crate::config::ScraperConfig;
use crate::error::FetchError;
use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use self::http_client::HttpClient;

// ── Source trait ──────────────────────────────────────────────────────────────

/// Swappable listing source: anything that can hand out page N as markup.
#[async_trait]
pub trait ListingSource: Send + Sync {
    fn base_url(&self) -> &str;

    async fn fetch_page(&self, page: u32) -> Result<String, FetchError>;
}

/// URL for a listing page. Page 1 is the base URL itself.
pub fn page_url(base_url: &str, page: u32) -> String {
    if page <= 1 {
        base_url.to_string()
    } else {
        let separator = if base_url.contains('?') { '&' } else { '?' };
        format!("{base_url}{separator}page={page}")
    }
}

// ── HTTP-backed store scraper ─────────────────────────────────────────────────

pub struct LeaseStoreScraper {
    client: HttpClient,
    base_url: String,
}

impl LeaseStoreScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        Ok(Self {
            client: HttpClient::new(config)?,
            base_url: config.base_url.clone(),
        })
    }
}

#[async_trait]
impl ListingSource for LeaseStoreScraper {
    fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch_page(&self, page: u32) -> Result<String, FetchError> {
        if page > 1 {
            self.client.polite_delay().await;
        }
        let url = page_url(&self.base_url, page);
        info!("Scraping page {}: {}", page, url);
        self.client.get_text(&url).await
    }
}
