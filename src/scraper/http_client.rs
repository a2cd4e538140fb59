use crate::config::ScraperConfig;
use crate::error::FetchError;
use anyhow::{Context, Result};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

pub struct HttpClient {
    inner: reqwest::Client,
    config: ScraperConfig,
}

impl HttpClient {
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            // Accept cookies so session-based pages work
            .cookie_store(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            inner,
            config: config.clone(),
        })
    }

    /// Fetch a URL as text, retrying transient failures.
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let mut last_err = None;
        let attempts = self.config.max_retries + 1;

        for attempt in 1..=attempts {
            debug!("GET {} (attempt {})", url, attempt);
            let retry_left = attempt < attempts;

            match self.inner.get(url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp.text().await?);
                    } else if status.as_u16() == 429 || status.is_server_error() {
                        // Rate limited or flaky upstream: back off harder
                        let backoff = Duration::from_millis(
                            self.config.request_delay_ms * 2u64.pow(attempt),
                        );
                        warn!(
                            "HTTP {} on attempt {}, sleeping {:?}",
                            status, attempt, backoff
                        );
                        last_err = Some(FetchError::Status { status: status.as_u16(), url: url.to_string() });
                        if retry_left {
                            sleep(backoff).await;
                        }
                    } else {
                        // Other 4xx will not get better
                        return Err(FetchError::Status { status: status.as_u16(), url: url.to_string() });
                    }
                }
                Err(e) => {
                    warn!("Request failed on attempt {}: {}", attempt, e);
                    let backoff = Duration::from_millis(self.config.request_delay_ms * attempt as u64);
                    last_err = Some(if e.is_timeout() {
                        FetchError::Timeout { url: url.to_string() }
                    } else {
                        FetchError::Request(e)
                    });
                    if retry_left {
                        sleep(backoff).await;
                    }
                }
            }
        }

        Err(last_err.unwrap_or(FetchError::Timeout { url: url.to_string() }))
    }

    /// Sleep for the configured delay + random jitter.
    pub async fn polite_delay(&self) {
        let jitter = if self.config.jitter_ms > 0 {
            rand::random_range(0..=self.config.jitter_ms)
        } else {
            0
        };
        let total = Duration::from_millis(self.config.request_delay_ms + jitter);
        sleep(total).await;
    }
}
