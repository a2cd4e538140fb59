use crate::config::NotifierConfig;
use crate::error::NotifyError;
use crate::notifier::{NotificationSink, WebhookMessage};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;
use tracing::{debug, error, warn};

/// Posts messages to a Discord-compatible webhook.
pub struct DiscordWebhook {
    client: reqwest::Client,
    url: String,
    max_retries: usize,
}

impl DiscordWebhook {
    pub fn new(url: &str, config: &NotifierConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build webhook client")?;

        Ok(Self {
            client,
            url: url.to_string(),
            max_retries: config.max_retries as usize,
        })
    }

    async fn post(&self, message: &WebhookMessage) -> Result<(), NotifyError> {
        let resp = self.client.post(&self.url).json(message).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        let err = NotifyError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(200).collect(),
        };
        warn!("Webhook answered {}", err);
        Err(err)
    }
}

#[async_trait]
impl NotificationSink for DiscordWebhook {
    async fn send(&self, message: &WebhookMessage) -> Result<(), NotifyError> {
        debug!("Sending webhook to: {}...", self.url.chars().take(50).collect::<String>());

        let strategy = ExponentialBackoff::from_millis(2)
            .factor(250)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries);

        RetryIf::spawn(strategy, || self.post(message), NotifyError::is_transient)
            .await
            .inspect_err(|e| error!("Notification delivery failed: {}", e))
    }

    fn name(&self) -> &'static str {
        "discord"
    }
}
