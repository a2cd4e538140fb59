//! Offer → webhook message rendering and the sinks that deliver it.

pub mod discord;

use crate::config::NotifierConfig;
use crate::error::NotifyError;
use crate::models::Offer;
use crate::utils::fmt_number;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

pub use self::discord::DiscordWebhook;

pub const EMBED_COLOR: u32 = 0x00ff00;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookMessage {
    /// Mention token, empty when no recipient is configured.
    pub content: String,
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Embed {
    pub title: String,
    pub description: String,
    pub color: u32,
    pub url: String,
    pub footer: EmbedFooter,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
}

/// Render an offer. Pure: the timestamp is passed in.
pub fn format_offer(offer: &Offer, config: &NotifierConfig, at: NaiveDateTime) -> WebhookMessage {
    let km_line = match offer.km_per_year {
        Some(km) if km > 0 => format!("\n**Kilometer:** {} km/year", fmt_number(i64::from(km))),
        _ => String::new(),
    };

    let description = format!(
        "**Monthly Rate:** €{:.2}{}\n**Dealer:** {}\n**Terms:** {}",
        offer.monthly_price,
        km_line,
        offer.dealer,
        offer.terms.as_deref().unwrap_or("N/A"),
    );

    let content = config
        .mention_user_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(|id| format!("<@{id}>"))
        .unwrap_or_default();

    WebhookMessage {
        content,
        embeds: vec![Embed {
            title: format!("🚗 New Leasing Offer: {}", offer.model),
            description,
            color: EMBED_COLOR,
            url: offer.link.clone(),
            footer: EmbedFooter {
                text: format!("{} • {}", config.footer, at.format("%Y-%m-%d %H:%M:%S")),
            },
        }],
    }
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, message: &WebhookMessage) -> Result<(), NotifyError>;

    fn name(&self) -> &'static str;
}

/// Logs messages instead of delivering them (dry runs, no webhook configured).
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, message: &WebhookMessage) -> Result<(), NotifyError> {
        for embed in &message.embeds {
            info!("[dry-run] {} | {} | {}", embed.title, embed.description.replace('\n', " | "), embed.url);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
