use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scraper configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Hard ceiling on pages walked per cycle.
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,

    /// A page with fewer offers than this (and no next control) is the last one.
    #[serde(default = "default_expected_per_page")]
    pub expected_per_page: usize,
}

/// Offer extraction rules
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    #[serde(default = "default_dealer_keywords")]
    pub dealer_keywords: Vec<String>,

    /// Minimum rendered text length for an ancestor to count as an offer card.
    #[serde(default = "default_min_card_text")]
    pub min_card_text: usize,
}

/// Price band and mileage filter
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilterConfig {
    #[serde(default = "default_min_price")]
    pub min_price: f64,

    #[serde(default = "default_max_price")]
    pub max_price: f64,

    #[serde(default = "default_km_allowance")]
    pub km_allowance: u32,

    /// Stop paginating once this many pages produced no in-range offer.
    #[serde(default = "default_max_pages_without_match")]
    pub max_pages_without_match: u32,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_seen_path")]
    pub seen_path: PathBuf,
}

/// Notification sink configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotifierConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Discord user id to mention in every message.
    #[serde(default)]
    pub mention_user_id: Option<String>,

    #[serde(default = "default_notify_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_notify_delay_ms")]
    pub delay_ms: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_footer")]
    pub footer: String,
}

/// Outer loop timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_error_backoff_secs")]
    pub error_backoff_secs: u64,
}

/// Log output besides stdout
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Plain-text log file, appended to. Empty disables it.
    #[serde(default = "default_log_file")]
    pub file: Option<PathBuf>,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://financing.peugeot.store/bestand".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_request_delay_ms() -> u64 {
    2000
}
fn default_jitter_ms() -> u64 {
    500
}
fn default_max_retries() -> u32 {
    2
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string()
}
fn default_max_pages() -> u32 {
    50
}
fn default_expected_per_page() -> usize {
    10
}
fn default_dealer_keywords() -> Vec<String> {
    vec!["Autohaus".into(), "Peugeot".into(), "Stellantis".into()]
}
fn default_min_card_text() -> usize {
    100
}
fn default_min_price() -> f64 {
    50.0
}
fn default_max_price() -> f64 {
    200.0
}
fn default_km_allowance() -> u32 {
    15_000
}
fn default_max_pages_without_match() -> u32 {
    10
}
fn default_seen_path() -> PathBuf {
    PathBuf::from("offers.json")
}
fn default_notify_timeout_secs() -> u64 {
    10
}
fn default_notify_delay_ms() -> u64 {
    1000
}
fn default_footer() -> String {
    "Lease Watch".to_string()
}
fn default_log_file() -> Option<PathBuf> {
    Some(PathBuf::from("monitor.log"))
}
fn default_interval_secs() -> u64 {
    1800
}
fn default_error_backoff_secs() -> u64 {
    60
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            request_delay_ms: default_request_delay_ms(),
            jitter_ms: default_jitter_ms(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
            max_pages: default_max_pages(),
            expected_per_page: default_expected_per_page(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dealer_keywords: default_dealer_keywords(),
            min_card_text: default_min_card_text(),
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            min_price: default_min_price(),
            max_price: default_max_price(),
            km_allowance: default_km_allowance(),
            max_pages_without_match: default_max_pages_without_match(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { seen_path: default_seen_path() }
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            mention_user_id: None,
            timeout_secs: default_notify_timeout_secs(),
            delay_ms: default_notify_delay_ms(),
            max_retries: default_max_retries(),
            footer: default_footer(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            error_backoff_secs: default_error_backoff_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { file: default_log_file() }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

/// Flat variable names kept from the first deployment, mapped to their keys.
const LEGACY_ENV: &[(&str, &str)] = &[
    ("MIN_PRICE", "filter.min_price"),
    ("MAX_PRICE", "filter.max_price"),
    ("KM_ALLOWANCE", "filter.km_allowance"),
    ("CHECK_INTERVAL", "watch.interval_secs"),
    ("STORE_URL", "scraper.base_url"),
    ("OFFERS_FILE", "storage.seen_path"),
    ("DISCORD_WEBHOOK_URL", "notifier.webhook_url"),
    ("DISCORD_USER_ID", "notifier.mention_user_id"),
];

impl AppConfig {
    /// Load configuration from files + environment overrides
    pub fn load(extra: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            );

        if let Some(path) = extra {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(config::Environment::with_prefix("LEASE_WATCH").separator("__"));

        for (var, key) in LEGACY_ENV {
            let value = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
            builder = builder.set_override_option(*key, value.map(|v| v.trim().to_string()))?;
        }

        let app_cfg: AppConfig = builder
            .build()?
            .try_deserialize()
            .context("Invalid configuration")?;

        app_cfg.validate()?;
        Ok(app_cfg.normalized())
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.filter.min_price <= self.filter.max_price,
            "filter.min_price ({}) is above filter.max_price ({})",
            self.filter.min_price,
            self.filter.max_price
        );
        ensure!(self.scraper.max_pages >= 1, "scraper.max_pages must be at least 1");
        url::Url::parse(&self.scraper.base_url)
            .with_context(|| format!("scraper.base_url is not a URL: {}", self.scraper.base_url))?;
        Ok(())
    }

    /// Blank optional strings count as unset.
    fn normalized(mut self) -> Self {
        let blank = |v: &Option<String>| v.as_deref().map(str::trim).is_none_or(str::is_empty);
        if blank(&self.notifier.webhook_url) {
            self.notifier.webhook_url = None;
        }
        if blank(&self.notifier.mention_user_id) {
            self.notifier.mention_user_id = None;
        }
        if self.logging.file.as_ref().is_some_and(|p| p.as_os_str().is_empty()) {
            self.logging.file = None;
        }
        self
    }
}
