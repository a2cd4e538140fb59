use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_MODEL: &str = "Unknown Model";
pub const UNKNOWN_DEALER: &str = "Unknown Dealer";

// ── Offer ─────────────────────────────────────────────────────────────────────

/// One leasing offer as extracted from a listing card.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Offer {
    /// Dedup key, derived from model + dealer + price + terms.
    pub id: String,
    pub model: String,
    pub monthly_price: f64,
    pub dealer: String,
    pub terms: Option<String>,     // "36 Mon. / 15.000 km"
    pub km_per_year: Option<u32>,
    pub link: String,
    pub price_text: String,        // matched fragment, kept for diagnostics
}

// ── Seen-set record ───────────────────────────────────────────────────────────

/// On-disk shape of the seen-set file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SeenRecord {
    pub seen_offers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

// ── Pagination markers ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextControl {
    Enabled,
    Disabled,
}

/// Pagination markers found on a listing page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationSignals {
    pub next_control: Option<NextControl>,
    /// `(current, total)` from a "3 von 7" style indicator.
    pub page_indicator: Option<(u32, u32)>,
}

/// Everything the walker needs from one fetched page.
#[derive(Debug, Clone, Default)]
pub struct ParsedPage {
    pub offers: Vec<Offer>,
    pub signals: PaginationSignals,
}
