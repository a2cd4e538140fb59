//! Offer extraction from loosely structured listing markup.
//!
//! ## Strategies
//!
//! Primary: every text node that looks like a monthly rate is walked up to the
//! nearest `article`/`div`/`section`/`li` whose rendered text is long enough
//! to be a whole offer card. Each card is processed once, however many rate
//! fragments it contains.
//!
//! Fallback (only when the primary pass yields nothing): elements whose
//! class or test id hints at offer/vehicle/card/item/product semantics.
//!
//! Each field has its own strategy chain; a field that cannot be read falls
//! back to a sentinel or `None`. Only a missing price drops the card.

use crate::config::ExtractionConfig;
use crate::filter::offer_id;
use crate::models::{NextControl, Offer, PaginationSignals, ParsedPage, UNKNOWN_DEALER, UNKNOWN_MODEL};
use crate::scraper::cleaner::{collapse_whitespace, parse_km, parse_monthly_price};
use anyhow::{Context, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

const CONTAINER_TAGS: &[&str] = &["article", "div", "section", "li"];
const FALLBACK_TAGS: &[&str] = &["article", "div"];
const HEADING_TAGS: [&str; 5] = ["h1", "h2", "h3", "h4", "h5"];
const DEALER_PARENT_TAGS: &[&str] = &["div", "p", "span", "strong"];

static PRICE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d{3})*[.,]\d+)\s*€\s*/?\s*Monat").expect("static regex")
});
static PRICE_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+[.,]\d+\s*€").expect("static regex"));
static MODEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{3,4}\s*(?:SW|GT|ALLURE|STYLE|ACTIVE)?\s*[A-Z\s]+)").expect("static regex")
});
static TERMS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d+\s*Mon(?:ate?|\.)?\s*/\s*(\d+[.,]?\d*)\s*k?m)").expect("static regex")
});
static TERMS_NODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\d+\s*Mon(?:ate?|\.)?\s*/\s*\d+").expect("static regex"));
static KM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/\s*(\d+[.,]?\d*)\s*k?m").expect("static regex"));
static CARD_HINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)offer|vehicle|card|item|product").expect("static regex"));
/// Arrow glyphs standing alone, or whole next-page words ("Weiter ›", "» next").
static NEXT_TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|\s)(?:»|›|>>?)(?:\s|$)|\b(?:next|weiter|nächste)\b").expect("static regex")
});
static NEXT_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)next|weiter|nächste").expect("static regex"));
static PAGE_OF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*(?:von|of)\s*(\d+)").expect("static regex"));

static ANCHOR_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a").expect("static selector"));
static HREF_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("static selector"));
static FALLBACK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(&FALLBACK_TAGS.join(", ")).expect("static selector"));
static HEADING_SELS: LazyLock<[Selector; 5]> =
    LazyLock::new(|| HEADING_TAGS.map(|tag| Selector::parse(tag).expect("static selector")));

/// Extracts offers and pagination markers from listing pages of one site.
pub struct OfferExtractor {
    base_url: String,
    site_root: String,
    dealer_re: Regex,
    min_card_text: usize,
}

impl OfferExtractor {
    pub fn new(base_url: &str, config: &ExtractionConfig) -> Result<Self> {
        let parsed = Url::parse(base_url).with_context(|| format!("Invalid base URL {base_url}"))?;
        let site_root = parsed.origin().ascii_serialization();

        let keywords: Vec<String> = config
            .dealer_keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .map(|k| regex::escape(k.trim()))
            .collect();
        anyhow::ensure!(!keywords.is_empty(), "extraction.dealer_keywords is empty");

        let dealer_re = Regex::new(&format!(r"(?i)((?:{})[^\n]*?)(?:\n|$)", keywords.join("|")))
            .context("Failed to build dealer pattern")?;

        Ok(Self {
            base_url: base_url.to_string(),
            site_root,
            dealer_re,
            min_card_text: config.min_card_text,
        })
    }

    /// Parse one page: offers in document order plus pagination markers.
    pub fn parse_page(&self, html: &str) -> ParsedPage {
        let doc = Html::parse_document(html);
        let offers = self.extract_offers(&doc);
        info!("Found {} offers on page", offers.len());
        ParsedPage {
            offers,
            signals: detect_pagination(&doc),
        }
    }

    pub fn extract_offers(&self, doc: &Html) -> Vec<Offer> {
        let offers = self.extract_from_price_nodes(doc);
        if !offers.is_empty() {
            return offers;
        }

        debug!("No price-anchored cards, trying class hints");
        doc.select(&FALLBACK_SEL)
            .filter(|el| has_card_hint(el))
            .filter_map(|card| self.extract_offer(card))
            .collect()
    }

    fn extract_from_price_nodes(&self, doc: &Html) -> Vec<Offer> {
        let mut seen_containers = HashSet::new();
        let mut offers = Vec::new();

        for node in doc.root_element().descendants() {
            let Some(text) = node.value().as_text() else { continue };
            if !PRICE_RE.is_match(text) || inside_script(node.parent().and_then(ElementRef::wrap)) {
                continue;
            }

            let container = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .filter(|el| CONTAINER_TAGS.contains(&el.value().name()))
                .find(|el| text_len(el) > self.min_card_text);

            let Some(card) = container else {
                debug!("Price fragment without a substantial container: {:?}", text.trim());
                continue;
            };

            if !seen_containers.insert(card.id()) {
                continue;
            }

            if let Some(offer) = self.extract_offer(card) {
                offers.push(offer);
            }
        }

        offers
    }

    /// Build an offer from one card. `None` when no usable price is found.
    pub fn extract_offer(&self, card: ElementRef<'_>) -> Option<Offer> {
        let card_text: String = card.text().collect();

        let Some(price_text) = extract_price_text(card, &card_text) else {
            debug!("Card without price, skipping");
            return None;
        };
        let monthly_price = parse_monthly_price(&price_text).filter(|p| *p > 0.0)?;

        let model = extract_model(card, &card_text);
        let dealer = self.extract_dealer(card, &card_text);
        let (terms, km_per_year) = extract_terms(card, &card_text);
        let link = self.extract_link(card);

        let id = offer_id(model.as_deref(), dealer.as_deref(), monthly_price, terms.as_deref());

        Some(Offer {
            id,
            model: model.unwrap_or_else(|| UNKNOWN_MODEL.to_string()),
            monthly_price,
            dealer: dealer.unwrap_or_else(|| UNKNOWN_DEALER.to_string()),
            terms,
            km_per_year,
            link: link.unwrap_or_else(|| self.base_url.clone()),
            price_text,
        })
    }

    fn extract_dealer(&self, card: ElementRef<'_>, card_text: &str) -> Option<String> {
        if let Some(caps) = self.dealer_re.captures(card_text) {
            return non_empty(caps[1].trim());
        }

        card.descendants()
            .filter(|n| n.value().as_text().is_some_and(|t| self.dealer_re.is_match(t)))
            .find_map(|n| {
                n.ancestors()
                    .filter_map(ElementRef::wrap)
                    .find(|el| DEALER_PARENT_TAGS.contains(&el.value().name()))
            })
            .and_then(|parent| non_empty(&collapse_whitespace(&parent.text().collect::<String>())))
    }

    fn extract_link(&self, card: ElementRef<'_>) -> Option<String> {
        let href = card.select(&HREF_SEL).next()?.value().attr("href")?.trim();
        Some(self.resolve_href(href))
    }

    /// Absolute kept, root-relative prefixed with the site origin, anything
    /// else appended to the page base URL.
    pub fn resolve_href(&self, href: &str) -> String {
        if href.starts_with("http") {
            href.to_string()
        } else if let Some(rest) = href.strip_prefix("//") {
            let scheme = self.site_root.split("://").next().unwrap_or("https");
            format!("{scheme}://{rest}")
        } else if href.starts_with('/') {
            format!("{}{}", self.site_root, href)
        } else {
            format!("{}/{}", self.base_url.trim_end_matches('/'), href.trim_start_matches('/'))
        }
    }
}

// ── Field strategies ──────────────────────────────────────────────────────────

fn extract_price_text(card: ElementRef<'_>, card_text: &str) -> Option<String> {
    if let Some(m) = PRICE_RE.find(card_text) {
        return Some(m.as_str().to_string());
    }
    card.descendants()
        .filter_map(|n| n.value().as_text().map(|t| t.trim().to_string()))
        .find_map(|t| PRICE_RE.find(&t).map(|m| m.as_str().to_string()))
}

fn extract_model(card: ElementRef<'_>, card_text: &str) -> Option<String> {
    for sel in HEADING_SELS.iter() {
        let Some(heading) = card.select(sel).next() else { continue };
        let text = collapse_whitespace(&heading.text().collect::<String>());
        if text.chars().count() > 5 && !PRICE_PREFIX_RE.is_match(&text) {
            return Some(text);
        }
    }

    MODEL_RE
        .captures(card_text)
        .and_then(|caps| non_empty(&collapse_whitespace(&caps[1])))
}

fn extract_terms(card: ElementRef<'_>, card_text: &str) -> (Option<String>, Option<u32>) {
    if let Some(caps) = TERMS_RE.captures(card_text) {
        let terms = collapse_whitespace(&caps[1]);
        return (non_empty(&terms), parse_km(&caps[2]));
    }

    let node_text = card
        .descendants()
        .filter_map(|n| n.value().as_text().map(|t| t.trim().to_string()))
        .find(|t| TERMS_NODE_RE.is_match(t));

    match node_text {
        Some(terms) => {
            let km = KM_RE.captures(&terms).and_then(|caps| parse_km(&caps[1]));
            (non_empty(&collapse_whitespace(&terms)), km)
        }
        None => (None, None),
    }
}

// ── Pagination markers ────────────────────────────────────────────────────────

/// Find the next-page control and any "n von m" indicator.
pub fn detect_pagination(doc: &Html) -> PaginationSignals {
    let anchors: Vec<ElementRef<'_>> = doc.select(&ANCHOR_SEL).collect();

    let next = anchors
        .iter()
        .find(|a| NEXT_TEXT_RE.is_match(&collapse_whitespace(&a.text().collect::<String>())))
        .or_else(|| {
            anchors.iter().find(|a| {
                a.value().attr("aria-label").is_some_and(|l| NEXT_LABEL_RE.is_match(l))
                    || a.value().attr("rel").is_some_and(|r| r.eq_ignore_ascii_case("next"))
            })
        });

    let next_control = next.map(|a| {
        let el = a.value();
        if el.classes().any(|c| c == "disabled") || el.attr("aria-disabled").is_some() {
            NextControl::Disabled
        } else {
            NextControl::Enabled
        }
    });

    let page_indicator: Option<(u32, u32)> = doc
        .root_element()
        .descendants()
        .filter_map(|n| n.value().as_text().map(|t| t.trim().to_string()))
        .find_map(|t| {
            let caps = PAGE_OF_RE.captures(&t)?;
            Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
        });

    PaginationSignals { next_control, page_indicator }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn text_len(el: &ElementRef<'_>) -> usize {
    el.text().map(|t| t.chars().count()).sum()
}

fn has_card_hint(el: &ElementRef<'_>) -> bool {
    let value = el.value();
    value.classes().any(|c| CARD_HINT_RE.is_match(c))
        || value.attr("data-testid").is_some_and(|t| CARD_HINT_RE.is_match(t))
}

fn inside_script(parent: Option<ElementRef<'_>>) -> bool {
    parent.is_some_and(|p| matches!(p.value().name(), "script" | "style" | "noscript"))
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() { None } else { Some(s.to_string()) }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const BASE: &str = "https://financing.example.store/bestand";

    pub(crate) fn card(model: &str, price: &str, dealer: &str, terms: &str, href: &str) -> String {
        format!(
            r#"<article class="result">
  <h3>{model}</h3>
  <p class="rate">{price}</p>
  <p>{dealer}</p>
  <p>{terms}</p>
  <p>Kraftstoff: Benzin, Getriebe: Automatik, Erstzulassung: Neuwagen, sofort verfügbar</p>
  <a href="{href}">Jetzt leasen</a>
</article>"#
        )
    }

    pub(crate) fn page(cards: &[String], footer: &str) -> String {
        format!(
            "<html><head><title>Bestand</title></head><body><main><div class=\"grid\">{}</div>{footer}</main></body></html>",
            cards.join("\n")
        )
    }

    fn extractor() -> OfferExtractor {
        OfferExtractor::new(BASE, &ExtractionConfig::default()).unwrap()
    }

    #[test]
    fn test_primary_extraction_reads_every_field() {
        let html = page(
            &[card(
                "E-208 GT Elektromotor 136",
                "139,09 € / Monat",
                "Autohaus Müller GmbH, Berlin",
                "36 Mon. / 15.000 km",
                "/angebot/123",
            )],
            "",
        );
        let parsed = extractor().parse_page(&html);
        assert_eq!(parsed.offers.len(), 1);

        let o = &parsed.offers[0];
        assert_eq!(o.model, "E-208 GT Elektromotor 136");
        assert!((o.monthly_price - 139.09).abs() < 1e-9);
        assert_eq!(o.dealer, "Autohaus Müller GmbH, Berlin");
        assert_eq!(o.terms.as_deref(), Some("36 Mon. / 15.000 km"));
        assert_eq!(o.km_per_year, Some(15_000));
        assert_eq!(o.link, "https://financing.example.store/angebot/123");
        assert_eq!(o.price_text, "139,09 € / Monat");
        assert_eq!(
            o.id,
            offer_id(
                Some("E-208 GT Elektromotor 136"),
                Some("Autohaus Müller GmbH, Berlin"),
                139.09,
                Some("36 Mon. / 15.000 km")
            )
        );
    }

    #[test]
    fn test_card_with_two_rate_fragments_counts_once() {
        let html = page(
            &[r#"<li class="tile"><h2>2008 Allure Pack Hybrid</h2>
<span>129,00 € / Monat</span><span>statt 149,00 € / Monat</span>
<p>Autohaus Lindner, Dresden. Inklusive Wartung, Überführung und Zulassung bei allen Varianten.</p>
<p>24 Mon. / 10.000 km</p></li>"#
                .to_string()],
            "",
        );
        let offers = extractor().parse_page(&html).offers;
        assert_eq!(offers.len(), 1);
        assert!((offers[0].monthly_price - 129.0).abs() < 1e-9);
    }

    #[test]
    fn test_ascends_past_small_wrappers() {
        let html = page(
            &[r#"<section class="x"><div><div><span>99,00 € / Monat</span></div></div>
<h4>308 SW Active Pack BlueHDi</h4><p>Stellantis &amp; You Frankfurt, Mainzer Landstraße 40, 60327 Frankfurt am Main</p></section>"#
                .to_string()],
            "",
        );
        let offers = extractor().parse_page(&html).offers;
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].model, "308 SW Active Pack BlueHDi");
        assert_eq!(offers[0].terms, None);
        assert_eq!(offers[0].km_per_year, None);
    }

    #[test]
    fn test_missing_fields_fall_back_to_sentinels() {
        let html = page(
            &[r#"<div class="offer-card"><span>149,90 € / Monat</span>
<p>Lieferzeit ca. 4 Wochen, Leasingangebot nur für Privatkunden mit Bonität, solange Vorrat reicht, Irrtümer vorbehalten.</p></div>"#
                .to_string()],
            "",
        );
        let o = &extractor().parse_page(&html).offers[0];
        assert_eq!(o.model, UNKNOWN_MODEL);
        assert_eq!(o.dealer, UNKNOWN_DEALER);
        assert_eq!(o.link, BASE);
    }

    #[test]
    fn test_fallback_uses_class_hints() {
        // Rate split across elements: no single text node carries the pattern.
        let html = page(
            &[r#"<div class="vehicle-tile"><h3>408 GT Hybrid 225</h3>
<b>189,00</b> € / Monat
<p>Autohaus Kern</p>
<a href="details/408">Details</a></div>"#
                .to_string()],
            "",
        );
        let offers = extractor().parse_page(&html).offers;
        assert_eq!(offers.len(), 1);
        assert_eq!(offers[0].model, "408 GT Hybrid 225");
        assert_eq!(offers[0].link, format!("{BASE}/details/408"));
    }

    #[test]
    fn test_card_without_price_is_dropped() {
        let html = page(
            &[r#"<div class="offer"><h3>Rifter Active L1</h3><p>Preis auf Anfrage beim Autohaus Schmidt</p></div>"#
                .to_string()],
            "",
        );
        assert!(extractor().parse_page(&html).offers.is_empty());
    }

    #[test]
    fn test_heading_that_is_a_price_is_skipped() {
        let html = page(
            &[r#"<article><h2>119,00 € / Monat</h2><h3>2008 ACTIVE PURETECH</h3>
<p>Autohaus Weber GmbH</p><p>48 Monate / 20.000 km</p><p>Angebot gültig bis Monatsende, Abbildung zeigt Sonderausstattung.</p></article>"#
                .to_string()],
            "",
        );
        let o = &extractor().parse_page(&html).offers[0];
        assert_eq!(o.model, "2008 ACTIVE PURETECH");
        assert_eq!(o.terms.as_deref(), Some("48 Monate / 20.000 km"));
        assert_eq!(o.km_per_year, Some(20_000));
    }

    #[test]
    fn test_resolve_href() {
        let ex = extractor();
        assert_eq!(ex.resolve_href("https://other.test/x"), "https://other.test/x");
        assert_eq!(ex.resolve_href("/fahrzeug/9"), "https://financing.example.store/fahrzeug/9");
        assert_eq!(ex.resolve_href("fahrzeug/9"), format!("{BASE}/fahrzeug/9"));
        assert_eq!(ex.resolve_href("//cdn.example.store/a"), "https://cdn.example.store/a");
    }

    #[test]
    fn test_detect_pagination_markers() {
        let doc = Html::parse_document(r#"<nav><a href="?page=1">1</a><a href="?page=3">»</a><span>Seite 2 von 5</span></nav>"#);
        let s = detect_pagination(&doc);
        assert_eq!(s.next_control, Some(NextControl::Enabled));
        assert_eq!(s.page_indicator, Some((2, 5)));

        let doc = Html::parse_document(r#"<a class="page-link disabled" aria-label="Weiter">›</a>"#);
        assert_eq!(detect_pagination(&doc).next_control, Some(NextControl::Disabled));

        let doc = Html::parse_document(r#"<a href="/x">Weitere Informationen</a>"#);
        assert_eq!(detect_pagination(&doc), PaginationSignals::default());
    }

    #[test]
    fn test_next_control_with_word_and_arrow() {
        let next = |html: &str| detect_pagination(&Html::parse_document(html)).next_control;

        assert_eq!(next(r#"<a href="?page=2">Weiter ›</a>"#), Some(NextControl::Enabled));
        assert_eq!(next(r#"<a href="?page=2">Next »</a>"#), Some(NextControl::Enabled));
        assert_eq!(next(r#"<a href="?page=2">» weiter</a>"#), Some(NextControl::Enabled));
        assert_eq!(next(r#"<a href="?page=2">Nächste Seite</a>"#), Some(NextControl::Enabled));
        assert_eq!(next(r#"<a class="disabled">Weiter »</a>"#), Some(NextControl::Disabled));
        assert_eq!(next(r#"<a href="/mehr">Weitere Angebote</a>"#), None);
        assert_eq!(next(r#"<a href="/x">308>Allure</a>"#), None);
    }

    #[test]
    fn test_terms_fallback_without_km_suffix() {
        let html = page(
            &[card(
                "308 SW Allure Pack",
                "159,00 € / Monat",
                "Autohaus Beispiel GmbH",
                "36 Monate / 15000 Kilometer",
                "/angebot/7",
            )],
            "",
        );
        let o = &extractor().parse_page(&html).offers[0];
        assert_eq!(o.terms.as_deref(), Some("36 Monate / 15000 Kilometer"));
        assert_eq!(o.km_per_year, None);
    }

    #[test]
    fn test_empty_dealer_keywords_rejected() {
        let cfg = ExtractionConfig { dealer_keywords: vec![" ".into()], min_card_text: 100 };
        assert!(OfferExtractor::new(BASE, &cfg).is_err());
    }
}
