//! Price/mileage predicate and offer identity.

use crate::config::FilterConfig;
use crate::models::Offer;
use regex::Regex;
use std::sync::LazyLock;

static NON_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W").expect("static regex"));

/// Stable identity of an offer: same four inputs, same id.
///
/// Parts are joined with `_`, spaces become `_`, the result is lower-cased
/// and every non-word character is dropped.
pub fn offer_id(model: Option<&str>, dealer: Option<&str>, price: f64, terms: Option<&str>) -> String {
    let joined = [
        model.unwrap_or_default().to_string(),
        dealer.unwrap_or_default().to_string(),
        format!("{price:.2}"),
        terms.unwrap_or_default().to_string(),
    ]
    .join("_")
    .replace(' ', "_")
    .to_lowercase();

    NON_WORD.replace_all(&joined, "").into_owned()
}

/// Inclusive price band plus mileage match.
#[derive(Debug, Clone)]
pub struct OfferFilter {
    min_price: f64,
    max_price: f64,
    km_allowance: u32,
}

impl OfferFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            min_price: config.min_price,
            max_price: config.max_price,
            km_allowance: config.km_allowance,
        }
    }

    /// Offers whose mileage could not be read are kept.
    pub fn matches(&self, offer: &Offer) -> bool {
        let in_band = self.min_price <= offer.monthly_price && offer.monthly_price <= self.max_price;
        let km_ok = offer.km_per_year.is_none_or(|km| km == self.km_allowance);
        in_band && km_ok
    }

    pub fn apply<'a>(&self, offers: &'a [Offer]) -> Vec<&'a Offer> {
        offers.iter().filter(|o| self.matches(o)).collect()
    }

    /// True when a non-empty page has nothing at or below the ceiling.
    pub fn all_above_max(&self, offers: &[Offer]) -> bool {
        !offers.is_empty() && offers.iter().all(|o| o.monthly_price > self.max_price)
    }

    pub fn describe(&self) -> String {
        format!(
            "€{:.2}-€{:.2} with {} km/year",
            self.min_price, self.max_price, self.km_allowance
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(price: f64, km: Option<u32>) -> Offer {
        Offer {
            id: offer_id(Some("208 Active"), Some("Autohaus Nord"), price, Some("24 Mon. / 15.000 km")),
            model: "208 Active".into(),
            monthly_price: price,
            dealer: "Autohaus Nord".into(),
            terms: Some("24 Mon. / 15.000 km".into()),
            km_per_year: km,
            link: "https://example.test/a".into(),
            price_text: format!("{price} € / Monat"),
        }
    }

    fn filter() -> OfferFilter {
        OfferFilter::new(&FilterConfig {
            min_price: 50.0,
            max_price: 200.0,
            km_allowance: 15_000,
            max_pages_without_match: 10,
        })
    }

    #[test]
    fn test_offer_id_is_deterministic() {
        let a = offer_id(Some("308 SW Allure"), Some("Autohaus Süd"), 139.09, Some("36 Mon. / 10.000 km"));
        let b = offer_id(Some("308 SW Allure"), Some("Autohaus Süd"), 139.09, Some("36 Mon. / 10.000 km"));
        assert_eq!(a, b);
        assert_eq!(a, "308_sw_allure_autohaus_süd_13909_36_mon__10000_km");
    }

    #[test]
    fn test_offer_id_changes_with_every_field() {
        let base = offer_id(Some("2008 GT"), Some("Autohaus A"), 149.0, Some("24 Mon. / 15.000 km"));
        assert_ne!(base, offer_id(Some("2008 GT Line"), Some("Autohaus A"), 149.0, Some("24 Mon. / 15.000 km")));
        assert_ne!(base, offer_id(Some("2008 GT"), Some("Autohaus B"), 149.0, Some("24 Mon. / 15.000 km")));
        assert_ne!(base, offer_id(Some("2008 GT"), Some("Autohaus A"), 149.01, Some("24 Mon. / 15.000 km")));
        assert_ne!(base, offer_id(Some("2008 GT"), Some("Autohaus A"), 149.0, Some("36 Mon. / 15.000 km")));
        assert_ne!(base, offer_id(Some("2008 GT"), Some("Autohaus A"), 149.0, None));
    }

    #[test]
    fn test_offer_id_with_missing_parts() {
        assert_eq!(offer_id(None, None, 99.0, None), "__9900_");
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let f = filter();
        assert!(f.matches(&offer(50.0, Some(15_000))));
        assert!(f.matches(&offer(200.0, Some(15_000))));
        assert!(!f.matches(&offer(49.99, Some(15_000))));
        assert!(!f.matches(&offer(200.01, Some(15_000))));
    }

    #[test]
    fn test_unknown_mileage_passes() {
        assert!(filter().matches(&offer(120.0, None)));
    }

    #[test]
    fn test_mismatched_mileage_is_excluded() {
        assert!(!filter().matches(&offer(120.0, Some(20_000))));
        assert!(!filter().matches(&offer(120.0, Some(10_000))));
    }

    #[test]
    fn test_all_above_max() {
        let f = filter();
        assert!(f.all_above_max(&[offer(210.0, None), offer(300.0, None)]));
        assert!(!f.all_above_max(&[offer(210.0, None), offer(200.0, None)]));
        assert!(!f.all_above_max(&[]));
    }

    #[test]
    fn test_apply_keeps_page_order() {
        let offers = vec![offer(120.0, None), offer(500.0, None), offer(60.0, Some(15_000))];
        let kept: Vec<f64> = filter().apply(&offers).iter().map(|o| o.monthly_price).collect();
        assert_eq!(kept, vec![120.0, 60.0]);
    }
}
