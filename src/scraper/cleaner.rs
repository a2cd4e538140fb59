use tracing::warn;

// ── Price normalizer ──────────────────────────────────────────────────────────

/// Parse a monthly rate as rendered on the listing.
/// "139,09 €" → 139.09 | "1.234,56 €" → 1234.56 | "126.32  / Monat" → 126.32
///
/// Comma present: comma is the decimal mark, dots group thousands.
/// No comma: a single dot followed by at most two digits is decimal, any
/// other dots group thousands.
pub fn parse_monthly_price(s: &str) -> Option<f64> {
    let s = s.trim_start_matches(is_space);
    if s.is_empty() {
        return None;
    }

    // Keep only the numeral: cut at the first slash or space of any kind.
    let end = s.find(|c: char| c == '/' || is_space(c)).unwrap_or(s.len());
    let head = s[..end].replace('€', "").replace("EUR", "");
    let head: String = head.chars().filter(|c| !is_format_space(*c)).collect();
    let head = head.trim();

    let canonical = if head.contains(',') {
        head.replace('.', "").replace(',', ".")
    } else if head.contains('.') {
        let parts: Vec<&str> = head.split('.').collect();
        if parts.len() == 2 && parts[1].len() <= 2 {
            head.to_string()
        } else {
            head.replace('.', "")
        }
    } else {
        head.to_string()
    };

    let cleaned: String = canonical
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();

    match cleaned.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            warn!("Could not parse price: {}", s.escape_default());
            None
        }
    }
}

/// "15.000" → 15000 | "20,000" → 20000 | "5000" → 5000
pub fn parse_km(s: &str) -> Option<u32> {
    let digits: String = s
        .trim()
        .chars()
        .filter(|c| *c != '.' && *c != ',')
        .collect();
    digits.parse().ok()
}

/// Trim each text fragment and join the non-empty ones with single spaces.
pub fn collapse_whitespace(s: &str) -> String {
    s.split(is_space)
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_space(c: char) -> bool {
    c.is_whitespace() || c == '\u{00A0}' || c == '\u{2009}' || c == '\u{202F}'
}

/// Zero-width and typographic spaces that survive `trim`.
fn is_format_space(c: char) -> bool {
    matches!(c, '\u{2000}'..='\u{200F}' | '\u{2028}'..='\u{202F}' | '\u{205F}'..='\u{206F}')
}

// ── Tests ─────────────────────────────────────────────────────────────────────
