//! Offline input/output: saved listing pages in, offer tables out.

use crate::models::Offer;
use crate::scraper::extractor::OfferExtractor;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Extract offers from one saved HTML page.
pub fn load_snapshot(path: &Path, extractor: &OfferExtractor) -> Result<Vec<Offer>> {
    let html = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {:?}", path))?;
    debug!("Parsing {:?} ({} bytes)", path, html.len());

    let offers = extractor.parse_page(&html).offers;
    info!("{:?}: {} offers", path, offers.len());
    Ok(offers)
}

/// A single `.html`/`.htm` file, or every such file directly inside a directory.
pub fn discover_html_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.exists() {
        anyhow::bail!("{:?} does not exist", path);
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let path = entry?.path();
        let is_html = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("html") || e.eq_ignore_ascii_case("htm"));
        if path.is_file() && is_html {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Write offers as CSV with a header row.
pub fn write_offers_csv(path: &Path, offers: &[Offer]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    for offer in offers {
        writer.serialize(offer)?;
    }
    writer.flush()?;
    info!("Wrote {} offers to {:?}", offers.len(), path);
    Ok(())
}
