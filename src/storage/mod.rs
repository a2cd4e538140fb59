//! Seen-set persistence: the ids of every offer already notified.
//!
//! The file is a single JSON record (`{"seen_offers": [...]}`). Writes go to a
//! sibling temp file that is renamed over the original, so a crash leaves
//! either the old or the new state on disk.

use crate::config::StorageConfig;
use crate::models::SeenRecord;
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeSet;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Ordered so the file diffs cleanly between runs.
pub type SeenSet = BTreeSet<String>;

pub struct SeenStore {
    path: PathBuf,
}

impl SeenStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self::open(&config.seen_path)
    }

    pub fn open(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Previously seen ids. Missing or unreadable state yields an empty set.
    pub fn load(&self) -> SeenSet {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No seen-offer state at {:?}, starting empty", self.path);
                return SeenSet::new();
            }
            Err(e) => {
                warn!("Error loading seen offers from {:?}: {}", self.path, e);
                return SeenSet::new();
            }
        };

        match serde_json::from_str::<SeenRecord>(&raw) {
            Ok(record) => record.seen_offers.into_iter().collect(),
            Err(e) => {
                warn!("Seen-offer state at {:?} is corrupt ({}), starting empty", self.path, e);
                SeenSet::new()
            }
        }
    }

    /// Replace the persisted state with `seen`.
    pub fn save(&self, seen: &SeenSet) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create dir {:?}", parent))?;
        }

        let record = SeenRecord {
            seen_offers: seen.iter().cloned().collect(),
            updated_at: Some(Utc::now()),
        };

        let tmp = self.tmp_path();
        {
            let file = fs::File::create(&tmp)
                .with_context(|| format!("Failed to create {:?}", tmp))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &record)
                .context("Failed to serialise seen offers")?;
            writer.flush()?;
            writer
                .get_ref()
                .sync_all()
                .with_context(|| format!("Failed to sync {:?}", tmp))?;
        }

        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to move {:?} into place", tmp))?;

        debug!("Saved {} seen offers to {:?}", seen.len(), self.path);
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "seen".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
