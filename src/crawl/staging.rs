//! Staging area for downloaded attachments
//!
//! The crawler never blocks on parsing: downloaded attachments land as files
//! in a staging directory and are drained by a decoupled ingest pass. A
//! staged file survives until it is parsed and committed, or until the
//! retention window expires.

use crate::error::Result;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

/// One staged download awaiting ingestion
#[derive(Debug, Clone)]
pub struct StagingRecord {
    /// Attachment URL
    pub url: String,

    /// Where the bytes were written
    pub local_path: PathBuf,

    /// Checksum of the page the attachment was discovered on
    pub origin_checksum_of_page: Option<String>,

    pub downloaded_at: DateTime<Utc>,
}

/// Filesystem staging area
pub struct StagingArea {
    dir: PathBuf,
    retention: Duration,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>, retention_hours: u64) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            retention: Duration::from_secs(retention_hours * 3600),
        })
    }

    /// Write downloaded bytes into the staging directory
    pub fn stage(
        &self,
        url: &str,
        bytes: &[u8],
        origin_checksum_of_page: Option<String>,
    ) -> Result<StagingRecord> {
        let local_path = self.dir.join(staged_file_name(url));
        std::fs::write(&local_path, bytes)?;
        debug!("Staged {} at {:?}", url, local_path);

        Ok(StagingRecord {
            url: url.to_string(),
            local_path,
            origin_checksum_of_page,
            downloaded_at: Utc::now(),
        })
    }

    /// Remove a staged file after its ingest committed
    pub fn remove(&self, record: &StagingRecord) -> Result<()> {
        if record.local_path.exists() {
            std::fs::remove_file(&record.local_path)?;
        }
        Ok(())
    }

    /// Delete staged files older than the retention window. Returns the
    /// number of files removed.
    pub fn sweep_expired(&self) -> Result<usize> {
        let cutoff = SystemTime::now() - self.retention;
        let mut removed = 0;

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if modified < cutoff {
                if let Err(e) = std::fs::remove_file(entry.path()) {
                    warn!("Failed to sweep staged file {:?}: {}", entry.path(), e);
                } else {
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            debug!("Swept {} expired staged files", removed);
        }
        Ok(removed)
    }
}

/// Deterministic file name for a staged URL: URL digest plus the original
/// extension so kind detection still works on the staged file.
fn staged_file_name(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = hex::encode(hasher.finalize());

    let extension = Path::new(url.split(['?', '#']).next().unwrap_or(url))
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("bin");

    format!("{}.{}", &digest[..32], extension)
}
