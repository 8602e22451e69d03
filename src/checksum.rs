//! Content checksums and freshness classification
//!
//! Every acquired document gets a SHA-256 checksum: raw bytes for binary
//! files, whitespace-normalized extracted text for web pages (markup churn
//! that does not change the text must not look like a content change). The
//! (source, checksum) pair is the identity everything downstream keys on.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};

use crate::meta::SourceDocument;

/// SHA-256 hex digest over raw bytes. Used for downloaded files.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// SHA-256 hex digest over whitespace-normalized text. Used for web pages,
/// where the extracted text is the content that matters.
pub fn checksum_text(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    checksum_bytes(normalized.as_bytes())
}

/// Freshness decision for an acquired document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocStatus {
    /// Never seen, or seen but never successfully parsed
    New,
    /// Already parsed with this exact content, or changed but not yet due
    /// for its refresh cadence
    Unchanged,
    /// Content changed and a re-ingest is due
    Stale,
}

/// Classify a document against its most recent known record.
///
/// Pure over its inputs: the caller supplies the latest non-superseded record
/// for the source (if any), the checksum of the content just acquired, and
/// the current time.
pub fn classify(
    existing: Option<&SourceDocument>,
    current_checksum: &str,
    now: DateTime<Utc>,
) -> DocStatus {
    let Some(doc) = existing else {
        return DocStatus::New;
    };

    if doc.checksum == current_checksum {
        // Same content. A record without parsed_at is a previous attempt that
        // never committed, so the ingest still has to happen.
        return if doc.parsed_at.is_some() {
            DocStatus::Unchanged
        } else {
            DocStatus::New
        };
    }

    match doc.refresh_frequency_days {
        // Web pages refresh on a cadence: a changed page that is not yet due
        // is deferred until its next check window.
        Some(days) => {
            if now - doc.last_checked >= Duration::days(days) {
                DocStatus::Stale
            } else {
                DocStatus::Unchanged
            }
        }
        // Files have no cadence; any content change is immediately stale.
        None => DocStatus::Stale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        checksum: &str,
        parsed: bool,
        cadence_days: Option<i64>,
        last_checked: DateTime<Utc>,
    ) -> SourceDocument {
        SourceDocument {
            id: 1,
            source: "https://example.org/report".to_string(),
            checksum: checksum.to_string(),
            kind: "web_page".to_string(),
            language: "en".to_string(),
            discovered_at: last_checked,
            parsed_at: parsed.then_some(last_checked),
            last_checked,
            refresh_frequency_days: cadence_days,
            vector_store_ref: None,
            superseded: false,
        }
    }

    #[test]
    fn test_checksum_is_deterministic() {
        let a = checksum_bytes(b"solar capacity factors");
        let b = checksum_bytes(b"solar capacity factors");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_text_checksum_ignores_whitespace_churn() {
        let a = checksum_text("wind  turbine\n\tblade   design");
        let b = checksum_text("wind turbine blade design");
        assert_eq!(a, b);
        assert_ne!(a, checksum_text("wind turbine blade designs"));
    }

    #[test]
    fn test_empty_content_still_hashes() {
        assert_eq!(checksum_text(""), checksum_bytes(b""));
    }

    #[test]
    fn test_unseen_is_new() {
        assert_eq!(classify(None, "abc", Utc::now()), DocStatus::New);
    }

    #[test]
    fn test_identical_parsed_is_unchanged() {
        let now = Utc::now();
        let doc = record("abc", true, Some(7), now);
        assert_eq!(classify(Some(&doc), "abc", now), DocStatus::Unchanged);
    }

    #[test]
    fn test_identical_but_never_parsed_is_new() {
        let now = Utc::now();
        let doc = record("abc", false, Some(7), now);
        assert_eq!(classify(Some(&doc), "abc", now), DocStatus::New);
    }

    #[test]
    fn test_changed_page_past_cadence_is_stale() {
        let checked = Utc::now() - Duration::days(10);
        let doc = record("abc", true, Some(7), checked);
        assert_eq!(classify(Some(&doc), "def", Utc::now()), DocStatus::Stale);
    }

    #[test]
    fn test_changed_page_before_cadence_is_deferred() {
        let checked = Utc::now() - Duration::days(2);
        let doc = record("abc", true, Some(7), checked);
        assert_eq!(
            classify(Some(&doc), "def", Utc::now()),
            DocStatus::Unchanged
        );
    }

    #[test]
    fn test_changed_file_without_cadence_is_stale_immediately() {
        let now = Utc::now();
        let doc = record("abc", true, None, now);
        assert_eq!(classify(Some(&doc), "def", now), DocStatus::Stale);
    }
}
