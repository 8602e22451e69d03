//! Ingest command implementation (local files)

use crate::error::{Error, Result};
use crate::ingest::{IngestPipeline, IngestStatus};
use crate::parse::DocumentKind;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// File ingest result for CLI output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileIngestStats {
    pub source: String,
    pub kind: String,
    pub status: String,
    pub chunk_count: usize,
    pub skipped_units: usize,
}

/// Ingest one local file. The kind is detected from the extension; the
/// absolute path is the document's identity.
pub async fn cmd_ingest_file(
    pipeline: &IngestPipeline,
    path: &Path,
    language: &str,
) -> Result<FileIngestStats> {
    let kind = DocumentKind::from_extension(path).ok_or_else(|| {
        Error::UnsupportedFormat(format!(
            "no parser for {:?} (supported: html, pdf, xlsx, xls, csv, ods)",
            path
        ))
    })?;

    let canonical = path.canonicalize()?;
    let source = canonical.to_string_lossy().to_string();
    let raw = std::fs::read(&canonical)?;

    info!("Ingesting {} as {}", source, kind.as_str());
    let outcome = pipeline
        .ingest_bytes(&source, &raw, kind, language, None)
        .await?;

    Ok(FileIngestStats {
        source,
        kind: kind.as_str().to_string(),
        status: match outcome.status {
            IngestStatus::Ingested => "ingested",
            IngestStatus::Refreshed => "refreshed",
            IngestStatus::Skipped => "skipped",
        }
        .to_string(),
        chunk_count: outcome.chunk_count,
        skipped_units: outcome.skipped_units,
    })
}

/// Print file ingest stats to console
pub fn print_file_ingest_stats(stats: &FileIngestStats) {
    println!("\n✓ Ingest complete ({})", stats.status);
    println!("  Source: {}", stats.source);
    println!("  Kind: {}", stats.kind);
    println!("  Chunks created: {}", stats.chunk_count);
    if stats.skipped_units > 0 {
        println!("  Units skipped: {}", stats.skipped_units);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::embed::Embedder;
    use crate::meta::MetaDb;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::TempDir;

    struct TinyEmbedder;

    #[async_trait]
    impl Embedder for TinyEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "tiny"
        }
    }

    async fn pipeline(tmp: &TempDir) -> IngestPipeline {
        let mut config = Config::default();
        config.chunk.max_chars = 200;
        config.chunk.overlap_chars = 20;
        config.chunk.min_chars = 5;
        let db = MetaDb::new(&tmp.path().join("wattson.db")).await.unwrap();
        IngestPipeline::new(db, Arc::new(InMemoryStore::new()), Arc::new(TinyEmbedder), &config)
    }

    #[tokio::test]
    async fn test_ingest_csv_file() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("prices.csv");
        std::fs::write(&file, "region,price_eur_mwh\nnorth,42.5\nsouth,38.1\n").unwrap();

        let pipeline = pipeline(&tmp).await;
        let stats = cmd_ingest_file(&pipeline, &file, "en").await.unwrap();
        assert_eq!(stats.status, "ingested");
        assert_eq!(stats.kind, "spreadsheet");
        assert!(stats.chunk_count > 0);

        // Unchanged file is skipped on re-ingest
        let again = cmd_ingest_file(&pipeline, &file, "en").await.unwrap();
        assert_eq!(again.status, "skipped");
        assert_eq!(again.chunk_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_extension_is_unsupported() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("notes.txt");
        std::fs::write(&file, "plain text").unwrap();

        let pipeline = pipeline(&tmp).await;
        let err = cmd_ingest_file(&pipeline, &file, "en").await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedFormat(_)));
    }
}
