//! Ingestion orchestration
//!
//! One pipeline owns the path from acquired bytes to a committed, retrievable
//! version: checksum, freshness classification, parse, chunk, embed, vector
//! upsert, metadata commit. The two stores are kept consistent by ordering:
//! vectors go in first, the metadata transaction commits second, and a failed
//! commit unwinds the vectors it upserted.

use crate::checksum::{checksum_bytes, checksum_text, classify, DocStatus};
use crate::chunk::{chunk_units, point_id};
use crate::config::{ChunkConfig, Config};
use crate::embed::{embed_in_batches, Embedder};
use crate::error::{Error, Result};
use crate::meta::{DocumentChunk, MetaDb, SourceDocument};
use crate::parse::{parse_document, DocumentKind};
use crate::store::{ChunkPayload, ChunkPoint, VectorStore};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Metadata commit attempts before the ingest is unwound
const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// What the pipeline did with a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStatus {
    /// First successful ingest for this identity
    Ingested,
    /// Content changed; the previous version was superseded
    Refreshed,
    /// Nothing to do: content unchanged, or a change deferred by cadence
    Skipped,
}

/// Outcome of one ingest call
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub status: IngestStatus,
    pub chunk_count: usize,
    /// Units the parser could not extract (unreadable pages, malformed rows)
    pub skipped_units: usize,
}

/// The ingestion pipeline. Cheap to share; all state lives in the stores.
pub struct IngestPipeline {
    meta: MetaDb,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    chunk_config: ChunkConfig,
    batch_size: usize,
    collection_name: String,
    // One async lock per document identity so concurrent ingests of the same
    // source serialize instead of racing the supersede logic.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl IngestPipeline {
    pub fn new(
        meta: MetaDb,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        config: &Config,
    ) -> Self {
        Self {
            meta,
            store,
            embedder,
            chunk_config: config.chunk.clone(),
            batch_size: config.embedding.batch_size,
            collection_name: config.collection_name.clone(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Ingest raw document bytes under the given source identity.
    ///
    /// `refresh_frequency_days` applies to web pages: a changed page is only
    /// re-ingested once its cadence has elapsed. Files pass `None` and go
    /// stale on any content change.
    pub async fn ingest_bytes(
        &self,
        source: &str,
        raw: &[u8],
        kind: DocumentKind,
        language: &str,
        refresh_frequency_days: Option<i64>,
    ) -> Result<IngestOutcome> {
        let _guard = self.identity_lock(source).await;

        // Web pages are checksummed over extracted text so markup churn does
        // not read as a content change; files over their raw bytes.
        let (checksum, mut parsed) = match kind {
            DocumentKind::WebPage => {
                let doc = parse_document(kind, raw, Some(source))?;
                (checksum_text(&doc.full_text()), Some(doc))
            }
            _ => (checksum_bytes(raw), None),
        };

        let existing = self.meta.get_latest_for_source(source).await?;
        let status = classify(existing.as_ref(), &checksum, Utc::now());

        if status == DocStatus::Unchanged {
            if let Some(existing) = &existing {
                self.meta
                    .touch_last_checked(source, &existing.checksum)
                    .await?;
            }
            debug!("Skipping {}: unchanged", source);
            return Ok(IngestOutcome {
                status: IngestStatus::Skipped,
                chunk_count: 0,
                skipped_units: 0,
            });
        }

        let parsed = match parsed.take() {
            Some(doc) => doc,
            None => parse_document(kind, raw, Some(source))?,
        };

        let outcome_status = match status {
            DocStatus::Stale => IngestStatus::Refreshed,
            _ => IngestStatus::Ingested,
        };

        let chunks = chunk_units(&parsed.units, &self.chunk_config);
        let doc_row = self.build_doc_row(source, &checksum, kind, language, refresh_frequency_days);

        if chunks.is_empty() {
            // Nothing retrievable, but the version is recorded as parsed so
            // the same content is not re-fetched and re-parsed every pass.
            self.commit_with_retry(source, &doc_row, &[], status, &[])
                .await?;
            return Ok(IngestOutcome {
                status: outcome_status,
                chunk_count: 0,
                skipped_units: parsed.skipped_units,
            });
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings =
            embed_in_batches(self.embedder.as_ref(), texts, self.batch_size).await?;
        if embeddings.len() != chunks.len() {
            return Err(Error::Embedding(format!(
                "backend returned {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let mut points = Vec::with_capacity(chunks.len());
        let mut rows = Vec::with_capacity(chunks.len());
        for (chunk, vector) in chunks.iter().zip(embeddings) {
            let pid = point_id(source, chunk.index, &chunk.hash);
            points.push(ChunkPoint {
                id: pid,
                vector,
                payload: ChunkPayload {
                    source: source.to_string(),
                    checksum: checksum.clone(),
                    sequence_index: chunk.index as i64,
                    unit_label: chunk.unit_label.clone(),
                    language: language.to_string(),
                    text: chunk.text.clone(),
                },
            });
            rows.push(DocumentChunk::new(
                source.to_string(),
                checksum.clone(),
                chunk.index as i64,
                chunk.text.clone(),
                chunk.unit_label.clone(),
                language.to_string(),
                pid,
            ));
        }
        let point_ids: Vec<Uuid> = points.iter().map(|p| p.id).collect();

        // Vector side first. If this fails nothing was written anywhere.
        self.store.upsert(points).await?;

        self.commit_with_retry(source, &doc_row, &rows, status, &point_ids)
            .await?;

        info!(
            "{} {}: {} chunks ({} units skipped)",
            match outcome_status {
                IngestStatus::Refreshed => "Refreshed",
                _ => "Ingested",
            },
            source,
            rows.len(),
            parsed.skipped_units
        );

        Ok(IngestOutcome {
            status: outcome_status,
            chunk_count: rows.len(),
            skipped_units: parsed.skipped_units,
        })
    }

    /// Commit the metadata transaction, retrying transient failures. On final
    /// failure the freshly upserted vectors are deleted so no vector exists
    /// without its chunk row. On a superseding commit the tombstoned points
    /// are deleted from the vector store.
    async fn commit_with_retry(
        &self,
        source: &str,
        doc_row: &SourceDocument,
        rows: &[DocumentChunk],
        status: DocStatus,
        upserted: &[Uuid],
    ) -> Result<()> {
        let supersede = status == DocStatus::Stale;
        let mut last_err = None;

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            match self.meta.commit_ingest(doc_row, rows, supersede).await {
                Ok(tombstoned) => {
                    self.delete_tombstoned_points(source, &tombstoned).await;
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Metadata commit for {} failed (attempt {}/{}): {}",
                        source, attempt, MAX_COMMIT_ATTEMPTS, e
                    );
                    last_err = Some(e);
                    if attempt < MAX_COMMIT_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                    }
                }
            }
        }

        if !upserted.is_empty() {
            if let Err(e) = self.store.delete(upserted).await {
                warn!("Failed to unwind vectors for {}: {}", source, e);
            }
        }
        Err(Error::Ingest {
            identity: source.to_string(),
            detail: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "metadata commit failed".to_string()),
        })
    }

    async fn delete_tombstoned_points(&self, source: &str, tombstoned: &[String]) {
        if tombstoned.is_empty() {
            return;
        }
        let ids: Vec<Uuid> = tombstoned
            .iter()
            .filter_map(|s| Uuid::parse_str(s).ok())
            .collect();
        // Best effort: a leftover vector is invisible to answers because its
        // chunk row is already tombstoned.
        if let Err(e) = self.store.delete(&ids).await {
            warn!(
                "Failed to delete {} superseded vectors for {}: {}",
                ids.len(),
                source,
                e
            );
        } else {
            debug!("Deleted {} superseded vectors for {}", ids.len(), source);
        }
    }

    fn build_doc_row(
        &self,
        source: &str,
        checksum: &str,
        kind: DocumentKind,
        language: &str,
        refresh_frequency_days: Option<i64>,
    ) -> SourceDocument {
        let mut doc = SourceDocument::new(
            source.to_string(),
            checksum.to_string(),
            kind,
            language.to_string(),
        );
        doc.parsed_at = Some(Utc::now());
        doc.refresh_frequency_days = refresh_frequency_days;
        doc.vector_store_ref = Some(self.collection_name.clone());
        doc
    }

    async fn identity_lock(&self, source: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().await;
            map.entry(source.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }

    /// Consistency probe for the status command: live chunk rows for the
    /// latest version of a source vs the vectors behind them.
    pub async fn live_chunks_for_latest(&self, source: &str) -> Result<usize> {
        match self.meta.get_latest_for_source(source).await? {
            Some(doc) => self.meta.live_chunk_count(source, &doc.checksum).await,
            None => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    /// Deterministic embedder: a tiny vector derived from byte sums
    struct HashEmbedder;

    #[async_trait]
    impl Embedder for HashEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let sum: u32 = t.bytes().map(u32::from).sum();
                    vec![(sum % 97) as f32, (t.len() % 89) as f32, 1.0, 0.5]
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            4
        }

        fn model_name(&self) -> &str {
            "hash-test"
        }
    }

    /// Store whose upsert always fails
    struct BrokenStore;

    #[async_trait]
    impl VectorStore for BrokenStore {
        async fn upsert(&self, _points: Vec<ChunkPoint>) -> Result<()> {
            Err(Error::VectorStore("upsert refused".to_string()))
        }

        async fn search(&self, _vector: Vec<f32>, _limit: usize) -> Result<Vec<crate::store::SearchHit>> {
            Ok(Vec::new())
        }

        async fn delete(&self, _point_ids: &[Uuid]) -> Result<()> {
            Ok(())
        }
    }

    async fn setup(store: Arc<dyn VectorStore>) -> (IngestPipeline, TempDir) {
        let tmp = TempDir::new().unwrap();
        let meta = MetaDb::new(&tmp.path().join("test.db")).await.unwrap();
        let mut config = Config::default();
        config.chunk.max_chars = 200;
        config.chunk.overlap_chars = 20;
        config.chunk.min_chars = 10;
        let pipeline = IngestPipeline::new(meta, store, Arc::new(HashEmbedder), &config);
        (pipeline, tmp)
    }

    fn page(body: &str) -> Vec<u8> {
        format!(
            "<html><head><title>Grid Notes</title></head><body><p>{}</p></body></html>",
            body
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn test_ingest_then_skip_unchanged() {
        let store = Arc::new(InMemoryStore::new());
        let (pipeline, _tmp) = setup(store.clone()).await;
        let source = "https://example.org/grid";
        let raw = page(&"pumped hydro storage balances the grid. ".repeat(20));

        let first = pipeline
            .ingest_bytes(source, &raw, DocumentKind::WebPage, "en", Some(7))
            .await
            .unwrap();
        assert_eq!(first.status, IngestStatus::Ingested);
        assert!(first.chunk_count > 1);
        assert_eq!(store.len(), first.chunk_count);

        // Same bytes again: no new vectors, no new rows
        let second = pipeline
            .ingest_bytes(source, &raw, DocumentKind::WebPage, "en", Some(7))
            .await
            .unwrap();
        assert_eq!(second.status, IngestStatus::Skipped);
        assert_eq!(store.len(), first.chunk_count);
        assert_eq!(
            pipeline.live_chunks_for_latest(source).await.unwrap(),
            store.len()
        );
    }

    #[tokio::test]
    async fn test_markup_churn_does_not_reingest() {
        let store = Arc::new(InMemoryStore::new());
        let (pipeline, _tmp) = setup(store.clone()).await;
        let source = "https://example.org/solar";
        let body = "utility scale solar keeps getting cheaper. ".repeat(10);

        pipeline
            .ingest_bytes(source, &page(&body), DocumentKind::WebPage, "en", Some(7))
            .await
            .unwrap();
        let before = store.len();

        // Same text, different markup and whitespace
        let churned = format!(
            "<html><head><title>Grid Notes</title></head><body><div>  {}  </div></body></html>",
            body
        );
        let outcome = pipeline
            .ingest_bytes(source, churned.as_bytes(), DocumentKind::WebPage, "en", Some(7))
            .await
            .unwrap();
        assert_eq!(outcome.status, IngestStatus::Skipped);
        assert_eq!(store.len(), before);
    }

    #[tokio::test]
    async fn test_refresh_supersedes_and_deletes_old_vectors() {
        let store = Arc::new(InMemoryStore::new());
        let (pipeline, _tmp) = setup(store.clone()).await;
        let source = "https://example.org/wind";

        let v1 = page(&"offshore wind capacity doubled last year. ".repeat(10));
        let first = pipeline
            .ingest_bytes(source, &v1, DocumentKind::WebPage, "en", Some(0))
            .await
            .unwrap();
        assert_eq!(first.status, IngestStatus::Ingested);
        let old_count = store.len();
        assert!(old_count > 0);

        // Cadence of zero days: a change is due immediately
        let v2 = page(&"offshore wind capacity tripled this year. ".repeat(10));
        let second = pipeline
            .ingest_bytes(source, &v2, DocumentKind::WebPage, "en", Some(0))
            .await
            .unwrap();
        assert_eq!(second.status, IngestStatus::Refreshed);

        // Only the new version's vectors remain
        assert_eq!(store.len(), second.chunk_count);
        assert_eq!(
            pipeline.live_chunks_for_latest(source).await.unwrap(),
            store.len()
        );
    }

    #[tokio::test]
    async fn test_changed_page_within_cadence_is_deferred() {
        let store = Arc::new(InMemoryStore::new());
        let (pipeline, _tmp) = setup(store.clone()).await;
        let source = "https://example.org/hydro";

        let v1 = page(&"run of river hydro output varies by season. ".repeat(10));
        pipeline
            .ingest_bytes(source, &v1, DocumentKind::WebPage, "en", Some(7))
            .await
            .unwrap();
        let before = store.len();

        let v2 = page(&"run of river hydro output varies by rainfall. ".repeat(10));
        let outcome = pipeline
            .ingest_bytes(source, &v2, DocumentKind::WebPage, "en", Some(7))
            .await
            .unwrap();
        assert_eq!(outcome.status, IngestStatus::Skipped);
        assert_eq!(store.len(), before);
    }

    #[tokio::test]
    async fn test_vector_upsert_failure_leaves_metadata_untouched() {
        let (pipeline, tmp) = setup(Arc::new(BrokenStore)).await;
        let source = "https://example.org/broken";
        let raw = page(&"grid scale batteries shift evening peaks. ".repeat(10));

        let result = pipeline
            .ingest_bytes(source, &raw, DocumentKind::WebPage, "en", Some(7))
            .await;
        assert!(matches!(result, Err(Error::VectorStore(_))));

        // Nothing committed: the same content is still New next time
        let meta = MetaDb::new(&tmp.path().join("test.db")).await.unwrap();
        assert!(!meta.is_parsed(source).await.unwrap());
        assert!(meta.get_latest_for_source(source).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_page_commits_without_chunks() {
        let store = Arc::new(InMemoryStore::new());
        let (pipeline, _tmp) = setup(store.clone()).await;
        let source = "https://example.org/empty";
        let raw = b"<html><head><title>Empty</title></head><body></body></html>";

        let first = pipeline
            .ingest_bytes(source, raw, DocumentKind::WebPage, "en", Some(7))
            .await
            .unwrap();
        assert_eq!(first.status, IngestStatus::Ingested);
        assert_eq!(first.chunk_count, 0);
        assert!(store.is_empty());

        // Recorded as parsed, so the next pass skips it
        let second = pipeline
            .ingest_bytes(source, raw, DocumentKind::WebPage, "en", Some(7))
            .await
            .unwrap();
        assert_eq!(second.status, IngestStatus::Skipped);
    }

    #[tokio::test]
    async fn test_duplicate_rows_keep_stores_aligned() {
        let store = Arc::new(InMemoryStore::new());
        let (pipeline, _tmp) = setup(store.clone()).await;
        let source = "/data/duplicates.csv";
        // Two identical data rows: identical chunk text, two chunk rows
        let csv = b"region,price\nnorth,42.5\nnorth,42.5\n";

        let outcome = pipeline
            .ingest_bytes(source, csv, DocumentKind::Spreadsheet, "en", None)
            .await
            .unwrap();
        assert_eq!(outcome.chunk_count, 2);

        // Every chunk row is backed by its own vector point
        assert_eq!(store.len(), outcome.chunk_count);
        assert_eq!(
            pipeline.live_chunks_for_latest(source).await.unwrap(),
            store.len()
        );
    }

    #[tokio::test]
    async fn test_file_ingest_uses_byte_checksum() {
        let store = Arc::new(InMemoryStore::new());
        let (pipeline, _tmp) = setup(store.clone()).await;
        let source = "/data/prices.csv";
        let csv = b"region,price\nnorth,42.5\nsouth,38.1\n";

        let first = pipeline
            .ingest_bytes(source, csv, DocumentKind::Spreadsheet, "en", None)
            .await
            .unwrap();
        assert_eq!(first.status, IngestStatus::Ingested);
        assert!(first.chunk_count > 0);

        // Any byte change to a file is stale immediately (no cadence)
        let changed = b"region,price\nnorth,43.0\nsouth,38.1\n";
        let second = pipeline
            .ingest_bytes(source, changed, DocumentKind::Spreadsheet, "en", None)
            .await
            .unwrap();
        assert_eq!(second.status, IngestStatus::Refreshed);
    }
}
