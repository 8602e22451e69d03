//! Metadata storage using SQLite
//!
//! This module tracks everything the vector store cannot answer:
//! - Source documents: one row per (source, checksum) version, with freshness
//!   bookkeeping. Superseded, never deleted.
//! - Document chunks: the text behind each vector point, tombstoned when
//!   their version is superseded.

mod schema;

pub use schema::*;

use crate::config::Config;
use crate::error::Result;
use crate::parse::DocumentKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use tracing::{debug, info};
use uuid::Uuid;

/// One version of an acquired document. Identity is (source, checksum).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SourceDocument {
    pub id: i64,
    /// Origin URL or file path
    pub source: String,
    /// SHA-256 of the acquired content
    pub checksum: String,
    /// Document kind tag ("web_page", "pdf", "spreadsheet")
    pub kind: String,
    /// Content language ("en" | "zh")
    pub language: String,
    pub discovered_at: DateTime<Utc>,
    /// Set when chunks for this checksum were committed to the vector store,
    /// and only then
    pub parsed_at: Option<DateTime<Utc>>,
    pub last_checked: DateTime<Utc>,
    /// Re-check cadence in days; web pages only
    pub refresh_frequency_days: Option<i64>,
    /// Collection the vectors live in
    pub vector_store_ref: Option<String>,
    pub superseded: bool,
}

impl SourceDocument {
    pub fn new(source: String, checksum: String, kind: DocumentKind, language: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            source,
            checksum,
            kind: kind.as_str().to_string(),
            language,
            discovered_at: now,
            parsed_at: None,
            last_checked: now,
            refresh_frequency_days: None,
            vector_store_ref: None,
            superseded: false,
        }
    }

    pub fn document_kind(&self) -> Result<DocumentKind> {
        self.kind.parse()
    }
}

/// One embedded chunk row. `point_id` ties it to its vector.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub id: String,
    pub source: String,
    pub checksum: String,
    pub sequence_index: i64,
    pub chunk_text: String,
    /// Locator inside the source ("page 3", "prices!row12")
    pub unit_label: String,
    pub language: String,
    pub point_id: String,
    pub tombstoned: bool,
    pub created_at: DateTime<Utc>,
}

impl DocumentChunk {
    pub fn new(
        source: String,
        checksum: String,
        sequence_index: i64,
        chunk_text: String,
        unit_label: String,
        language: String,
        point_id: Uuid,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            checksum,
            sequence_index,
            chunk_text,
            unit_label,
            language,
            point_id: point_id.to_string(),
            tombstoned: false,
            created_at: Utc::now(),
        }
    }
}

/// Per-source summary for the CLI
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SourceOverview {
    pub source: String,
    pub kind: String,
    pub language: String,
    pub versions: i64,
    pub live_chunks: i64,
    pub last_checked: DateTime<Utc>,
}

/// Global statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStats {
    pub source_count: usize,
    pub version_count: usize,
    pub live_chunk_count: usize,
    pub tombstoned_chunk_count: usize,
}

/// Metadata database handle
#[derive(Clone)]
pub struct MetaDb {
    pool: SqlitePool,
}

impl MetaDb {
    /// Connect to the metadata database from config
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::new(&config.paths.db_file).await
    }

    /// Connect with a database path directly, auto-initializing the schema
    pub async fn new(db_path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        if !db.is_initialized().await? {
            db.init_schema().await?;
        }
        Ok(db)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='source_documents'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    // ===== Source document operations =====

    /// Insert a version row, or refresh its `last_checked` if it exists
    pub async fn upsert_source_document(&self, doc: &SourceDocument) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO source_documents
                (source, checksum, kind, language, discovered_at, parsed_at,
                 last_checked, refresh_frequency_days, vector_store_ref, superseded)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source, checksum) DO UPDATE SET
                last_checked = excluded.last_checked,
                refresh_frequency_days = excluded.refresh_frequency_days
            "#,
        )
        .bind(&doc.source)
        .bind(&doc.checksum)
        .bind(&doc.kind)
        .bind(&doc.language)
        .bind(doc.discovered_at)
        .bind(doc.parsed_at)
        .bind(doc.last_checked)
        .bind(doc.refresh_frequency_days)
        .bind(&doc.vector_store_ref)
        .bind(doc.superseded)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get one exact version by identity
    pub async fn get_source_document(
        &self,
        source: &str,
        checksum: &str,
    ) -> Result<Option<SourceDocument>> {
        let doc = sqlx::query_as::<_, SourceDocument>(
            "SELECT * FROM source_documents WHERE source = ? AND checksum = ?",
        )
        .bind(source)
        .bind(checksum)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }

    /// Get the newest non-superseded version for a source
    pub async fn get_latest_for_source(&self, source: &str) -> Result<Option<SourceDocument>> {
        let doc = sqlx::query_as::<_, SourceDocument>(
            r#"
            SELECT * FROM source_documents
            WHERE source = ? AND superseded = 0
            ORDER BY discovered_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(source)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc)
    }

    /// Whether any version of this source was ever successfully parsed
    pub async fn is_parsed(&self, source: &str) -> Result<bool> {
        let result: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM source_documents WHERE source = ? AND parsed_at IS NOT NULL LIMIT 1",
        )
        .bind(source)
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    /// Whether this exact (source, checksum) version was parsed
    pub async fn is_version_parsed(&self, source: &str, checksum: &str) -> Result<bool> {
        Ok(self
            .get_source_document(source, checksum)
            .await?
            .map(|d| d.parsed_at.is_some())
            .unwrap_or(false))
    }

    /// Record a freshness check without any content change
    pub async fn touch_last_checked(&self, source: &str, checksum: &str) -> Result<()> {
        sqlx::query("UPDATE source_documents SET last_checked = ? WHERE source = ? AND checksum = ?")
            .bind(Utc::now())
            .bind(source)
            .bind(checksum)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ===== Ingest commit =====

    /// Commit a fully ingested version in one transaction: the version row
    /// (with `parsed_at` set), all its chunk rows, and, when superseding,
    /// tombstones for every prior live chunk of the source.
    ///
    /// Returns the point ids of tombstoned chunks so the caller can delete
    /// their vectors.
    pub async fn commit_ingest(
        &self,
        doc: &SourceDocument,
        chunks: &[DocumentChunk],
        supersede_previous: bool,
    ) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;
        let mut tombstoned_points = Vec::new();

        if supersede_previous {
            tombstoned_points = sqlx::query_scalar::<_, String>(
                "SELECT point_id FROM document_chunks WHERE source = ? AND checksum != ? AND tombstoned = 0",
            )
            .bind(&doc.source)
            .bind(&doc.checksum)
            .fetch_all(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE document_chunks SET tombstoned = 1 WHERE source = ? AND checksum != ? AND tombstoned = 0",
            )
            .bind(&doc.source)
            .bind(&doc.checksum)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                "UPDATE source_documents SET superseded = 1 WHERE source = ? AND checksum != ?",
            )
            .bind(&doc.source)
            .bind(&doc.checksum)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO source_documents
                (source, checksum, kind, language, discovered_at, parsed_at,
                 last_checked, refresh_frequency_days, vector_store_ref, superseded)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            ON CONFLICT(source, checksum) DO UPDATE SET
                parsed_at = excluded.parsed_at,
                last_checked = excluded.last_checked,
                vector_store_ref = excluded.vector_store_ref,
                superseded = 0
            "#,
        )
        .bind(&doc.source)
        .bind(&doc.checksum)
        .bind(&doc.kind)
        .bind(&doc.language)
        .bind(doc.discovered_at)
        .bind(doc.parsed_at)
        .bind(doc.last_checked)
        .bind(doc.refresh_frequency_days)
        .bind(&doc.vector_store_ref)
        .execute(&mut *tx)
        .await?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO document_chunks
                    (id, source, checksum, sequence_index, chunk_text, unit_label,
                     language, point_id, tombstoned, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?)
                ON CONFLICT(source, checksum, sequence_index) DO UPDATE SET
                    chunk_text = excluded.chunk_text,
                    unit_label = excluded.unit_label,
                    point_id = excluded.point_id,
                    tombstoned = 0
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(&chunk.checksum)
            .bind(chunk.sequence_index)
            .bind(&chunk.chunk_text)
            .bind(&chunk.unit_label)
            .bind(&chunk.language)
            .bind(&chunk.point_id)
            .bind(chunk.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(tombstoned_points)
    }

    /// Delete chunk rows for one version. Reconciliation helper for a commit
    /// that must be unwound.
    pub async fn delete_chunks_for(&self, source: &str, checksum: &str) -> Result<()> {
        sqlx::query("DELETE FROM document_chunks WHERE source = ? AND checksum = ?")
            .bind(source)
            .bind(checksum)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ===== Chunk lookups =====

    /// Get the chunk row behind a vector point
    pub async fn get_chunk_by_point_id(&self, point_id: &str) -> Result<Option<DocumentChunk>> {
        let chunk = sqlx::query_as::<_, DocumentChunk>(
            "SELECT * FROM document_chunks WHERE point_id = ? AND tombstoned = 0",
        )
        .bind(point_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(chunk)
    }

    /// Live (non-tombstoned) chunk count for a version
    pub async fn live_chunk_count(&self, source: &str, checksum: &str) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM document_chunks WHERE source = ? AND checksum = ? AND tombstoned = 0",
        )
        .bind(source)
        .bind(checksum)
        .fetch_one(&self.pool)
        .await?;
        Ok(count as usize)
    }

    // ===== CLI listings =====

    /// Per-source overview: latest version info plus live chunk counts
    pub async fn list_sources(&self) -> Result<Vec<SourceOverview>> {
        let rows = sqlx::query_as::<_, SourceOverview>(
            r#"
            SELECT
                d.source AS source,
                d.kind AS kind,
                d.language AS language,
                COUNT(DISTINCT d.checksum) AS versions,
                (SELECT COUNT(*) FROM document_chunks c
                 WHERE c.source = d.source AND c.tombstoned = 0) AS live_chunks,
                MAX(d.last_checked) AS last_checked
            FROM source_documents d
            GROUP BY d.source
            ORDER BY last_checked DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Get global statistics
    pub async fn get_global_stats(&self) -> Result<GlobalStats> {
        let source_count: i64 =
            sqlx::query_scalar("SELECT COUNT(DISTINCT source) FROM source_documents")
                .fetch_one(&self.pool)
                .await?;
        let version_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM source_documents")
            .fetch_one(&self.pool)
            .await?;
        let live_chunk_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE tombstoned = 0")
                .fetch_one(&self.pool)
                .await?;
        let tombstoned_chunk_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM document_chunks WHERE tombstoned = 1")
                .fetch_one(&self.pool)
                .await?;

        Ok(GlobalStats {
            source_count: source_count as usize,
            version_count: version_count as usize,
            live_chunk_count: live_chunk_count as usize,
            tombstoned_chunk_count: tombstoned_chunk_count as usize,
        })
    }
}

/// Lookup used by the crawler for dedup-before-download: has this identity
/// already been parsed into the index?
#[async_trait::async_trait]
pub trait ParsedLookup: Send + Sync {
    /// Any version of this identity parsed?
    async fn is_parsed(&self, source: &str) -> Result<bool>;

    /// This exact (source, checksum) version parsed?
    async fn is_version_parsed(&self, source: &str, checksum: &str) -> Result<bool>;
}

#[async_trait::async_trait]
impl ParsedLookup for MetaDb {
    async fn is_parsed(&self, source: &str) -> Result<bool> {
        MetaDb::is_parsed(self, source).await
    }

    async fn is_version_parsed(&self, source: &str, checksum: &str) -> Result<bool> {
        MetaDb::is_version_parsed(self, source, checksum).await
    }
}
