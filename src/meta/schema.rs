//! SQLite schema definition

/// SQL schema for the metadata database
pub const SCHEMA_SQL: &str = r#"
-- Source documents: one row per (source, checksum) version.
-- Versions are superseded, never deleted.
CREATE TABLE IF NOT EXISTS source_documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source TEXT NOT NULL,
    checksum TEXT NOT NULL,
    kind TEXT NOT NULL,
    language TEXT NOT NULL DEFAULT 'en',
    discovered_at TEXT NOT NULL,
    parsed_at TEXT,
    last_checked TEXT NOT NULL,
    refresh_frequency_days INTEGER,
    vector_store_ref TEXT,
    superseded INTEGER NOT NULL DEFAULT 0,
    UNIQUE(source, checksum)
);

-- Document chunks: embedded text chunks. Tombstoned instead of deleted when
-- their version is superseded; retrieval sees live rows only.
CREATE TABLE IF NOT EXISTS document_chunks (
    id TEXT PRIMARY KEY,
    source TEXT NOT NULL,
    checksum TEXT NOT NULL,
    sequence_index INTEGER NOT NULL,
    chunk_text TEXT NOT NULL,
    unit_label TEXT NOT NULL,
    language TEXT NOT NULL DEFAULT 'en',
    point_id TEXT NOT NULL,
    tombstoned INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(source, checksum, sequence_index)
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_docs_source ON source_documents(source);
CREATE INDEX IF NOT EXISTS idx_docs_checksum ON source_documents(checksum);
CREATE INDEX IF NOT EXISTS idx_chunks_source ON document_chunks(source, checksum);
CREATE INDEX IF NOT EXISTS idx_chunks_point ON document_chunks(point_id);
"#;
