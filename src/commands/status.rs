//! Status command implementation

use crate::config::Config;
use crate::error::Result;
use crate::meta::{GlobalStats, MetaDb};
use crate::store::QdrantStore;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Status information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusInfo {
    pub config_path: String,
    pub db_path: String,
    pub qdrant_url: String,
    pub collection_name: String,
    pub embedding_model: String,
    pub llm_model: String,
    pub qdrant_connected: bool,
    pub collection_exists: bool,
    pub qdrant_points: u64,
    pub db_stats: GlobalStats,
}

/// Get system status
pub async fn cmd_status(config: &Config, db: &MetaDb, store: &QdrantStore) -> Result<StatusInfo> {
    info!("Getting status");

    let db_stats = db.get_global_stats().await?;

    let (qdrant_connected, collection_exists, qdrant_points) = match store.point_count().await {
        Ok(Some(points)) => (true, true, points),
        Ok(None) => (true, false, 0),
        Err(e) => {
            tracing::debug!("Qdrant connection error: {:?}", e);
            (false, false, 0)
        }
    };

    Ok(StatusInfo {
        config_path: config.paths.config_file.display().to_string(),
        db_path: config.paths.db_file.display().to_string(),
        qdrant_url: config.qdrant_url.clone(),
        collection_name: config.collection_name.clone(),
        embedding_model: config.embedding.model.clone(),
        llm_model: config.llm.model.clone(),
        qdrant_connected,
        collection_exists,
        qdrant_points,
        db_stats,
    })
}

/// Print status to console
pub fn print_status(status: &StatusInfo) {
    println!("\nwattson status\n");
    println!("Configuration: {}", status.config_path);
    println!("Database: {}", status.db_path);
    println!("\nQdrant:");
    println!("  URL: {}", status.qdrant_url);
    println!("  Collection: {}", status.collection_name);

    let connection_status = if status.qdrant_connected {
        if status.collection_exists {
            "✓ Connected"
        } else {
            "⚠ Connected (collection not created yet - it is created on first ingest)"
        }
    } else {
        "✗ Not connected"
    };
    println!("  Status: {}", connection_status);
    println!("  Points: {}", status.qdrant_points);
    println!("\nEmbedding model: {}", status.embedding_model);
    println!("Generation model: {}", status.llm_model);
    println!("\nMetadata:");
    println!("  Sources: {}", status.db_stats.source_count);
    println!("  Document versions: {}", status.db_stats.version_count);
    println!("  Live chunks: {}", status.db_stats.live_chunk_count);
    println!(
        "  Tombstoned chunks: {}",
        status.db_stats.tombstoned_chunk_count
    );

    // The two stores must agree when everything is healthy
    if status.collection_exists && status.qdrant_points != status.db_stats.live_chunk_count as u64 {
        println!(
            "\n⚠ Vector count ({}) differs from live chunk count ({}); a failed ingest may need reconciliation",
            status.qdrant_points, status.db_stats.live_chunk_count
        );
    }
}
