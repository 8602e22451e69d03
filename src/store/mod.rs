//! Vector index access
//!
//! The index is an injected capability: the pipeline talks to the
//! [`VectorStore`] trait and never to a concrete backend. Qdrant is the
//! production implementation; the in-memory store backs tests and offline
//! runs.

mod memory;
mod qdrant;

pub use memory::*;
pub use qdrant::*;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload stored next to each vector. Carries the chunk text so retrieval
/// does not need a metadata round trip per hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub source: String,
    pub checksum: String,
    pub sequence_index: i64,
    pub unit_label: String,
    pub language: String,
    pub text: String,
}

/// A vector point ready for upsert
#[derive(Debug, Clone)]
pub struct ChunkPoint {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// One similarity search hit
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: ChunkPayload,
}

/// Vector index operations the pipeline relies on. Search internals (ANN
/// algorithm, quantization) belong to the implementation.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert points; replaces points with the same id
    async fn upsert(&self, points: Vec<ChunkPoint>) -> Result<()>;

    /// Top-k similarity search
    async fn search(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<SearchHit>>;

    /// Delete points by id; unknown ids are ignored
    async fn delete(&self, point_ids: &[Uuid]) -> Result<()>;
}
