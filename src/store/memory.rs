//! In-memory vector store for tests and offline runs

use super::{ChunkPoint, SearchHit, VectorStore};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Exact cosine-similarity store backed by a hash map
#[derive(Default)]
pub struct InMemoryStore {
    points: RwLock<HashMap<Uuid, ChunkPoint>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.points.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.points.read().map(|p| p.contains_key(id)).unwrap_or(false)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn upsert(&self, points: Vec<ChunkPoint>) -> Result<()> {
        let mut map = self.points.write().unwrap_or_else(|e| e.into_inner());
        for point in points {
            map.insert(point.id, point);
        }
        Ok(())
    }

    async fn search(&self, vector: Vec<f32>, limit: usize) -> Result<Vec<SearchHit>> {
        let map = self.points.read().unwrap_or_else(|e| e.into_inner());
        let mut hits: Vec<SearchHit> = map
            .values()
            .map(|p| SearchHit {
                id: p.id.to_string(),
                score: cosine_similarity(&vector, &p.vector),
                payload: p.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete(&self, point_ids: &[Uuid]) -> Result<()> {
        let mut map = self.points.write().unwrap_or_else(|e| e.into_inner());
        for id in point_ids {
            map.remove(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ChunkPayload;

    fn point(id: Uuid, vector: Vec<f32>, text: &str) -> ChunkPoint {
        ChunkPoint {
            id,
            vector,
            payload: ChunkPayload {
                source: "https://example.org/a".to_string(),
                checksum: "c1".to_string(),
                sequence_index: 0,
                unit_label: "page 1".to_string(),
                language: "en".to_string(),
                text: text.to_string(),
            },
        }
    }

    #[tokio::test]
    async fn test_search_ranks_by_cosine() {
        let store = InMemoryStore::new();
        let close = Uuid::new_v4();
        let far = Uuid::new_v4();
        store
            .upsert(vec![
                point(close, vec![1.0, 0.0], "close"),
                point(far, vec![0.0, 1.0], "far"),
            ])
            .await
            .unwrap();

        let hits = store.search(vec![0.9, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload.text, "close");
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn test_upsert_replaces_and_delete_removes() {
        let store = InMemoryStore::new();
        let id = Uuid::new_v4();
        store.upsert(vec![point(id, vec![1.0, 0.0], "v1")]).await.unwrap();
        store.upsert(vec![point(id, vec![1.0, 0.0], "v2")]).await.unwrap();
        assert_eq!(store.len(), 1);

        let hits = store.search(vec![1.0, 0.0], 1).await.unwrap();
        assert_eq!(hits[0].payload.text, "v2");

        store.delete(&[id]).await.unwrap();
        assert!(store.is_empty());
        // Deleting an unknown id is a no-op
        store.delete(&[Uuid::new_v4()]).await.unwrap();
    }
}
