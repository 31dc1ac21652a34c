use crate::error::BackendError;
use crate::models::Chunk;
use crate::traits::{StoreProvider, VectorEntry, VectorStore};
use async_trait::async_trait;

/// Brute-force cosine similarity over vectors held in memory.
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    entries: Vec<VectorEntry>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &str {
        "memory"
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    async fn insert(&mut self, entries: Vec<VectorEntry>) -> Result<(), BackendError> {
        self.entries.extend(entries);
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(Chunk, f32)>, BackendError> {
        let mut scored = self
            .entries
            .iter()
            .map(|entry| (entry, cosine_similarity(query, &entry.vector)))
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(entry, score)| (entry.chunk.clone(), score))
            .collect())
    }

    async fn clear(&mut self) -> Result<(), BackendError> {
        self.entries.clear();
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryStoreProvider;

impl StoreProvider for MemoryStoreProvider {
    fn open(&self, _collection_name: &str) -> Box<dyn VectorStore> {
        Box::new(InMemoryVectorStore::new())
    }
}

pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }
    let dot: f32 = left.iter().zip(right.iter()).map(|(x, y)| x * y).sum();
    let left_norm: f32 = left.iter().map(|x| x * x).sum::<f32>().sqrt();
    let right_norm: f32 = right.iter().map(|x| x * x).sum::<f32>().sqrt();
    if left_norm < f32::EPSILON || right_norm < f32::EPSILON {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}
