use crate::error::BackendError;
use crate::models::Chunk;
use async_trait::async_trait;

/// A chunk together with its embedding, as handed to a [`VectorStore`].
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Nearest-neighbour storage for one collection. The similarity metric is
/// the store's business; scores only need to sort descending.
#[async_trait]
pub trait VectorStore: Send + Sync {
    fn backend(&self) -> &str;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn insert(&mut self, entries: Vec<VectorEntry>) -> Result<(), BackendError>;

    /// At most `limit` hits, best first.
    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(Chunk, f32)>, BackendError>;

    async fn clear(&mut self) -> Result<(), BackendError>;
}

/// Opens the store backing a collection, keyed by its normalized name.
pub trait StoreProvider: Send + Sync {
    fn open(&self, collection_name: &str) -> Box<dyn VectorStore>;
}
