use crate::embeddings::Embedder;
use crate::error::{BackendError, IngestError, SearchError};
use crate::models::{Chunk, ScoredChunk};
use crate::traits::{VectorEntry, VectorStore};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

/// An embedding model paired with the vector store of one collection.
pub struct EmbeddingIndex {
    topic: String,
    collection_name: String,
    embedder: Arc<dyn Embedder>,
    store: Box<dyn VectorStore>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl EmbeddingIndex {
    pub fn new(
        topic: impl Into<String>,
        collection_name: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        store: Box<dyn VectorStore>,
    ) -> Self {
        let now = Utc::now();
        Self {
            topic: topic.into(),
            collection_name: collection_name.into(),
            embedder,
            store,
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn from_chunks(
        topic: impl Into<String>,
        collection_name: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        store: Box<dyn VectorStore>,
        chunks: Vec<Chunk>,
    ) -> Result<Self, IngestError> {
        let mut index = Self::new(topic, collection_name, embedder, store);
        index.add(chunks).await?;
        Ok(index)
    }

    /// Embeds and stores the chunks, returning how many were added.
    pub async fn add(&mut self, chunks: Vec<Chunk>) -> Result<usize, IngestError> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts = chunks
            .iter()
            .map(|chunk| chunk.text.clone())
            .collect::<Vec<_>>();
        let vectors = self.embedder.embed(&texts).await?;

        if vectors.len() != chunks.len() {
            return Err(BackendError::Embedding(format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                chunks.len()
            ))
            .into());
        }

        let added = chunks.len();
        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorEntry { chunk, vector })
            .collect();
        self.store.insert(entries).await?;
        self.updated_at = Utc::now();
        debug!(
            collection = %self.collection_name,
            backend = self.store.backend(),
            model = self.embedder.model_name(),
            added,
            "chunks embedded"
        );

        Ok(added)
    }

    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>, SearchError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let vector = self.embedder.embed_query(text).await?;
        self.query_vector(&vector, k).await
    }

    /// Like [`EmbeddingIndex::query`] with an already embedded query.
    pub async fn query_vector(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredChunk>, SearchError> {
        if self.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut hits = self
            .store
            .search(vector, k)
            .await?
            .into_iter()
            .map(|(chunk, score)| ScoredChunk {
                chunk,
                score,
                topic: self.topic.clone(),
            })
            .collect::<Vec<_>>();

        hits.sort_by(|left, right| right.score.total_cmp(&left.score));
        hits.truncate(k);
        Ok(hits)
    }

    pub async fn clear(&mut self) -> Result<(), BackendError> {
        self.store.clear().await?;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
