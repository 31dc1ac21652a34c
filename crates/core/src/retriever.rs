use crate::config::RetrievalConfig;
use crate::error::SearchError;
use crate::models::Retrieval;
use crate::registry::CollectionRegistry;
use std::sync::Arc;
use tracing::{debug, info};

/// Routes a question to one topic, or fans it out over every collection.
pub struct Retriever {
    registry: Arc<CollectionRegistry>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(registry: Arc<CollectionRegistry>, config: RetrievalConfig) -> Self {
        Self { registry, config }
    }

    pub async fn search(&self, query: &str, topic: Option<&str>) -> Result<Retrieval, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::Request("query is empty".to_string()));
        }
        if self.registry.is_empty().await {
            return Ok(Retrieval::NoDocuments);
        }

        match topic {
            Some(topic) => self.search_topic(query, topic).await,
            None => self.search_all(query).await,
        }
    }

    async fn search_topic(&self, query: &str, topic: &str) -> Result<Retrieval, SearchError> {
        let Some(entry) = self.registry.get(topic).await else {
            return Ok(Retrieval::TopicNotFound {
                topic: topic.to_string(),
                available: self.registry.list().await,
            });
        };

        let hits = entry
            .index
            .read()
            .await
            .query(query, self.config.scoped_top_k)
            .await?;
        info!(topic, hits = hits.len(), "scoped search finished");
        Ok(Retrieval::Hits(hits))
    }

    /// Results are concatenated in registry order. Scores from different
    /// collections are not compared.
    async fn search_all(&self, query: &str) -> Result<Retrieval, SearchError> {
        let vector = self.registry.embedder().embed_query(query).await?;
        let topics = self.registry.snapshot().await;

        let mut hits = Vec::new();
        for entry in topics.iter() {
            let index = entry.index.read().await;
            if index.is_empty() {
                debug!(topic = %entry.topic, "skipping empty collection");
                continue;
            }
            let found = index
                .query_vector(&vector, self.config.per_collection_top_k)
                .await?;
            debug!(topic = %entry.topic, hits = found.len(), "collection searched");
            hits.extend(found);
        }

        info!(collections = topics.len(), hits = hits.len(), "fan-out search finished");
        Ok(Retrieval::Hits(hits))
    }
}
