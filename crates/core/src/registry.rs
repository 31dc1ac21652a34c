use crate::embeddings::Embedder;
use crate::error::{BackendError, IngestError};
use crate::index::EmbeddingIndex;
use crate::models::{Chunk, CollectionInfo};
use crate::traits::StoreProvider;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock, RwLockReadGuard};
use tracing::info;

/// Collection name derived from a topic: trimmed, lowercased, spaces as
/// underscores.
pub fn normalize_collection_name(topic: &str) -> String {
    topic.trim().to_lowercase().replace(' ', "_")
}

pub(crate) struct TopicEntry {
    pub(crate) topic: String,
    pub(crate) index: RwLock<EmbeddingIndex>,
}

/// Topic to index mapping, kept in insertion order.
///
/// Ingests and deletes of one topic are serialized by a per-collection
/// lock; a new topic only becomes visible once its index is fully built.
/// Collection names are reserved before the build starts so two new topics
/// never share one.
pub struct CollectionRegistry {
    embedder: Arc<dyn Embedder>,
    stores: Arc<dyn StoreProvider>,
    topics: RwLock<Vec<Arc<TopicEntry>>>,
    ingest_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    reserved_names: Mutex<HashSet<String>>,
}

impl CollectionRegistry {
    pub fn new(embedder: Arc<dyn Embedder>, stores: Arc<dyn StoreProvider>) -> Self {
        Self {
            embedder,
            stores,
            topics: RwLock::new(Vec::new()),
            ingest_locks: Mutex::new(HashMap::new()),
            reserved_names: Mutex::new(HashSet::new()),
        }
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    async fn ingest_lock(&self, topic: &str) -> Arc<Mutex<()>> {
        self.ingest_locks
            .lock()
            .await
            .entry(normalize_collection_name(topic))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Appends the chunks to `topic`, creating its collection on first use.
    /// Returns the topic's chunk count afterwards.
    pub async fn upsert(&self, topic: &str, chunks: Vec<Chunk>) -> Result<usize, IngestError> {
        if chunks.is_empty() {
            return Err(IngestError::EmptyIngest(topic.to_string()));
        }

        let ingest_lock = self.ingest_lock(topic).await;
        let _serialized = ingest_lock.lock().await;

        if let Some(entry) = self.get(topic).await {
            let mut index = entry.index.write().await;
            let added = index.add(chunks).await?;
            info!(topic, added, total = index.len(), "collection updated");
            return Ok(index.len());
        }

        let collection_name = self
            .reserve_collection_name(normalize_collection_name(topic))
            .await;
        let built = EmbeddingIndex::from_chunks(
            topic,
            collection_name.as_str(),
            self.embedder.clone(),
            self.stores.open(&collection_name),
            chunks,
        )
        .await;
        let index = match built {
            Ok(index) => index,
            Err(error) => {
                self.reserved_names.lock().await.remove(&collection_name);
                return Err(error);
            }
        };
        let total = index.len();

        self.topics.write().await.push(Arc::new(TopicEntry {
            topic: topic.to_string(),
            index: RwLock::new(index),
        }));
        info!(topic, collection = %collection_name, total, "collection created");

        Ok(total)
    }

    /// Claims the first free name among `base`, `base_2`, `base_3`, ...
    /// The claim lasts until the collection is deleted.
    async fn reserve_collection_name(&self, base: String) -> String {
        let mut reserved = self.reserved_names.lock().await;
        let mut candidate = base.clone();
        let mut suffix = 2;
        while reserved.contains(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        reserved.insert(candidate.clone());
        candidate
    }

    pub(crate) async fn get(&self, topic: &str) -> Option<Arc<TopicEntry>> {
        self.topics
            .read()
            .await
            .iter()
            .find(|entry| entry.topic == topic)
            .cloned()
    }

    /// Read access to every topic, in insertion order.
    pub(crate) async fn snapshot(&self) -> RwLockReadGuard<'_, Vec<Arc<TopicEntry>>> {
        self.topics.read().await
    }

    pub async fn list(&self) -> Vec<String> {
        self.topics
            .read()
            .await
            .iter()
            .map(|entry| entry.topic.clone())
            .collect()
    }

    pub async fn is_empty(&self) -> bool {
        self.topics.read().await.is_empty()
    }

    /// Removes `topic`. Unknown topics are a no-op reported as `false`.
    ///
    /// Waits for any ingest into the topic to finish. The backing collection
    /// is cleared before the topic is unregistered, so a failed clear leaves
    /// the topic listed and retryable.
    pub async fn delete(&self, topic: &str) -> Result<bool, BackendError> {
        let ingest_lock = self.ingest_lock(topic).await;
        let _serialized = ingest_lock.lock().await;

        let Some(entry) = self.get(topic).await else {
            return Ok(false);
        };

        let collection_name = {
            let mut index = entry.index.write().await;
            index.clear().await?;
            index.collection_name().to_string()
        };

        self.topics
            .write()
            .await
            .retain(|registered| !Arc::ptr_eq(registered, &entry));
        self.reserved_names.lock().await.remove(&collection_name);
        info!(topic, collection = %collection_name, "collection deleted");
        Ok(true)
    }

    /// Deletes every topic registered when the call starts. Stops at the
    /// first failed clear, leaving that topic and the rest registered.
    pub async fn delete_all(&self) -> Result<usize, BackendError> {
        let mut count = 0;
        for topic in self.list().await {
            if self.delete(&topic).await? {
                count += 1;
            }
        }
        info!(count, "all collections deleted");
        Ok(count)
    }

    pub async fn stats(&self) -> Vec<(String, usize)> {
        let topics = self.topics.read().await;
        let mut stats = Vec::with_capacity(topics.len());
        for entry in topics.iter() {
            stats.push((entry.topic.clone(), entry.index.read().await.len()));
        }
        stats
    }

    pub async fn info(&self) -> Vec<CollectionInfo> {
        let topics = self.topics.read().await;
        let mut infos = Vec::with_capacity(topics.len());
        for entry in topics.iter() {
            let index = entry.index.read().await;
            infos.push(CollectionInfo {
                topic: entry.topic.clone(),
                collection_name: index.collection_name().to_string(),
                chunk_count: index.len(),
                created_at: index.created_at(),
                updated_at: index.updated_at(),
            });
        }
        infos
    }
}
