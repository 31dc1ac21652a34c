use crate::error::{BackendError, ConfigError};
use crate::models::Chunk;
use crate::traits::{StoreProvider, VectorEntry, VectorStore};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use url::Url;
use uuid::Uuid;

/// One Qdrant collection per topic. The collection is (re)created on the
/// first insert, sized to the first vector.
pub struct QdrantStore {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: Option<usize>,
    count: usize,
}

impl QdrantStore {
    pub fn new(client: Client, endpoint: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client,
            vector_size: None,
            count: 0,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    async fn ensure_collection(&mut self, vector_size: usize) -> Result<(), BackendError> {
        match self.vector_size {
            Some(size) if size == vector_size => return Ok(()),
            Some(size) => {
                return Err(self.invalid(format!(
                    "embedding dimension {vector_size} != {size}"
                )))
            }
            None => {}
        }

        self.drop_collection().await?;

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": vector_size, "distance": "Cosine" }
            }))
            .send()
            .await
            .map_err(|error| self.invalid(error.to_string()))?;

        if !response.status().is_success() {
            return Err(self.invalid(format!(
                "collection setup failed with {}",
                response.status()
            )));
        }

        self.vector_size = Some(vector_size);
        Ok(())
    }

    async fn drop_collection(&self) -> Result<(), BackendError> {
        let response = self
            .client
            .delete(self.collection_url())
            .send()
            .await
            .map_err(|error| self.invalid(error.to_string()))?;

        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(self.invalid(format!(
                "collection delete failed with {}",
                response.status()
            )))
        }
    }

    fn invalid(&self, details: String) -> BackendError {
        BackendError::VectorStore {
            backend: format!("qdrant/{}", self.collection),
            details,
        }
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    fn backend(&self) -> &str {
        "qdrant"
    }

    fn len(&self) -> usize {
        self.count
    }

    async fn insert(&mut self, entries: Vec<VectorEntry>) -> Result<(), BackendError> {
        let Some(first) = entries.first() else {
            return Ok(());
        };
        self.ensure_collection(first.vector.len()).await?;

        let points = entries
            .iter()
            .map(|entry| {
                if Some(entry.vector.len()) != self.vector_size {
                    return Err(self.invalid(format!(
                        "embedding dimension {} != {:?}",
                        entry.vector.len(),
                        self.vector_size
                    )));
                }
                let payload = serde_json::to_value(&entry.chunk)
                    .map_err(|error| self.invalid(error.to_string()))?;

                Ok(json!({
                    "id": Uuid::new_v4().to_string(),
                    "vector": entry.vector,
                    "payload": payload,
                }))
            })
            .collect::<Result<Vec<_>, BackendError>>()?;

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await
            .map_err(|error| self.invalid(error.to_string()))?;

        if !response.status().is_success() {
            return Err(self.invalid(response.status().to_string()));
        }

        self.count += points.len();
        Ok(())
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(Chunk, f32)>, BackendError> {
        if self.count == 0 || limit == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": query,
                "limit": limit,
                "with_payload": true,
            }))
            .send()
            .await
            .map_err(|error| self.invalid(error.to_string()))?;

        if !response.status().is_success() {
            return Err(self.invalid(response.status().to_string()));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|error| self.invalid(error.to_string()))?;
        parse_search_hits(&parsed).map_err(|details| self.invalid(details))
    }

    async fn clear(&mut self) -> Result<(), BackendError> {
        self.drop_collection().await?;
        self.vector_size = None;
        self.count = 0;
        Ok(())
    }
}

fn parse_search_hits(parsed: &Value) -> Result<Vec<(Chunk, f32)>, String> {
    let hits = parsed
        .pointer("/result")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    hits.into_iter()
        .map(|hit| {
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32;
            let payload = hit
                .get("payload")
                .cloned()
                .ok_or_else(|| "search hit without payload".to_string())?;
            let chunk: Chunk =
                serde_json::from_value(payload).map_err(|error| error.to_string())?;
            Ok((chunk, score))
        })
        .collect()
}

/// Hands out [`QdrantStore`]s sharing one HTTP client.
#[derive(Clone)]
pub struct QdrantStoreProvider {
    endpoint: String,
    client: Client,
}

impl QdrantStoreProvider {
    pub fn new(endpoint: &str) -> Result<Self, ConfigError> {
        Url::parse(endpoint)?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: Client::new(),
        })
    }
}

impl StoreProvider for QdrantStoreProvider {
    fn open(&self, collection_name: &str) -> Box<dyn VectorStore> {
        Box::new(QdrantStore::new(
            self.client.clone(),
            self.endpoint.clone(),
            collection_name,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionMethod;

    #[test]
    fn search_hits_are_decoded_from_payload() -> Result<(), String> {
        let chunk = Chunk {
            chunk_id: "c-1".to_string(),
            text: "Hydraulic pump maintenance schedule".to_string(),
            source_filename: "manual.pdf".to_string(),
            page_index: 4,
            chunk_index: 2,
            extraction_method: ExtractionMethod::Ocr,
        };
        let response = json!({
            "result": [
                { "id": "5b1d", "score": 0.83, "payload": serde_json::to_value(&chunk).map_err(|e| e.to_string())? }
            ]
        });

        let hits = parse_search_hits(&response)?;

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, chunk);
        assert!((hits[0].1 - 0.83).abs() < 1e-6);
        Ok(())
    }

    #[test]
    fn hit_without_payload_is_an_error() {
        let response = json!({ "result": [ { "id": 1, "score": 0.5 } ] });
        assert!(parse_search_hits(&response).is_err());
    }

    #[test]
    fn missing_result_means_no_hits() -> Result<(), String> {
        assert!(parse_search_hits(&json!({ "status": "ok" }))?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn empty_store_searches_without_network() -> Result<(), Box<dyn std::error::Error>> {
        let provider = QdrantStoreProvider::new("http://127.0.0.1:9")?;
        let store = provider.open("general");
        assert_eq!(store.backend(), "qdrant");
        assert!(store.search(&[0.1, 0.2], 4).await?.is_empty());
        Ok(())
    }

    #[test]
    fn provider_rejects_bad_endpoint() {
        assert!(QdrantStoreProvider::new("not a url").is_err());
    }
}
