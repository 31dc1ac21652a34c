use crate::error::{BackendError, ConfigError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Texts sent to Ollama per `/api/embed` request.
const EMBED_BATCH_SIZE: usize = 32;

/// Turns text into vectors. One vector per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::Embedding("empty embedding response".to_string()))
    }
}

/// Hashed character-trigram embedder. Deterministic and offline, so it
/// serves as the local fallback and as the test embedder.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_name(&self) -> &str {
        "char-trigram"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    #[serde(default)]
    embeddings: Vec<Vec<f32>>,
}

/// Embeddings served by an Ollama instance (`POST /api/embed`).
pub struct OllamaEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            client: Client::new(),
            endpoint: api_endpoint(base_url, "api/embed")?,
            model: model.into(),
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&OllamaEmbedRequest {
                model: &self.model,
                input: batch,
            })
            .send()
            .await
            .map_err(|error| BackendError::Embedding(error.to_string()))?;

        if !response.status().is_success() {
            return Err(BackendError::Embedding(format!(
                "{} returned {}",
                self.endpoint,
                response.status()
            )));
        }

        let payload: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|error| BackendError::Embedding(error.to_string()))?;

        if payload.embeddings.len() != batch.len() {
            return Err(BackendError::Embedding(format!(
                "embedding count {} doesn't match input count {}",
                payload.embeddings.len(),
                batch.len()
            )));
        }

        Ok(payload.embeddings)
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(EMBED_BATCH_SIZE) {
            vectors.extend(self.embed_batch(batch).await?);
        }
        Ok(vectors)
    }
}

/// Joins `path` onto a service base URL, keeping any path prefix the base has.
pub(crate) fn api_endpoint(base_url: &str, path: &str) -> Result<Url, ConfigError> {
    let mut base = Url::parse(base_url)?;
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    Ok(base.join(path)?)
}

#[cfg(test)]
mod tests {
    use super::{api_endpoint, CharacterNgramEmbedder, Embedder};

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed_text("Hydraulic pressure and flow");
        let second = embedder.embed_text("Hydraulic pressure and flow");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed_text("abc");
        assert_eq!(vector.len(), 32);
    }

    #[tokio::test]
    async fn batch_embedding_keeps_input_order() -> Result<(), Box<dyn std::error::Error>> {
        let embedder = CharacterNgramEmbedder::default();
        let texts = vec!["pump seals".to_string(), "valve timing".to_string()];

        let vectors = embedder.embed(&texts).await?;
        let query = embedder.embed_query("valve timing").await?;

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[1], query);
        Ok(())
    }

    #[test]
    fn endpoints_respect_base_path() -> Result<(), Box<dyn std::error::Error>> {
        assert_eq!(
            api_endpoint("http://localhost:11434", "api/embed")?.as_str(),
            "http://localhost:11434/api/embed"
        );
        assert_eq!(
            api_endpoint("http://gateway/ollama", "api/generate")?.as_str(),
            "http://gateway/ollama/api/generate"
        );
        Ok(())
    }
}
