use crate::config::GenerationOptions;
use crate::embeddings::api_endpoint;
use crate::error::{BackendError, ConfigError};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

/// Single-shot text completion. No streaming, no conversation memory.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError>;
}

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

/// Completions from an Ollama instance (`POST /api/generate`).
pub struct OllamaGenerator {
    client: Client,
    endpoint: Url,
    model: String,
}

impl OllamaGenerator {
    pub fn new(base_url: &str, model: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            client: Client::new(),
            endpoint: api_endpoint(base_url, "api/generate")?,
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Runs one non-streaming generate call, optionally with base64 images
    /// for multimodal models.
    pub(crate) async fn generate(
        &self,
        prompt: &str,
        images: Vec<String>,
        options: &GenerationOptions,
    ) -> Result<String, String> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&OllamaGenerateRequest {
                model: &self.model,
                prompt,
                stream: false,
                images,
                options: OllamaOptions {
                    temperature: options.temperature,
                    num_predict: options.max_output_tokens,
                },
            })
            .send()
            .await
            .map_err(|error| error.to_string())?;

        if !response.status().is_success() {
            return Err(format!(
                "{} returned {}",
                self.endpoint,
                response.status()
            ));
        }

        let payload: OllamaGenerateResponse =
            response.json().await.map_err(|error| error.to_string())?;
        Ok(payload.response)
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        self.generate(prompt, Vec::new(), options)
            .await
            .map_err(BackendError::Generation)
    }
}
