use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2";

/// Everything the pipeline needs, built once by the host and passed in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ollama: OllamaConfig,
    pub embedding_backend: EmbeddingBackend,
    pub chunking: ChunkingConfig,
    pub extraction: ExtractionConfig,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationOptions,
    pub ocr: OcrConfig,
    pub vector_store: VectorStoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub generation_model: String,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OLLAMA_URL.to_string(),
            embedding_model: DEFAULT_MODEL.to_string(),
            generation_model: DEFAULT_MODEL.to_string(),
        }
    }
}

/// Where chunk and query embeddings come from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingBackend {
    /// `ollama.embedding_model` served by Ollama.
    #[default]
    Ollama,
    /// Hashed character trigrams computed in process. Needs no server.
    CharTrigram,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Chunks whose trimmed length is at or below this are dropped.
    pub min_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_500,
            chunk_overlap: 150,
            min_chunk_chars: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// A document needs more than this many text-layer characters to skip OCR.
    pub min_document_chars: usize,
    pub min_direct_page_chars: usize,
    pub min_ocr_page_chars: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_document_chars: 100,
            min_direct_page_chars: 10,
            min_ocr_page_chars: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub scoped_top_k: usize,
    pub per_collection_top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            scoped_top_k: 8,
            per_collection_top_k: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_output_tokens: 512,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OcrEngine {
    Disabled,
    Tesseract,
    VisionModel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub engine: OcrEngine,
    pub dpi: u32,
    pub languages: String,
    pub pdftoppm_path: Option<PathBuf>,
    pub tesseract_path: Option<PathBuf>,
    /// Multimodal model used by [`OcrEngine::VisionModel`].
    pub vision_model: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: OcrEngine::Tesseract,
            dpi: 200,
            languages: "spa+eng".to_string(),
            pdftoppm_path: None,
            tesseract_path: None,
            vision_model: "llava".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VectorStoreConfig {
    #[default]
    Memory,
    Qdrant {
        url: String,
    },
}

impl PipelineConfig {
    /// Defaults overridden by `RAG_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(url) = env_value("RAG_OLLAMA_URL") {
            config.ollama.base_url = url;
        }
        if let Some(model) = env_value("RAG_EMBEDDING_MODEL") {
            config.ollama.embedding_model = model;
        }
        if let Some(backend) = env_value("RAG_EMBEDDING_BACKEND") {
            config.embedding_backend = parse_embedding_backend(&backend)?;
        }
        if let Some(model) = env_value("RAG_GENERATION_MODEL") {
            config.ollama.generation_model = model;
        }
        if let Some(size) = env_parse("RAG_CHUNK_SIZE")? {
            config.chunking.chunk_size = size;
        }
        if let Some(overlap) = env_parse("RAG_CHUNK_OVERLAP")? {
            config.chunking.chunk_overlap = overlap;
        }
        if let Some(temperature) = env_parse("RAG_TEMPERATURE")? {
            config.generation.temperature = temperature;
        }
        if let Some(tokens) = env_parse("RAG_MAX_OUTPUT_TOKENS")? {
            config.generation.max_output_tokens = tokens;
        }
        if let Some(engine) = env_value("RAG_OCR_ENGINE") {
            config.ocr.engine = parse_ocr_engine(&engine)?;
        }
        if let Some(dpi) = env_parse("RAG_OCR_DPI")? {
            config.ocr.dpi = dpi;
        }
        if let Some(languages) = env_value("RAG_OCR_LANGUAGES") {
            config.ocr.languages = languages;
        }
        config.ocr.pdftoppm_path = env_value("RAG_PDFTOPPM_PATH").map(PathBuf::from);
        config.ocr.tesseract_path = env_value("RAG_TESSERACT_PATH").map(PathBuf::from);
        if let Some(model) = env_value("RAG_OCR_VISION_MODEL") {
            config.ocr.vision_model = model;
        }
        if let Some(url) = env_value("RAG_QDRANT_URL") {
            config.vector_store = VectorStoreConfig::Qdrant { url };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.ollama.base_url)?;
        if let VectorStoreConfig::Qdrant { url } = &self.vector_store {
            Url::parse(url)?;
        }
        if self.chunking.chunk_size == 0 || self.chunking.chunk_overlap >= self.chunking.chunk_size
        {
            return Err(ConfigError::InvalidValue {
                key: "chunking".to_string(),
                value: format!(
                    "size={} overlap={}",
                    self.chunking.chunk_size, self.chunking.chunk_overlap
                ),
            });
        }
        Ok(())
    }
}

pub fn parse_ocr_engine(value: &str) -> Result<OcrEngine, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "disabled" | "off" | "none" => Ok(OcrEngine::Disabled),
        "tesseract" => Ok(OcrEngine::Tesseract),
        "vision" | "vision_model" => Ok(OcrEngine::VisionModel),
        other => Err(ConfigError::InvalidValue {
            key: "ocr.engine".to_string(),
            value: other.to_string(),
        }),
    }
}

pub fn parse_embedding_backend(value: &str) -> Result<EmbeddingBackend, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "ollama" => Ok(EmbeddingBackend::Ollama),
        "trigram" | "char_trigram" | "local" => Ok(EmbeddingBackend::CharTrigram),
        other => Err(ConfigError::InvalidValue {
            key: "embedding_backend".to_string(),
            value: other.to_string(),
        }),
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|value| {
        let value = value.trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    env_value(key)
        .map(|value| {
            value.parse::<T>().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            })
        })
        .transpose()
}
