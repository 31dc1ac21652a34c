use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A PDF handed over by the host, before ingestion.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ExtractionMethod {
    Direct,
    Ocr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub text: String,
    pub source_filename: String,
    /// Zero-based position of the page (or OCR'd image) in its document.
    pub page_index: u32,
    pub extraction_method: ExtractionMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub text: String,
    pub source_filename: String,
    pub page_index: u32,
    pub chunk_index: u64,
    pub extraction_method: ExtractionMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub topic: String,
}

/// Outcome of a retrieval request. Only backend faults are errors.
#[derive(Debug, Clone)]
pub enum Retrieval {
    Hits(Vec<ScoredChunk>),
    NoDocuments,
    TopicNotFound { topic: String, available: Vec<String> },
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedPdf {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub success: bool,
    pub topic: String,
    pub page_count: usize,
    pub chunk_count: usize,
    pub skipped_files: Vec<SkippedPdf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub topic: String,
    pub collection_name: String,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Empty,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Chat history entry kept by hosts. The pipeline itself only sees the
/// current question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}
