use thiserror::Error;

/// Failure of an external collaborator. The core never retries these.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("embedding backend failed: {0}")]
    Embedding(String),

    #[error("generation backend failed: {0}")]
    Generation(String),

    #[error("ocr backend failed: {0}")]
    Ocr(String),

    #[error("invalid response from {backend}: {details}")]
    VectorStore { backend: String, details: String },
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no chunks to ingest into topic {0:?}")]
    EmptyIngest(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("search request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
