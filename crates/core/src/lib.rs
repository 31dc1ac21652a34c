pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod registry;
pub mod retriever;
pub mod stores;
pub mod synthesizer;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_support;

pub use chunking::{split_pages, RecursiveSplitter};
pub use config::{
    ChunkingConfig, EmbeddingBackend, ExtractionConfig, GenerationOptions, OcrConfig, OcrEngine, OllamaConfig,
    PipelineConfig, RetrievalConfig, VectorStoreConfig,
};
pub use embeddings::{CharacterNgramEmbedder, Embedder, OllamaEmbedder};
pub use error::{BackendError, ConfigError, IngestError, SearchError};
pub use extractor::{PageText, PdfExtractor, TextExtractor};
pub use generation::{Generator, OllamaGenerator};
pub use index::EmbeddingIndex;
pub use ingest::{discover_pdf_files, load_documents};
pub use models::{
    Chunk, CollectionInfo, ConversationTurn, ExtractionMethod, IngestReport, PageRecord,
    PipelineState, Retrieval, Role, ScoredChunk, SkippedPdf, SourceDocument,
};
pub use ocr::{resolve_ocr_backend, CommandLineOcr, OcrBackend, PageImage, VisionModelOcr};
pub use pipeline::RagPipeline;
pub use registry::{normalize_collection_name, CollectionRegistry};
pub use retriever::Retriever;
pub use stores::{InMemoryVectorStore, MemoryStoreProvider, QdrantStore, QdrantStoreProvider};
pub use synthesizer::{AnswerSynthesizer, NO_DOCUMENTS_MESSAGE};
pub use traits::{StoreProvider, VectorEntry, VectorStore};
