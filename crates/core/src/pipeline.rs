use crate::chunking::{split_pages, RecursiveSplitter};
use crate::config::{EmbeddingBackend, PipelineConfig, VectorStoreConfig};
use crate::embeddings::{CharacterNgramEmbedder, Embedder, OllamaEmbedder};
use crate::error::{BackendError, ConfigError, IngestError, SearchError};
use crate::extractor::TextExtractor;
use crate::generation::{Generator, OllamaGenerator};
use crate::models::{
    CollectionInfo, IngestReport, PipelineState, Retrieval, SkippedPdf, SourceDocument,
};
use crate::ocr::{resolve_ocr_backend, OcrBackend};
use crate::registry::CollectionRegistry;
use crate::retriever::Retriever;
use crate::stores::{MemoryStoreProvider, QdrantStoreProvider};
use crate::synthesizer::{topic_not_found_message, AnswerSynthesizer, NO_DOCUMENTS_MESSAGE};
use crate::traits::StoreProvider;
use std::sync::Arc;
use tracing::{info, warn};

/// Entry point for hosts: ingest PDFs under a topic, ask questions, manage
/// topics. Safe to share between tasks.
pub struct RagPipeline {
    config: PipelineConfig,
    extractor: TextExtractor,
    registry: Arc<CollectionRegistry>,
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
}

impl RagPipeline {
    /// Wires the Ollama backends, the configured vector store and whatever
    /// OCR capability the machine offers.
    pub fn from_config(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let embedder: Arc<dyn Embedder> = match config.embedding_backend {
            EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(
                &config.ollama.base_url,
                &config.ollama.embedding_model,
            )?),
            EmbeddingBackend::CharTrigram => Arc::new(CharacterNgramEmbedder::default()),
        };
        let generator = Arc::new(OllamaGenerator::new(
            &config.ollama.base_url,
            &config.ollama.generation_model,
        )?);
        let stores: Arc<dyn StoreProvider> = match &config.vector_store {
            VectorStoreConfig::Memory => Arc::new(MemoryStoreProvider),
            VectorStoreConfig::Qdrant { url } => Arc::new(QdrantStoreProvider::new(url)?),
        };
        let ocr = resolve_ocr_backend(&config)?;

        info!(
            ollama = %config.ollama.base_url,
            embedder = embedder.model_name(),
            generation_model = %config.ollama.generation_model,
            ocr = ocr.is_some(),
            "pipeline configured"
        );

        Ok(Self::with_backends(config, embedder, generator, ocr, stores))
    }

    pub fn with_backends(
        config: PipelineConfig,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        ocr: Option<Arc<dyn OcrBackend>>,
        stores: Arc<dyn StoreProvider>,
    ) -> Self {
        let registry = Arc::new(CollectionRegistry::new(embedder, stores));
        Self {
            extractor: TextExtractor::new(config.extraction, ocr),
            retriever: Retriever::new(registry.clone(), config.retrieval),
            synthesizer: AnswerSynthesizer::new(generator, config.generation),
            registry,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn state(&self) -> PipelineState {
        if self.registry.is_empty().await {
            PipelineState::Empty
        } else {
            PipelineState::Ready
        }
    }

    /// Extracts, chunks and stores `files` under `topic`.
    ///
    /// Files without usable text are reported in `skipped_files`. When no
    /// file yields a chunk the registry is left untouched and `success` is
    /// false.
    pub async fn ingest(
        &self,
        files: &[SourceDocument],
        topic: &str,
    ) -> Result<IngestReport, IngestError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(IngestError::InvalidArgument("topic is empty".to_string()));
        }
        if files.is_empty() {
            return Err(IngestError::InvalidArgument("no files to ingest".to_string()));
        }
        RecursiveSplitter::try_from(self.config.chunking)?;

        let mut chunks = Vec::new();
        let mut page_count = 0;
        let mut skipped_files = Vec::new();

        for file in files {
            let pages = match self.extractor.extract(&file.bytes, &file.filename).await {
                Ok(pages) => pages,
                Err(IngestError::PdfParse(reason)) => {
                    warn!(filename = %file.filename, %reason, "skipped pdf");
                    skipped_files.push(SkippedPdf {
                        filename: file.filename.clone(),
                        reason,
                    });
                    continue;
                }
                Err(error) => return Err(error),
            };

            if pages.is_empty() {
                warn!(filename = %file.filename, "no extractable text");
                skipped_files.push(SkippedPdf {
                    filename: file.filename.clone(),
                    reason: "no extractable text".to_string(),
                });
                continue;
            }

            let file_chunks = split_pages(&pages, &self.config.chunking)?;
            if file_chunks.is_empty() {
                warn!(filename = %file.filename, "text too short to chunk");
                skipped_files.push(SkippedPdf {
                    filename: file.filename.clone(),
                    reason: "text too short to chunk".to_string(),
                });
                continue;
            }

            page_count += pages.len();
            chunks.extend(file_chunks);
        }

        if chunks.is_empty() {
            warn!(topic, skipped = skipped_files.len(), "nothing to ingest");
            return Ok(IngestReport {
                success: false,
                topic: topic.to_string(),
                page_count,
                chunk_count: 0,
                skipped_files,
            });
        }

        let chunk_count = chunks.len();
        let total = self.registry.upsert(topic, chunks).await?;
        info!(
            topic,
            files = files.len(),
            page_count,
            chunk_count,
            total,
            skipped = skipped_files.len(),
            "ingest finished"
        );

        Ok(IngestReport {
            success: true,
            topic: topic.to_string(),
            page_count,
            chunk_count,
            skipped_files,
        })
    }

    /// Answers from one topic, or from every topic when `topic_scope` is
    /// `None` or blank. The scope is trimmed the same way ingest trims
    /// topics. "Nothing to answer from" is a message, not an error.
    pub async fn ask(&self, question: &str, topic_scope: Option<&str>) -> Result<String, SearchError> {
        if question.trim().is_empty() {
            return Err(SearchError::Request("question is empty".to_string()));
        }
        let topic_scope = topic_scope.map(str::trim).filter(|topic| !topic.is_empty());

        match self.retriever.search(question, topic_scope).await? {
            Retrieval::NoDocuments => Ok(NO_DOCUMENTS_MESSAGE.to_string()),
            Retrieval::TopicNotFound { topic, available } => {
                warn!(%topic, "topic not found");
                Ok(topic_not_found_message(&topic, &available))
            }
            Retrieval::Hits(hits) => self.synthesizer.synthesize(question, &hits).await,
        }
    }

    pub async fn list_topics(&self) -> Vec<String> {
        self.registry.list().await
    }

    pub async fn delete_topic(&self, topic: &str) -> Result<bool, BackendError> {
        self.registry.delete(topic.trim()).await
    }

    pub async fn delete_all(&self) -> Result<usize, BackendError> {
        self.registry.delete_all().await
    }

    pub async fn stats(&self) -> Vec<(String, usize)> {
        self.registry.stats().await
    }

    pub async fn collections(&self) -> Vec<CollectionInfo> {
        self.registry.info().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OcrEngine;
    use crate::test_support::{
        blank_pdf, text_pdf, CountingEmbedder, FakeOcr, RecordingGenerator,
    };

    struct Harness {
        embedder: Arc<CountingEmbedder>,
        generator: Arc<RecordingGenerator>,
        pipeline: RagPipeline,
    }

    fn harness() -> Harness {
        let embedder = Arc::new(CountingEmbedder::default());
        let generator = Arc::new(RecordingGenerator::new("Respuesta basada en el contexto."));
        let pipeline = RagPipeline::with_backends(
            PipelineConfig::default(),
            embedder.clone(),
            generator.clone(),
            None,
            Arc::new(MemoryStoreProvider),
        );
        Harness {
            embedder,
            generator,
            pipeline,
        }
    }

    /// Roughly `chars` characters of prose on a single page.
    fn prose_page(chars: usize) -> String {
        let line = "The hydraulic pump must be inspected before every shift.";
        let mut page = String::new();
        let mut line_no = 0;
        while page.chars().count() < chars {
            page.push_str(&format!("{line_no:03} {line}\n"));
            line_no += 1;
        }
        page
    }

    fn manual(name: &str, chars: usize) -> SourceDocument {
        SourceDocument::new(name, text_pdf(&[&prose_page(chars)]))
    }

    #[tokio::test]
    async fn five_thousand_chars_become_a_few_chunks() -> Result<(), IngestError> {
        let h = harness();

        let report = h.pipeline.ingest(&[manual("manual.pdf", 5000)], "general").await?;

        assert!(report.success);
        assert_eq!(report.page_count, 1);
        assert!((3..=5).contains(&report.chunk_count), "got {}", report.chunk_count);
        assert_eq!(h.pipeline.list_topics().await, vec!["general".to_string()]);
        assert_eq!(h.pipeline.state().await, PipelineState::Ready);
        Ok(())
    }

    #[tokio::test]
    async fn image_only_pdf_without_ocr_is_reported_not_stored() -> Result<(), IngestError> {
        let h = harness();

        let report = h
            .pipeline
            .ingest(&[SourceDocument::new("scan.pdf", blank_pdf(2))], "general")
            .await?;

        assert!(!report.success);
        assert_eq!(report.chunk_count, 0);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(report.skipped_files[0].filename, "scan.pdf");
        assert!(h.pipeline.list_topics().await.is_empty());
        assert_eq!(h.pipeline.state().await, PipelineState::Empty);
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_file_is_skipped_alongside_good_ones() -> Result<(), IngestError> {
        let h = harness();

        let report = h
            .pipeline
            .ingest(
                &[
                    SourceDocument::new("broken.pdf", b"not a pdf at all".to_vec()),
                    manual("manual.pdf", 2000),
                ],
                "general",
            )
            .await?;

        assert!(report.success);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(report.skipped_files[0].filename, "broken.pdf");
        Ok(())
    }

    #[tokio::test]
    async fn ingest_validates_before_touching_files() {
        let h = harness();

        assert!(matches!(
            h.pipeline.ingest(&[manual("a.pdf", 500)], "   ").await,
            Err(IngestError::InvalidArgument(_))
        ));
        assert!(matches!(
            h.pipeline.ingest(&[], "general").await,
            Err(IngestError::InvalidArgument(_))
        ));
        assert_eq!(h.embedder.calls(), 0);
    }

    #[tokio::test]
    async fn asking_before_ingest_returns_sentinel_without_backend_calls(
    ) -> Result<(), SearchError> {
        let h = harness();

        let answer = h.pipeline.ask("¿Qué dice el manual?", None).await?;

        assert_eq!(answer, NO_DOCUMENTS_MESSAGE);
        assert_eq!(h.embedder.calls(), 0);
        assert_eq!(h.generator.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn unscoped_question_uses_every_topic() -> Result<(), Box<dyn std::error::Error>> {
        let h = harness();
        h.pipeline.ingest(&[manual("a.pdf", 6000)], "a").await?;
        h.pipeline.ingest(&[manual("b.pdf", 6000)], "b").await?;
        let embeds_after_ingest = h.embedder.calls();

        let answer = h.pipeline.ask("How often is the pump inspected?", None).await?;

        assert_eq!(h.embedder.calls() - embeds_after_ingest, 1);
        assert_eq!(h.generator.calls(), 1);
        assert!(answer.starts_with("Respuesta basada en el contexto."));
        assert!(answer.contains("- a.pdf (Página 0)"));
        assert!(answer.contains("- b.pdf (Página 0)"));

        let prompt = &h.generator.prompts()[0];
        let context_blocks = prompt.matches("hydraulic pump").count();
        assert!(context_blocks > 0);
        Ok(())
    }

    #[tokio::test]
    async fn repeated_ingest_doubles_the_topic() -> Result<(), IngestError> {
        let h = harness();
        let first = h.pipeline.ingest(&[manual("manual.pdf", 3000)], "general").await?;
        h.pipeline.ingest(&[manual("manual.pdf", 3000)], "general").await?;

        assert_eq!(
            h.pipeline.stats().await,
            vec![("general".to_string(), first.chunk_count * 2)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_topic_gets_explicit_message() -> Result<(), Box<dyn std::error::Error>> {
        let h = harness();
        h.pipeline.ingest(&[manual("manual.pdf", 1000)], "general").await?;

        let answer = h.pipeline.ask("¿Presión?", Some("contratos")).await?;

        assert_eq!(answer, topic_not_found_message("contratos", &["general".to_string()]));
        assert_eq!(h.generator.calls(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn citations_for_one_page_collapse() -> Result<(), Box<dyn std::error::Error>> {
        let h = harness();
        h.pipeline.ingest(&[manual("manual.pdf", 4000)], "general").await?;

        let answer = h.pipeline.ask("pump inspection", Some("general")).await?;

        assert_eq!(answer.matches("- manual.pdf (Página 0)").count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn deleting_topics_returns_to_empty() -> Result<(), Box<dyn std::error::Error>> {
        let h = harness();
        h.pipeline.ingest(&[manual("a.pdf", 1000)], "a").await?;
        h.pipeline.ingest(&[manual("b.pdf", 1000)], "b").await?;

        assert!(h.pipeline.delete_topic("a").await?);
        assert!(!h.pipeline.delete_topic("a").await?);
        assert_eq!(h.pipeline.list_topics().await, vec!["b".to_string()]);

        assert_eq!(h.pipeline.delete_all().await?, 1);
        assert_eq!(h.pipeline.state().await, PipelineState::Empty);
        Ok(())
    }

    #[tokio::test]
    async fn blank_question_is_a_request_error() {
        let h = harness();
        assert!(matches!(
            h.pipeline.ask("  ", None).await,
            Err(SearchError::Request(_))
        ));
    }

    #[tokio::test]
    async fn unrenderable_file_is_skipped_when_ocr_fails() -> Result<(), IngestError> {
        let pipeline = RagPipeline::with_backends(
            PipelineConfig::default(),
            Arc::new(CountingEmbedder::default()),
            Arc::new(RecordingGenerator::new("unused")),
            Some(Arc::new(FakeOcr::failing())),
            Arc::new(MemoryStoreProvider),
        );

        let report = pipeline
            .ingest(
                &[
                    SourceDocument::new("broken.pdf", b"not a pdf at all".to_vec()),
                    manual("manual.pdf", 2000),
                ],
                "general",
            )
            .await?;

        assert!(report.success);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(report.skipped_files[0].filename, "broken.pdf");
        assert_eq!(pipeline.list_topics().await, vec!["general".to_string()]);
        Ok(())
    }

    #[tokio::test]
    async fn trigram_backend_ingests_without_a_server() -> Result<(), Box<dyn std::error::Error>> {
        let mut config = PipelineConfig::default();
        config.embedding_backend = EmbeddingBackend::CharTrigram;
        config.ocr.engine = OcrEngine::Disabled;
        let pipeline = RagPipeline::from_config(config)?;

        let report = pipeline.ingest(&[manual("manual.pdf", 3000)], "general").await?;

        assert!(report.success);
        assert_eq!(
            pipeline.stats().await,
            vec![("general".to_string(), report.chunk_count)]
        );
        Ok(())
    }

    #[tokio::test]
    async fn topic_scope_is_trimmed_like_ingest() -> Result<(), Box<dyn std::error::Error>> {
        let h = harness();
        h.pipeline.ingest(&[manual("manual.pdf", 1000)], " general ").await?;

        let answer = h.pipeline.ask("pump inspection", Some("  general\t")).await?;
        assert!(answer.starts_with("Respuesta basada en el contexto."));

        h.pipeline.ask("pump inspection", Some("   ")).await?;
        assert_eq!(h.generator.calls(), 2);

        assert!(h.pipeline.delete_topic(" general ").await?);
        Ok(())
    }
}
