use crate::config::GenerationOptions;
use crate::embeddings::{CharacterNgramEmbedder, Embedder};
use crate::error::BackendError;
use crate::generation::Generator;
use crate::models::{Chunk, ExtractionMethod};
use crate::ocr::{OcrBackend, PageImage};
use crate::stores::InMemoryVectorStore;
use crate::traits::{StoreProvider, VectorEntry, VectorStore};
use async_trait::async_trait;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn chunk(filename: &str, page_index: u32, text: &str) -> Chunk {
    Chunk {
        chunk_id: format!("{filename}-{page_index}-{}", text.len()),
        text: text.to_string(),
        source_filename: filename.to_string(),
        page_index,
        chunk_index: 0,
        extraction_method: ExtractionMethod::Direct,
    }
}

/// A PDF with one page per entry. Each line of a page becomes its own
/// text object so the extracted text keeps the line breaks.
pub fn text_pdf(pages: &[&str]) -> Vec<u8> {
    build_pdf(pages.iter().map(|page| page.lines().collect()).collect())
}

/// A PDF whose pages carry no text layer, like a scan.
pub fn blank_pdf(page_count: usize) -> Vec<u8> {
    build_pdf(vec![Vec::new(); page_count])
}

fn build_pdf(pages: Vec<Vec<&str>>) -> Vec<u8> {
    let mut document = Document::with_version("1.5");
    let pages_id = document.new_object_id();
    let font_id = document.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
        "Encoding" => "WinAnsiEncoding",
    });
    let resources_id = document.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for lines in &pages {
        let mut operations = Vec::new();
        for (line_no, line) in lines.iter().enumerate() {
            let baseline = 760 - 14 * line_no as i64;
            operations.push(Operation::new("BT", vec![]));
            operations.push(Operation::new("Tf", vec!["F1".into(), 10.into()]));
            operations.push(Operation::new("Td", vec![40.into(), baseline.into()]));
            operations.push(Operation::new("Tj", vec![Object::string_literal(*line)]));
            operations.push(Operation::new("ET", vec![]));
        }
        let content = Content { operations };
        let content_id = document.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("content stream encodes"),
        ));
        let page_id = document.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let page_count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        }),
    );
    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    document.save_to(&mut bytes).expect("pdf serializes");
    bytes
}

/// Renders one image per scripted page and "recognizes" the scripted text.
pub struct FakeOcr {
    pages: Vec<String>,
    fail: bool,
    recognized: AtomicUsize,
}

impl FakeOcr {
    pub fn new(pages: Vec<String>) -> Self {
        Self {
            pages,
            fail: false,
            recognized: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            pages: Vec::new(),
            fail: true,
            recognized: AtomicUsize::new(0),
        }
    }

    pub fn recognized_pages(&self) -> usize {
        self.recognized.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrBackend for FakeOcr {
    fn name(&self) -> &str {
        "fake"
    }

    async fn rasterize(&self, _pdf: &[u8]) -> Result<Vec<PageImage>, BackendError> {
        if self.fail {
            return Err(BackendError::Ocr("rasterizer crashed".to_string()));
        }
        Ok((0..self.pages.len() as u32)
            .map(|page_index| PageImage {
                page_index,
                png: Vec::new(),
            })
            .collect())
    }

    async fn recognize(&self, image: &PageImage) -> Result<String, BackendError> {
        self.recognized.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .pages
            .get(image.page_index as usize)
            .cloned()
            .unwrap_or_default())
    }
}

/// Trigram embeddings with a call counter.
#[derive(Default)]
pub struct CountingEmbedder {
    inner: CharacterNgramEmbedder,
    calls: AtomicUsize,
}

impl CountingEmbedder {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_name(&self) -> &str {
        "counting"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.embed(texts).await
    }
}

/// Trigram embeddings that take `delay` per call, counting finished calls.
pub struct SlowEmbedder {
    inner: CharacterNgramEmbedder,
    delay: Duration,
    finished: AtomicUsize,
}

impl SlowEmbedder {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: CharacterNgramEmbedder::default(),
            delay,
            finished: AtomicUsize::new(0),
        }
    }

    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Embedder for SlowEmbedder {
    fn model_name(&self) -> &str {
        "slow"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        tokio::time::sleep(self.delay).await;
        let vectors = self.inner.embed(texts).await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        vectors
    }
}

pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    fn model_name(&self) -> &str {
        "failing"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
        Err(BackendError::Embedding("connection refused".to_string()))
    }
}

/// Answers every prompt with the same text and keeps the prompts.
pub struct RecordingGenerator {
    answer: String,
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    pub fn new(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompt log poisoned").clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts().len()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn complete(
        &self,
        prompt: &str,
        _options: &GenerationOptions,
    ) -> Result<String, BackendError> {
        self.prompts
            .lock()
            .expect("prompt log poisoned")
            .push(prompt.to_string());
        Ok(self.answer.clone())
    }
}

/// Memory stores whose `clear` always fails, like an unreachable server.
pub struct UnclearableStoreProvider;

impl StoreProvider for UnclearableStoreProvider {
    fn open(&self, _collection_name: &str) -> Box<dyn VectorStore> {
        Box::new(UnclearableStore(InMemoryVectorStore::new()))
    }
}

struct UnclearableStore(InMemoryVectorStore);

#[async_trait]
impl VectorStore for UnclearableStore {
    fn backend(&self) -> &str {
        "unclearable"
    }

    fn len(&self) -> usize {
        self.0.len()
    }

    async fn insert(&mut self, entries: Vec<VectorEntry>) -> Result<(), BackendError> {
        self.0.insert(entries).await
    }

    async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<(Chunk, f32)>, BackendError> {
        self.0.search(query, limit).await
    }

    async fn clear(&mut self) -> Result<(), BackendError> {
        Err(BackendError::VectorStore {
            backend: "unclearable".to_string(),
            details: "delete collection timed out".to_string(),
        })
    }
}
