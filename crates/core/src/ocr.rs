//! Optional OCR fallback for PDFs without a usable text layer.
//!
//! Pages are rasterized with poppler's `pdftoppm` and recognized either by
//! the `tesseract` CLI or by a multimodal model served by Ollama. Which
//! backend exists is decided once, from [`OcrConfig`], when the pipeline is
//! built. Scratch files live in temporary directories that are removed when
//! the call returns, whatever the outcome.

use crate::config::{GenerationOptions, OcrConfig, OcrEngine, PipelineConfig};
use crate::error::{BackendError, ConfigError};
use crate::generation::OllamaGenerator;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{info, warn};

const VISION_PROMPT: &str = "Transcribe all of the text in this page image exactly as written. \
Keep the original language and line breaks. Reply with the text only.";

/// One rasterized page, PNG encoded.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub page_index: u32,
    pub png: Vec<u8>,
}

#[async_trait]
pub trait OcrBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn rasterize(&self, pdf: &[u8]) -> Result<Vec<PageImage>, BackendError>;

    async fn recognize(&self, image: &PageImage) -> Result<String, BackendError>;
}

/// `pdftoppm` + `tesseract`.
#[derive(Debug, Clone)]
pub struct CommandLineOcr {
    pdftoppm: PathBuf,
    tesseract: PathBuf,
    dpi: u32,
    languages: String,
}

impl CommandLineOcr {
    pub fn new(
        pdftoppm: impl Into<PathBuf>,
        tesseract: impl Into<PathBuf>,
        dpi: u32,
        languages: impl Into<String>,
    ) -> Self {
        Self {
            pdftoppm: pdftoppm.into(),
            tesseract: tesseract.into(),
            dpi,
            languages: languages.into(),
        }
    }

    pub fn detect(config: &OcrConfig) -> Option<Self> {
        let pdftoppm = find_executable(config.pdftoppm_path.as_deref(), "pdftoppm")?;
        let tesseract = find_executable(config.tesseract_path.as_deref(), "tesseract")?;
        Some(Self::new(pdftoppm, tesseract, config.dpi, config.languages.clone()))
    }
}

#[async_trait]
impl OcrBackend for CommandLineOcr {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn rasterize(&self, pdf: &[u8]) -> Result<Vec<PageImage>, BackendError> {
        rasterize_with_pdftoppm(&self.pdftoppm, self.dpi, pdf).await
    }

    async fn recognize(&self, image: &PageImage) -> Result<String, BackendError> {
        let scratch = tempfile::Builder::new()
            .prefix("ocr-page-")
            .suffix(".png")
            .tempfile()
            .map_err(ocr_io)?;
        tokio::fs::write(scratch.path(), &image.png)
            .await
            .map_err(ocr_io)?;

        let output = Command::new(&self.tesseract)
            .arg(scratch.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.languages)
            .output()
            .await
            .map_err(ocr_io)?;

        if !output.status.success() {
            return Err(BackendError::Ocr(format!(
                "tesseract exited with {} on page {}: {}",
                output.status,
                image.page_index,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// `pdftoppm` + a multimodal model asked to transcribe each page image.
pub struct VisionModelOcr {
    pdftoppm: PathBuf,
    dpi: u32,
    model: OllamaGenerator,
}

impl VisionModelOcr {
    pub fn new(pdftoppm: impl Into<PathBuf>, dpi: u32, model: OllamaGenerator) -> Self {
        Self {
            pdftoppm: pdftoppm.into(),
            dpi,
            model,
        }
    }
}

#[async_trait]
impl OcrBackend for VisionModelOcr {
    fn name(&self) -> &str {
        "vision-model"
    }

    async fn rasterize(&self, pdf: &[u8]) -> Result<Vec<PageImage>, BackendError> {
        rasterize_with_pdftoppm(&self.pdftoppm, self.dpi, pdf).await
    }

    async fn recognize(&self, image: &PageImage) -> Result<String, BackendError> {
        let options = GenerationOptions {
            temperature: 0.0,
            max_output_tokens: 2_048,
        };
        self.model
            .generate(VISION_PROMPT, vec![STANDARD.encode(&image.png)], &options)
            .await
            .map_err(|error| {
                BackendError::Ocr(format!(
                    "{} failed on page {}: {error}",
                    self.model.model(),
                    image.page_index
                ))
            })
    }
}

/// Resolves the OCR capability once. A missing tool disables OCR instead of
/// failing startup.
pub fn resolve_ocr_backend(
    config: &PipelineConfig,
) -> Result<Option<Arc<dyn OcrBackend>>, ConfigError> {
    let ocr = &config.ocr;
    let backend: Option<Arc<dyn OcrBackend>> = match ocr.engine {
        OcrEngine::Disabled => None,
        OcrEngine::Tesseract => match CommandLineOcr::detect(ocr) {
            Some(backend) => Some(Arc::new(backend)),
            None => {
                warn!("pdftoppm or tesseract not found, OCR fallback disabled");
                None
            }
        },
        OcrEngine::VisionModel => {
            match find_executable(ocr.pdftoppm_path.as_deref(), "pdftoppm") {
                Some(pdftoppm) => {
                    let model = OllamaGenerator::new(&config.ollama.base_url, &ocr.vision_model)?;
                    Some(Arc::new(VisionModelOcr::new(pdftoppm, ocr.dpi, model)))
                }
                None => {
                    warn!("pdftoppm not found, OCR fallback disabled");
                    None
                }
            }
        }
    };

    if let Some(backend) = &backend {
        info!(backend = backend.name(), "OCR fallback available");
    }
    Ok(backend)
}

/// Returns the explicit path when it exists, otherwise searches `PATH`.
pub fn find_executable(explicit: Option<&Path>, name: &str) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.is_file().then(|| path.to_path_buf());
    }

    let candidates = if cfg!(windows) {
        vec![format!("{name}.exe"), name.to_string()]
    } else {
        vec![name.to_string()]
    };

    let search_path = std::env::var_os("PATH")?;
    std::env::split_paths(&search_path).find_map(|directory| {
        candidates
            .iter()
            .map(|candidate| directory.join(candidate))
            .find(|path| path.is_file())
    })
}

async fn rasterize_with_pdftoppm(
    pdftoppm: &Path,
    dpi: u32,
    pdf: &[u8],
) -> Result<Vec<PageImage>, BackendError> {
    let scratch = tempfile::Builder::new()
        .prefix("ocr-raster-")
        .tempdir()
        .map_err(ocr_io)?;
    let input = scratch.path().join("input.pdf");
    tokio::fs::write(&input, pdf).await.map_err(ocr_io)?;

    let output = Command::new(pdftoppm)
        .arg("-r")
        .arg(dpi.to_string())
        .arg("-png")
        .arg(&input)
        .arg(scratch.path().join("page"))
        .output()
        .await
        .map_err(ocr_io)?;

    if !output.status.success() {
        return Err(BackendError::Ocr(format!(
            "pdftoppm exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let mut rendered = Vec::new();
    let mut entries = tokio::fs::read_dir(scratch.path()).await.map_err(ocr_io)?;
    while let Some(entry) = entries.next_entry().await.map_err(ocr_io)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(number) = rendered_page_number(&name) {
            rendered.push((number, entry.path()));
        }
    }
    rendered.sort_by_key(|(number, _)| *number);

    let mut images = Vec::with_capacity(rendered.len());
    for (position, (_, path)) in rendered.into_iter().enumerate() {
        images.push(PageImage {
            page_index: position as u32,
            png: tokio::fs::read(&path).await.map_err(ocr_io)?,
        });
    }

    Ok(images)
}

/// `page-7.png` and `page-007.png` both give 7.
fn rendered_page_number(file_name: &str) -> Option<u32> {
    file_name
        .strip_prefix("page-")?
        .strip_suffix(".png")?
        .parse()
        .ok()
}

fn ocr_io(error: std::io::Error) -> BackendError {
    BackendError::Ocr(error.to_string())
}
