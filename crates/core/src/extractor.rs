use crate::config::ExtractionConfig;
use crate::error::IngestError;
use crate::models::{ExtractionMethod, PageRecord};
use crate::ocr::OcrBackend;
use lopdf::Document;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Raw text of one page, numbered from 1 as in the PDF page tree.
#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

pub trait PdfExtractor: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError>;
}

/// Reads the PDF text layer. Pages whose text cannot be decoded come back empty.
#[derive(Default)]
pub struct LopdfExtractor;

impl PdfExtractor for LopdfExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<PageText>, IngestError> {
        let document =
            Document::load_mem(bytes).map_err(|error| IngestError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = match document.extract_text(&[page_no]) {
                Ok(text) => text,
                Err(error) => {
                    debug!(page = page_no, %error, "page text layer unreadable");
                    String::new()
                }
            };
            pages.push(PageText {
                number: page_no,
                text,
            });
        }

        Ok(pages)
    }
}

/// Turns a PDF into page records, falling back to OCR when the text layer
/// is too thin to be useful.
pub struct TextExtractor {
    text_layer: Box<dyn PdfExtractor>,
    ocr: Option<Arc<dyn OcrBackend>>,
    config: ExtractionConfig,
}

impl TextExtractor {
    pub fn new(config: ExtractionConfig, ocr: Option<Arc<dyn OcrBackend>>) -> Self {
        Self {
            text_layer: Box::new(LopdfExtractor),
            ocr,
            config,
        }
    }

    /// An empty result means the document has no extractable text. Errors
    /// are reserved for unreadable files and OCR backend faults. A file that
    /// fails to parse and also fails to rasterize is reported as unreadable.
    pub async fn extract(
        &self,
        bytes: &[u8],
        filename: &str,
    ) -> Result<Vec<PageRecord>, IngestError> {
        let cleaner = PageCleaner::new()?;

        let (direct, parse_error) = match self.text_layer.extract_pages(bytes) {
            Ok(pages) => (Some(pages), None),
            Err(IngestError::PdfParse(error)) if self.ocr.is_some() => {
                warn!(filename, %error, "text layer unreadable, trying OCR");
                (None, Some(error))
            }
            Err(error) => return Err(error),
        };

        if let Some(pages) = direct {
            let total_chars: usize = pages
                .iter()
                .map(|page| page.text.trim().chars().count())
                .sum();

            if total_chars > self.config.min_document_chars {
                let records = pages
                    .into_iter()
                    .filter_map(|page| {
                        let text = cleaner.clean(&page.text);
                        (text.chars().count() > self.config.min_direct_page_chars).then(|| {
                            PageRecord {
                                text,
                                source_filename: filename.to_string(),
                                page_index: page.number.saturating_sub(1),
                                extraction_method: ExtractionMethod::Direct,
                            }
                        })
                    })
                    .collect::<Vec<_>>();

                info!(filename, total_chars, pages = records.len(), "text layer extracted");
                return Ok(records);
            }

            info!(filename, total_chars, "text layer too thin");
        }

        match &self.ocr {
            Some(ocr) => {
                self.extract_with_ocr(ocr.as_ref(), &cleaner, bytes, filename, parse_error)
                    .await
            }
            None => {
                warn!(filename, "no extractable text and no OCR backend configured");
                Ok(Vec::new())
            }
        }
    }

    async fn extract_with_ocr(
        &self,
        ocr: &dyn OcrBackend,
        cleaner: &PageCleaner,
        bytes: &[u8],
        filename: &str,
        parse_error: Option<String>,
    ) -> Result<Vec<PageRecord>, IngestError> {
        // A file neither lopdf nor the rasterizer can open is unreadable,
        // not a backend fault.
        let images = match (ocr.rasterize(bytes).await, parse_error) {
            (Ok(images), _) => images,
            (Err(error), Some(parse_error)) => {
                return Err(IngestError::PdfParse(format!(
                    "{parse_error}; OCR could not render it either: {error}"
                )))
            }
            (Err(error), None) => return Err(error.into()),
        };
        let mut records = Vec::new();

        for image in &images {
            let text = cleaner.clean(&ocr.recognize(image).await?);
            let chars = text.chars().count();
            if chars > self.config.min_ocr_page_chars {
                debug!(filename, page = image.page_index, chars, "page recognized");
                records.push(PageRecord {
                    text,
                    source_filename: filename.to_string(),
                    page_index: image.page_index,
                    extraction_method: ExtractionMethod::Ocr,
                });
            }
        }

        info!(
            filename,
            backend = ocr.name(),
            rendered = images.len(),
            pages = records.len(),
            "OCR extraction finished"
        );
        Ok(records)
    }
}

/// Whitespace cleanup shared by both extraction paths. Paragraph breaks
/// survive so the chunker can still split on them.
struct PageCleaner {
    blanks: Regex,
    trailing: Regex,
    gaps: Regex,
}

impl PageCleaner {
    fn new() -> Result<Self, IngestError> {
        Ok(Self {
            blanks: Regex::new(r"[ \t\u{a0}\u{0c}]+")?,
            trailing: Regex::new(r"(?m) +$|^ +")?,
            gaps: Regex::new(r"\n{3,}")?,
        })
    }

    fn clean(&self, text: &str) -> String {
        let unified = text.replace("\r\n", "\n").replace('\r', "\n");
        let collapsed = self.blanks.replace_all(&unified, " ");
        let trimmed = self.trailing.replace_all(&collapsed, "");
        self.gaps.replace_all(&trimmed, "\n\n").trim().to_string()
    }
}
