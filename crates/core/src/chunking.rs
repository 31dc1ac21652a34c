use crate::config::ChunkingConfig;
use crate::error::IngestError;
use crate::models::{Chunk, PageRecord};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;

/// Boundaries tried in order: paragraph, line, sentence, word, character.
pub const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Character-window splitter that prefers natural text boundaries.
///
/// Text is cut at the first separator present, pieces that are still too
/// large are split again with the next separator, and small pieces are
/// merged back into windows of at most `chunk_size` characters that carry up
/// to `chunk_overlap` trailing characters into the following window.
#[derive(Debug, Clone, Copy)]
pub struct RecursiveSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self, IngestError> {
        if chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be positive".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "overlap {chunk_overlap} must be smaller than chunk size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, finer) = pick_separator(text, separators);
        let mut chunks = Vec::new();
        let mut small = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(&piece) < self.chunk_size {
                small.push(piece);
                continue;
            }

            if !small.is_empty() {
                chunks.extend(self.merge(&small));
                small.clear();
            }

            if finer.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, finer));
            }
        }

        if !small.is_empty() {
            chunks.extend(self.merge(&small));
        }

        chunks
    }

    fn merge(&self, pieces: &[String]) -> Vec<String> {
        let mut merged = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = char_len(piece);

            if total + len > self.chunk_size && !window.is_empty() {
                push_window(&mut merged, &window);

                while total > self.chunk_overlap || (total > 0 && total + len > self.chunk_size) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            window.push_back(piece);
            total += len;
        }

        push_window(&mut merged, &window);
        merged
    }
}

impl TryFrom<ChunkingConfig> for RecursiveSplitter {
    type Error = IngestError;

    fn try_from(value: ChunkingConfig) -> Result<Self, Self::Error> {
        Self::new(value.chunk_size, value.chunk_overlap)
    }
}

/// Splits every page into chunks, preserving page order and attribution.
pub fn split_pages(
    pages: &[PageRecord],
    config: &ChunkingConfig,
) -> Result<Vec<Chunk>, IngestError> {
    let splitter = RecursiveSplitter::try_from(*config)?;
    let mut chunks = Vec::new();
    let mut cursor = 0u64;

    for page in pages {
        for text in splitter.split_text(&page.text) {
            if text.trim().chars().count() <= config.min_chunk_chars {
                continue;
            }

            chunks.push(Chunk {
                chunk_id: make_chunk_id(&page.source_filename, page.page_index, cursor, &text),
                text,
                source_filename: page.source_filename.clone(),
                page_index: page.page_index,
                chunk_index: cursor,
                extraction_method: page.extraction_method,
            });
            cursor = cursor.saturating_add(1);
        }
    }

    Ok(chunks)
}

fn pick_separator<'a, 's>(text: &str, separators: &'a [&'s str]) -> (&'s str, &'a [&'s str]) {
    for (position, separator) in separators.iter().enumerate() {
        if separator.is_empty() {
            return (*separator, &[]);
        }
        if text.contains(separator) {
            return (*separator, &separators[position + 1..]);
        }
    }
    ("", &[])
}

/// The separator stays attached to the start of the piece that follows it.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }

    text.split(separator)
        .enumerate()
        .map(|(position, part)| {
            if position == 0 {
                part.to_string()
            } else {
                format!("{separator}{part}")
            }
        })
        .filter(|piece| !piece.is_empty())
        .collect()
}

fn push_window(target: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined = window.iter().copied().collect::<String>();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        target.push(trimmed.to_string());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn make_chunk_id(filename: &str, page: u32, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(filename.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
