use crate::error::IngestError;
use crate::models::{DocumentChunk, IngestionOptions, Metadata};
use chrono::Utc;
use regex::Regex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            overlap: 200,
        }
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            overlap: value.chunk_overlap,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk size must be greater than zero".to_string(),
            ));
        }

        if self.overlap >= self.chunk_size {
            warn!(
                chunk_size = self.chunk_size,
                overlap = self.overlap,
                "chunk overlap is not smaller than chunk size; windows will advance one character at a time"
            );
        }

        Ok(())
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Splits `text` into windows of at most `chunk_size` characters.
///
/// Each window after the first starts `overlap` characters before the end of
/// the previous one, but always at least one character after its start.
pub fn chunk_text(text: &str, config: ChunkingConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut chunks = Vec::new();

    if chars.is_empty() || config.chunk_size == 0 {
        return chunks;
    }

    let mut start = 0;
    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start = (start + 1).max(end.saturating_sub(config.overlap));
    }

    chunks
}

pub const DEFAULT_SECTION_CHARS: usize = 10_000;
pub const DEFAULT_SECTION_OVERLAP: usize = 500;

/// Cuts a long document into overlapping sections that each fit in one model
/// prompt. Uses the same window rule as [`chunk_text`].
pub fn split_into_sections(text: &str, max_section_chars: usize, overlap: usize) -> Vec<String> {
    chunk_text(
        text,
        ChunkingConfig {
            chunk_size: max_section_chars,
            overlap,
        },
    )
}

pub fn build_chunks(
    document_name: &str,
    text: &str,
    config: ChunkingConfig,
    metadata: &Metadata,
) -> Result<Vec<DocumentChunk>, IngestError> {
    config.validate()?;

    let pieces = chunk_text(text, config);
    let total_chunks = pieces.len();
    let created_at = Utc::now();

    Ok(pieces
        .into_iter()
        .enumerate()
        .map(|(index, content)| DocumentChunk {
            chunk_id: make_chunk_id(document_name, index, &content),
            document_name: document_name.to_string(),
            content,
            index,
            total_chunks,
            embedding: None,
            metadata: metadata.clone(),
            created_at,
        })
        .collect())
}

fn make_chunk_id(document_name: &str, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_name.as_bytes());
    hasher.update((index as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Tidies text pulled out of a PDF: page footers, glued words and runs of
/// whitespace.
pub fn clean_extracted_text(text: &str) -> Result<String, regex::Error> {
    let page_marker = Regex::new(r"(?i)page \d+ of \d+")?;
    let glued_words = Regex::new(r"([a-z])([A-Z])")?;

    let collapsed = normalize_whitespace(text);
    let without_markers = page_marker.replace_all(&collapsed, "");
    let separated = glued_words.replace_all(&without_markers, "$1 $2");

    Ok(normalize_whitespace(&separated))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStats {
    pub word_count: usize,
    pub character_count: usize,
    pub estimated_reading_minutes: usize,
    pub has_numbers: bool,
    pub has_currency: bool,
    pub has_percentages: bool,
}

impl TextStats {
    const WORDS_PER_MINUTE: usize = 200;

    pub fn from_text(text: &str) -> Self {
        let word_count = text.split_whitespace().count();
        Self {
            word_count,
            character_count: text.chars().count(),
            estimated_reading_minutes: word_count.div_ceil(Self::WORDS_PER_MINUTE),
            has_numbers: text.chars().any(|c| c.is_ascii_digit()),
            has_currency: text.contains(['$', '€', '£', '¥']),
            has_percentages: text.contains('%'),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingEstimate {
    pub seconds: u64,
    pub minutes: u64,
    pub message: String,
}

/// Rough wall-clock estimate for extracting a source of `byte_len` bytes.
pub fn estimate_processing_time(byte_len: u64) -> ProcessingEstimate {
    const SECONDS_PER_MIB: f64 = 2.0;
    let mib = byte_len as f64 / (1024.0 * 1024.0);
    let seconds = (mib * SECONDS_PER_MIB).ceil() as u64;
    let minutes = seconds.div_ceil(60);

    let message = if seconds < 10 {
        "This should only take a few seconds".to_string()
    } else if seconds < 60 {
        format!("This should take about {seconds} seconds")
    } else {
        let plural = if minutes > 1 { "s" } else { "" };
        format!("This may take {minutes} minute{plural}")
    };

    ProcessingEstimate {
        seconds,
        minutes,
        message,
    }
}
