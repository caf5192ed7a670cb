use crate::models::IngestionOptions;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_EMBEDDING_MODEL: &str = "embedding-001";
pub const DEFAULT_GENERATION_MODEL: &str = "gemini-1.5-flash-latest";

/// Credentials and model names for the hosted embedding and generation APIs.
///
/// Built explicitly and handed to each provider, so two pipelines with
/// different keys can live in one process.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub embedding_model: String,
    pub generation_model: String,
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_key: non_blank_env("GOOGLE_GENERATIVE_AI_API_KEY"),
            base_url: non_blank_env("DOC_ANALYST_BASE_URL").unwrap_or(defaults.base_url),
            embedding_model: non_blank_env("DOC_ANALYST_EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            generation_model: non_blank_env("DOC_ANALYST_GENERATION_MODEL")
                .unwrap_or(defaults.generation_model),
            request_timeout: defaults.request_timeout,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = non_blank(api_key.into());
        self
    }
}

pub(crate) fn non_blank_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(non_blank)
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EmbeddingOptions {
    /// Inputs longer than this many characters are cut before embedding.
    pub max_input_chars: usize,
    pub expected_dimensions: Option<usize>,
}

impl Default for EmbeddingOptions {
    fn default() -> Self {
        Self {
            max_input_chars: 2_048,
            expected_dimensions: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    /// Vector ranking when the scoped chunks carry embeddings, keywords otherwise.
    Auto,
    Vector,
    Keyword,
}

#[derive(Debug, Clone, Copy)]
pub struct RetrievalOptions {
    pub mode: RetrievalMode,
    pub answer_top_k: usize,
    pub findings_top_k: usize,
    pub structured_top_k: usize,
    pub source_preview_chars: usize,
    pub keyword_confidence: f64,
    pub analysis_max_chars: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::Auto,
            answer_top_k: 5,
            findings_top_k: 10,
            structured_top_k: 10,
            source_preview_chars: 100,
            keyword_confidence: 0.8,
            analysis_max_chars: 100_000,
        }
    }
}

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ExtractionOptions {
    pub window_pages: u32,
    pub large_window_pages: u32,
    pub large_source_bytes: u64,
    pub max_source_bytes: u64,
    /// Timeout for fetching remote sources.
    pub request_timeout: Duration,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            window_pages: 10,
            large_window_pages: 5,
            large_source_bytes: 20 * MIB,
            max_source_bytes: 100 * MIB,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl ExtractionOptions {
    /// Pages per window for a source of `byte_len` bytes.
    pub fn window_for(&self, byte_len: u64) -> u32 {
        let window = if byte_len > self.large_source_bytes {
            self.large_window_pages.min(self.window_pages)
        } else {
            self.window_pages
        };
        window.max(1)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub ingestion: IngestionOptions,
    pub embedding: EmbeddingOptions,
    pub retrieval: RetrievalOptions,
    pub extraction: ExtractionOptions,
}
