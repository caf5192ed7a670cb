use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("source is empty: {0}")]
    EmptySource(String),

    #[error("source is {size} bytes, above the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },

    #[error("page {page} failed to decode: {details}")]
    Page { page: u32, details: String },

    #[error("no extractable text in {pages} page(s); the pages may be scanned images")]
    NoExtractableText { pages: u32 },

    #[error("extraction cancelled after {completed} of {total} page(s)")]
    Cancelled { completed: u32, total: u32 },

    #[error("remote source request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("multimodal OCR failed: {0}")]
    OcrFailed(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("provider returned no embedding vector")]
    Missing,

    #[error("provider returned an empty embedding vector")]
    Empty,

    #[error("embedding element {position} is not a number")]
    NonNumeric { position: usize },

    #[error("embedding element {position} is not finite")]
    NonFinite { position: usize },

    #[error("embedding has {actual} dimensions, expected {expected}")]
    Dimensions { expected: usize, actual: usize },

    #[error("invalid response from {provider}: {details}")]
    ProviderResponse { provider: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("invalid response from {provider}: {details}")]
    ProviderResponse { provider: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt record in {collection} at line {line}: {details}")]
    CorruptRecord {
        collection: String,
        line: usize,
        details: String,
    },

    #[error("record not found: {0}")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("model response could not be parsed: {0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("embedding chunk {index} failed: {source}")]
    Embedding {
        index: usize,
        #[source]
        source: EmbeddingError,
    },

    #[error("storing chunks failed: {0}")]
    Storage(#[from] StorageError),

    #[error("embedding task failed: {0}")]
    Task(String),
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("query is invalid: {0}")]
    InvalidQuery(String),

    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("reading chunks failed: {0}")]
    Storage(#[from] StorageError),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),
}

impl From<GenerationError> for SearchError {
    fn from(value: GenerationError) -> Self {
        Self::Synthesis(SynthesisError::Generation(value))
    }
}
