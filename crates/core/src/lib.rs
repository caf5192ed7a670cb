pub mod chat;
pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod ingest;
pub mod models;
pub mod ocr;
pub mod orchestrator;
pub mod providers;
pub mod retriever;
pub mod stores;
pub mod synthesizer;
pub mod traits;

pub use chat::ChatLog;
pub use chunking::{
    build_chunks, chunk_text, clean_extracted_text, estimate_processing_time,
    normalize_whitespace, split_into_sections, ChunkingConfig, ProcessingEstimate, TextStats,
    DEFAULT_SECTION_CHARS, DEFAULT_SECTION_OVERLAP,
};
pub use config::{
    EmbeddingOptions, ExtractionOptions, PipelineConfig, ProviderConfig, RetrievalMode,
    RetrievalOptions,
};
pub use embeddings::{CharacterNgramEmbedder, Embedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{
    EmbeddingError, ExtractionError, GenerationError, IngestError, SearchError, StorageError,
    SynthesisError,
};
pub use extractor::{DocumentExtractor, LopdfSource, SourceLocation};
pub use ingest::{discover_pdf_files, FolderIngestionReport, Ingestor, SkippedPdf};
pub use models::{
    AnswerResponse, ChatMessage, ChatRole, DocumentAnalysis, DocumentChunk, ExtractedDocument,
    ExtractedReport, ExtractionProgress, IngestionOptions, IngestionSummary, MarketFindings,
    Metadata, PageText, RankingStrategy, ReportContent, ReportFigure, ReportRecord, Retrieval,
    RetrievalResult, StructuredData, SwotAnalysis,
};
pub use ocr::{OcrClient, OcrEndpointConfig};
pub use orchestrator::DocumentAnalyst;
pub use providers::{GeminiEmbeddingProvider, GeminiGenerativeModel};
pub use retriever::{cosine_similarity, Retriever};
pub use stores::{FileStore, MemoryStore};
pub use synthesizer::{Synthesizer, INSUFFICIENT_INFORMATION};
pub use traits::{DocumentStore, EmbeddingProvider, GenerativeModel, PageSource};
