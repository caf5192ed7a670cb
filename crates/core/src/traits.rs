use crate::error::{EmbeddingError, ExtractionError, GenerationError, StorageError};
use crate::models::{ChatMessage, DocumentChunk, Metadata, ReportRecord};
use async_trait::async_trait;
use serde_json::Value;

/// Raw access to a hosted or local embedding model.
///
/// Implementations return the vector exactly as the provider sent it; the
/// [`crate::Embedder`] wrapper truncates input and validates the output.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Option<Vec<Value>>, EmbeddingError>;
}

#[async_trait]
pub trait GenerativeModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persists a whole chunk set in one write.
    async fn put_chunks(&self, chunks: &[DocumentChunk]) -> Result<(), StorageError>;

    /// All chunks of `document_name`, or of every document when `None`.
    async fn scan_chunks(
        &self,
        document_name: Option<&str>,
    ) -> Result<Vec<DocumentChunk>, StorageError>;

    async fn append_message(
        &self,
        document_name: &str,
        message: &ChatMessage,
    ) -> Result<(), StorageError>;

    /// Messages of one document, oldest first.
    async fn list_messages(&self, document_name: &str) -> Result<Vec<ChatMessage>, StorageError>;

    async fn put_report(&self, report: &ReportRecord) -> Result<(), StorageError>;

    /// Newest reports first.
    async fn list_reports(&self, limit: usize) -> Result<Vec<ReportRecord>, StorageError>;

    async fn get_report(&self, id: &str) -> Result<ReportRecord, StorageError>;
}

/// A paginated document that yields text one page at a time.
#[async_trait]
pub trait PageSource: Send + Sync {
    fn page_count(&self) -> u32;

    fn byte_len(&self) -> u64;

    /// Document-level properties such as title or author.
    fn info(&self) -> Metadata {
        Metadata::new()
    }

    /// Text of `page`, numbered from 1.
    async fn page_text(&self, page: u32) -> Result<String, ExtractionError>;
}
