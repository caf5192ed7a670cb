use crate::chat::ChatLog;
use crate::config::PipelineConfig;
use crate::embeddings::Embedder;
use crate::error::{IngestError, SearchError, StorageError};
use crate::extractor::{DocumentExtractor, SourceLocation};
use crate::ingest::{FolderIngestionReport, Ingestor};
use crate::models::{
    AnswerResponse, ChatMessage, DocumentAnalysis, DocumentChunk, ExtractionProgress,
    IngestionSummary, MarketFindings, Metadata, ReportContent, ReportRecord, Retrieval,
    StructuredData,
};
use crate::retriever::Retriever;
use crate::synthesizer::Synthesizer;
use crate::traits::{DocumentStore, EmbeddingProvider, GenerativeModel};
use chrono::Utc;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Single entry point over ingestion, retrieval, synthesis, chat history and
/// saved reports. Every component shares one store.
pub struct DocumentAnalyst {
    store: Arc<dyn DocumentStore>,
    ingestor: Ingestor,
    synthesizer: Synthesizer,
    chat: ChatLog,
}

impl DocumentAnalyst {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn GenerativeModel>,
        store: Arc<dyn DocumentStore>,
        extractor: DocumentExtractor,
        config: PipelineConfig,
    ) -> Self {
        let embedder = Embedder::new(provider, config.embedding.clone());
        let retriever = Retriever::new(embedder.clone(), Arc::clone(&store), config.retrieval.mode);
        let ingestor = Ingestor::new(
            embedder,
            Arc::clone(&store),
            Arc::new(extractor),
            config.ingestion.clone(),
        );

        Self {
            synthesizer: Synthesizer::new(retriever, model, config.retrieval),
            chat: ChatLog::new(Arc::clone(&store)),
            ingestor,
            store,
        }
    }

    pub async fn ingest_text(
        &self,
        document_name: Option<&str>,
        text: &str,
        metadata: Metadata,
    ) -> Result<IngestionSummary, IngestError> {
        self.ingestor.ingest_text(document_name, text, metadata).await
    }

    pub async fn ingest_pdf<F>(
        &self,
        location: &SourceLocation,
        document_name: Option<&str>,
        observer: F,
    ) -> Result<IngestionSummary, IngestError>
    where
        F: FnMut(ExtractionProgress) -> ControlFlow<()>,
    {
        self.ingestor.ingest_pdf(location, document_name, observer).await
    }

    pub async fn ingest_folder(&self, folder: &Path) -> Result<FolderIngestionReport, IngestError> {
        self.ingestor.ingest_folder(folder).await
    }

    pub async fn retrieve(
        &self,
        query: &str,
        document_name: &str,
        top_k: usize,
    ) -> Result<Retrieval, SearchError> {
        self.synthesizer
            .retriever()
            .retrieve(query, document_name, top_k)
            .await
    }

    /// Records the question, answers it and records the answer with its
    /// source previews.
    pub async fn ask(
        &self,
        question: &str,
        document_name: &str,
    ) -> Result<AnswerResponse, SearchError> {
        self.chat.append_user(document_name, question).await?;
        let response = self.synthesizer.answer(question, document_name).await?;
        self.chat
            .append_assistant(document_name, &response.answer, response.sources.clone())
            .await?;
        Ok(response)
    }

    pub async fn findings(&self, document_name: &str) -> Result<MarketFindings, SearchError> {
        self.synthesizer.findings(document_name).await
    }

    pub async fn structured_data(&self, document_name: &str) -> Result<StructuredData, SearchError> {
        self.synthesizer.structured_data(document_name).await
    }

    pub async fn analyze_document(&self, text: &str) -> Result<DocumentAnalysis, SearchError> {
        self.synthesizer.analyze_document(text).await
    }

    pub async fn history(&self, document_name: &str) -> Vec<ChatMessage> {
        self.chat.history(document_name).await
    }

    pub async fn chunks(&self, document_name: &str) -> Result<Vec<DocumentChunk>, StorageError> {
        let mut chunks = self.store.scan_chunks(Some(document_name)).await?;
        chunks.sort_by_key(|chunk| chunk.index);
        Ok(chunks)
    }

    /// Runs findings and structured extraction together and saves the pair.
    pub async fn create_report(&self, document_name: &str) -> Result<ReportRecord, SearchError> {
        let (findings, structured) = tokio::try_join!(
            self.synthesizer.findings(document_name),
            self.synthesizer.structured_data(document_name)
        )?;

        self.save_report(document_name, ReportContent::Analysis { findings, structured })
            .await
    }

    /// Extracts a report from the full source text and saves it together
    /// with that text.
    pub async fn extract_report(
        &self,
        document_name: &str,
        text: &str,
    ) -> Result<ReportRecord, SearchError> {
        let report = self.synthesizer.extract_report(text).await?;
        self.save_report(
            document_name,
            ReportContent::Extraction {
                report,
                source_text: text.to_string(),
            },
        )
        .await
    }

    async fn save_report(
        &self,
        document_name: &str,
        content: ReportContent,
    ) -> Result<ReportRecord, SearchError> {
        let report = ReportRecord {
            id: Uuid::new_v4().to_string(),
            document_name: document_name.to_string(),
            content,
            created_at: Utc::now(),
        };
        self.store.put_report(&report).await?;
        info!(report = %report.id, document = document_name, "saved report");
        Ok(report)
    }

    pub async fn list_reports(&self, limit: usize) -> Result<Vec<ReportRecord>, StorageError> {
        self.store.list_reports(limit).await
    }

    pub async fn get_report(&self, id: &str) -> Result<ReportRecord, StorageError> {
        self.store.get_report(id).await
    }
}
