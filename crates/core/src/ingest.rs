use crate::chunking::{build_chunks, clean_extracted_text, ChunkingConfig, TextStats};
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::extractor::{DocumentExtractor, SourceLocation};
use crate::models::{DocumentChunk, ExtractionProgress, IngestionOptions, IngestionSummary, Metadata};
use crate::traits::DocumentStore;
use chrono::Utc;
use serde_json::Value;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn generate_document_name() -> String {
    format!("document-{}", Uuid::new_v4().simple())
}

fn document_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("document");
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{stem}-{}", &suffix[..8])
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct FolderIngestionReport {
    pub ingested: Vec<IngestionSummary>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Chunks, embeds and stores documents.
///
/// A document is stored all at once after every chunk has been embedded; an
/// embedding failure leaves nothing behind for that document.
pub struct Ingestor {
    embedder: Embedder,
    store: Arc<dyn DocumentStore>,
    extractor: Arc<DocumentExtractor>,
    options: IngestionOptions,
}

impl Ingestor {
    pub fn new(
        embedder: Embedder,
        store: Arc<dyn DocumentStore>,
        extractor: Arc<DocumentExtractor>,
        options: IngestionOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            extractor,
            options,
        }
    }

    pub async fn ingest_text(
        &self,
        document_name: Option<&str>,
        text: &str,
        metadata: Metadata,
    ) -> Result<IngestionSummary, IngestError> {
        if text.trim().is_empty() {
            return Err(IngestError::InvalidArgument(
                "document text is empty".to_string(),
            ));
        }

        let document_name = match document_name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => generate_document_name(),
        };

        let config = ChunkingConfig::from(&self.options);
        let mut chunks = build_chunks(&document_name, text, config, &metadata)?;
        info!(
            document = %document_name,
            chars = text.chars().count(),
            chunks = chunks.len(),
            "ingesting document"
        );

        if self.options.embed {
            self.embed_chunks(&mut chunks).await?;
        }

        self.store.put_chunks(&chunks).await?;
        info!(document = %document_name, chunks = chunks.len(), "stored chunks");

        Ok(IngestionSummary {
            document_name,
            chunk_count: chunks.len(),
            embedded: self.options.embed,
            page_count: None,
        })
    }

    async fn embed_chunks(&self, chunks: &mut [DocumentChunk]) -> Result<(), IngestError> {
        let concurrency = self.options.embed_concurrency.max(1);

        if concurrency == 1 {
            for chunk in chunks.iter_mut() {
                let vector = self
                    .embedder
                    .embed(&chunk.content)
                    .await
                    .map_err(|source| IngestError::Embedding {
                        index: chunk.index,
                        source,
                    })?;
                debug!(index = chunk.index, dimensions = vector.len(), "embedded chunk");
                chunk.embedding = Some(vector);
            }
            return Ok(());
        }

        let permits = Arc::new(Semaphore::new(concurrency));
        let mut tasks = JoinSet::new();
        for chunk in chunks.iter() {
            let embedder = self.embedder.clone();
            let permits = Arc::clone(&permits);
            let content = chunk.content.clone();
            let index = chunk.index;

            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|error| IngestError::Task(error.to_string()))?;
                let vector = embedder
                    .embed(&content)
                    .await
                    .map_err(|source| IngestError::Embedding { index, source })?;
                Ok::<_, IngestError>((index, vector))
            });
        }

        let mut vectors: Vec<Option<Vec<f32>>> = vec![None; chunks.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, vector) = joined.map_err(|error| IngestError::Task(error.to_string()))??;
            debug!(index, dimensions = vector.len(), "embedded chunk");
            vectors[index] = Some(vector);
        }

        for (chunk, vector) in chunks.iter_mut().zip(vectors) {
            chunk.embedding = vector;
        }
        Ok(())
    }

    /// Extracts a PDF window by window, cleans the text and ingests it.
    pub async fn ingest_pdf<F>(
        &self,
        location: &SourceLocation,
        document_name: Option<&str>,
        observer: F,
    ) -> Result<IngestionSummary, IngestError>
    where
        F: FnMut(ExtractionProgress) -> ControlFlow<()>,
    {
        let extracted = self.extractor.extract_pdf(location, observer).await?;
        let cleaned = clean_extracted_text(&extracted.text)
            .map_err(|error| IngestError::InvalidArgument(error.to_string()))?;
        let stats = TextStats::from_text(&cleaned);

        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), Value::from(location.name()));
        metadata.insert("pageCount".to_string(), Value::from(extracted.page_count));
        metadata.insert("characterCount".to_string(), Value::from(stats.character_count));
        metadata.insert("wordCount".to_string(), Value::from(stats.word_count));
        metadata.insert("uploadedAt".to_string(), Value::from(Utc::now().to_rfc3339()));
        if let Some(checksum) = &extracted.checksum {
            metadata.insert("checksum".to_string(), Value::from(checksum.as_str()));
        }
        if !extracted.info.is_empty() {
            metadata.insert("pdfInfo".to_string(), Value::Object(extracted.info.clone()));
        }

        info!(
            source = %location.name(),
            pages = extracted.page_count,
            elapsed_ms = extracted.elapsed.as_millis() as u64,
            "extracted pdf"
        );

        let mut summary = self.ingest_text(document_name, &cleaned, metadata).await?;
        summary.page_count = Some(extracted.page_count);
        Ok(summary)
    }

    /// Ingests every PDF under `folder` as its own document. Files that fail
    /// are reported and skipped.
    pub async fn ingest_folder(&self, folder: &Path) -> Result<FolderIngestionReport, IngestError> {
        let files = discover_pdf_files(folder);

        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                folder.display()
            )));
        }

        let mut ingested = Vec::new();
        let mut skipped_files = Vec::new();

        for path in files {
            let name = document_name_for(&path);
            let location = SourceLocation::Path(path.clone());
            let result = self
                .ingest_pdf(&location, Some(&name), |progress| {
                    debug!(
                        page = progress.current_page,
                        total = progress.total_pages,
                        percentage = progress.percentage,
                        "extraction progress"
                    );
                    ControlFlow::Continue(())
                })
                .await;

            match result {
                Ok(summary) => ingested.push(summary),
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping pdf");
                    skipped_files.push(SkippedPdf {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(FolderIngestionReport {
            ingested,
            skipped_files,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingOptions, ExtractionOptions};
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::error::EmbeddingError;
    use crate::stores::MemoryStore;
    use crate::traits::EmbeddingProvider;
    use async_trait::async_trait;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    /// Fails on any chunk containing the marker text.
    struct FailingProvider {
        marker: &'static str,
    }

    #[async_trait]
    impl EmbeddingProvider for FailingProvider {
        async fn embed(&self, text: &str) -> Result<Option<Vec<Value>>, EmbeddingError> {
            if text.contains(self.marker) {
                Ok(Some(vec![Value::from(0.1), Value::Null]))
            } else {
                Ok(Some(vec![Value::from(0.1), Value::from(0.2)]))
            }
        }
    }

    fn ingestor(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<MemoryStore>,
        options: IngestionOptions,
    ) -> Ingestor {
        Ingestor::new(
            Embedder::new(provider, EmbeddingOptions::default()),
            store,
            Arc::new(DocumentExtractor::new(ExtractionOptions::default()).unwrap()),
            options,
        )
    }

    fn text_of(len: usize) -> String {
        "market data and revenue figures "
            .chars()
            .cycle()
            .take(len)
            .collect()
    }

    #[tokio::test]
    async fn ingesting_2500_chars_stores_three_indexed_chunks() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(
            Arc::new(CharacterNgramEmbedder::default()),
            store.clone(),
            IngestionOptions::default(),
        );

        let summary = ingestor
            .ingest_text(Some("doc1"), &text_of(2_500), Metadata::new())
            .await
            .unwrap();

        assert_eq!(summary.document_name, "doc1");
        assert_eq!(summary.chunk_count, 3);

        let mut chunks = store.scan_chunks(Some("doc1")).await.unwrap();
        chunks.sort_by_key(|chunk| chunk.index);
        assert_eq!(
            chunks.iter().map(|chunk| chunk.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(chunks.iter().all(|chunk| chunk.total_chunks == 3));
        assert!(chunks.iter().all(|chunk| chunk.embedding.is_some()));
    }

    #[tokio::test]
    async fn missing_names_are_generated() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(
            Arc::new(CharacterNgramEmbedder::default()),
            store,
            IngestionOptions::default(),
        );

        let first = ingestor.ingest_text(None, "some text", Metadata::new()).await.unwrap();
        let second = ingestor.ingest_text(Some("  "), "some text", Metadata::new()).await.unwrap();
        assert!(first.document_name.starts_with("document-"));
        assert_ne!(first.document_name, second.document_name);
    }

    #[tokio::test]
    async fn keyword_only_ingestion_skips_embeddings() {
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(
            Arc::new(FailingProvider { marker: "" }),
            store.clone(),
            IngestionOptions {
                embed: false,
                ..IngestionOptions::default()
            },
        );

        let summary = ingestor
            .ingest_text(Some("plain"), &text_of(1_500), Metadata::new())
            .await
            .unwrap();

        assert!(!summary.embedded);
        let chunks = store.scan_chunks(Some("plain")).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|chunk| chunk.embedding.is_none()));
    }

    #[tokio::test]
    async fn embedding_failure_names_the_chunk_and_stores_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut text = text_of(2_500);
        text.replace_range(1_900..1_906, "POISON");
        let ingestor = ingestor(
            Arc::new(FailingProvider { marker: "POISON" }),
            store.clone(),
            IngestionOptions::default(),
        );

        let result = ingestor.ingest_text(Some("doc1"), &text, Metadata::new()).await;

        match result {
            Err(IngestError::Embedding { index, source }) => {
                assert_eq!(index, 2);
                assert!(matches!(source, EmbeddingError::NonNumeric { position: 1 }));
            }
            other => panic!("expected embedding failure, got {:?}", other.map(|s| s.chunk_count)),
        }
        assert!(store.scan_chunks(Some("doc1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn parallel_embedding_preserves_chunk_order() {
        let text = text_of(5_000);
        let sequential_store = Arc::new(MemoryStore::new());
        let parallel_store = Arc::new(MemoryStore::new());

        ingestor(
            Arc::new(CharacterNgramEmbedder::default()),
            sequential_store.clone(),
            IngestionOptions::default(),
        )
        .ingest_text(Some("doc"), &text, Metadata::new())
        .await
        .unwrap();

        ingestor(
            Arc::new(CharacterNgramEmbedder::default()),
            parallel_store.clone(),
            IngestionOptions {
                embed_concurrency: 4,
                ..IngestionOptions::default()
            },
        )
        .ingest_text(Some("doc"), &text, Metadata::new())
        .await
        .unwrap();

        let sequential = sequential_store.scan_chunks(Some("doc")).await.unwrap();
        let parallel = parallel_store.scan_chunks(Some("doc")).await.unwrap();
        assert_eq!(sequential.len(), parallel.len());
        for (left, right) in sequential.iter().zip(parallel.iter()) {
            assert_eq!(left.index, right.index);
            assert_eq!(left.content, right.content);
            assert_eq!(left.embedding, right.embedding);
        }
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let ingestor = ingestor(
            Arc::new(CharacterNgramEmbedder::default()),
            Arc::new(MemoryStore::new()),
            IngestionOptions::default(),
        );
        assert!(matches!(
            ingestor.ingest_text(Some("doc"), " \n ", Metadata::new()).await,
            Err(IngestError::InvalidArgument(_))
        ));
    }

    #[test]
    fn discover_pdf_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("a.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("b.PDF"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn folder_ingestion_fails_without_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let ingestor = ingestor(
            Arc::new(CharacterNgramEmbedder::default()),
            Arc::new(MemoryStore::new()),
            IngestionOptions::default(),
        );
        assert!(ingestor.ingest_folder(dir.path()).await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn folder_ingestion_skips_unreadable_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;
        let store = Arc::new(MemoryStore::new());
        let ingestor = ingestor(
            Arc::new(CharacterNgramEmbedder::default()),
            store.clone(),
            IngestionOptions::default(),
        );

        let report = ingestor.ingest_folder(dir.path()).await?;

        assert!(report.ingested.is_empty());
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            report.skipped_files[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("unreadable.pdf")
        );
        assert!(store.scan_chunks(None).await?.is_empty());
        Ok(())
    }
}
