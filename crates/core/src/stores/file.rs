use crate::error::StorageError;
use crate::models::{ChatMessage, DocumentChunk, ReportRecord};
use crate::traits::DocumentStore;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

const CHUNKS: &str = "market_docs";
const MESSAGES: &str = "chat_messages";
const REPORTS: &str = "market_reports";

/// Store backed by one JSON-lines file per collection inside a directory.
///
/// Every batch is serialized up front and appended with a single write, so a
/// reader never sees half of a chunk set written by this process.
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, collection: &str) -> PathBuf {
        self.root.join(format!("{collection}.jsonl"))
    }

    async fn append<T: Serialize>(&self, collection: &str, records: &[T]) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut payload = String::new();
        for record in records {
            payload.push_str(&serde_json::to_string(record)?);
            payload.push('\n');
        }

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.collection_path(collection))
            .await?;
        file.write_all(payload.as_bytes()).await?;
        file.flush().await?;

        debug!(collection, count = records.len(), "appended records");
        Ok(())
    }

    async fn read<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>, StorageError> {
        let contents = match fs::read_to_string(self.collection_path(collection)).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(position, line)| {
                serde_json::from_str(line).map_err(|error| StorageError::CorruptRecord {
                    collection: collection.to_string(),
                    line: position + 1,
                    details: error.to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn put_chunks(&self, chunks: &[DocumentChunk]) -> Result<(), StorageError> {
        self.append(CHUNKS, chunks).await
    }

    async fn scan_chunks(
        &self,
        document_name: Option<&str>,
    ) -> Result<Vec<DocumentChunk>, StorageError> {
        let mut chunks: Vec<DocumentChunk> = self.read(CHUNKS).await?;
        if let Some(name) = document_name {
            chunks.retain(|chunk| chunk.document_name == name);
        }
        Ok(chunks)
    }

    async fn append_message(
        &self,
        document_name: &str,
        message: &ChatMessage,
    ) -> Result<(), StorageError> {
        let mut record = message.clone();
        record.document_name = document_name.to_string();
        self.append(MESSAGES, &[record]).await
    }

    async fn list_messages(&self, document_name: &str) -> Result<Vec<ChatMessage>, StorageError> {
        let mut messages: Vec<ChatMessage> = self.read(MESSAGES).await?;
        messages.retain(|message| message.document_name == document_name);
        messages.sort_by_key(|message| message.timestamp);
        Ok(messages)
    }

    async fn put_report(&self, report: &ReportRecord) -> Result<(), StorageError> {
        self.append(REPORTS, std::slice::from_ref(report)).await
    }

    async fn list_reports(&self, limit: usize) -> Result<Vec<ReportRecord>, StorageError> {
        let mut reports: Vec<ReportRecord> = self.read(REPORTS).await?;
        reports.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        reports.truncate(limit);
        Ok(reports)
    }

    async fn get_report(&self, id: &str) -> Result<ReportRecord, StorageError> {
        let reports: Vec<ReportRecord> = self.read(REPORTS).await?;
        reports
            .into_iter()
            .find(|report| report.id == id)
            .ok_or_else(|| StorageError::NotFound(format!("report {id}")))
    }
}
