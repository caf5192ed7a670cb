use crate::error::StorageError;
use crate::models::{ChatMessage, DocumentChunk, ReportRecord};
use crate::traits::DocumentStore;
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

/// Process-local store. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    chunks: RwLock<Vec<DocumentChunk>>,
    messages: RwLock<Vec<ChatMessage>>,
    reports: RwLock<Vec<ReportRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn put_chunks(&self, chunks: &[DocumentChunk]) -> Result<(), StorageError> {
        let mut stored = self.chunks.write().await;
        stored.extend_from_slice(chunks);
        debug!(count = chunks.len(), "stored chunks in memory");
        Ok(())
    }

    async fn scan_chunks(
        &self,
        document_name: Option<&str>,
    ) -> Result<Vec<DocumentChunk>, StorageError> {
        let stored = self.chunks.read().await;
        Ok(stored
            .iter()
            .filter(|chunk| document_name.map_or(true, |name| chunk.document_name == name))
            .cloned()
            .collect())
    }

    async fn append_message(
        &self,
        document_name: &str,
        message: &ChatMessage,
    ) -> Result<(), StorageError> {
        let mut record = message.clone();
        record.document_name = document_name.to_string();
        self.messages.write().await.push(record);
        Ok(())
    }

    async fn list_messages(&self, document_name: &str) -> Result<Vec<ChatMessage>, StorageError> {
        let mut messages: Vec<ChatMessage> = self
            .messages
            .read()
            .await
            .iter()
            .filter(|message| message.document_name == document_name)
            .cloned()
            .collect();
        messages.sort_by_key(|message| message.timestamp);
        Ok(messages)
    }

    async fn put_report(&self, report: &ReportRecord) -> Result<(), StorageError> {
        self.reports.write().await.push(report.clone());
        Ok(())
    }

    async fn list_reports(&self, limit: usize) -> Result<Vec<ReportRecord>, StorageError> {
        let mut reports = self.reports.read().await.clone();
        reports.sort_by(|left, right| right.created_at.cmp(&left.created_at));
        reports.truncate(limit);
        Ok(reports)
    }

    async fn get_report(&self, id: &str) -> Result<ReportRecord, StorageError> {
        self.reports
            .read()
            .await
            .iter()
            .find(|report| report.id == id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("report {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatRole, Metadata};
    use chrono::{Duration, Utc};

    fn chunk(document_name: &str, index: usize) -> DocumentChunk {
        DocumentChunk {
            chunk_id: format!("{document_name}-{index}"),
            document_name: document_name.to_string(),
            content: format!("chunk {index}"),
            index,
            total_chunks: 2,
            embedding: None,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn scan_is_scoped_by_document_name() {
        let store = MemoryStore::new();
        store
            .put_chunks(&[chunk("a", 0), chunk("a", 1), chunk("b", 0)])
            .await
            .unwrap();

        assert_eq!(store.scan_chunks(Some("a")).await.unwrap().len(), 2);
        assert_eq!(store.scan_chunks(Some("missing")).await.unwrap().len(), 0);
        assert_eq!(store.scan_chunks(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn messages_come_back_in_timestamp_order() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut later = ChatMessage::assistant("doc", "answer", vec!["src".to_string()]);
        later.timestamp = now + Duration::seconds(5);
        let mut earlier = ChatMessage::user("doc", "question");
        earlier.timestamp = now;

        store.append_message("doc", &later).await.unwrap();
        store.append_message("doc", &earlier).await.unwrap();
        store
            .append_message("other", &ChatMessage::user("other", "elsewhere"))
            .await
            .unwrap();

        let messages = store.list_messages("doc").await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::User);
        assert_eq!(messages[1].sources, vec!["src".to_string()]);
    }
}
