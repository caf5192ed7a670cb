use crate::error::StorageError;
use crate::models::ChatMessage;
use crate::traits::DocumentStore;
use std::sync::Arc;
use tracing::warn;

/// Per-document conversation turns on top of a [`DocumentStore`].
#[derive(Clone)]
pub struct ChatLog {
    store: Arc<dyn DocumentStore>,
}

impl ChatLog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn append_user(
        &self,
        document_name: &str,
        content: &str,
    ) -> Result<ChatMessage, StorageError> {
        let message = ChatMessage::user(document_name, content);
        self.store.append_message(document_name, &message).await?;
        Ok(message)
    }

    pub async fn append_assistant(
        &self,
        document_name: &str,
        content: &str,
        sources: Vec<String>,
    ) -> Result<ChatMessage, StorageError> {
        let message = ChatMessage::assistant(document_name, content, sources);
        self.store.append_message(document_name, &message).await?;
        Ok(message)
    }

    /// History of one document, oldest first. Read failures yield an empty
    /// history instead of an error.
    pub async fn history(&self, document_name: &str) -> Vec<ChatMessage> {
        match self.store.list_messages(document_name).await {
            Ok(messages) => messages,
            Err(error) => {
                warn!(document = document_name, %error, "chat history unavailable, returning empty history");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChatRole, DocumentChunk, ReportRecord};
    use crate::stores::MemoryStore;
    use async_trait::async_trait;

    struct BrokenHistoryStore;

    #[async_trait]
    impl DocumentStore for BrokenHistoryStore {
        async fn put_chunks(&self, _chunks: &[DocumentChunk]) -> Result<(), StorageError> {
            Ok(())
        }

        async fn scan_chunks(
            &self,
            _document_name: Option<&str>,
        ) -> Result<Vec<DocumentChunk>, StorageError> {
            Ok(Vec::new())
        }

        async fn append_message(
            &self,
            _document_name: &str,
            _message: &ChatMessage,
        ) -> Result<(), StorageError> {
            Ok(())
        }

        async fn list_messages(&self, _document_name: &str) -> Result<Vec<ChatMessage>, StorageError> {
            Err(StorageError::NotFound("index on (documentName, timestamp)".to_string()))
        }

        async fn put_report(&self, _report: &ReportRecord) -> Result<(), StorageError> {
            Ok(())
        }

        async fn list_reports(&self, _limit: usize) -> Result<Vec<ReportRecord>, StorageError> {
            Ok(Vec::new())
        }

        async fn get_report(&self, id: &str) -> Result<ReportRecord, StorageError> {
            Err(StorageError::NotFound(id.to_string()))
        }
    }

    #[tokio::test]
    async fn turns_are_read_back_in_order_per_document() {
        let log = ChatLog::new(Arc::new(MemoryStore::new()));
        log.append_user("doc", "What is the market size?").await.unwrap();
        log.append_assistant("doc", "About $4B.", vec!["Market size...".to_string()])
            .await
            .unwrap();
        log.append_user("other", "Unrelated").await.unwrap();

        let history = log.history("doc").await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[1].role, ChatRole::Assistant);
        assert_eq!(history[1].sources, vec!["Market size...".to_string()]);
        assert!(history[0].timestamp <= history[1].timestamp);
    }

    #[tokio::test]
    async fn history_read_failures_degrade_to_empty() {
        let log = ChatLog::new(Arc::new(BrokenHistoryStore));
        assert!(log.history("doc").await.is_empty());
    }
}
