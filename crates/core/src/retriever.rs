use crate::config::RetrievalMode;
use crate::embeddings::Embedder;
use crate::error::SearchError;
use crate::models::{DocumentChunk, RankingStrategy, Retrieval, RetrievalResult};
use crate::traits::DocumentStore;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info};

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Ranks the chunks of one document against a query.
///
/// The ranking strategy follows [`RetrievalMode`]: in `Auto` mode a document
/// whose chunks carry embeddings is ranked by cosine similarity, otherwise by
/// keyword match counts.
#[derive(Clone)]
pub struct Retriever {
    embedder: Embedder,
    store: Arc<dyn DocumentStore>,
    mode: RetrievalMode,
}

impl Retriever {
    pub fn new(embedder: Embedder, store: Arc<dyn DocumentStore>, mode: RetrievalMode) -> Self {
        Self {
            embedder,
            store,
            mode,
        }
    }

    pub async fn retrieve(
        &self,
        query: &str,
        document_name: &str,
        top_k: usize,
    ) -> Result<Retrieval, SearchError> {
        let mut chunks = self.store.scan_chunks(Some(document_name)).await?;
        chunks.sort_by_key(|chunk| chunk.index);

        let strategy = self.strategy_for(&chunks);
        if chunks.is_empty() {
            debug!(document = document_name, "no chunks stored for document");
            return Ok(Retrieval::empty(strategy));
        }

        if query.trim().is_empty() {
            return Err(SearchError::InvalidQuery("query is empty".to_string()));
        }

        let scored = match strategy {
            RankingStrategy::Vector => {
                let query_vector = self.embedder.embed(query).await?;
                rank_by_vector(&query_vector, &chunks)
            }
            RankingStrategy::Keyword => rank_by_keywords(query, &chunks)?,
        };

        let results = top_results(scored, top_k);
        info!(
            document = document_name,
            strategy = ?strategy,
            candidates = chunks.len(),
            returned = results.len(),
            "retrieved chunks"
        );

        Ok(Retrieval { strategy, results })
    }

    fn strategy_for(&self, chunks: &[DocumentChunk]) -> RankingStrategy {
        match self.mode {
            RetrievalMode::Vector => RankingStrategy::Vector,
            RetrievalMode::Keyword => RankingStrategy::Keyword,
            RetrievalMode::Auto => {
                if chunks.iter().any(|chunk| chunk.embedding.is_some()) {
                    RankingStrategy::Vector
                } else {
                    RankingStrategy::Keyword
                }
            }
        }
    }
}

fn rank_by_vector<'a>(
    query_vector: &[f32],
    chunks: &'a [DocumentChunk],
) -> Vec<(f64, &'a DocumentChunk)> {
    chunks
        .iter()
        .filter_map(|chunk| {
            let embedding = chunk.embedding.as_deref()?;
            Some((cosine_similarity(query_vector, embedding), chunk))
        })
        .collect()
}

/// Counts literal occurrences of each lowercased query token in each chunk.
/// Chunks without a single match are dropped.
fn rank_by_keywords<'a>(
    query: &str,
    chunks: &'a [DocumentChunk],
) -> Result<Vec<(f64, &'a DocumentChunk)>, regex::Error> {
    let patterns = query
        .to_lowercase()
        .split_whitespace()
        .map(|token| Regex::new(&regex::escape(token)))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(chunks
        .iter()
        .filter_map(|chunk| {
            let content = chunk.content.to_lowercase();
            let score: usize = patterns
                .iter()
                .map(|pattern| pattern.find_iter(&content).count())
                .sum();
            (score > 0).then_some((score as f64, chunk))
        })
        .collect())
}

/// Highest scores first; equal scores keep ascending chunk index order.
fn top_results(mut scored: Vec<(f64, &DocumentChunk)>, top_k: usize) -> Vec<RetrievalResult> {
    scored.sort_by(|left, right| {
        right
            .0
            .total_cmp(&left.0)
            .then_with(|| left.1.index.cmp(&right.1.index))
    });

    scored
        .into_iter()
        .take(top_k)
        .map(|(score, chunk)| RetrievalResult {
            content: chunk.content.clone(),
            chunk_index: chunk.index,
            similarity: score,
            metadata: chunk.metadata.clone(),
        })
        .collect()
}
