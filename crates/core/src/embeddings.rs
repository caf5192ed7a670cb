use crate::config::EmbeddingOptions;
use crate::error::EmbeddingError;
use crate::traits::EmbeddingProvider;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Embeds text through a provider, guarding both directions: input is cut to
/// a maximum length and output must be a non-empty vector of finite numbers.
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    options: EmbeddingOptions,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, options: EmbeddingOptions) -> Self {
        Self { provider, options }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let input = truncate_chars(text, self.options.max_input_chars);
        if input.len() < text.len() {
            debug!(
                original_bytes = text.len(),
                truncated_bytes = input.len(),
                "embedding input truncated"
            );
        }

        let raw = self.provider.embed(input).await?;
        let vector = validate_embedding(raw)?;

        if let Some(expected) = self.options.expected_dimensions {
            if vector.len() != expected {
                return Err(EmbeddingError::Dimensions {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        Ok(vector)
    }
}

/// Longest prefix of `text` holding at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

pub fn validate_embedding(raw: Option<Vec<Value>>) -> Result<Vec<f32>, EmbeddingError> {
    let values = raw.ok_or(EmbeddingError::Missing)?;
    if values.is_empty() {
        return Err(EmbeddingError::Empty);
    }

    values
        .iter()
        .enumerate()
        .map(|(position, value)| {
            let number = value
                .as_f64()
                .ok_or(EmbeddingError::NonNumeric { position })?;
            let narrowed = number as f32;
            if narrowed.is_finite() {
                Ok(narrowed)
            } else {
                Err(EmbeddingError::NonFinite { position })
            }
        })
        .collect()
}

/// Offline embedder hashing character trigrams into a fixed number of
/// buckets. Deterministic and network free.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for CharacterNgramEmbedder {
    async fn embed(&self, text: &str) -> Result<Option<Vec<Value>>, EmbeddingError> {
        Ok(Some(self.vector(text).into_iter().map(Value::from).collect()))
    }
}
