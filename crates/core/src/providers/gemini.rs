use crate::config::ProviderConfig;
use crate::error::{EmbeddingError, GenerationError};
use crate::traits::{EmbeddingProvider, GenerativeModel};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::debug;
use url::Url;

const PROVIDER: &str = "gemini";
const API_KEY_HINT: &str = "set GOOGLE_GENERATIVE_AI_API_KEY or pass an api key";

fn build_client(config: &ProviderConfig) -> Result<Client, reqwest::Error> {
    Client::builder().timeout(config.request_timeout).build()
}

fn model_url(base_url: &str, model: &str, method: &str, api_key: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(&format!(
        "{}/models/{}:{}",
        base_url.trim_end_matches('/'),
        model,
        method
    ))?;
    url.query_pairs_mut().append_pair("key", api_key);
    Ok(url)
}

pub struct GeminiEmbeddingProvider {
    client: Client,
    url: Url,
    model: String,
}

impl GeminiEmbeddingProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, EmbeddingError> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| EmbeddingError::MissingCredential(API_KEY_HINT.to_string()))?;

        Ok(Self {
            client: build_client(config)?,
            url: model_url(&config.base_url, &config.embedding_model, "embedContent", api_key)?,
            model: config.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Option<Vec<Value>>, EmbeddingError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({
                "model": format!("models/{}", self.model),
                "content": { "parts": [{ "text": text }] },
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ProviderResponse {
                provider: PROVIDER.to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let parsed: Value = response.json().await?;
        Ok(embedding_values(&parsed))
    }
}

fn embedding_values(response: &Value) -> Option<Vec<Value>> {
    response
        .pointer("/embedding/values")
        .and_then(Value::as_array)
        .cloned()
}

pub struct GeminiGenerativeModel {
    client: Client,
    url: Url,
}

impl GeminiGenerativeModel {
    pub fn new(config: &ProviderConfig) -> Result<Self, GenerationError> {
        let api_key = config
            .api_key
            .as_deref()
            .ok_or_else(|| GenerationError::MissingCredential(API_KEY_HINT.to_string()))?;

        Ok(Self {
            client: build_client(config)?,
            url: model_url(
                &config.base_url,
                &config.generation_model,
                "generateContent",
                api_key,
            )?,
        })
    }
}

#[async_trait]
impl GenerativeModel for GeminiGenerativeModel {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        debug!(prompt_chars = prompt.len(), "calling generateContent");

        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({
                "contents": [{ "role": "user", "parts": [{ "text": prompt }] }],
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(GenerationError::ProviderResponse {
                provider: PROVIDER.to_string(),
                details: format!("{status}: {details}"),
            });
        }

        let parsed: Value = response.json().await?;
        candidate_text(&parsed).ok_or_else(|| GenerationError::ProviderResponse {
            provider: PROVIDER.to_string(),
            details: "response had no text candidates".to_string(),
        })
    }
}

fn candidate_text(response: &Value) -> Option<String> {
    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)?;

    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<String>();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_require_an_api_key() {
        let config = ProviderConfig::default();
        assert!(matches!(
            GeminiEmbeddingProvider::new(&config),
            Err(EmbeddingError::MissingCredential(_))
        ));
        assert!(matches!(
            GeminiGenerativeModel::new(&config),
            Err(GenerationError::MissingCredential(_))
        ));
    }

    #[test]
    fn model_url_carries_method_and_key() {
        let url = model_url(
            "https://example.test/v1beta/",
            "embedding-001",
            "embedContent",
            "secret",
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.test/v1beta/models/embedding-001:embedContent?key=secret"
        );
    }

    #[test]
    fn embedding_values_are_read_from_the_response() {
        let response = json!({ "embedding": { "values": [0.1, 0.2, 0.3] } });
        assert_eq!(embedding_values(&response).map(|values| values.len()), Some(3));
        assert_eq!(embedding_values(&json!({ "embedding": {} })), None);
    }

    #[test]
    fn candidate_text_joins_parts_of_the_first_candidate() {
        let response = json!({
            "candidates": [
                { "content": { "parts": [{ "text": "Hello " }, { "text": "world" }] } },
                { "content": { "parts": [{ "text": "ignored" }] } }
            ]
        });
        assert_eq!(candidate_text(&response).as_deref(), Some("Hello world"));
        assert_eq!(candidate_text(&json!({ "candidates": [] })), None);
    }
}
