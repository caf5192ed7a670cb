use crate::config::non_blank_env;
use crate::error::ExtractionError;
use crate::models::PageText;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
struct LlmOcrRequest<'a> {
    pdf_base64: String,
    source_path: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrResponse {
    pages: Option<Vec<LlmOcrPage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LlmOcrPage {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

impl OcrEndpointConfig {
    /// Reads `LLM_OCR_ENDPOINT` and `LLM_OCR_API_KEY`; `None` when no endpoint is set.
    pub fn from_env() -> Option<Self> {
        let endpoint = non_blank_env("LLM_OCR_ENDPOINT")?;
        Some(Self {
            endpoint,
            api_key: non_blank_env("LLM_OCR_API_KEY"),
        })
    }
}

/// Client for an OCR service that reads scanned PDFs the text layer misses.
#[derive(Debug, Clone)]
pub struct OcrClient {
    client: Client,
    config: OcrEndpointConfig,
}

impl OcrClient {
    pub fn new(config: OcrEndpointConfig, timeout: Duration) -> Result<Self, ExtractionError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            config,
        })
    }

    pub async fn extract_pages(
        &self,
        pdf: &[u8],
        source_name: &str,
    ) -> Result<Vec<PageText>, ExtractionError> {
        info!(endpoint = %self.config.endpoint, source = source_name, "requesting OCR");

        let payload = LlmOcrRequest {
            pdf_base64: STANDARD.encode(pdf),
            source_path: source_name,
        };

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            return Err(ExtractionError::OcrFailed(format!(
                "OCR request to {} returned {}",
                self.config.endpoint,
                response.status()
            )));
        }

        let payload: LlmOcrResponse = response.json().await?;
        payload_to_pages(&payload, source_name)
    }
}

fn payload_to_pages(
    payload: &LlmOcrResponse,
    source_name: &str,
) -> Result<Vec<PageText>, ExtractionError> {
    if let Some(listed) = &payload.pages {
        let listed = listed
            .iter()
            .filter_map(|page| {
                let text = page.text.as_deref().map(str::trim)?;
                if text.is_empty() {
                    return None;
                }
                Some(PageText {
                    number: page.page.unwrap_or(1),
                    text: text.to_string(),
                })
            })
            .collect::<Vec<_>>();

        if !listed.is_empty() {
            return Ok(listed);
        }
    }

    if let Some(raw_text) = &payload.text {
        let pages = raw_text
            .split('\u{000c}')
            .enumerate()
            .filter_map(|(index, page)| {
                let text = page.trim();
                if text.is_empty() {
                    None
                } else {
                    Some(PageText {
                        number: (index + 1) as u32,
                        text: text.to_string(),
                    })
                }
            })
            .collect::<Vec<_>>();

        if !pages.is_empty() {
            return Ok(pages);
        }
    }

    Err(ExtractionError::OcrFailed(format!(
        "OCR response was empty for {source_name}"
    )))
}
