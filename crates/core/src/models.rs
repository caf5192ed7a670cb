use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

pub type Metadata = Map<String, Value>;

/// One stored window of a document's text.
///
/// Chunks are written once per ingestion and never updated; re-ingesting a
/// document under a new name supersedes them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentChunk {
    pub chunk_id: String,
    pub document_name: String,
    pub content: String,
    #[serde(rename = "chunkIndex")]
    pub index: usize,
    pub total_chunks: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub document_name: String,
    pub role: ChatRole,
    pub content: String,
    #[serde(default)]
    pub sources: Vec<String>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(document_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            document_name: document_name.into(),
            role: ChatRole::User,
            content: content.into(),
            sources: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(
        document_name: impl Into<String>,
        content: impl Into<String>,
        sources: Vec<String>,
    ) -> Self {
        Self {
            document_name: document_name.into(),
            role: ChatRole::Assistant,
            content: content.into(),
            sources,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RankingStrategy {
    Vector,
    Keyword,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalResult {
    pub content: String,
    pub chunk_index: usize,
    /// Cosine similarity in vector mode, match count in keyword mode.
    pub similarity: f64,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Retrieval {
    pub strategy: RankingStrategy,
    pub results: Vec<RetrievalResult>,
}

impl Retrieval {
    pub fn empty(strategy: RankingStrategy) -> Self {
        Self {
            strategy,
            results: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerResponse {
    pub answer: String,
    pub sources: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct MarketFindings {
    #[serde(default, deserialize_with = "lenient::strings")]
    pub key_insights: Vec<String>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub opportunities: Vec<String>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub threats: Vec<String>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub recommendations: Vec<String>,
}

impl MarketFindings {
    pub fn unparsed() -> Self {
        Self {
            key_insights: vec!["Unable to parse findings".to_string()],
            ..Self::default()
        }
    }
}

fn unknown() -> String {
    "Unknown".to_string()
}

/// Company facts pulled from a document. Model output is read leniently: a
/// field of the wrong shape is dropped rather than failing the whole record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StructuredData {
    #[serde(default = "unknown", deserialize_with = "lenient::string_or_unknown")]
    pub company_name: String,
    #[serde(default = "unknown", deserialize_with = "lenient::string_or_unknown")]
    pub industry: String,
    #[serde(
        default,
        deserialize_with = "lenient::optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub market_size: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::strings",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub competitors: Vec<String>,
    #[serde(
        default,
        deserialize_with = "lenient::object",
        skip_serializing_if = "Map::is_empty"
    )]
    pub key_metrics: Metadata,
    #[serde(
        default,
        deserialize_with = "lenient::optional_integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub founded_year: Option<i64>,
    #[serde(
        default,
        deserialize_with = "lenient::optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub headquarters: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient::optional_integer",
        skip_serializing_if = "Option::is_none"
    )]
    pub employee_count: Option<u64>,
    /// Fields the model emitted beyond the known schema.
    #[serde(flatten)]
    pub extra: Metadata,
}

impl StructuredData {
    pub fn unknown() -> Self {
        Self {
            company_name: unknown(),
            industry: unknown(),
            market_size: None,
            competitors: Vec::new(),
            key_metrics: Metadata::new(),
            founded_year: None,
            headquarters: None,
            employee_count: None,
            extra: Metadata::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SwotAnalysis {
    #[serde(default, deserialize_with = "lenient::strings")]
    pub strengths: Vec<String>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub weaknesses: Vec<String>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub opportunities: Vec<String>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub threats: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAnalysis {
    #[serde(default = "unknown", deserialize_with = "lenient::string_or_unknown")]
    pub company_name: String,
    #[serde(default = "unknown", deserialize_with = "lenient::string_or_unknown")]
    pub industry: String,
    #[serde(default, deserialize_with = "lenient::optional_string")]
    pub market_size: Option<String>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub competitors: Vec<String>,
    #[serde(flatten)]
    pub findings: MarketFindings,
    #[serde(default)]
    pub swot_analysis: SwotAnalysis,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ReportFigure {
    #[serde(default, deserialize_with = "lenient::string_or_empty")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient::string_or_empty")]
    pub value: String,
}

/// Summary, products, labelled figures, insights and trends read from the
/// full text of a market report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedReport {
    #[serde(default, deserialize_with = "lenient::string_or_empty")]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub products: Vec<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub figures: Vec<ReportFigure>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub key_insights: Vec<String>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub market_trends: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReportContent {
    /// Findings and structured data over a document's stored chunks.
    Analysis {
        findings: MarketFindings,
        structured: StructuredData,
    },
    /// A report extracted from the full source text, kept with that text.
    Extraction {
        report: ExtractedReport,
        #[serde(rename = "sourceText")]
        source_text: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReportRecord {
    pub id: String,
    pub document_name: String,
    pub content: ReportContent,
    pub created_at: DateTime<Utc>,
}

/// Deserializers that accept the loose shapes generative models emit.
mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::{Map, Value};

    pub fn string_or_unknown<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(text(Value::deserialize(deserializer)?).unwrap_or_else(super::unknown))
    }

    pub fn string_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(text(Value::deserialize(deserializer)?).unwrap_or_default())
    }

    pub fn optional_string<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<String>, D::Error> {
        Ok(text(Value::deserialize(deserializer)?))
    }

    /// An array keeps its textual items; a lone string becomes one item;
    /// anything else is empty.
    pub fn strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Array(items) => items.into_iter().filter_map(text).collect(),
            other => text(other).into_iter().collect(),
        })
    }

    pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    pub fn object<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Map<String, Value>, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Object(map) => map,
            _ => Map::new(),
        })
    }

    /// Integers, whole floats and numeric strings such as `"1,200"`.
    pub fn optional_integer<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: TryFrom<i64>,
    {
        Ok(integer(Value::deserialize(deserializer)?).and_then(|value| T::try_from(value).ok()))
    }

    fn text(value: Value) -> Option<String> {
        match value {
            Value::String(raw) => {
                let trimmed = raw.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }

    fn integer(value: Value) -> Option<i64> {
        let whole = |float: f64| (float.is_finite() && float.fract() == 0.0).then_some(float as i64);
        match value {
            Value::Number(number) => number.as_i64().or_else(|| number.as_f64().and_then(whole)),
            Value::String(raw) => {
                let digits: String = raw
                    .trim()
                    .chars()
                    .filter(|c| !matches!(c, ',' | '_' | ' '))
                    .collect();
                digits
                    .parse::<i64>()
                    .ok()
                    .or_else(|| digits.parse::<f64>().ok().and_then(whole))
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionProgress {
    pub current_page: u32,
    pub total_pages: u32,
    pub percentage: u32,
}

impl ExtractionProgress {
    pub fn new(current_page: u32, total_pages: u32) -> Self {
        let percentage = if total_pages == 0 {
            100
        } else {
            (f64::from(current_page) / f64::from(total_pages) * 100.0).round() as u32
        };

        Self {
            current_page,
            total_pages,
            percentage,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageText {
    pub number: u32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub page_count: u32,
    pub window_pages: u32,
    pub elapsed: Duration,
    /// Hex sha256 of the source bytes, when they were read from a location.
    pub checksum: Option<String>,
    /// Document properties from the source, such as `Title` or `Author`.
    pub info: Metadata,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Store chunks without embeddings; retrieval then ranks by keywords.
    pub embed: bool,
    /// Number of chunks embedded at once. 1 keeps ingestion sequential.
    pub embed_concurrency: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            embed: true,
            embed_concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionSummary {
    pub document_name: String,
    pub chunk_count: usize,
    pub embedded: bool,
    pub page_count: Option<u32>,
}
