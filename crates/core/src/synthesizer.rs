use crate::config::RetrievalOptions;
use crate::embeddings::truncate_chars;
use crate::error::{SearchError, SynthesisError};
use crate::models::{
    AnswerResponse, DocumentAnalysis, ExtractedReport, MarketFindings, RankingStrategy, Retrieval,
    StructuredData,
};
use crate::retriever::Retriever;
use crate::traits::GenerativeModel;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{info, warn};

pub const INSUFFICIENT_INFORMATION: &str =
    "I don't have enough information to answer this question based on the provided documents.";

const FINDINGS_QUERY: &str = "market research findings opportunities threats analysis";
const STRUCTURED_QUERY: &str = "company information metrics data statistics";
const TRUNCATION_MARKER: &str = "\n\n[Document truncated for analysis]";

/// Finds the first `{` and the `}` that closes it, skipping braces inside
/// JSON string literals. Returns `None` when the braces never balance.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

pub fn parse_model_json<T: DeserializeOwned>(response: &str) -> Result<T, SynthesisError> {
    let object = extract_json_object(response)
        .ok_or_else(|| SynthesisError::Parse("no balanced JSON object in response".to_string()))?;
    serde_json::from_str(object).map_err(|error| SynthesisError::Parse(error.to_string()))
}

fn numbered_context(retrieval: &Retrieval) -> String {
    retrieval
        .results
        .iter()
        .enumerate()
        .map(|(position, result)| format!("[{}] {}", position + 1, result.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn plain_context(retrieval: &Retrieval) -> String {
    retrieval
        .results
        .iter()
        .map(|result| result.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn answer_prompt(question: &str, context: &str) -> String {
    format!(
        "You are an AI Market Analyst. Answer the following question based on the provided context from market research documents.

Context:
{context}

Question: {question}

Answer strictly from the context above. If the context doesn't contain enough information, say so. Cite which context sections you used (e.g., [1], [2])."
    )
}

fn findings_prompt(context: &str) -> String {
    format!(
        "You are an AI Market Analyst. Analyze the following market research document and provide structured findings.

Document Content:
{context}

Provide a comprehensive analysis in the following format:

KEY INSIGHTS:
- List 3-5 key insights from the research

OPPORTUNITIES:
- List 3-5 market opportunities identified

THREATS:
- List 3-5 potential threats or challenges

RECOMMENDATIONS:
- List 3-5 strategic recommendations

Format your response as a JSON object with keys: keyInsights, opportunities, threats, recommendations (each as an array of strings)."
    )
}

fn structured_prompt(context: &str) -> String {
    format!(
        "You are an AI Market Analyst. Extract structured data from the following market research document.

Document Content:
{context}

Extract and return a JSON object with the following information:
- companyName: string
- industry: string
- marketSize: string (if available)
- competitors: array of competitor names
- keyMetrics: object with any numerical metrics found (revenue, growth rate, market share, etc.)
- foundedYear: number (if available)
- headquarters: string (if available)
- employeeCount: number (if available)

Only include fields where you find clear information. Return valid JSON."
    )
}

fn analysis_prompt(content: &str) -> String {
    format!(
        r#"You are an AI Market Analyst. Analyze the following market research document and provide comprehensive insights.

Document Content:
{content}

Provide your analysis in the following JSON format:
{{
  "companyName": "string",
  "industry": "string",
  "marketSize": "string (if available)",
  "competitors": ["array of competitor names"],
  "keyInsights": ["3-5 key insights from the research"],
  "opportunities": ["3-5 market opportunities identified"],
  "threats": ["3-5 potential threats or challenges"],
  "recommendations": ["3-5 strategic recommendations"],
  "swotAnalysis": {{
    "strengths": ["3-5 company strengths"],
    "weaknesses": ["3-5 company weaknesses"],
    "opportunities": ["3-5 market opportunities"],
    "threats": ["3-5 external threats"]
  }}
}}

Return ONLY valid JSON, no additional text."#
    )
}

fn report_prompt(content: &str) -> String {
    format!(
        r#"You are an expert market research analyst. Read the following market report and extract its key information.

Report Content:
{content}

Return the result in the following JSON format:
{{
  "summary": "a concise summary of the report",
  "products": ["products or services discussed"],
  "figures": [{{"label": "what the figure measures", "value": "the figure as written"}}],
  "keyInsights": ["the most important insights"],
  "marketTrends": ["market trends identified in the report"]
}}

Return ONLY valid JSON, no additional text."#
    )
}

fn source_preview(content: &str, max_chars: usize) -> String {
    let preview = truncate_chars(content, max_chars);
    if preview.len() < content.len() {
        format!("{preview}...")
    } else {
        preview.to_string()
    }
}

/// Grounded answers, findings and structured data over one document's chunks.
#[derive(Clone)]
pub struct Synthesizer {
    retriever: Retriever,
    model: Arc<dyn GenerativeModel>,
    options: RetrievalOptions,
}

impl Synthesizer {
    pub fn new(
        retriever: Retriever,
        model: Arc<dyn GenerativeModel>,
        options: RetrievalOptions,
    ) -> Self {
        Self {
            retriever,
            model,
            options,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Answers `question` from the top chunks of `document_name`.
    ///
    /// With nothing retrieved the model is not called and a fixed
    /// insufficient-information answer with zero confidence is returned.
    pub async fn answer(
        &self,
        question: &str,
        document_name: &str,
    ) -> Result<AnswerResponse, SearchError> {
        let retrieval = self
            .retriever
            .retrieve(question, document_name, self.options.answer_top_k)
            .await?;

        if retrieval.is_empty() {
            info!(document = document_name, "no context retrieved, skipping generation");
            return Ok(AnswerResponse {
                answer: INSUFFICIENT_INFORMATION.to_string(),
                sources: Vec::new(),
                confidence: 0.0,
            });
        }

        let prompt = answer_prompt(question, &numbered_context(&retrieval));
        let answer = self.model.generate(&prompt).await?;

        Ok(AnswerResponse {
            answer,
            sources: retrieval
                .results
                .iter()
                .map(|result| source_preview(&result.content, self.options.source_preview_chars))
                .collect(),
            confidence: self.confidence(&retrieval),
        })
    }

    /// Mean similarity in vector mode. Keyword counts are not comparable to a
    /// probability, so keyword mode reports a fixed value.
    fn confidence(&self, retrieval: &Retrieval) -> f64 {
        match retrieval.strategy {
            RankingStrategy::Keyword => self.options.keyword_confidence,
            RankingStrategy::Vector => {
                let total: f64 = retrieval.results.iter().map(|result| result.similarity).sum();
                total / retrieval.results.len() as f64
            }
        }
    }

    pub async fn findings(&self, document_name: &str) -> Result<MarketFindings, SearchError> {
        let retrieval = self
            .retriever
            .retrieve(FINDINGS_QUERY, document_name, self.options.findings_top_k)
            .await?;

        if retrieval.is_empty() {
            warn!(document = document_name, "no chunks for findings");
            return Ok(MarketFindings::unparsed());
        }

        let response = self
            .model
            .generate(&findings_prompt(&plain_context(&retrieval)))
            .await?;

        Ok(parse_model_json(&response).unwrap_or_else(|error| {
            warn!(document = document_name, %error, "findings response unparseable");
            MarketFindings::unparsed()
        }))
    }

    pub async fn structured_data(&self, document_name: &str) -> Result<StructuredData, SearchError> {
        let retrieval = self
            .retriever
            .retrieve(STRUCTURED_QUERY, document_name, self.options.structured_top_k)
            .await?;

        if retrieval.is_empty() {
            warn!(document = document_name, "no chunks for structured extraction");
            return Ok(StructuredData::unknown());
        }

        let response = self
            .model
            .generate(&structured_prompt(&plain_context(&retrieval)))
            .await?;

        Ok(parse_model_json(&response).unwrap_or_else(|error| {
            warn!(document = document_name, %error, "structured response unparseable");
            StructuredData::unknown()
        }))
    }

    /// One-shot analysis of raw document text, without retrieval. Text above
    /// the configured size is cut and marked as truncated.
    pub async fn analyze_document(&self, text: &str) -> Result<DocumentAnalysis, SearchError> {
        let body = self.bounded_document(text)?;
        let response = self.model.generate(&analysis_prompt(&body)).await?;
        Ok(parse_model_json(&response)?)
    }

    /// Extracts summary, products, figures, insights and trends from the full
    /// text of a report. Unlike the retrieval-backed operations an
    /// unparseable response is an error, not a fallback.
    pub async fn extract_report(&self, text: &str) -> Result<ExtractedReport, SearchError> {
        let body = self.bounded_document(text)?;
        let response = self.model.generate(&report_prompt(&body)).await?;
        Ok(parse_model_json(&response)?)
    }

    fn bounded_document(&self, text: &str) -> Result<String, SearchError> {
        let content = text.trim();
        if content.is_empty() {
            return Err(SearchError::InvalidQuery(
                "no content found in the document".to_string(),
            ));
        }

        let truncated = truncate_chars(content, self.options.analysis_max_chars);
        if truncated.len() < content.len() {
            info!(
                original_chars = content.chars().count(),
                kept_chars = self.options.analysis_max_chars,
                "document truncated for analysis"
            );
            Ok(format!("{truncated}{TRUNCATION_MARKER}"))
        } else {
            Ok(truncated.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmbeddingOptions, RetrievalMode};
    use crate::embeddings::{CharacterNgramEmbedder, Embedder};
    use crate::error::GenerationError;
    use crate::models::{DocumentChunk, Metadata};
    use crate::stores::MemoryStore;
    use crate::traits::DocumentStore;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::Mutex;

    struct ScriptedModel {
        response: String,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedModel {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl GenerativeModel for ScriptedModel {
        async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.response.clone())
        }
    }

    struct FailingModel;

    #[async_trait]
    impl GenerativeModel for FailingModel {
        async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
            Err(GenerationError::ProviderResponse {
                provider: "test".to_string(),
                details: "quota exceeded".to_string(),
            })
        }
    }

    fn chunk(index: usize, content: &str, embedding: Option<Vec<f32>>) -> DocumentChunk {
        DocumentChunk {
            chunk_id: format!("doc-{index}"),
            document_name: "doc".to_string(),
            content: content.to_string(),
            index,
            total_chunks: 2,
            embedding,
            metadata: Metadata::new(),
            created_at: Utc::now(),
        }
    }

    fn synthesizer(store: Arc<MemoryStore>, model: Arc<dyn GenerativeModel>) -> Synthesizer {
        let embedder = Embedder::new(
            Arc::new(CharacterNgramEmbedder::default()),
            EmbeddingOptions::default(),
        );
        let retriever = Retriever::new(embedder, store, RetrievalMode::Auto);
        Synthesizer::new(retriever, model, RetrievalOptions::default())
    }

    #[test]
    fn json_is_isolated_from_fences_and_prose() {
        let response = "Here is the result:\n```json\n{\"a\":1}\n```\nThanks!";
        assert_eq!(extract_json_object(response), Some("{\"a\":1}"));
    }

    #[test]
    fn json_extraction_stops_at_the_matching_brace() {
        let response = "{\"a\":{\"b\":\"}\"}} trailing {\"c\":2}";
        assert_eq!(extract_json_object(response), Some("{\"a\":{\"b\":\"}\"}}"));
    }

    #[test]
    fn escaped_quotes_do_not_end_strings() {
        let response = r#"{"quote":"she said \"{\""} done"#;
        assert_eq!(extract_json_object(response), Some(r#"{"quote":"she said \"{\""}"#));
    }

    #[test]
    fn unbalanced_json_is_a_parse_failure() {
        assert_eq!(extract_json_object("{\"a\":1"), None);
        assert!(matches!(
            parse_model_json::<serde_json::Value>("{\"a\":1"),
            Err(SynthesisError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn answer_without_context_skips_the_model() {
        let model = ScriptedModel::new("should not be used");
        let synthesizer = synthesizer(Arc::new(MemoryStore::new()), model.clone());

        let response = synthesizer.answer("What is X?", "doc2").await.unwrap();

        assert_eq!(response.answer, INSUFFICIENT_INFORMATION);
        assert!(response.sources.is_empty());
        assert_eq!(response.confidence, 0.0);
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn keyword_answers_have_fixed_confidence_and_numbered_context() {
        let store = Arc::new(MemoryStore::new());
        let long = format!("Revenue reached $4B. {}", "detail ".repeat(40));
        store
            .put_chunks(&[chunk(0, &long, None), chunk(1, "revenue growth slowed", None)])
            .await
            .unwrap();
        let model = ScriptedModel::new("Revenue was $4B [1].");

        let response = synthesizer(store, model.clone())
            .answer("revenue", "doc")
            .await
            .unwrap();

        assert_eq!(response.answer, "Revenue was $4B [1].");
        assert_eq!(response.confidence, 0.8);
        assert_eq!(response.sources.len(), 2);
        assert_eq!(response.sources[0].chars().count(), 103);
        assert!(response.sources[0].ends_with("..."));
        assert_eq!(response.sources[1], "revenue growth slowed");

        let prompt = model.last_prompt();
        assert!(prompt.contains("[1] Revenue reached $4B."));
        assert!(prompt.contains("[2] revenue growth slowed"));
        assert!(prompt.contains("Question: revenue"));
    }

    #[tokio::test]
    async fn vector_answers_report_mean_similarity() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_chunks(&[
                chunk(0, "alpha", Some(vec![1.0, 0.0])),
                chunk(1, "beta", Some(vec![0.0, 1.0])),
            ])
            .await
            .unwrap();
        let synthesizer = synthesizer(store, ScriptedModel::new("answer"));

        let retrieval = Retrieval {
            strategy: RankingStrategy::Vector,
            results: vec![
                crate::models::RetrievalResult {
                    content: "alpha".to_string(),
                    chunk_index: 0,
                    similarity: 0.9,
                    metadata: Metadata::new(),
                },
                crate::models::RetrievalResult {
                    content: "beta".to_string(),
                    chunk_index: 1,
                    similarity: 0.5,
                    metadata: Metadata::new(),
                },
            ],
        };
        assert!((synthesizer.confidence(&retrieval) - 0.7).abs() < 1e-12);
    }

    #[tokio::test]
    async fn findings_are_parsed_from_fenced_json() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_chunks(&[chunk(0, "market opportunities and threats", None)])
            .await
            .unwrap();
        let model = ScriptedModel::new(
            "Sure!\n```json\n{\"keyInsights\":[\"growing\"],\"opportunities\":[\"asia\"],\"threats\":[],\"recommendations\":[\"expand\"]}\n```",
        );

        let findings = synthesizer(store, model).findings("doc").await.unwrap();

        assert_eq!(findings.key_insights, vec!["growing".to_string()]);
        assert_eq!(findings.opportunities, vec!["asia".to_string()]);
        assert_eq!(findings.recommendations, vec!["expand".to_string()]);
    }

    #[tokio::test]
    async fn unparseable_findings_fall_back() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_chunks(&[chunk(0, "market analysis", None)])
            .await
            .unwrap();
        let model = ScriptedModel::new("{\"keyInsights\": [\"cut off");

        let findings = synthesizer(store, model).findings("doc").await.unwrap();
        assert_eq!(findings, MarketFindings::unparsed());
    }

    #[tokio::test]
    async fn findings_without_chunks_do_not_call_the_model() {
        let model = ScriptedModel::new("{}");
        let findings = synthesizer(Arc::new(MemoryStore::new()), model.clone())
            .findings("doc")
            .await
            .unwrap();
        assert_eq!(findings, MarketFindings::unparsed());
        assert_eq!(model.calls(), 0);
    }

    #[tokio::test]
    async fn structured_data_falls_back_to_unknown() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_chunks(&[chunk(0, "company information and statistics", None)])
            .await
            .unwrap();

        let parsed = synthesizer(
            store.clone(),
            ScriptedModel::new(
                "{\"companyName\":\"Acme\",\"industry\":\"Robotics\",\"competitors\":[\"Initech\"],\"foundedYear\":1999}",
            ),
        )
        .structured_data("doc")
        .await
        .unwrap();
        assert_eq!(parsed.company_name, "Acme");
        assert_eq!(parsed.competitors, vec!["Initech".to_string()]);
        assert_eq!(parsed.founded_year, Some(1999));

        let fallback = synthesizer(store, ScriptedModel::new("no json here"))
            .structured_data("doc")
            .await
            .unwrap();
        assert_eq!(fallback, StructuredData::unknown());
    }

    #[tokio::test]
    async fn analysis_truncates_long_documents() {
        let model = ScriptedModel::new(
            "{\"companyName\":\"Acme\",\"industry\":\"Retail\",\"keyInsights\":[\"a\"],\"swotAnalysis\":{\"strengths\":[\"brand\"]}}",
        );
        let mut options = RetrievalOptions::default();
        options.analysis_max_chars = 10;
        let embedder = Embedder::new(
            Arc::new(CharacterNgramEmbedder::default()),
            EmbeddingOptions::default(),
        );
        let retriever = Retriever::new(embedder, Arc::new(MemoryStore::new()), RetrievalMode::Auto);
        let synthesizer = Synthesizer::new(retriever, model.clone(), options);

        let analysis = synthesizer
            .analyze_document("0123456789abcdef")
            .await
            .unwrap();

        assert_eq!(analysis.company_name, "Acme");
        assert_eq!(analysis.findings.key_insights, vec!["a".to_string()]);
        assert_eq!(analysis.swot_analysis.strengths, vec!["brand".to_string()]);
        let prompt = model.last_prompt();
        assert!(prompt.contains("0123456789\n\n[Document truncated for analysis]"));
        assert!(!prompt.contains("abcdef"));
    }

    #[tokio::test]
    async fn analysis_of_blank_text_is_rejected() {
        let synthesizer = synthesizer(Arc::new(MemoryStore::new()), ScriptedModel::new("{}"));
        assert!(matches!(
            synthesizer.analyze_document("  \n").await,
            Err(SearchError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn lenient_structured_fields_keep_the_company() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_chunks(&[chunk(0, "company information and statistics", None)])
            .await
            .unwrap();
        let model = ScriptedModel::new(
            r#"{"companyName":"Acme","industry":"Retail","foundedYear":"1999","employeeCount":5000.0,"competitors":null}"#,
        );

        let parsed = synthesizer(store, model).structured_data("doc").await.unwrap();
        assert_eq!(parsed.company_name, "Acme");
        assert_eq!(parsed.industry, "Retail");
        assert_eq!(parsed.founded_year, Some(1999));
        assert_eq!(parsed.employee_count, Some(5000));
        assert!(parsed.competitors.is_empty());
    }

    #[tokio::test]
    async fn generation_failures_propagate_when_context_exists() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_chunks(&[chunk(0, "company market analysis statistics", None)])
            .await
            .unwrap();
        let synthesizer = synthesizer(store, Arc::new(FailingModel));

        assert!(matches!(
            synthesizer.answer("What does the company sell?", "doc").await,
            Err(SearchError::Synthesis(SynthesisError::Generation(_)))
        ));
        assert!(matches!(
            synthesizer.findings("doc").await,
            Err(SearchError::Synthesis(SynthesisError::Generation(_)))
        ));
        assert!(matches!(
            synthesizer.structured_data("doc").await,
            Err(SearchError::Synthesis(SynthesisError::Generation(_)))
        ));
        assert!(matches!(
            synthesizer.extract_report("Widget sales grew 7%.").await,
            Err(SearchError::Synthesis(SynthesisError::Generation(_)))
        ));
    }

    #[tokio::test]
    async fn reports_are_extracted_from_full_text() {
        let model = ScriptedModel::new(
            r#"Sure:
```json
{"summary":"Widgets grow.","products":["Widget X"],"figures":[{"label":"CAGR","value":"7%"}],
 "keyInsights":["Demand up"],"marketTrends":["Automation"]}
```"#,
        );
        let synthesizer = synthesizer(Arc::new(MemoryStore::new()), model.clone());

        let report = synthesizer
            .extract_report("Widget X sales grew 7% a year.")
            .await
            .unwrap();

        assert_eq!(report.summary, "Widgets grow.");
        assert_eq!(report.products, vec!["Widget X".to_string()]);
        assert_eq!(report.figures[0].value, "7%");
        assert_eq!(report.market_trends, vec!["Automation".to_string()]);
        assert!(model.last_prompt().contains("Widget X sales grew 7% a year."));
    }

    #[tokio::test]
    async fn unparseable_reports_are_errors() {
        let synthesizer = synthesizer(Arc::new(MemoryStore::new()), ScriptedModel::new("sorry"));
        assert!(matches!(
            synthesizer.extract_report("Widget sales grew.").await,
            Err(SearchError::Synthesis(SynthesisError::Parse(_)))
        ));
        assert!(matches!(
            synthesizer.extract_report("   ").await,
            Err(SearchError::InvalidQuery(_))
        ));
    }
}
