use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::Utc;
use clap::{ArgGroup, Parser, Subcommand};
use doc_analyst_core::{
    clean_extracted_text, split_into_sections, estimate_processing_time, CharacterNgramEmbedder, DocumentAnalyst,
    DocumentExtractor, EmbeddingProvider, ExtractionOptions, FileStore, GeminiEmbeddingProvider,
    GeminiGenerativeModel, GenerationError, GenerativeModel, Metadata, OcrClient,
    OcrEndpointConfig, PipelineConfig, ProviderConfig, SourceLocation, DEFAULT_SECTION_CHARS,
    DEFAULT_SECTION_OVERLAP,
};
use serde_json::Value;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "doc-analyst", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the chunk, chat and report collections.
    #[arg(long, env = "DOC_ANALYST_DATA_DIR", default_value = ".doc-analyst")]
    data_dir: PathBuf,

    /// API key for the hosted embedding and generation models.
    #[arg(long, env = "GOOGLE_GENERATIVE_AI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Embedding model name.
    #[arg(long)]
    embedding_model: Option<String>,

    /// Generation model name.
    #[arg(long)]
    generation_model: Option<String>,

    /// Embed with the local trigram embedder and disable generation.
    #[arg(long, default_value_t = false)]
    offline: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Chunk, embed and store a document or a folder of PDFs.
    #[command(group(ArgGroup::new("input").required(true).args(["file", "folder"])))]
    Ingest {
        /// PDF or plain-text file.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Folder searched recursively for PDFs.
        #[arg(long)]
        folder: Option<PathBuf>,
        /// Document name; generated when omitted.
        #[arg(long)]
        name: Option<String>,
        /// Store chunks without embeddings; questions use keyword ranking.
        #[arg(long, default_value_t = false)]
        no_embed: bool,
        #[arg(long, default_value = "1000")]
        chunk_size: usize,
        #[arg(long, default_value = "200")]
        chunk_overlap: usize,
        /// Chunks embedded at the same time.
        #[arg(long, default_value = "1")]
        concurrency: usize,
    },
    /// Ask a question about one document.
    Ask {
        #[arg(long)]
        document: String,
        question: String,
    },
    /// Summarize insights, opportunities, threats and recommendations.
    Findings {
        #[arg(long)]
        document: String,
    },
    /// Extract company facts as JSON.
    Extract {
        #[arg(long)]
        document: String,
    },
    /// One-shot analysis of a file, including SWOT, without storing it.
    Analyze {
        #[arg(long)]
        file: PathBuf,
    },
    /// Print the conversation recorded for a document.
    History {
        #[arg(long)]
        document: String,
    },
    /// Run findings and extraction together and save the result.
    Report {
        #[arg(long)]
        document: String,
    },
    /// Extract summary, products, figures, insights and trends from a file
    /// and save them with its text.
    ExtractReport {
        #[arg(long)]
        file: PathBuf,
        /// Report name; defaults to the file stem.
        #[arg(long)]
        name: Option<String>,
    },
    /// List saved reports, newest first, or print one by id.
    Reports {
        #[arg(long)]
        id: Option<String>,
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Print the stored chunks of a document.
    Chunks {
        #[arg(long)]
        document: String,
        /// Characters of each chunk to print.
        #[arg(long, default_value = "120")]
        preview: usize,
    },
}

/// Stand-in used with `--offline`; any generation attempt fails.
struct OfflineModel;

#[async_trait]
impl GenerativeModel for OfflineModel {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::MissingCredential(
            "generation is disabled in offline mode".to_string(),
        ))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        data_dir = %cli.data_dir.display(),
        "doc-analyst boot"
    );

    let provider_config = provider_config(&cli);
    let mut config = PipelineConfig::default();
    config.extraction.request_timeout = provider_config.request_timeout;

    if let Command::Ingest {
        no_embed,
        chunk_size,
        chunk_overlap,
        concurrency,
        ..
    } = &cli.command
    {
        config.ingestion.embed = !no_embed;
        config.ingestion.chunk_size = *chunk_size;
        config.ingestion.chunk_overlap = *chunk_overlap;
        config.ingestion.embed_concurrency = *concurrency;
    }

    let (embedder, model): (Arc<dyn EmbeddingProvider>, Arc<dyn GenerativeModel>) = if cli.offline
    {
        (Arc::new(CharacterNgramEmbedder::default()), Arc::new(OfflineModel))
    } else {
        if provider_config.api_key.is_none() {
            bail!("set GOOGLE_GENERATIVE_AI_API_KEY, pass --api-key, or use --offline");
        }
        (
            Arc::new(GeminiEmbeddingProvider::new(&provider_config)?),
            Arc::new(GeminiGenerativeModel::new(&provider_config)?),
        )
    };

    let store = Arc::new(
        FileStore::open(&cli.data_dir)
            .await
            .with_context(|| format!("opening data directory {}", cli.data_dir.display()))?,
    );
    let analyst = DocumentAnalyst::new(
        embedder,
        model,
        store,
        build_extractor(&config.extraction, &provider_config)?,
        config.clone(),
    );

    match cli.command {
        Command::Ingest {
            file, folder, name, ..
        } => {
            if let Some(folder) = folder {
                let report = analyst.ingest_folder(&folder).await?;
                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                }
                info!(
                    folder = %folder.display(),
                    ingested = report.ingested.len(),
                    skipped = report.skipped_files.len(),
                    "folder ingested"
                );
                print_json(&report.ingested)?;
            } else if let Some(file) = file {
                let summary = if is_pdf(&file) {
                    let size = tokio::fs::metadata(&file).await?.len();
                    let estimate = estimate_processing_time(size);
                    info!(file = %file.display(), seconds = estimate.seconds, "{}", estimate.message);

                    analyst
                        .ingest_pdf(&SourceLocation::Path(file), name.as_deref(), log_progress)
                        .await?
                } else {
                    let text = tokio::fs::read_to_string(&file)
                        .await
                        .with_context(|| format!("reading {}", file.display()))?;
                    let mut metadata = Metadata::new();
                    metadata.insert("source".to_string(), Value::from(file.display().to_string()));
                    analyst.ingest_text(name.as_deref(), &text, metadata).await?
                };
                print_json(&summary)?;
            }
        }
        Command::Ask { document, question } => {
            print_json(&analyst.ask(&question, &document).await?)?;
        }
        Command::Findings { document } => {
            print_json(&analyst.findings(&document).await?)?;
        }
        Command::Extract { document } => {
            print_json(&analyst.structured_data(&document).await?)?;
        }
        Command::Analyze { file } => {
            let text = read_document(&file, &config.extraction, &provider_config).await?;
            print_json(&analyst.analyze_document(&text).await?)?;
        }
        Command::ExtractReport { file, name } => {
            let text = read_document(&file, &config.extraction, &provider_config).await?;
            let sections =
                split_into_sections(&text, DEFAULT_SECTION_CHARS, DEFAULT_SECTION_OVERLAP);
            info!(
                file = %file.display(),
                chars = text.chars().count(),
                sections = sections.len(),
                "extracting report"
            );
            let name = name.unwrap_or_else(|| file_stem(&file));
            print_json(&analyst.extract_report(&name, &text).await?)?;
        }
        Command::History { document } => {
            print_json(&analyst.history(&document).await)?;
        }
        Command::Report { document } => {
            print_json(&analyst.create_report(&document).await?)?;
        }
        Command::Reports { id, limit } => match id {
            Some(id) => print_json(&analyst.get_report(&id).await?)?,
            None => print_json(&analyst.list_reports(limit).await?)?,
        },
        Command::Chunks { document, preview } => {
            let chunks = analyst.chunks(&document).await?;
            if chunks.is_empty() {
                println!("no chunks stored for {document}");
            }
            for chunk in chunks {
                let text: String = chunk.content.chars().take(preview).collect();
                println!(
                    "[{}/{}] embedded={} {}",
                    chunk.index + 1,
                    chunk.total_chunks,
                    chunk.embedding.is_some(),
                    text.replace('\n', " ")
                );
            }
        }
    }

    Ok(())
}

fn provider_config(cli: &Cli) -> ProviderConfig {
    let mut config = ProviderConfig::from_env();
    if let Some(api_key) = &cli.api_key {
        config = config.with_api_key(api_key.as_str());
    }
    if let Some(model) = &cli.embedding_model {
        config.embedding_model = model.clone();
    }
    if let Some(model) = &cli.generation_model {
        config.generation_model = model.clone();
    }
    config
}

fn build_extractor(
    options: &ExtractionOptions,
    provider: &ProviderConfig,
) -> anyhow::Result<DocumentExtractor> {
    let extractor = DocumentExtractor::new(options.clone())?;
    Ok(match OcrEndpointConfig::from_env() {
        Some(ocr) => {
            info!(endpoint = %ocr.endpoint, "OCR fallback enabled");
            extractor.with_ocr(OcrClient::new(ocr, provider.request_timeout)?)
        }
        None => extractor,
    })
}

/// Reads a PDF through the extractor and cleans it, or reads plain text as is.
async fn read_document(
    file: &Path,
    options: &ExtractionOptions,
    provider: &ProviderConfig,
) -> anyhow::Result<String> {
    if is_pdf(file) {
        let extractor = build_extractor(options, provider)?;
        let extracted = extractor
            .extract_pdf(&SourceLocation::Path(file.to_path_buf()), log_progress)
            .await?;
        Ok(clean_extracted_text(&extracted.text)?)
    } else {
        tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("reading {}", file.display()))
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "report".to_string())
}

fn log_progress(progress: doc_analyst_core::ExtractionProgress) -> ControlFlow<()> {
    info!(
        page = progress.current_page,
        total = progress.total_pages,
        "extracting {}%",
        progress.percentage
    );
    ControlFlow::Continue(())
}

fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
