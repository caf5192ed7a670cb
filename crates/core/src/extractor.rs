use crate::config::ExtractionOptions;
use crate::error::ExtractionError;
use crate::models::{ExtractedDocument, ExtractionProgress, Metadata, PageText};
use crate::ocr::OcrClient;
use crate::traits::PageSource;
use async_trait::async_trait;
use lopdf::{Document, Object};
use reqwest::Client;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

const PAGE_SEPARATOR: &str = "\n\n";

/// A PDF parsed with lopdf, kept whole in memory while pages are read.
pub struct LopdfSource {
    document: Arc<Document>,
    page_count: u32,
    byte_len: u64,
    info: Metadata,
}

impl LopdfSource {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ExtractionError> {
        if bytes.is_empty() {
            return Err(ExtractionError::EmptySource("pdf buffer is empty".to_string()));
        }

        let document =
            Document::load_mem(bytes).map_err(|error| ExtractionError::PdfParse(error.to_string()))?;
        let page_count = document.get_pages().len() as u32;

        if page_count == 0 {
            return Err(ExtractionError::EmptySource("pdf has no pages".to_string()));
        }

        let info = document_info(&document);
        Ok(Self {
            document: Arc::new(document),
            page_count,
            byte_len: bytes.len() as u64,
            info,
        })
    }
}

#[async_trait]
impl PageSource for LopdfSource {
    fn page_count(&self) -> u32 {
        self.page_count
    }

    fn byte_len(&self) -> u64 {
        self.byte_len
    }

    fn info(&self) -> Metadata {
        self.info.clone()
    }

    async fn page_text(&self, page: u32) -> Result<String, ExtractionError> {
        if page == 0 || page > self.page_count {
            return Err(ExtractionError::Page {
                page,
                details: format!("page is outside 1..={}", self.page_count),
            });
        }

        let document = Arc::clone(&self.document);
        tokio::task::spawn_blocking(move || document.extract_text(&[page]))
            .await
            .map_err(|error| ExtractionError::Page {
                page,
                details: error.to_string(),
            })?
            .map_err(|error| ExtractionError::Page {
                page,
                details: error.to_string(),
            })
    }
}

/// String entries of the trailer's Info dictionary (Title, Author, Producer...).
fn document_info(document: &Document) -> Metadata {
    let mut info = Metadata::new();
    let dictionary = match document.trailer.get(b"Info") {
        Ok(Object::Reference(id)) => document.get_object(*id).and_then(Object::as_dict),
        Ok(object) => object.as_dict(),
        Err(error) => Err(error),
    };

    let Ok(dictionary) = dictionary else {
        return info;
    };

    for (key, value) in dictionary.iter() {
        if let Object::String(bytes, _) = value {
            let text = decode_pdf_string(bytes);
            if !text.trim().is_empty() {
                info.insert(
                    String::from_utf8_lossy(key).into_owned(),
                    Value::from(text.trim()),
                );
            }
        }
    }
    info
}

/// UTF-16BE when the string carries a byte order mark, single-byte otherwise.
fn decode_pdf_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&byte| char::from(byte)).collect(),
    }
}

/// Where the bytes of a PDF come from.
#[derive(Debug, Clone)]
pub enum SourceLocation {
    Bytes { name: String, bytes: Arc<Vec<u8>> },
    Path(PathBuf),
    Url(Url),
}

impl SourceLocation {
    pub fn bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::Bytes {
            name: name.into(),
            bytes: Arc::new(bytes),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Bytes { name, .. } => name.clone(),
            Self::Path(path) => path.to_string_lossy().to_string(),
            Self::Url(url) => url.to_string(),
        }
    }

    /// Loads the source, failing with `TooLarge` before buffering anything
    /// whose known size exceeds `limit`. Remote bodies without a length are
    /// cut off as soon as they pass the limit.
    async fn read(&self, client: &Client, limit: u64) -> Result<Arc<Vec<u8>>, ExtractionError> {
        match self {
            Self::Bytes { bytes, .. } => {
                check_size(bytes.len() as u64, limit)?;
                Ok(Arc::clone(bytes))
            }
            Self::Path(path) => {
                check_size(tokio::fs::metadata(path).await?.len(), limit)?;
                Ok(Arc::new(tokio::fs::read(path).await?))
            }
            Self::Url(url) => {
                let mut response = client.get(url.clone()).send().await?.error_for_status()?;
                if let Some(length) = response.content_length() {
                    check_size(length, limit)?;
                }

                let mut bytes = Vec::new();
                while let Some(chunk) = response.chunk().await? {
                    check_size((bytes.len() + chunk.len()) as u64, limit)?;
                    bytes.extend_from_slice(&chunk);
                }
                Ok(Arc::new(bytes))
            }
        }
    }
}

fn check_size(size: u64, limit: u64) -> Result<(), ExtractionError> {
    if size > limit {
        return Err(ExtractionError::TooLarge { size, limit });
    }
    Ok(())
}

/// Pulls text out of paginated sources a window of pages at a time.
///
/// Pages inside one window are read concurrently; windows run one after the
/// other so only one window of page text is in flight. Progress for a window
/// is reported in page order once the whole window has been read.
pub struct DocumentExtractor {
    options: ExtractionOptions,
    client: Client,
    ocr: Option<OcrClient>,
}

impl DocumentExtractor {
    pub fn new(options: ExtractionOptions) -> Result<Self, ExtractionError> {
        Ok(Self {
            client: Client::builder().timeout(options.request_timeout).build()?,
            options,
            ocr: None,
        })
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_ocr(mut self, ocr: OcrClient) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn options(&self) -> &ExtractionOptions {
        &self.options
    }

    /// Reads every page at once and returns after the last one.
    pub async fn extract_all<F>(
        &self,
        source: Arc<dyn PageSource>,
        observer: F,
    ) -> Result<ExtractedDocument, ExtractionError>
    where
        F: FnMut(ExtractionProgress) -> ControlFlow<()>,
    {
        let window = source.page_count().max(1);
        self.run(source, window, observer).await
    }

    /// Reads the source in windows sized by [`ExtractionOptions::window_for`].
    pub async fn extract_windowed<F>(
        &self,
        source: Arc<dyn PageSource>,
        observer: F,
    ) -> Result<ExtractedDocument, ExtractionError>
    where
        F: FnMut(ExtractionProgress) -> ControlFlow<()>,
    {
        let window = self.options.window_for(source.byte_len());
        self.run(source, window, observer).await
    }

    /// Loads a PDF from `location` and extracts it window by window, falling
    /// back to OCR when the text layer is missing and an OCR client is set.
    pub async fn extract_pdf<F>(
        &self,
        location: &SourceLocation,
        observer: F,
    ) -> Result<ExtractedDocument, ExtractionError>
    where
        F: FnMut(ExtractionProgress) -> ControlFlow<()>,
    {
        let name = location.name();
        let bytes = location
            .read(&self.client, self.options.max_source_bytes)
            .await?;
        let checksum = digest_bytes(&bytes);

        let loaded = {
            let bytes = Arc::clone(&bytes);
            tokio::task::spawn_blocking(move || LopdfSource::from_bytes(&bytes))
                .await
                .map_err(|error| ExtractionError::PdfParse(error.to_string()))?
        };

        let started = Instant::now();
        let extracted = match loaded {
            Ok(source) => self.extract_windowed(Arc::new(source), observer).await,
            Err(error) => Err(error),
        };

        let extracted = extracted.map(|document| ExtractedDocument {
            checksum: Some(checksum.clone()),
            ..document
        });

        match (extracted, &self.ocr) {
            (
                Err(error @ (ExtractionError::NoExtractableText { .. } | ExtractionError::PdfParse(_))),
                Some(ocr),
            ) => {
                warn!(source = %name, %error, "text layer unusable, falling back to OCR");
                let pages = ocr.extract_pages(&bytes, &name).await?;
                Ok(ExtractedDocument {
                    page_count: pages.len() as u32,
                    text: join_pages(&pages),
                    window_pages: 0,
                    elapsed: started.elapsed(),
                    checksum: Some(checksum),
                    info: Metadata::new(),
                })
            }
            (result, _) => result,
        }
    }

    async fn run<F>(
        &self,
        source: Arc<dyn PageSource>,
        window: u32,
        mut observer: F,
    ) -> Result<ExtractedDocument, ExtractionError>
    where
        F: FnMut(ExtractionProgress) -> ControlFlow<()>,
    {
        let total = source.page_count();
        if total == 0 {
            return Err(ExtractionError::EmptySource("source has no pages".to_string()));
        }
        check_size(source.byte_len(), self.options.max_source_bytes)?;

        let window = window.max(1);
        let started = Instant::now();
        info!(pages = total, window, bytes = source.byte_len(), "extracting text");

        let mut text = String::new();
        let mut completed = 0u32;
        let mut first = 1u32;

        while first <= total {
            let last = first.saturating_add(window - 1).min(total);
            let pages = read_window(&source, first, last).await?;

            let window_text = join_pages(&pages);
            if !window_text.is_empty() {
                if !text.is_empty() {
                    text.push_str(PAGE_SEPARATOR);
                }
                text.push_str(&window_text);
            }

            let mut cancelled = false;
            for page in &pages {
                completed += 1;
                if observer(ExtractionProgress::new(page.number, total)).is_break() {
                    cancelled = true;
                    break;
                }
            }
            debug!(first, last, total, "extracted page window");

            if cancelled && last < total {
                info!(completed, total, "extraction cancelled");
                return Err(ExtractionError::Cancelled { completed, total });
            }

            first = last + 1;
        }

        if text.trim().is_empty() {
            return Err(ExtractionError::NoExtractableText { pages: total });
        }

        Ok(ExtractedDocument {
            text: text.trim().to_string(),
            page_count: total,
            window_pages: window,
            elapsed: started.elapsed(),
            checksum: None,
            info: source.info(),
        })
    }
}

/// Reads `first..=last` concurrently and returns the pages in order. The
/// first failing page in order fails the window and the rest are aborted.
async fn read_window(
    source: &Arc<dyn PageSource>,
    first: u32,
    last: u32,
) -> Result<Vec<PageText>, ExtractionError> {
    let mut handles = (first..=last)
        .map(|number| {
            let source = Arc::clone(source);
            (number, tokio::spawn(async move { source.page_text(number).await }))
        })
        .collect::<Vec<_>>()
        .into_iter();

    let mut pages = Vec::with_capacity((last - first + 1) as usize);
    while let Some((number, handle)) = handles.next() {
        let text = handle.await.unwrap_or_else(|error| {
            Err(ExtractionError::Page {
                page: number,
                details: error.to_string(),
            })
        });

        match text {
            Ok(text) => pages.push(PageText { number, text }),
            Err(error) => {
                for (_, pending) in handles.by_ref() {
                    pending.abort();
                }
                return Err(error);
            }
        }
    }

    Ok(pages)
}

fn digest_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn join_pages(pages: &[PageText]) -> String {
    pages
        .iter()
        .map(|page| page.text.as_str())
        .collect::<Vec<_>>()
        .join(PAGE_SEPARATOR)
}
