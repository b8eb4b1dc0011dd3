//! Document acquisition: download a PDF and gate it before indexing.
//!
//! ## Order of checks
//!
//! 1. URL syntax (`http`/`https` only)
//! 2. Download under the download timeout, aborting as soon as the body
//!    exceeds the size limit
//! 3. Size gate on the full body
//! 4. `%PDF` magic bytes
//! 5. Page gate on the structural page count, when the extractor knows it
//! 6. Text extraction (blocking pool) under the extraction timeout, then the
//!    page gate on the extracted pages
//!
//! Everything here happens before any embedding call, so an oversized or
//! overlong document never costs embedding quota. No step is retried here;
//! see [`crate::config::RetryPolicy`].
//!
//! Only the download timeout is retriable. A blocking parser thread keeps
//! running after its timeout fires, so an extraction timeout is reported as
//! [`FetchError::InvalidPdf`] to keep a retry from starting a second parse.

use crate::error::{DocumentError, FetchError, LimitExceeded, PdfQaError};
use crate::output::DocumentRef;
use crate::pipeline::extract::{is_text_empty, PdfTextExtractor};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Retrieves raw bytes for a URL.
#[async_trait]
pub trait PdfSource: Send + Sync {
    /// Download `url`. Implementations may stop early once the body exceeds
    /// `max_bytes` and report [`LimitExceeded::SizeTooLarge`].
    async fn get(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>, DocumentError>;
}

/// Size and page limits applied to every document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentLimits {
    pub max_bytes: u64,
    pub max_pages: usize,
}

impl DocumentLimits {
    pub fn check_size(&self, bytes: u64) -> Result<(), LimitExceeded> {
        if bytes > self.max_bytes {
            return Err(LimitExceeded::SizeTooLarge {
                bytes,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }

    pub fn check_pages(&self, pages: usize) -> Result<(), LimitExceeded> {
        if pages > self.max_pages {
            return Err(LimitExceeded::TooManyPages {
                pages,
                limit: self.max_pages,
            });
        }
        Ok(())
    }
}

/// A document that passed every gate, with its extracted page text.
#[derive(Debug, Clone)]
pub struct FetchedDocument {
    pub reference: DocumentRef,
    /// Page text in page order; `pages.len() == reference.page_count`.
    pub pages: Vec<String>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Parse and validate an HTTP/HTTPS URL.
pub fn parse_url(url: &str) -> Result<reqwest::Url, FetchError> {
    let invalid = || FetchError::InvalidUrl {
        url: url.to_string(),
    };
    if !is_url(url) {
        return Err(invalid());
    }
    let parsed = reqwest::Url::parse(url).map_err(|_| invalid())?;
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(invalid());
    }
    Ok(parsed)
}

/// Split a newline-separated URL list, dropping blank lines.
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(120);

/// Downloads, validates and extracts a document.
pub struct DocumentFetcher {
    source: Arc<dyn PdfSource>,
    extractor: Arc<dyn PdfTextExtractor>,
    limits: DocumentLimits,
    download_timeout: Duration,
    extract_timeout: Duration,
}

impl DocumentFetcher {
    pub fn new(
        source: Arc<dyn PdfSource>,
        extractor: Arc<dyn PdfTextExtractor>,
        limits: DocumentLimits,
    ) -> Self {
        Self {
            source,
            extractor,
            limits,
            download_timeout: DEFAULT_STAGE_TIMEOUT,
            extract_timeout: DEFAULT_STAGE_TIMEOUT,
        }
    }

    /// Override the download and extraction timeouts (120s each by default).
    pub fn with_timeouts(mut self, download: Duration, extract: Duration) -> Self {
        self.download_timeout = download;
        self.extract_timeout = extract;
        self
    }

    pub fn limits(&self) -> DocumentLimits {
        self.limits
    }

    /// Fetch `url` and return the validated document.
    pub async fn fetch(&self, url: &str) -> Result<FetchedDocument, DocumentError> {
        let url = url.trim();
        parse_url(url)?;

        info!("Downloading PDF from: {}", url);
        let bytes = tokio::time::timeout(
            self.download_timeout,
            self.source.get(url, self.limits.max_bytes),
        )
        .await
        .map_err(|_| FetchError::Timeout {
            url: url.to_string(),
            secs: self.download_timeout.as_secs(),
        })??;
        let byte_size = bytes.len() as u64;
        self.limits.check_size(byte_size)?;

        if !bytes.starts_with(b"%PDF") {
            let head: Vec<u8> = bytes.iter().take(4).copied().collect();
            return Err(FetchError::InvalidPdf {
                url: url.to_string(),
                detail: format!("missing %PDF header, first bytes: {:?}", head),
            }
            .into());
        }

        let content_sha256 = format!("{:x}", Sha256::digest(&bytes));

        let pages = self.extract(url, bytes).await?;
        self.limits.check_pages(pages.len())?;
        if is_text_empty(&pages) {
            warn!("No extractable text in {} ({} pages); likely a scanned PDF", url, pages.len());
        }
        info!("Fetched {} bytes, {} pages from {}", byte_size, pages.len(), url);

        Ok(FetchedDocument {
            reference: DocumentRef {
                url: url.to_string(),
                byte_size,
                page_count: pages.len(),
                content_sha256,
            },
            pages,
        })
    }

    /// Page gate and text extraction on the blocking pool.
    async fn extract(&self, url: &str, bytes: Vec<u8>) -> Result<Vec<String>, DocumentError> {
        let extractor = Arc::clone(&self.extractor);
        let limits = self.limits;
        let owned_url = url.to_string();
        let job = tokio::task::spawn_blocking(move || -> Result<Vec<String>, DocumentError> {
            if let Some(pages) = extractor.page_count(&bytes) {
                limits.check_pages(pages)?;
            }
            extractor.extract_pages(&bytes).map_err(|detail| {
                FetchError::InvalidPdf {
                    url: owned_url,
                    detail,
                }
                .into()
            })
        });

        let invalid = |detail: String| -> DocumentError {
            FetchError::InvalidPdf {
                url: url.to_string(),
                detail,
            }
            .into()
        };
        match tokio::time::timeout(self.extract_timeout, job).await {
            Err(_) => Err(invalid(format!(
                "text extraction timed out after {}s",
                self.extract_timeout.as_secs()
            ))),
            Ok(Err(e)) => Err(invalid(format!("PDF parser crashed: {}", e))),
            Ok(Ok(result)) => result,
        }
    }
}

/// [`PdfSource`] over HTTP(S) via reqwest.
pub struct HttpPdfSource {
    client: reqwest::Client,
    timeout_secs: u64,
}

impl HttpPdfSource {
    pub fn new(timeout_secs: u64) -> Result<Self, PdfQaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| PdfQaError::Internal(format!("HTTP client: {}", e)))?;
        Ok(Self {
            client,
            timeout_secs,
        })
    }

    fn transport_error(&self, url: &str, e: reqwest::Error) -> DocumentError {
        if e.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                secs: self.timeout_secs,
            }
            .into()
        } else {
            FetchError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            }
            .into()
        }
    }
}

#[async_trait]
impl PdfSource for HttpPdfSource {
    async fn get(&self, url: &str, max_bytes: u64) -> Result<Vec<u8>, DocumentError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.transport_error(url, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(FetchError::NotFound {
                url: url.to_string(),
                status: status.as_u16(),
            }
            .into());
        }
        if !status.is_success() {
            return Err(FetchError::Transport {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            }
            .into());
        }

        if let Some(len) = response.content_length() {
            if len > max_bytes {
                return Err(LimitExceeded::SizeTooLarge {
                    bytes: len,
                    limit: max_bytes,
                }
                .into());
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.transport_error(url, e))?
        {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > max_bytes {
                return Err(LimitExceeded::SizeTooLarge {
                    bytes: body.len() as u64,
                    limit: max_bytes,
                }
                .into());
            }
        }

        debug!("Downloaded {} bytes from {}", body.len(), url);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticSource(Vec<u8>);

    #[async_trait]
    impl PdfSource for StaticSource {
        async fn get(&self, _url: &str, _max: u64) -> Result<Vec<u8>, DocumentError> {
            Ok(self.0.clone())
        }
    }

    /// Pages separated by form feeds after an 8-byte header.
    #[derive(Default)]
    struct FormFeedExtractor {
        calls: AtomicUsize,
    }

    impl PdfTextExtractor for FormFeedExtractor {
        fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let text = String::from_utf8_lossy(&bytes[8..]).to_string();
            Ok(text.split('\u{c}').map(str::to_string).collect())
        }
    }

    struct SlowSource {
        bytes: Vec<u8>,
        delay: Duration,
    }

    #[async_trait]
    impl PdfSource for SlowSource {
        async fn get(&self, _url: &str, _max: u64) -> Result<Vec<u8>, DocumentError> {
            tokio::time::sleep(self.delay).await;
            Ok(self.bytes.clone())
        }
    }

    /// Sleeps on the blocking thread before answering with one page.
    struct SlowExtractor {
        delay: Duration,
        calls: AtomicUsize,
    }

    impl PdfTextExtractor for SlowExtractor {
        fn extract_pages(&self, _bytes: &[u8]) -> Result<Vec<String>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            Ok(vec!["late".to_string()])
        }
    }

    /// Reports a page count from the document structure and counts text passes.
    struct CountingPagesExtractor {
        pages: usize,
        calls: AtomicUsize,
    }

    impl PdfTextExtractor for CountingPagesExtractor {
        fn extract_pages(&self, _bytes: &[u8]) -> Result<Vec<String>, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec!["text".to_string(); self.pages])
        }

        fn page_count(&self, _bytes: &[u8]) -> Option<usize> {
            Some(self.pages)
        }
    }

    struct PanickingExtractor;

    impl PdfTextExtractor for PanickingExtractor {
        fn extract_pages(&self, _bytes: &[u8]) -> Result<Vec<String>, String> {
            panic!("malformed xref table");
        }
    }

    fn limits() -> DocumentLimits {
        DocumentLimits {
            max_bytes: 1024,
            max_pages: 3,
        }
    }

    fn fetcher(bytes: Vec<u8>, extractor: Arc<FormFeedExtractor>) -> DocumentFetcher {
        DocumentFetcher::new(Arc::new(StaticSource(bytes)), extractor, limits())
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/doc.pdf"));
        assert!(is_url("http://example.com/doc.pdf"));
        assert!(!is_url("/tmp/doc.pdf"));
        assert!(!is_url("ftp://example.com/doc.pdf"));
        assert!(!is_url(""));
    }

    #[test]
    fn test_parse_url() {
        assert!(parse_url("https://example.com/doc.pdf").is_ok());
        assert!(parse_url("https://").is_err());
        assert!(parse_url("example.com/doc.pdf").is_err());
    }

    #[test]
    fn test_parse_url_list() {
        let urls = parse_url_list("  https://a/1.pdf \n\n\thttps://b/2.pdf\n   \n");
        assert_eq!(urls, vec!["https://a/1.pdf", "https://b/2.pdf"]);
    }

    #[test]
    fn limits_are_inclusive() {
        let l = limits();
        assert!(l.check_size(1024).is_ok());
        assert!(l.check_size(1025).is_err());
        assert!(l.check_pages(3).is_ok());
        assert_eq!(
            l.check_pages(4),
            Err(LimitExceeded::TooManyPages { pages: 4, limit: 3 })
        );
    }

    #[tokio::test]
    async fn fetch_builds_document_ref() {
        let extractor = Arc::new(FormFeedExtractor::default());
        let f = fetcher(b"%PDF-1.4one\x0ctwo".to_vec(), Arc::clone(&extractor));
        let doc = f.fetch("https://example.com/a.pdf").await.unwrap();
        assert_eq!(doc.reference.page_count, 2);
        assert_eq!(doc.reference.byte_size, 15);
        assert_eq!(doc.reference.content_sha256.len(), 64);
        assert_eq!(doc.pages, vec!["one", "two"]);
    }

    #[tokio::test]
    async fn oversized_document_is_not_parsed() {
        let extractor = Arc::new(FormFeedExtractor::default());
        let mut bytes = b"%PDF-1.4".to_vec();
        bytes.resize(2048, b'x');
        let err = fetcher(bytes, Arc::clone(&extractor))
            .fetch("https://example.com/big.pdf")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "limit.size_too_large");
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn non_pdf_is_rejected() {
        let extractor = Arc::new(FormFeedExtractor::default());
        let err = fetcher(b"<html>nope</html>".to_vec(), Arc::clone(&extractor))
            .fetch("https://example.com/a.pdf")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "fetch.invalid_pdf");
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn too_many_pages() {
        let extractor = Arc::new(FormFeedExtractor::default());
        let err = fetcher(b"%PDF-1.4a\x0cb\x0cc\x0cd".to_vec(), extractor)
            .fetch("https://example.com/a.pdf")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            DocumentError::Limit(LimitExceeded::TooManyPages { pages: 4, limit: 3 })
        );
    }

    #[tokio::test]
    async fn invalid_url_short_circuits() {
        let extractor = Arc::new(FormFeedExtractor::default());
        let err = fetcher(b"%PDF-1.4".to_vec(), extractor)
            .fetch("not a url")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "fetch.invalid_url");
    }

    #[tokio::test]
    async fn slow_download_times_out_as_retriable() {
        let source = SlowSource {
            bytes: b"%PDF-1.4one".to_vec(),
            delay: Duration::from_millis(500),
        };
        let f = DocumentFetcher::new(
            Arc::new(source),
            Arc::new(FormFeedExtractor::default()),
            limits(),
        )
        .with_timeouts(Duration::from_millis(20), Duration::from_secs(5));

        let err = f.fetch("https://example.com/a.pdf").await.unwrap_err();
        assert_eq!(err.kind(), "fetch.timeout");
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn slow_extraction_is_not_a_download_timeout() {
        let extractor = Arc::new(SlowExtractor {
            delay: Duration::from_millis(150),
            calls: AtomicUsize::new(0),
        });
        let f = DocumentFetcher::new(
            Arc::new(StaticSource(b"%PDF-1.4one".to_vec())),
            Arc::clone(&extractor) as Arc<dyn PdfTextExtractor>,
            limits(),
        )
        .with_timeouts(Duration::from_millis(20), Duration::from_secs(5));

        let doc = f.fetch("https://example.com/a.pdf").await.unwrap();
        assert_eq!(doc.pages, vec!["late"]);
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn extraction_timeout_is_invalid_pdf_and_not_retriable() {
        let extractor = Arc::new(SlowExtractor {
            delay: Duration::from_millis(300),
            calls: AtomicUsize::new(0),
        });
        let f = DocumentFetcher::new(
            Arc::new(StaticSource(b"%PDF-1.4one".to_vec())),
            Arc::clone(&extractor) as Arc<dyn PdfTextExtractor>,
            limits(),
        )
        .with_timeouts(Duration::from_secs(5), Duration::from_millis(20));

        let err = f.fetch("https://example.com/a.pdf").await.unwrap_err();
        assert_eq!(err.kind(), "fetch.invalid_pdf");
        assert!(err.to_string().contains("text extraction timed out"), "{err}");
        assert!(!err.is_retriable());
    }

    #[tokio::test]
    async fn structural_page_count_gates_before_extraction() {
        let extractor = Arc::new(CountingPagesExtractor {
            pages: 10,
            calls: AtomicUsize::new(0),
        });
        let f = DocumentFetcher::new(
            Arc::new(StaticSource(b"%PDF-1.4".to_vec())),
            Arc::clone(&extractor) as Arc<dyn PdfTextExtractor>,
            limits(),
        );

        let err = f.fetch("https://example.com/a.pdf").await.unwrap_err();
        assert_eq!(
            err,
            DocumentError::Limit(LimitExceeded::TooManyPages { pages: 10, limit: 3 })
        );
        assert_eq!(extractor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn parser_panic_is_reported_as_invalid_pdf() {
        let f = DocumentFetcher::new(
            Arc::new(StaticSource(b"%PDF-1.4".to_vec())),
            Arc::new(PanickingExtractor),
            limits(),
        );

        let err = f.fetch("https://example.com/a.pdf").await.unwrap_err();
        assert_eq!(err.kind(), "fetch.invalid_pdf");
        assert!(err.to_string().contains("crashed"), "{err}");
    }
}
