//! Error types for the edgequake-pdfqa library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`PdfQaError`] is **fatal**: the analysis cannot run at all (missing
//!   credentials, invalid configuration, unreadable cache file). Returned as
//!   `Err(PdfQaError)` from constructors and cache persistence helpers.
//!
//! * [`DocumentError`] is **non-fatal**: one document failed at one stage
//!   (download, limits, embedding, LLM) but its siblings in a batch are
//!   unaffected. Stored inside [`crate::output::AnalysisResult`] so callers
//!   can render per-document failures next to successful answers.
//!
//! `DocumentError` groups the stage-specific errors [`FetchError`],
//! [`LimitExceeded`], [`IndexError`] and [`QueryError`]. Each carries a stable
//! machine-readable [`DocumentError::kind`] for presentation layers.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdfqa library.
///
/// Per-document failures use [`DocumentError`] and are stored in
/// [`crate::output::AnalysisResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum PdfQaError {
    // ── Startup errors ────────────────────────────────────────────────────
    /// A required credential is absent from the environment.
    #[error("{var} is not set.\nIt is required for {purpose}. Export it before running.")]
    MissingCredential {
        var: &'static str,
        purpose: &'static str,
    },

    /// The configured LLM provider could not be initialised.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Cache persistence errors ──────────────────────────────────────────
    /// The cache file exists but could not be read.
    #[error("Failed to read cache file '{path}': {source}")]
    CacheReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache file could not be written.
    #[error("Failed to write cache file '{path}': {source}")]
    CacheWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache file was read but its content is not a valid cache.
    #[error("Cache file '{path}' is corrupt: {detail}")]
    CacheCorrupt { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Download and PDF-validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FetchError {
    /// The locator is not an absolute HTTP/HTTPS URL.
    #[error("Invalid URL '{url}': not a valid HTTP/HTTPS URL")]
    InvalidUrl { url: String },

    /// The server answered 404/410.
    #[error("PDF not found at '{url}' (HTTP {status})")]
    NotFound { url: String, status: u16 },

    /// The download exceeded the fetch timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    Timeout { url: String, secs: u64 },

    /// Connection failure or a non-success HTTP status other than not-found.
    #[error("Failed to download '{url}': {reason}")]
    Transport { url: String, reason: String },

    /// The bytes were downloaded but are not a readable PDF.
    #[error("'{url}' is not a valid PDF: {detail}")]
    InvalidPdf { url: String, detail: String },
}

/// Document rejected by the size or page gate before indexing.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum LimitExceeded {
    #[error("Document is {bytes} bytes; the limit is {limit} bytes")]
    SizeTooLarge { bytes: u64, limit: u64 },

    #[error("Document has {pages} pages; the limit is {limit} pages")]
    TooManyPages { pages: usize, limit: usize },
}

/// Index construction failures.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum IndexError {
    /// The embedding service failed (quota, network, bad response).
    #[error("Embedding service unavailable: {detail}")]
    EmbeddingUnavailable { detail: String },

    /// No page produced any extractable text (e.g. a scanned, image-only PDF).
    #[error("Document has no extractable text ({pages} pages scanned); image-only PDFs are not supported")]
    EmptyDocument { pages: usize },
}

/// Retrieval and LLM failures.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum QueryError {
    /// The provider returned HTTP 429 or reported overload.
    #[error("Rate limit exceeded for provider '{provider}': {detail}")]
    RateLimited { provider: String, detail: String },

    /// Any other provider-side or transport failure.
    #[error("Provider '{provider}' failed: {detail}")]
    ProviderError { provider: String, detail: String },

    /// The provider answered but the answer is unusable.
    #[error("Malformed response from LLM: {detail}")]
    MalformedResponse { detail: String },
}

/// A non-fatal error for a single document.
///
/// Stored in [`crate::output::Outcome::Failed`]. The batch continues
/// regardless of how many documents fail.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum DocumentError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Limit(#[from] LimitExceeded),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Query(#[from] QueryError),

    /// The enclosing request was cancelled before this document finished.
    #[error("Analysis cancelled before completion")]
    Cancelled,
}

impl DocumentError {
    /// Stable identifier for the error kind, e.g. `"limit.too_many_pages"`.
    pub fn kind(&self) -> &'static str {
        match self {
            DocumentError::Fetch(e) => match e {
                FetchError::InvalidUrl { .. } => "fetch.invalid_url",
                FetchError::NotFound { .. } => "fetch.not_found",
                FetchError::Timeout { .. } => "fetch.timeout",
                FetchError::Transport { .. } => "fetch.transport",
                FetchError::InvalidPdf { .. } => "fetch.invalid_pdf",
            },
            DocumentError::Limit(e) => match e {
                LimitExceeded::SizeTooLarge { .. } => "limit.size_too_large",
                LimitExceeded::TooManyPages { .. } => "limit.too_many_pages",
            },
            DocumentError::Index(e) => match e {
                IndexError::EmbeddingUnavailable { .. } => "index.embedding_unavailable",
                IndexError::EmptyDocument { .. } => "index.empty_document",
            },
            DocumentError::Query(e) => match e {
                QueryError::RateLimited { .. } => "query.rate_limited",
                QueryError::ProviderError { .. } => "query.provider_error",
                QueryError::MalformedResponse { .. } => "query.malformed_response",
            },
            DocumentError::Cancelled => "cancelled",
        }
    }

    /// Pipeline stage that produced the error.
    pub fn stage(&self) -> &'static str {
        match self {
            DocumentError::Fetch(_) | DocumentError::Limit(_) => "fetch",
            DocumentError::Index(_) => "index",
            DocumentError::Query(_) => "query",
            DocumentError::Cancelled => "cancelled",
        }
    }

    /// Whether re-running the failed stage may succeed.
    ///
    /// Consulted by the retry policy in [`crate::analyze`]; the stages
    /// themselves never retry.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            DocumentError::Fetch(FetchError::Timeout { .. })
                | DocumentError::Index(IndexError::EmbeddingUnavailable { .. })
                | DocumentError::Query(QueryError::RateLimited { .. })
                | DocumentError::Query(QueryError::ProviderError { .. })
        )
    }
}
