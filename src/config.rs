//! Configuration types for PDF question answering.
//!
//! All pipeline behaviour is controlled through [`AnalysisConfig`], built via
//! its [`AnalysisConfigBuilder`]. Limits, chunking, retrieval, retry and
//! timeout knobs live side by side so that two runs can be compared by
//! diffing their configs.

use crate::error::PdfQaError;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Largest accepted document: 32 MiB.
pub const DEFAULT_MAX_DOCUMENT_BYTES: u64 = 32 * 1024 * 1024;

/// Largest accepted page count.
pub const DEFAULT_MAX_PAGES: usize = 100;

/// Query used when the caller does not supply one.
pub const DEFAULT_QUERY: &str = "Analyze this document and provide a detailed summary.";

/// Configuration for single-document and batch analysis.
///
/// Built via [`AnalysisConfig::builder()`] or using
/// [`AnalysisConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_pdfqa::AnalysisConfig;
///
/// let config = AnalysisConfig::builder()
///     .similarity_top_k(5)
///     .concurrency(8)
///     .model("claude-3-5-haiku-20241022")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct AnalysisConfig {
    /// Maximum downloaded size in bytes. Default: 32 MiB.
    pub max_document_bytes: u64,

    /// Maximum page count. Default: 100.
    pub max_pages: usize,

    /// Target chunk size in tokens (≈ 4 characters each). Default: 1024.
    pub chunk_size_tokens: usize,

    /// Tokens repeated between consecutive chunks of a page. Default: 20.
    pub chunk_overlap_tokens: usize,

    /// Number of chunks retrieved per query. Default: 3.
    pub similarity_top_k: usize,

    /// LLM provider name passed to `ProviderFactory`. Default: "anthropic".
    pub llm_provider: String,

    /// LLM model identifier. Default: "claude-3-5-sonnet-20241022".
    pub model: String,

    /// Pre-constructed LLM provider. Takes precedence over `llm_provider`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Embedding model identifier. Default: "text-embedding-3-small".
    pub embedding_model: String,

    /// Texts per embeddings request. Default: 64.
    pub embedding_batch_size: usize,

    /// Sampling temperature for answer synthesis. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per LLM call. Default: 2048.
    pub max_tokens: usize,

    /// Upper bound on retrieved context characters per LLM call. Default: 12000.
    ///
    /// When the retrieved chunks do not fit, they are answered in groups and
    /// the partial answers are combined by a further call.
    pub max_context_chars: usize,

    /// Documents processed in parallel during a batch. Default: 4.
    pub concurrency: usize,

    /// Read and write the answer cache. Default: true.
    pub use_cache: bool,

    /// Keep built indexes for later queries on the same URL. Default: true.
    pub cache_indexes: bool,

    /// Retry policy applied to retriable stage failures.
    pub retry: RetryPolicy,

    /// Download timeout in seconds. Default: 120.
    pub fetch_timeout_secs: u64,

    /// Text extraction timeout in seconds. Default: 120.
    ///
    /// Extraction runs on the blocking pool and cannot be interrupted; on
    /// timeout the document fails as an invalid PDF and is not retried.
    pub extract_timeout_secs: u64,

    /// Timeout for building one index (all embedding calls) in seconds. Default: 120.
    pub index_timeout_secs: u64,

    /// Timeout for answering one query in seconds. Default: 60.
    pub query_timeout_secs: u64,

    /// Custom system prompt. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Optional progress callback for stage transitions.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            max_pages: DEFAULT_MAX_PAGES,
            chunk_size_tokens: 1024,
            chunk_overlap_tokens: 20,
            similarity_top_k: 3,
            llm_provider: "anthropic".to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            provider: None,
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_batch_size: 64,
            temperature: 0.1,
            max_tokens: 2048,
            max_context_chars: 12_000,
            concurrency: 4,
            use_cache: true,
            cache_indexes: true,
            retry: RetryPolicy::default(),
            fetch_timeout_secs: 120,
            extract_timeout_secs: 120,
            index_timeout_secs: 120,
            query_timeout_secs: 60,
            system_prompt: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AnalysisConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalysisConfig")
            .field("max_document_bytes", &self.max_document_bytes)
            .field("max_pages", &self.max_pages)
            .field("chunk_size_tokens", &self.chunk_size_tokens)
            .field("chunk_overlap_tokens", &self.chunk_overlap_tokens)
            .field("similarity_top_k", &self.similarity_top_k)
            .field("llm_provider", &self.llm_provider)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("concurrency", &self.concurrency)
            .field("use_cache", &self.use_cache)
            .field("cache_indexes", &self.cache_indexes)
            .field("retry", &self.retry)
            .finish()
    }
}

impl AnalysisConfig {
    /// Create a new builder for `AnalysisConfig`.
    pub fn builder() -> AnalysisConfigBuilder {
        AnalysisConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn extract_timeout(&self) -> Duration {
        Duration::from_secs(self.extract_timeout_secs)
    }

    pub fn index_timeout(&self) -> Duration {
        Duration::from_secs(self.index_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }
}

/// Builder for [`AnalysisConfig`].
#[derive(Debug)]
pub struct AnalysisConfigBuilder {
    config: AnalysisConfig,
}

impl AnalysisConfigBuilder {
    pub fn max_document_bytes(mut self, bytes: u64) -> Self {
        self.config.max_document_bytes = bytes;
        self
    }

    pub fn max_pages(mut self, pages: usize) -> Self {
        self.config.max_pages = pages;
        self
    }

    pub fn chunk_size_tokens(mut self, n: usize) -> Self {
        self.config.chunk_size_tokens = n;
        self
    }

    pub fn chunk_overlap_tokens(mut self, n: usize) -> Self {
        self.config.chunk_overlap_tokens = n;
        self
    }

    pub fn similarity_top_k(mut self, k: usize) -> Self {
        self.config.similarity_top_k = k.max(1);
        self
    }

    pub fn llm_provider(mut self, name: impl Into<String>) -> Self {
        self.config.llm_provider = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.config.embedding_model = model.into();
        self
    }

    pub fn embedding_batch_size(mut self, n: usize) -> Self {
        self.config.embedding_batch_size = n.max(1);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_context_chars(mut self, n: usize) -> Self {
        self.config.max_context_chars = n;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn use_cache(mut self, v: bool) -> Self {
        self.config.use_cache = v;
        self
    }

    pub fn cache_indexes(mut self, v: bool) -> Self {
        self.config.cache_indexes = v;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn extract_timeout_secs(mut self, secs: u64) -> Self {
        self.config.extract_timeout_secs = secs;
        self
    }

    pub fn index_timeout_secs(mut self, secs: u64) -> Self {
        self.config.index_timeout_secs = secs;
        self
    }

    pub fn query_timeout_secs(mut self, secs: u64) -> Self {
        self.config.query_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AnalysisConfig, PdfQaError> {
        let c = &self.config;
        if c.max_document_bytes == 0 || c.max_pages == 0 {
            return Err(PdfQaError::InvalidConfig(
                "Document size and page limits must be ≥ 1".into(),
            ));
        }
        if c.chunk_size_tokens == 0 {
            return Err(PdfQaError::InvalidConfig(
                "Chunk size must be ≥ 1 token".into(),
            ));
        }
        if c.chunk_overlap_tokens >= c.chunk_size_tokens {
            return Err(PdfQaError::InvalidConfig(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                c.chunk_overlap_tokens, c.chunk_size_tokens
            )));
        }
        if c.max_context_chars < 256 {
            return Err(PdfQaError::InvalidConfig(format!(
                "max_context_chars must be ≥ 256, got {}",
                c.max_context_chars
            )));
        }
        if c.fetch_timeout_secs == 0
            || c.extract_timeout_secs == 0
            || c.index_timeout_secs == 0
            || c.query_timeout_secs == 0
        {
            return Err(PdfQaError::InvalidConfig(
                "Stage timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.model.trim().is_empty() || c.embedding_model.trim().is_empty() {
            return Err(PdfQaError::InvalidConfig(
                "Model identifiers must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

/// Retry policy for retriable stage failures.
///
/// Only errors for which [`crate::error::DocumentError::is_retriable`] holds
/// are retried, and only the failing stage is re-run. The delay doubles after
/// each attempt: `backoff_ms`, `2 × backoff_ms`, `4 × backoff_ms`, …
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Additional attempts after the first failure. Default: 2.
    pub max_retries: u32,
    /// Initial delay in milliseconds. Default: 500.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_ms: 500,
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            backoff_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(10);
        Duration::from_millis(self.backoff_ms.saturating_mul(1u64 << exp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let c = AnalysisConfig::default();
        assert_eq!(c.max_document_bytes, 33_554_432);
        assert_eq!(c.max_pages, 100);
        assert_eq!(c.chunk_size_tokens, 1024);
        assert_eq!(c.chunk_overlap_tokens, 20);
        assert_eq!(c.similarity_top_k, 3);
        assert!(c.use_cache);
    }

    #[test]
    fn overlap_must_be_smaller_than_chunk() {
        let err = AnalysisConfig::builder()
            .chunk_size_tokens(10)
            .chunk_overlap_tokens(10)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn zero_timeout_rejected() {
        assert!(AnalysisConfig::builder()
            .query_timeout_secs(0)
            .build()
            .is_err());
        assert!(AnalysisConfig::builder()
            .extract_timeout_secs(0)
            .build()
            .is_err());
    }

    #[test]
    fn builder_clamps() {
        let c = AnalysisConfig::builder()
            .concurrency(0)
            .similarity_top_k(0)
            .temperature(9.0)
            .build()
            .unwrap();
        assert_eq!(c.concurrency, 1);
        assert_eq!(c.similarity_top_k, 1);
        assert_eq!(c.temperature, 2.0);
    }

    #[test]
    fn retry_backoff_doubles() {
        let p = RetryPolicy {
            max_retries: 3,
            backoff_ms: 500,
        };
        assert_eq!(p.delay_for(1), Duration::from_millis(500));
        assert_eq!(p.delay_for(2), Duration::from_millis(1000));
        assert_eq!(p.delay_for(3), Duration::from_millis(2000));
    }
}
