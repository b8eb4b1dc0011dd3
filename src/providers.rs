//! Credentials and production wiring of the external services.
//!
//! Two credentials are needed: an LLM key (`ANTHROPIC_API_KEY` for the
//! default Claude provider) and `OPENAI_API_KEY` for embeddings. Both are
//! checked once at startup; a missing key is fatal
//! ([`PdfQaError::MissingCredential`]) rather than a per-document failure.

use crate::analyze::{Analyzer, Services};
use crate::cache::ResponseCache;
use crate::config::AnalysisConfig;
use crate::error::PdfQaError;
use crate::pipeline::embed::OpenAIEmbedder;
use crate::pipeline::extract::PdfExtractBackend;
use crate::pipeline::fetch::HttpPdfSource;
use crate::pipeline::query::LlmCompleter;
use edgequake_llm::{LLMProvider, ProviderFactory};
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub const ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// API keys read from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub openai_api_key: String,
    pub anthropic_api_key: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("openai_api_key", &"<redacted>")
            .field(
                "anthropic_api_key",
                &self.anthropic_api_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Credentials {
    /// Read both keys; either one missing is an error.
    pub fn from_env() -> Result<Self, PdfQaError> {
        Self::for_provider("anthropic")
    }

    /// Read the keys needed when answering with `llm_provider`.
    ///
    /// `ANTHROPIC_API_KEY` is only mandatory for the `anthropic` provider;
    /// other providers are validated by the provider factory.
    pub fn for_provider(llm_provider: &str) -> Result<Self, PdfQaError> {
        let openai_api_key = require(OPENAI_API_KEY, "document and query embeddings")?;
        let anthropic_api_key = if llm_provider.eq_ignore_ascii_case("anthropic") {
            Some(require(ANTHROPIC_API_KEY, "answer generation with Claude")?)
        } else {
            non_empty_var(ANTHROPIC_API_KEY)
        };
        Ok(Self {
            openai_api_key,
            anthropic_api_key,
        })
    }
}

fn non_empty_var(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.trim().is_empty())
}

fn require(var: &'static str, purpose: &'static str) -> Result<String, PdfQaError> {
    non_empty_var(var).ok_or(PdfQaError::MissingCredential { var, purpose })
}

/// Instantiate a named provider with the given model.
fn create_llm_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, PdfQaError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        PdfQaError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

impl Services {
    /// Production services: HTTP download, `pdf-extract`, OpenAI embeddings
    /// and the configured LLM provider.
    pub fn from_credentials(
        config: &AnalysisConfig,
        credentials: &Credentials,
    ) -> Result<Self, PdfQaError> {
        let source = HttpPdfSource::new(config.fetch_timeout_secs)?;
        let embedder = OpenAIEmbedder::new(
            credentials.openai_api_key.clone(),
            config.embedding_model.clone(),
            config.index_timeout(),
        )
        .map_err(|e| PdfQaError::Internal(e.to_string()))?;

        // A pre-built provider wins over the named one.
        let provider = match config.provider {
            Some(ref provider) => Arc::clone(provider),
            None => create_llm_provider(&config.llm_provider, &config.model)?,
        };
        info!(
            "Using LLM {}/{} and embeddings {}",
            config.llm_provider, config.model, config.embedding_model
        );
        let completer = LlmCompleter::new(
            provider,
            config.llm_provider.clone(),
            config.temperature,
            config.max_tokens,
        );

        Ok(Self {
            source: Arc::new(source),
            extractor: Arc::new(PdfExtractBackend),
            embedder: Arc::new(embedder),
            completer: Arc::new(completer),
        })
    }
}

impl Analyzer {
    /// Build an analyzer from environment credentials.
    pub fn from_env(config: AnalysisConfig, cache: Arc<ResponseCache>) -> Result<Self, PdfQaError> {
        let credentials = Credentials::for_provider(&config.llm_provider)?;
        let services = Services::from_credentials(&config, &credentials)?;
        Ok(Self::new(config, services, cache))
    }
}
