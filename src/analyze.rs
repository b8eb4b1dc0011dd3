//! Analysis orchestrator: single and batch entry points.
//!
//! ## Per-document flow
//!
//! ```text
//! fingerprint ──▶ answer cache ──hit──────────────────────────────▶ Succeeded
//!                     │ miss
//!                     ▼
//!               index cache ──hit──────────────┐
//!                     │ miss                   ▼
//!                     ▼                     Querying ──▶ store ──▶ Succeeded
//!                 Fetching ──▶ Indexing ───────┘
//! ```
//!
//! Any stage error ends the document in `Failed` with that error. Nothing is
//! written to the answer cache unless the query stage produced a complete
//! answer, and the index cache only ever receives fully built indexes.
//!
//! ## Retries and timeouts
//!
//! Each stage runs under its own timeout; the fetch stage times the download
//! and the text extraction separately (see [`crate::pipeline::fetch`]).
//! Retriable failures (see
//! [`DocumentError::is_retriable`]) re-run only the failing stage, up to
//! [`RetryPolicy::max_retries`](crate::config::RetryPolicy) times with
//! exponential backoff.
//!
//! ## Batches
//!
//! Documents run concurrently (bounded by `concurrency`) and are completely
//! independent: the only shared state is the two caches. Results are sorted
//! back into input order before being returned.

use crate::cache::{normalize_query, Fingerprint, IndexCache, ResponseCache};
use crate::config::{AnalysisConfig, DEFAULT_QUERY};
use crate::error::{DocumentError, IndexError, QueryError};
use crate::output::{AnalysisResult, BatchReport, DocumentRef, DocumentState, Outcome};
use crate::pipeline::embed::Embedder;
use crate::pipeline::extract::PdfTextExtractor;
use crate::pipeline::fetch::{DocumentFetcher, DocumentLimits, FetchedDocument, PdfSource};
use crate::pipeline::index::{DocumentIndex, DocumentIndexer};
use crate::pipeline::query::{Completer, QueryEngine};
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use futures::stream::{self, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// External collaborators used by the pipeline.
///
/// Production code gets these from [`Services::from_credentials`](crate::providers);
/// tests plug in fakes.
#[derive(Clone)]
pub struct Services {
    pub source: Arc<dyn PdfSource>,
    pub extractor: Arc<dyn PdfTextExtractor>,
    pub embedder: Arc<dyn Embedder>,
    pub completer: Arc<dyn Completer>,
}

/// Runs single and batch analyses against shared caches.
pub struct Analyzer {
    config: AnalysisConfig,
    fetcher: DocumentFetcher,
    indexer: DocumentIndexer,
    engine: QueryEngine,
    cache: Arc<ResponseCache>,
    indexes: IndexCache,
}

impl Analyzer {
    /// Create an analyzer. The answer cache is owned by the caller so it can
    /// be shared, inspected or persisted.
    pub fn new(config: AnalysisConfig, services: Services, cache: Arc<ResponseCache>) -> Self {
        let fetcher = DocumentFetcher::new(
            services.source,
            services.extractor,
            DocumentLimits {
                max_bytes: config.max_document_bytes,
                max_pages: config.max_pages,
            },
        )
        .with_timeouts(config.fetch_timeout(), config.extract_timeout());
        let indexer = DocumentIndexer::new(
            Arc::clone(&services.embedder),
            config.chunk_size_tokens,
            config.chunk_overlap_tokens,
            config.embedding_batch_size,
        );
        let system_prompt = config
            .system_prompt
            .clone()
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let engine = QueryEngine::new(
            services.embedder,
            services.completer,
            config.similarity_top_k,
            config.max_context_chars,
            system_prompt,
        );

        Self {
            config,
            fetcher,
            indexer,
            engine,
            cache,
            indexes: IndexCache::new(),
        }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn index_cache(&self) -> &IndexCache {
        &self.indexes
    }

    /// Analyse one document.
    ///
    /// Never fails as a whole: errors are reported in the returned result.
    pub async fn analyze_single(&self, url: &str, query: &str) -> AnalysisResult {
        let query = effective_query(query);
        info!("Analysing {}", url.trim());
        self.run_document(0, 1, url, &query, None).await
    }

    /// Like [`Analyzer::analyze_single`], but abandons the document once
    /// `cancel` fires.
    pub async fn analyze_single_cancellable(
        &self,
        url: &str,
        query: &str,
        cancel: CancellationToken,
    ) -> AnalysisResult {
        let query = effective_query(query);
        info!("Analysing {}", url.trim());
        self.run_document(0, 1, url, &query, Some(&cancel)).await
    }

    /// Analyse every URL with the same query.
    ///
    /// Returns one result per input, in input order, regardless of failures.
    pub async fn analyze_batch(&self, urls: &[String], query: &str) -> BatchReport {
        self.run_batch(urls, query, None).await
    }

    /// Like [`Analyzer::analyze_batch`], but abandons unfinished documents
    /// once `cancel` fires.
    ///
    /// Abandoned documents report [`DocumentError::Cancelled`] and never write
    /// an answer to the cache.
    pub async fn analyze_batch_cancellable(
        &self,
        urls: &[String],
        query: &str,
        cancel: CancellationToken,
    ) -> BatchReport {
        self.run_batch(urls, query, Some(&cancel)).await
    }

    async fn run_batch(
        &self,
        urls: &[String],
        query: &str,
        cancel: Option<&CancellationToken>,
    ) -> BatchReport {
        let start = Instant::now();
        let total = urls.len();
        let query = effective_query(query);
        info!(
            "Starting batch of {} documents (concurrency {})",
            total, self.config.concurrency
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_start(total);
        }

        let query_ref = query.as_str();
        let mut indexed: Vec<(usize, AnalysisResult)> =
            stream::iter(urls.iter().enumerate().map(|(position, url)| async move {
                let result = self
                    .run_document(position, total, url, query_ref, cancel)
                    .await;
                (position, result)
            }))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        // Completion order → input order
        indexed.sort_by_key(|(position, _)| *position);
        let results = indexed.into_iter().map(|(_, r)| r).collect();

        let report = BatchReport::from_results(results, start.elapsed().as_millis() as u64);
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(total, report.summary.succeeded);
        }
        info!(
            "Batch complete: {}/{} succeeded ({} from cache) in {}ms",
            report.summary.succeeded,
            report.summary.total,
            report.summary.cached,
            report.summary.total_duration_ms
        );
        report
    }

    /// Run one document to a terminal state.
    pub(crate) async fn run_document(
        &self,
        position: usize,
        total: usize,
        url: &str,
        query: &str,
        cancel: Option<&CancellationToken>,
    ) -> AnalysisResult {
        let start = Instant::now();
        let mut document: Option<DocumentRef> = None;

        let result = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(DocumentError::Cancelled),
                r = self.process(position, total, url, query, &mut document) => r,
            },
            None => self.process(position, total, url, query, &mut document).await,
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let outcome = match result {
            Ok((answer, cached)) => {
                info!(
                    "[{}/{}] {} succeeded in {}ms{}",
                    position + 1,
                    total,
                    url,
                    duration_ms,
                    if cached { " (cached)" } else { "" }
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_document_complete(position, total, url, cached);
                }
                Outcome::Succeeded { answer, cached }
            }
            Err(error) => {
                warn!(
                    "[{}/{}] {} failed after {}ms: {} ({})",
                    position + 1,
                    total,
                    url,
                    duration_ms,
                    error,
                    error.kind()
                );
                if let Some(ref cb) = self.config.progress_callback {
                    cb.on_document_error(position, total, url, &error.to_string());
                }
                Outcome::Failed { error }
            }
        };

        AnalysisResult {
            url: url.to_string(),
            document,
            outcome,
            duration_ms,
        }
    }

    /// Returns `(answer, served_from_cache)`.
    async fn process(
        &self,
        position: usize,
        total: usize,
        url: &str,
        query: &str,
        document: &mut Option<DocumentRef>,
    ) -> Result<(String, bool), DocumentError> {
        self.notify_stage(position, total, url, DocumentState::Pending);
        let fingerprint = Fingerprint::compute(url, query);

        if self.config.use_cache {
            if let Some(entry) = self.cache.lookup(&fingerprint) {
                info!("Cache hit for {} ({})", url, fingerprint);
                *document = Some(entry.source);
                return Ok((entry.answer, true));
            }
            debug!("Cache miss for {} ({})", url, fingerprint);
        }

        let cached_index = if self.config.cache_indexes {
            self.indexes.get(url)
        } else {
            None
        };

        let index = match cached_index {
            Some(index) => {
                info!("Reusing index for {} ({} chunks)", url, index.len());
                index
            }
            None => {
                self.notify_stage(position, total, url, DocumentState::Fetching);
                let fetched = self.retrying("fetch", url, || self.fetcher.fetch(url)).await?;
                *document = Some(fetched.reference.clone());

                self.notify_stage(position, total, url, DocumentState::Indexing);
                let index = Arc::new(
                    self.retrying("index", url, || self.index_stage(&fetched))
                        .await?,
                );
                if self.config.cache_indexes {
                    self.indexes.insert(url, Arc::clone(&index));
                }
                index
            }
        };
        *document = Some(index.document().clone());

        self.notify_stage(position, total, url, DocumentState::Querying);
        let answer = self
            .retrying("query", url, || self.query_stage(&index, query))
            .await?;

        if self.config.use_cache {
            self.cache
                .store(fingerprint, answer.clone(), index.document().clone());
        }
        Ok((answer, false))
    }

    // ── Stages ───────────────────────────────────────────────────────────

    async fn index_stage(&self, fetched: &FetchedDocument) -> Result<DocumentIndex, DocumentError> {
        match tokio::time::timeout(self.config.index_timeout(), self.indexer.build(fetched)).await {
            Ok(result) => result.map_err(DocumentError::from),
            Err(_) => Err(IndexError::EmbeddingUnavailable {
                detail: format!(
                    "indexing timed out after {}s",
                    self.config.index_timeout_secs
                ),
            }
            .into()),
        }
    }

    async fn query_stage(&self, index: &DocumentIndex, query: &str) -> Result<String, DocumentError> {
        match tokio::time::timeout(self.config.query_timeout(), self.engine.answer(index, query)).await
        {
            Ok(result) => result.map_err(DocumentError::from),
            Err(_) => Err(QueryError::ProviderError {
                provider: self.config.llm_provider.clone(),
                detail: format!("query timed out after {}s", self.config.query_timeout_secs),
            }
            .into()),
        }
    }

    /// Run `op`, re-running it on retriable errors per the retry policy.
    async fn retrying<T, F, Fut>(&self, stage: &str, url: &str, mut op: F) -> Result<T, DocumentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, DocumentError>>,
    {
        let policy = self.config.retry;
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retriable() && attempt < policy.max_retries => {
                    attempt += 1;
                    let delay = policy.delay_for(attempt);
                    warn!(
                        "{} {}: retry {}/{} after {}ms ({})",
                        stage,
                        url,
                        attempt,
                        policy.max_retries,
                        delay.as_millis(),
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn notify_stage(&self, position: usize, total: usize, url: &str, state: DocumentState) {
        debug!("[{}/{}] {} → {}", position + 1, total, url, state.label());
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage(position, total, url, state);
        }
    }
}

/// Normalise the query, falling back to the default summary request.
pub(crate) fn effective_query(query: &str) -> String {
    let q = normalize_query(query);
    if q.is_empty() {
        DEFAULT_QUERY.to_string()
    } else {
        q
    }
}
