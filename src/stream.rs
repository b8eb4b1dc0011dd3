//! Streaming batch API: emit results as documents finish.
//!
//! [`Analyzer::analyze_batch`] returns only after every document is done.
//! [`Analyzer::analyze_batch_stream`] instead yields each result as soon as
//! its document reaches a terminal state, tagged with its input position, so
//! callers can render partial results or write them out incrementally.
//! Items arrive in completion order; sort by position if order matters.

use crate::analyze::{effective_query, Analyzer};
use crate::output::AnalysisResult;
use futures::stream::{self, StreamExt};
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::info;

/// A boxed stream of `(input position, result)` pairs.
pub type ResultStream<'a> = Pin<Box<dyn Stream<Item = (usize, AnalysisResult)> + Send + 'a>>;

impl Analyzer {
    /// Analyse every URL, yielding results in completion order.
    ///
    /// The stream yields exactly `urls.len()` items. Batch-level progress
    /// callbacks (`on_batch_start` / `on_batch_complete`) are not fired;
    /// per-document callbacks are.
    pub fn analyze_batch_stream<'a>(&'a self, urls: &'a [String], query: &str) -> ResultStream<'a> {
        let total = urls.len();
        let query = effective_query(query);
        info!("Starting streaming batch of {} documents", total);

        let s = stream::iter(urls.iter().enumerate())
            .map(move |(position, url)| {
                let query = query.clone();
                async move {
                    let result = self.run_document(position, total, url, &query, None).await;
                    (position, result)
                }
            })
            .buffer_unordered(self.config().concurrency);
        Box::pin(s)
    }
}
