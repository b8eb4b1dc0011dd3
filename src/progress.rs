//! Progress-callback trait for per-document analysis events.
//!
//! Inject an [`Arc<dyn AnalysisProgressCallback>`] via
//! [`crate::config::AnalysisConfigBuilder::progress_callback`] to receive
//! events as documents move through the pipeline.
//!
//! Positions are 0-based indexes into the request's URL list; single-document
//! calls report position 0 of 1.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdfqa::{AnalysisConfig, AnalysisProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     failed: AtomicUsize,
//! }
//!
//! impl AnalysisProgressCallback for CountingCallback {
//!     fn on_document_error(&self, position: usize, total: usize, url: &str, error: &str) {
//!         self.failed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {url} failed: {error}", position + 1, total);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { failed: AtomicUsize::new(0) });
//! let config = AnalysisConfig::builder()
//!     .progress_callback(cb as Arc<dyn AnalysisProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::DocumentState;
use std::sync::Arc;

/// Called by the pipeline as each document advances.
///
/// Batch documents are processed concurrently, so implementations must be
/// `Send + Sync` and protect shared mutable state themselves. All methods
/// default to no-ops.
pub trait AnalysisProgressCallback: Send + Sync {
    /// Called once before a batch starts.
    fn on_batch_start(&self, total: usize) {
        let _ = total;
    }

    /// Called on every non-terminal state transition of a document.
    fn on_stage(&self, position: usize, total: usize, url: &str, state: DocumentState) {
        let _ = (position, total, url, state);
    }

    /// Called when a document succeeds.
    ///
    /// `cached` is true when the answer came from the response cache.
    fn on_document_complete(&self, position: usize, total: usize, url: &str, cached: bool) {
        let _ = (position, total, url, cached);
    }

    /// Called when a document fails.
    fn on_document_error(&self, position: usize, total: usize, url: &str, error: &str) {
        let _ = (position, total, url, error);
    }

    /// Called once after every document of a batch reached a terminal state.
    fn on_batch_complete(&self, total: usize, succeeded: usize) {
        let _ = (total, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl AnalysisProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::AnalysisConfig`].
pub type ProgressCallback = Arc<dyn AnalysisProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        states: Mutex<Vec<DocumentState>>,
    }

    impl AnalysisProgressCallback for Recorder {
        fn on_stage(&self, _position: usize, _total: usize, _url: &str, state: DocumentState) {
            self.states.lock().unwrap().push(state);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(2);
        cb.on_stage(0, 2, "https://a", DocumentState::Fetching);
        cb.on_document_complete(0, 2, "https://a", false);
        cb.on_document_error(1, 2, "https://b", "boom");
        cb.on_batch_complete(2, 1);
    }

    #[test]
    fn recorder_sees_states_in_order() {
        let rec = Recorder::default();
        rec.on_stage(0, 1, "u", DocumentState::Fetching);
        rec.on_stage(0, 1, "u", DocumentState::Indexing);
        rec.on_stage(0, 1, "u", DocumentState::Querying);
        assert_eq!(
            *rec.states.lock().unwrap(),
            vec![
                DocumentState::Fetching,
                DocumentState::Indexing,
                DocumentState::Querying
            ]
        );
    }

    #[test]
    fn arc_dyn_callback_works() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_batch_start(3);
    }
}
