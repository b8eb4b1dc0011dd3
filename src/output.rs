//! Result types returned by the analysis entry points.

use crate::error::DocumentError;
use serde::{Deserialize, Serialize};

/// A fetched document that passed the size and page gates.
///
/// Created by [`crate::pipeline::fetch::DocumentFetcher`] and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub url: String,
    /// Downloaded size in bytes.
    pub byte_size: u64,
    pub page_count: usize,
    /// Hex SHA-256 of the downloaded bytes.
    pub content_sha256: String,
}

/// Per-document pipeline state.
///
/// `Pending → Fetching → Indexing → Querying → {Succeeded, Failed}`.
/// Every document is reported as `Pending` first. A cache hit goes straight
/// from `Pending` to `Succeeded`; an index-cache hit skips `Fetching` and
/// `Indexing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentState {
    Pending,
    Fetching,
    Indexing,
    Querying,
    Succeeded,
    Failed,
}

impl DocumentState {
    pub fn label(self) -> &'static str {
        match self {
            DocumentState::Pending => "pending",
            DocumentState::Fetching => "fetching",
            DocumentState::Indexing => "indexing",
            DocumentState::Querying => "querying",
            DocumentState::Succeeded => "succeeded",
            DocumentState::Failed => "failed",
        }
    }
}

/// Terminal outcome of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Succeeded {
        answer: String,
        /// True when the answer came from the response cache.
        cached: bool,
    },
    Failed {
        error: DocumentError,
    },
}

/// Outcome of analysing one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// The URL exactly as requested.
    pub url: String,
    /// Known once the document has been fetched (or was cached).
    pub document: Option<DocumentRef>,
    pub outcome: Outcome,
    pub duration_ms: u64,
}

impl AnalysisResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded { .. })
    }

    pub fn answer(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Succeeded { answer, .. } => Some(answer),
            Outcome::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&DocumentError> {
        match &self.outcome {
            Outcome::Succeeded { .. } => None,
            Outcome::Failed { error } => Some(error),
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self.outcome, Outcome::Succeeded { cached: true, .. })
    }

    pub fn state(&self) -> DocumentState {
        if self.is_success() {
            DocumentState::Succeeded
        } else {
            DocumentState::Failed
        }
    }
}

/// Success/failure counts for a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Successful documents answered from the response cache.
    pub cached: usize,
    pub total_duration_ms: u64,
}

/// Ordered batch results (input order) plus summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub results: Vec<AnalysisResult>,
    pub summary: BatchSummary,
}

impl BatchReport {
    pub fn from_results(results: Vec<AnalysisResult>, total_duration_ms: u64) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let cached = results.iter().filter(|r| r.is_cached()).count();
        let summary = BatchSummary {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            cached,
            total_duration_ms,
        };
        Self { results, summary }
    }
}
