//! # edgequake-pdfqa
//!
//! Ask questions about PDF documents using retrieval-augmented generation.
//!
//! ## Why this crate?
//!
//! Pasting a whole PDF into an LLM prompt is slow, expensive and often does
//! not fit. Instead this crate extracts the text, embeds it in small chunks,
//! and sends the LLM only the few chunks most relevant to the question.
//! Answers are cached per (document, query) so repeated questions cost
//! nothing, and batches of documents are analysed concurrently with failures
//! isolated per document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! URL + query
//!  │
//!  ├─ 0. Cache    fingerprint(url, query) → cached answer? done
//!  ├─ 1. Fetch    download, ≤ 32 MiB, %PDF check
//!  ├─ 2. Extract  per-page text (CPU-bound, spawn_blocking), ≤ 100 pages
//!  ├─ 3. Chunk    sentence-aware, 1024 tokens, 20 overlap
//!  ├─ 4. Embed    text-embedding-3-small
//!  ├─ 5. Query    top-3 chunks → Claude, tree-summarize
//!  └─ 6. Store    answer cached under the fingerprint
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdfqa::{AnalysisConfig, Analyzer, ResponseCache};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Needs ANTHROPIC_API_KEY and OPENAI_API_KEY
//!     let analyzer = Analyzer::from_env(AnalysisConfig::default(), Arc::new(ResponseCache::new()))?;
//!     let result = analyzer
//!         .analyze_single("https://arxiv.org/pdf/1706.03762", "What is the main contribution?")
//!         .await;
//!     match result.answer() {
//!         Some(answer) => println!("{answer}"),
//!         None => eprintln!("failed: {}", result.error().map(|e| e.to_string()).unwrap_or_default()),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfqa` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdfqa = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
pub mod cache;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod providers;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{Analyzer, Services};
pub use cache::{CacheEntry, Fingerprint, IndexCache, ResponseCache};
pub use config::{AnalysisConfig, AnalysisConfigBuilder, RetryPolicy, DEFAULT_QUERY};
pub use error::{DocumentError, FetchError, IndexError, LimitExceeded, PdfQaError, QueryError};
pub use output::{
    AnalysisResult, BatchReport, BatchSummary, DocumentRef, DocumentState, Outcome,
};
pub use pipeline::fetch::parse_url_list;
pub use progress::{AnalysisProgressCallback, NoopProgressCallback, ProgressCallback};
pub use providers::Credentials;
pub use stream::ResultStream;
pub use tokio_util::sync::CancellationToken;
