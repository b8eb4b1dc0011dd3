//! Pipeline stages for PDF question answering.
//!
//! Each submodule implements one step. External services sit behind traits
//! ([`fetch::PdfSource`], [`extract::PdfTextExtractor`], [`embed::Embedder`],
//! [`query::Completer`]) so every stage can be tested with in-process fakes.
//!
//! ## Data Flow
//!
//! ```text
//! fetch ──▶ extract ──▶ chunk ──▶ embed ──▶ index ──▶ query ──▶ postprocess
//! (HTTP)    (pdf text)  (1024 tok) (OpenAI)  (top-k)   (LLM)     (cleanup)
//! ```
//!
//! 1. [`fetch`]: download, size gate, `%PDF` check, page gate
//! 2. [`extract`]: per-page text; runs in `spawn_blocking` because PDF
//!    parsing is CPU-bound
//! 3. [`chunk`]: sentence-aware chunks with overlap, one page at a time
//! 4. [`embed`]: embedding service client and vector helpers
//! 5. [`index`]: builds the searchable [`index::DocumentIndex`]
//! 6. [`query`]: retrieval, prompt assembly, LLM call
//! 7. [`postprocess`]: deterministic cleanup of the answer text
//!
//! No stage retries on its own; retry policy lives in [`crate::analyze`].

pub mod chunk;
pub mod embed;
pub mod extract;
pub mod fetch;
pub mod index;
pub mod postprocess;
pub mod query;
