//! PDF text extraction: bytes → one string per page.
//!
//! Parsing is CPU-bound and the parser may panic on hostile input, so the
//! fetcher always calls into a [`PdfTextExtractor`] from
//! `tokio::task::spawn_blocking`; a panic surfaces as a join error there and
//! is reported as an invalid PDF instead of taking the process down.

use tracing::debug;

/// Turns raw PDF bytes into per-page text.
///
/// Implementations must be deterministic: the same bytes yield the same pages.
pub trait PdfTextExtractor: Send + Sync {
    /// Extract the text of every page, in page order.
    ///
    /// Image-only pages yield empty (or whitespace-only) strings, not errors.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, String>;

    /// Page count read from the document structure, without extracting text.
    ///
    /// Lets the fetcher apply the page gate before the expensive pass.
    /// `None` means unknown; the gate then runs on the extracted pages.
    fn page_count(&self, _bytes: &[u8]) -> Option<usize> {
        None
    }
}

/// Default extractor backed by the `pdf-extract` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfExtractBackend;

impl PdfTextExtractor for PdfExtractBackend {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, String> {
        let pages =
            pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| e.to_string())?;
        debug!("Extracted text from {} pages", pages.len());
        Ok(pages)
    }

    fn page_count(&self, bytes: &[u8]) -> Option<usize> {
        match lopdf::Document::load_mem(bytes) {
            Ok(doc) => Some(doc.get_pages().len()),
            Err(e) => {
                debug!("Page count unavailable: {}", e);
                None
            }
        }
    }
}

/// True when no page carries any non-whitespace text.
pub fn is_text_empty(pages: &[String]) -> bool {
    pages.iter().all(|p| p.trim().is_empty())
}
