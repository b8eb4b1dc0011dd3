//! Answer cache and index cache.
//!
//! ## Fingerprints
//!
//! A [`Fingerprint`] is the hex SHA-256 of a versioned, length-prefixed
//! encoding of `(url, normalised query)`. It depends on nothing else, so two
//! processes agree on it and a persisted cache can be reused across runs.
//! Length prefixes keep `("ab", "c")` and `("a", "bc")` apart.
//!
//! The URL stands in for the document's content: content identity is only
//! known after a download, and a cache lookup must not force one. A remote
//! PDF that changes under the same URL is therefore served stale until the
//! cache is cleared. Each [`CacheEntry`] records the content hash it was
//! computed from so staleness can be audited.
//!
//! ## Bounds
//!
//! Neither cache evicts. Both live for the session (or, for the answer cache,
//! for as long as its persisted file is kept).

use crate::error::PdfQaError;
use crate::output::DocumentRef;
use crate::pipeline::index::DocumentIndex;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

/// Bumped whenever the key derivation changes.
const FINGERPRINT_VERSION: &str = "pdfqa-fp-v1";

/// Format version of the persisted cache file.
const CACHE_FILE_VERSION: u32 = 1;

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Collapse whitespace runs to a single space and trim. Case is preserved.
pub fn normalize_query(query: &str) -> String {
    RE_WHITESPACE.replace_all(query.trim(), " ").into_owned()
}

/// Deterministic cache key for a (document, query) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of `(url, query)`.
    pub fn compute(url: &str, query: &str) -> Self {
        let url = url.trim();
        let query = normalize_query(query);

        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_VERSION.as_bytes());
        for part in [url, query.as_str()] {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A cached answer. Entries are replaced, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub answer: String,
    pub created_at: DateTime<Utc>,
    /// The document the answer was computed from.
    pub source: DocumentRef,
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    entries: Vec<(Fingerprint, CacheEntry)>,
}

/// Fingerprint → answer map shared by all document pipelines of a batch.
///
/// Owned by the caller and handed to [`crate::analyze::Analyzer`], so tests
/// get isolation simply by creating a fresh cache.
#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: RwLock<HashMap<Fingerprint, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries.get(fingerprint).cloned()
    }

    /// Insert an answer. Concurrent stores for the same fingerprint resolve
    /// last-writer-wins.
    pub fn store(&self, fingerprint: Fingerprint, answer: impl Into<String>, source: DocumentRef) {
        let entry = CacheEntry {
            answer: answer.into(),
            created_at: Utc::now(),
            source,
        };
        debug!("Caching answer under {}", fingerprint);
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.insert(fingerprint, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|p| p.into_inner())
            .clear();
    }

    /// Load a cache previously written by [`ResponseCache::save`].
    ///
    /// A missing file yields an empty cache.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PdfQaError> {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cache file at {}, starting empty", path.display());
                return Ok(Self::new());
            }
            Err(e) => {
                return Err(PdfQaError::CacheReadFailed {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };

        let file: CacheFile =
            serde_json::from_str(&raw).map_err(|e| PdfQaError::CacheCorrupt {
                path: path.to_path_buf(),
                detail: e.to_string(),
            })?;
        if file.version != CACHE_FILE_VERSION {
            return Err(PdfQaError::CacheCorrupt {
                path: path.to_path_buf(),
                detail: format!(
                    "unsupported version {} (expected {})",
                    file.version, CACHE_FILE_VERSION
                ),
            });
        }

        info!("Loaded {} cached answers from {}", file.entries.len(), path.display());
        Ok(Self {
            entries: RwLock::new(file.entries.into_iter().collect()),
        })
    }

    /// Persist the cache as JSON.
    ///
    /// Uses atomic write (temp file in the same directory + rename) so a
    /// crash never leaves a truncated cache behind.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PdfQaError> {
        let path = path.as_ref();
        let write_err = |source: std::io::Error| PdfQaError::CacheWriteFailed {
            path: path.to_path_buf(),
            source,
        };

        let mut entries: Vec<(Fingerprint, CacheEntry)> = {
            let map = self.entries.read().unwrap_or_else(|p| p.into_inner());
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        let json = serde_json::to_vec_pretty(&CacheFile {
            version: CACHE_FILE_VERSION,
            entries,
        })
        .map_err(|e| PdfQaError::Internal(format!("cache serialisation: {e}")))?;

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => std::path::PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir).map_err(write_err)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(&json).map_err(write_err)?;
        tmp.persist(path).map_err(|e| write_err(e.error))?;

        debug!("Saved {} cached answers to {}", self.len(), path.display());
        Ok(())
    }
}

/// Built indexes keyed by URL, reused across queries on the same document.
#[derive(Default)]
pub struct IndexCache {
    indexes: Mutex<HashMap<String, Arc<DocumentIndex>>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, url: &str) -> Option<Arc<DocumentIndex>> {
        let indexes = self.indexes.lock().unwrap_or_else(|p| p.into_inner());
        indexes.get(url.trim()).cloned()
    }

    pub fn insert(&self, url: &str, index: Arc<DocumentIndex>) {
        let mut indexes = self.indexes.lock().unwrap_or_else(|p| p.into_inner());
        indexes.insert(url.trim().to_string(), index);
    }

    pub fn len(&self) -> usize {
        self.indexes.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(url: &str) -> DocumentRef {
        DocumentRef {
            url: url.into(),
            byte_size: 10,
            page_count: 1,
            content_sha256: "abc".into(),
        }
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = Fingerprint::compute("https://x/a.pdf", "What is this?");
        let b = Fingerprint::compute("https://x/a.pdf", "What is this?");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn fingerprint_differs_by_url_and_query() {
        let base = Fingerprint::compute("https://x/a.pdf", "q1");
        assert_ne!(base, Fingerprint::compute("https://x/b.pdf", "q1"));
        assert_ne!(base, Fingerprint::compute("https://x/a.pdf", "q2"));
    }

    #[test]
    fn fingerprint_fields_do_not_bleed() {
        assert_ne!(
            Fingerprint::compute("https://x/ab", "c"),
            Fingerprint::compute("https://x/a", "bc")
        );
    }

    #[test]
    fn fingerprint_ignores_whitespace_noise() {
        assert_eq!(
            Fingerprint::compute(" https://x/a.pdf ", "  Summarise\n the   paper "),
            Fingerprint::compute("https://x/a.pdf", "Summarise the paper")
        );
    }

    #[test]
    fn normalize_preserves_case() {
        assert_eq!(normalize_query("  Hello\t\tWorld \n"), "Hello World");
    }

    #[test]
    fn store_then_lookup() {
        let cache = ResponseCache::new();
        let fp = Fingerprint::compute("u", "q");
        assert!(cache.lookup(&fp).is_none());
        cache.store(fp.clone(), "answer", doc("u"));
        assert_eq!(cache.lookup(&fp).unwrap().answer, "answer");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn last_write_wins() {
        let cache = ResponseCache::new();
        let fp = Fingerprint::compute("u", "q");
        cache.store(fp.clone(), "first", doc("u"));
        cache.store(fp.clone(), "second", doc("u"));
        assert_eq!(cache.lookup(&fp).unwrap().answer, "second");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let cache = ResponseCache::new();
        let fp = Fingerprint::compute("https://x/a.pdf", "q");
        cache.store(fp.clone(), "persisted", doc("https://x/a.pdf"));
        cache.save(&path).unwrap();

        let loaded = ResponseCache::load(&path).unwrap();
        let entry = loaded.lookup(&fp).unwrap();
        assert_eq!(entry.answer, "persisted");
        assert_eq!(entry.source.url, "https://x/a.pdf");
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = ResponseCache::load(dir.path().join("absent.json")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn load_corrupt_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            ResponseCache::load(&path),
            Err(PdfQaError::CacheCorrupt { .. })
        ));
    }
}
