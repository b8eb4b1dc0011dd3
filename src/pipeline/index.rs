//! Builds a searchable vector index over one document.

use crate::error::IndexError;
use crate::output::DocumentRef;
use crate::pipeline::chunk::{chunk_pages, Chunk};
use crate::pipeline::embed::{cosine_similarity, Embedder};
use crate::pipeline::fetch::FetchedDocument;
use std::sync::Arc;
use tracing::{debug, info};

/// One chunk and its embedding.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A chunk returned by [`DocumentIndex::top_k`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Embedding-backed index of one document. Never empty.
#[derive(Debug, Clone)]
pub struct DocumentIndex {
    document: DocumentRef,
    entries: Vec<IndexEntry>,
    dims: usize,
}

impl DocumentIndex {
    pub fn document(&self) -> &DocumentRef {
        &self.document
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// The `k` chunks most similar to `query_vector`, best first.
    ///
    /// Ties keep document order, so the result is deterministic.
    pub fn top_k(&self, query_vector: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|e| ScoredChunk {
                chunk: e.chunk.clone(),
                score: cosine_similarity(&e.vector, query_vector),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.chunk.index.cmp(&b.chunk.index))
        });
        scored.truncate(k);
        scored
    }
}

/// Chunks a fetched document and embeds every chunk.
pub struct DocumentIndexer {
    embedder: Arc<dyn Embedder>,
    chunk_size_tokens: usize,
    chunk_overlap_tokens: usize,
    batch_size: usize,
}

impl DocumentIndexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        chunk_size_tokens: usize,
        chunk_overlap_tokens: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            chunk_size_tokens,
            chunk_overlap_tokens,
            batch_size: batch_size.max(1),
        }
    }

    /// Build the index. No retries; see [`crate::config::RetryPolicy`].
    pub async fn build(&self, document: &FetchedDocument) -> Result<DocumentIndex, IndexError> {
        let chunks = chunk_pages(
            &document.pages,
            self.chunk_size_tokens,
            self.chunk_overlap_tokens,
        );
        if chunks.is_empty() {
            return Err(IndexError::EmptyDocument {
                pages: document.reference.page_count,
            });
        }
        info!(
            "Indexing {} chunks from {} pages of {}",
            chunks.len(),
            document.reference.page_count,
            document.reference.url
        );

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self.embedder.embed(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(IndexError::EmbeddingUnavailable {
                    detail: format!(
                        "expected {} embeddings, got {}",
                        texts.len(),
                        embedded.len()
                    ),
                });
            }
            vectors.extend(embedded);
        }

        let dims = vectors.first().map_or(0, Vec::len);
        if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
            return Err(IndexError::EmbeddingUnavailable {
                detail: "embedding vectors have inconsistent dimensions".to_string(),
            });
        }
        debug!(
            "Embedded {} chunks ({} dims) with {}",
            vectors.len(),
            dims,
            self.embedder.model_name()
        );

        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry { chunk, vector })
            .collect();

        Ok(DocumentIndex {
            document: document.reference.clone(),
            entries,
            dims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Vector = [count of "cat", count of "dog", 1].
    #[derive(Default)]
    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![t.matches("cat").count() as f32, t.matches("dog").count() as f32, 1.0]
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
            Err(IndexError::EmbeddingUnavailable {
                detail: "quota".into(),
            })
        }
    }

    fn doc(pages: &[&str]) -> FetchedDocument {
        FetchedDocument {
            reference: DocumentRef {
                url: "https://example.com/a.pdf".into(),
                byte_size: 100,
                page_count: pages.len(),
                content_sha256: "00".into(),
            },
            pages: pages.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn empty_document_is_rejected() {
        let embedder = Arc::new(CountingEmbedder::default());
        let indexer = DocumentIndexer::new(embedder.clone(), 1024, 20, 64);
        let err = indexer.build(&doc(&["", "   "])).await.unwrap_err();
        assert_eq!(err, IndexError::EmptyDocument { pages: 2 });
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn embeds_in_batches() {
        let embedder = Arc::new(CountingEmbedder::default());
        let indexer = DocumentIndexer::new(embedder.clone(), 1024, 20, 2);
        let index = indexer
            .build(&doc(&["Cats.", "Dogs.", "Birds.", "Fish.", "Frogs."]))
            .await
            .unwrap();
        assert_eq!(index.len(), 5);
        assert_eq!(index.dims(), 3);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn top_k_ranks_by_similarity() {
        let indexer = DocumentIndexer::new(Arc::new(CountingEmbedder::default()), 1024, 20, 64);
        let index = indexer
            .build(&doc(&["The dog barked.", "A cat and another cat.", "Weather report."]))
            .await
            .unwrap();
        let hits = index.top_k(&[1.0, 0.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.page, 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn top_k_larger_than_index() {
        let indexer = DocumentIndexer::new(Arc::new(CountingEmbedder::default()), 1024, 20, 64);
        let index = indexer.build(&doc(&["Only page."])).await.unwrap();
        assert_eq!(index.top_k(&[0.0, 0.0, 1.0], 10).len(), 1);
    }

    #[tokio::test]
    async fn embedding_failure_propagates() {
        let indexer = DocumentIndexer::new(Arc::new(FailingEmbedder), 1024, 20, 64);
        let err = indexer.build(&doc(&["Text."])).await.unwrap_err();
        assert!(matches!(err, IndexError::EmbeddingUnavailable { .. }));
    }
}
