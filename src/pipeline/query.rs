//! Query engine: retrieval, prompt assembly and answer synthesis.
//!
//! ## Tree summarize
//!
//! The top-k retrieved chunks are packed into groups whose combined length
//! stays under `max_context_chars`. A single group is answered with one LLM
//! call. Several groups are answered independently and the partial answers
//! are merged by further calls, level by level, until one answer remains.
//!
//! The engine never re-fetches or re-indexes and never retries; every LLM
//! call either yields a complete, cleaned answer or a [`QueryError`].

use crate::error::QueryError;
use crate::pipeline::embed::Embedder;
use crate::pipeline::index::DocumentIndex;
use crate::pipeline::postprocess::clean_answer;
use crate::prompts::{answer_prompt, combine_prompt, excerpt};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider};
use std::sync::Arc;
use tracing::{debug, info};

/// Produces text for a (system, user) prompt pair.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Provider name used in error reports.
    fn name(&self) -> &str;

    /// Run one completion and return the full text.
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, QueryError>;
}

/// [`Completer`] over an `edgequake_llm` provider.
pub struct LlmCompleter {
    provider: Arc<dyn LLMProvider>,
    provider_name: String,
    temperature: f32,
    max_tokens: usize,
}

impl LlmCompleter {
    pub fn new(
        provider: Arc<dyn LLMProvider>,
        provider_name: impl Into<String>,
        temperature: f32,
        max_tokens: usize,
    ) -> Self {
        Self {
            provider,
            provider_name: provider_name.into(),
            temperature,
            max_tokens,
        }
    }

    fn build_options(&self) -> CompletionOptions {
        CompletionOptions {
            temperature: Some(self.temperature),
            max_tokens: Some(self.max_tokens),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Completer for LlmCompleter {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn complete(&self, system: &str, prompt: &str) -> Result<String, QueryError> {
        let messages = vec![ChatMessage::system(system), ChatMessage::user(prompt)];
        let options = self.build_options();

        let response = self
            .provider
            .chat(&messages, Some(&options))
            .await
            .map_err(|e| classify_provider_error(&self.provider_name, &format!("{}", e)))?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.provider_name, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}

/// Map a provider error message onto the query error taxonomy.
pub fn classify_provider_error(provider: &str, message: &str) -> QueryError {
    let lower = message.to_lowercase();
    if lower.contains("429")
        || lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("overloaded")
    {
        QueryError::RateLimited {
            provider: provider.to_string(),
            detail: message.to_string(),
        }
    } else if lower.contains("parse") || lower.contains("json") || lower.contains("deserializ") {
        QueryError::MalformedResponse {
            detail: message.to_string(),
        }
    } else {
        QueryError::ProviderError {
            provider: provider.to_string(),
            detail: message.to_string(),
        }
    }
}

/// Answers queries against a built [`DocumentIndex`].
pub struct QueryEngine {
    embedder: Arc<dyn Embedder>,
    completer: Arc<dyn Completer>,
    top_k: usize,
    max_context_chars: usize,
    system_prompt: String,
}

impl QueryEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        completer: Arc<dyn Completer>,
        top_k: usize,
        max_context_chars: usize,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            completer,
            top_k: top_k.max(1),
            max_context_chars,
            system_prompt: system_prompt.into(),
        }
    }

    /// Answer `query` from the chunks of `index` most similar to it.
    pub async fn answer(&self, index: &DocumentIndex, query: &str) -> Result<String, QueryError> {
        let vectors = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| QueryError::ProviderError {
                provider: self.embedder.model_name().to_string(),
                detail: e.to_string(),
            })?;
        let query_vector = vectors.into_iter().next().ok_or_else(|| QueryError::ProviderError {
            provider: self.embedder.model_name().to_string(),
            detail: "no embedding returned for the query".to_string(),
        })?;

        let hits = index.top_k(&query_vector, self.top_k);
        debug!(
            "Retrieved {} chunks for {}: scores {:?}",
            hits.len(),
            index.document().url,
            hits.iter().map(|h| h.score).collect::<Vec<_>>()
        );

        let excerpts: Vec<String> = hits
            .iter()
            .map(|h| excerpt(h.chunk.page, &h.chunk.text))
            .collect();

        let mut answers = Vec::new();
        for pack in pack_context(&excerpts, self.max_context_chars) {
            let prompt = answer_prompt(&pack.join("\n\n"), query);
            answers.push(self.complete(&prompt).await?);
        }

        let mut level = 0;
        while answers.len() > 1 {
            level += 1;
            let mut groups = pack_context(&answers, self.max_context_chars);
            if groups.len() >= answers.len() {
                groups = answers.chunks(2).map(<[String]>::to_vec).collect();
            }
            info!(
                "Combining {} partial answers into {} (level {})",
                answers.len(),
                groups.len(),
                level
            );
            let mut next = Vec::with_capacity(groups.len());
            for group in &groups {
                if let [single] = group.as_slice() {
                    next.push(single.clone());
                    continue;
                }
                next.push(self.complete(&combine_prompt(group, query)).await?);
            }
            answers = next;
        }

        answers
            .pop()
            .ok_or_else(|| QueryError::MalformedResponse {
                detail: "no answer was produced".to_string(),
            })
    }

    async fn complete(&self, prompt: &str) -> Result<String, QueryError> {
        let raw = self.completer.complete(&self.system_prompt, prompt).await?;
        let answer = clean_answer(&raw);
        if answer.is_empty() {
            return Err(QueryError::MalformedResponse {
                detail: format!("{} returned an empty answer", self.completer.name()),
            });
        }
        Ok(answer)
    }
}

/// Greedily group texts so each group's total length stays within `max_chars`.
///
/// A text longer than `max_chars` is truncated and placed in its own group.
fn pack_context(texts: &[String], max_chars: usize) -> Vec<Vec<String>> {
    let mut groups: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut current_len = 0;

    for text in texts {
        let text = truncate_chars(text, max_chars);
        if !current.is_empty() && current_len + 2 + text.len() > max_chars {
            groups.push(std::mem::take(&mut current));
            current_len = 0;
        }
        let sep = if current.is_empty() { 0 } else { 2 };
        current_len += sep + text.len();
        current.push(text);
    }
    if !current.is_empty() {
        groups.push(current);
    }
    groups
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.len() <= max_chars {
        return text.to_string();
    }
    let mut end = max_chars;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_rate_limit() {
        let e = classify_provider_error("anthropic", "HTTP 429 Too Many Requests");
        assert!(matches!(e, QueryError::RateLimited { .. }));
        let e = classify_provider_error("anthropic", "Overloaded");
        assert!(matches!(e, QueryError::RateLimited { .. }));
    }

    #[test]
    fn classify_parse_failure() {
        let e = classify_provider_error("anthropic", "failed to parse JSON body");
        assert!(matches!(e, QueryError::MalformedResponse { .. }));
    }

    #[test]
    fn classify_other() {
        let e = classify_provider_error("anthropic", "connection reset");
        assert_eq!(
            e,
            QueryError::ProviderError {
                provider: "anthropic".into(),
                detail: "connection reset".into()
            }
        );
    }

    #[test]
    fn pack_fits_in_one_group() {
        let texts = vec!["a".repeat(10), "b".repeat(10)];
        assert_eq!(pack_context(&texts, 100).len(), 1);
    }

    #[test]
    fn pack_splits_when_too_long() {
        let texts = vec!["a".repeat(60), "b".repeat(60), "c".repeat(30)];
        let groups = pack_context(&texts, 100);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].len(), 1);
        assert_eq!(groups[1].len(), 2);
    }

    #[test]
    fn oversize_text_is_truncated() {
        let groups = pack_context(&["é".repeat(100)], 51);
        assert_eq!(groups.len(), 1);
        assert!(groups[0][0].len() <= 51);
    }
}
