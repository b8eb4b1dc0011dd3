//! Sentence-aware chunker.
//!
//! Splits extracted page text into [`Chunk`]s of at most `size_tokens`
//! tokens, with `overlap_tokens` repeated between consecutive chunks of the
//! same page.
//!
//! # Algorithm
//!
//! 1. Convert token counts to characters using a 4 chars/token ratio.
//! 2. For each page, collapse whitespace and split into sentences at
//!    `.`, `!` or `?` followed by whitespace.
//! 3. Accumulate sentences into a buffer until the next one would exceed
//!    the limit; flush the buffer as a chunk and seed the next buffer with
//!    the last `overlap` characters of the flushed chunk, cut at a word
//!    boundary.
//! 4. Sentences longer than the limit are hard-split at spaces.
//!
//! Chunks never span two pages, so every chunk carries exactly one page
//! number. Pages without text produce no chunks; a document whose pages are
//! all empty produces an empty vector.

use once_cell::sync::Lazy;
use regex::Regex;

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static RE_SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[.!?]+["')\]]*\s+"#).unwrap());

/// A retrievable slice of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Position in the document, contiguous from 0.
    pub index: usize,
    /// 1-based page number.
    pub page: usize,
    pub text: String,
}

/// Chunk every page of a document.
pub fn chunk_pages(pages: &[String], size_tokens: usize, overlap_tokens: usize) -> Vec<Chunk> {
    let max_chars = size_tokens.max(1) * CHARS_PER_TOKEN;
    let overlap_chars = overlap_tokens.saturating_mul(CHARS_PER_TOKEN).min(max_chars / 2);

    let mut chunks = Vec::new();
    for (i, page) in pages.iter().enumerate() {
        for text in chunk_page(page, max_chars, overlap_chars) {
            chunks.push(Chunk {
                index: chunks.len(),
                page: i + 1,
                text,
            });
        }
    }
    chunks
}

fn chunk_page(page: &str, max_chars: usize, overlap_chars: usize) -> Vec<String> {
    let text = RE_WHITESPACE.replace_all(page.trim(), " ");
    if text.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut buf = String::new();

    for sentence in split_sentences(&text) {
        for piece in hard_split(sentence, max_chars) {
            if !buf.is_empty() && buf.len() + 1 + piece.len() > max_chars {
                let tail = overlap_tail(&buf, overlap_chars).to_string();
                out.push(std::mem::take(&mut buf));
                if !tail.is_empty() && tail.len() + 1 + piece.len() <= max_chars {
                    buf = tail;
                }
            }
            if !buf.is_empty() {
                buf.push(' ');
            }
            buf.push_str(piece);
        }
    }

    if !buf.is_empty() {
        out.push(buf);
    }
    out
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in RE_SENTENCE_END.find_iter(text) {
        let s = text[start..m.end()].trim();
        if !s.is_empty() {
            sentences.push(s);
        }
        start = m.end();
    }
    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// Split an oversized sentence at the last space before the limit.
fn hard_split(sentence: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut remaining = sentence;
    while remaining.len() > max_chars {
        let limit = floor_char_boundary(remaining, max_chars);
        let split_at = match remaining[..limit].rfind(' ') {
            Some(pos) if pos > 0 => pos,
            _ if limit > 0 => limit,
            // Limit smaller than the first character.
            _ => remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len()),
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece);
        }
        remaining = remaining[split_at..].trim_start();
    }
    if !remaining.is_empty() {
        pieces.push(remaining);
    }
    pieces
}

/// The last `n` characters of `text`, starting at a word boundary.
fn overlap_tail(text: &str, n: usize) -> &str {
    if n == 0 || text.is_empty() {
        return "";
    }
    if text.len() <= n {
        return text;
    }
    let mut start = text.len() - n;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    let at_word_start = text[..start].ends_with(' ');
    if !at_word_start {
        match text[start..].find(' ') {
            Some(pos) => start += pos + 1,
            None => return "",
        }
    }
    text[start..].trim()
}

fn floor_char_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut i = idx;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pages(texts: &[&str]) -> Vec<String> {
        texts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn empty_document_has_no_chunks() {
        assert!(chunk_pages(&[], 1024, 20).is_empty());
        assert!(chunk_pages(&pages(&["", "  \n\t "]), 1024, 20).is_empty());
    }

    #[test]
    fn small_page_is_one_chunk() {
        let chunks = chunk_pages(&pages(&["Hello world.\n\nSecond   line."]), 1024, 20);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello world. Second line.");
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn chunks_do_not_cross_pages() {
        let chunks = chunk_pages(&pages(&["First page.", "", "Third page."]), 1024, 20);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].page, 1);
        assert_eq!(chunks[1].page, 3);
        assert_eq!(chunks[1].index, 1);
    }

    #[test]
    fn respects_size_limit() {
        let text = "This is a sentence of moderate length. ".repeat(100);
        let chunks = chunk_pages(&pages(&[&text]), 20, 2);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 80, "chunk too long: {}", c.text.len());
        }
        let indices: Vec<usize> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, (0..chunks.len()).collect::<Vec<_>>());
    }

    #[test]
    fn consecutive_chunks_overlap() {
        let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota. Kappa lambda mu.";
        let chunks = chunk_pages(&pages(&[text]), 10, 3);
        assert!(chunks.len() >= 2);
        let last_word = chunks[0].text.split(' ').last().unwrap();
        assert!(
            chunks[1].text.starts_with(last_word),
            "{:?} should start with {:?}",
            chunks[1].text,
            last_word
        );
    }

    #[test]
    fn no_overlap_when_zero() {
        let text = "Alpha beta gamma. Delta epsilon zeta. Eta theta iota. Kappa lambda mu.";
        let chunks = chunk_pages(&pages(&[text]), 10, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "Alpha beta gamma. Delta epsilon zeta.");
        assert_eq!(chunks[1].text, "Eta theta iota. Kappa lambda mu.");
    }

    #[test]
    fn long_sentence_is_hard_split() {
        let text = "word ".repeat(200);
        let chunks = chunk_pages(&pages(&[&text]), 10, 0);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.text.len() <= 40));
        assert!(chunks.iter().all(|c| !c.text.starts_with(' ')));
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let text = "Überprüfung der Maßnahmen für Größenordnungen. ".repeat(50);
        let chunks = chunk_pages(&pages(&[&text]), 8, 2);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn sentence_split_keeps_punctuation() {
        assert_eq!(
            split_sentences("One. Two! Three? Four"),
            vec!["One.", "Two!", "Three?", "Four"]
        );
    }
}
