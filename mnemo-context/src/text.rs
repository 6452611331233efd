//! Token-window chunking for retrieval passages.
//!
//! Notes are split into overlapping windows of whitespace-delimited tokens. Each
//! window becomes a [`TextChunk`], the unit that the lexical and vector indexes
//! store and that search results point back to.
//!
//! The chunker is deterministic: running it twice over identical text yields the
//! same boundaries, the same line ranges and the same content hashes. That is what
//! keeps embedding-cache entries valid across re-index runs.
//!
//! # Windowing
//!
//! - A token is a maximal run of non-whitespace characters.
//! - Every chunk holds at most `target_tokens` tokens.
//! - Consecutive chunks share exactly `overlap_tokens` tokens, except at the
//!   document tail where the last window may share fewer.
//! - Chunk text is the exact slice of the source from the first token's start to
//!   the last token's end, so interior whitespace and newlines are preserved.
//!
//! ```
//! use mnemo_context::text::chunk;
//!
//! let text = "one two three four five six seven";
//! let chunks: Vec<_> = chunk(text, 4, 1).collect();
//!
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[0].text, "one two three four");
//! assert_eq!(chunks[1].text, "four five six seven");
//!
//! // Restartable: a second pass is byte-identical.
//! let again: Vec<_> = chunk(text, 4, 1).collect();
//! assert_eq!(chunks, again);
//! ```
use serde::Serialize;
use std::ops::Range;

/// Default window size in tokens.
pub const DEFAULT_TARGET_TOKENS: usize = 400;

/// Default overlap between consecutive windows, in tokens.
pub const DEFAULT_OVERLAP_TOKENS: usize = 80;

/// One contiguous, bounded span of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextChunk {
    /// Position of this chunk within the document (0-indexed).
    pub index: usize,
    /// Byte offset of the first token, relative to the whole document.
    pub start_byte: usize,
    /// Byte offset one past the last token, relative to the whole document.
    pub end_byte: usize,
    /// 1-based line on which the chunk starts.
    pub start_line: usize,
    /// 1-based line on which the chunk ends.
    pub end_line: usize,
    /// Exact source text covered by this chunk.
    pub text: String,
    /// blake3 hex digest of `text`.
    pub hash: String,
}

/// Stable content hash used for chunk text, embedding inputs and file bodies.
pub fn content_hash(text: &str) -> String {
    blake3::hash(text.as_bytes()).to_hex().to_string()
}

/// Window parameters for [`TextChunker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextChunker {
    target_tokens: usize,
    overlap_tokens: usize,
}

impl Default for TextChunker {
    fn default() -> Self {
        Self::new(DEFAULT_TARGET_TOKENS, DEFAULT_OVERLAP_TOKENS)
    }
}

impl TextChunker {
    /// Creates a chunker. A zero target is treated as one token, and the overlap is
    /// clamped below the target so every window advances.
    pub fn new(target_tokens: usize, overlap_tokens: usize) -> Self {
        let target_tokens = target_tokens.max(1);
        Self {
            target_tokens,
            overlap_tokens: overlap_tokens.min(target_tokens - 1),
        }
    }

    pub fn target_tokens(&self) -> usize {
        self.target_tokens
    }

    pub fn overlap_tokens(&self) -> usize {
        self.overlap_tokens
    }

    /// Chunks `text` as a standalone document.
    pub fn chunks<'a>(&self, text: &'a str) -> ChunkIter<'a> {
        self.chunks_at(text, 0, 0)
    }

    /// Chunks a body that starts `byte_offset` bytes and `line_offset` lines into a
    /// larger document, so offsets and line numbers stay document-relative. Used to
    /// chunk a note's body after its frontmatter has been stripped.
    pub fn chunks_at<'a>(
        &self,
        text: &'a str,
        byte_offset: usize,
        line_offset: usize,
    ) -> ChunkIter<'a> {
        ChunkIter {
            text,
            tokens: token_spans(text),
            target: self.target_tokens,
            stride: self.target_tokens - self.overlap_tokens,
            next_token: 0,
            index: 0,
            byte_offset,
            line_cursor: (0, line_offset + 1),
            done: false,
        }
    }
}

/// Chunks `text` into windows of at most `target_tokens` tokens that overlap by
/// `overlap_tokens`.
pub fn chunk(text: &str, target_tokens: usize, overlap_tokens: usize) -> ChunkIter<'_> {
    TextChunker::new(target_tokens, overlap_tokens).chunks(text)
}

/// Lazy iterator over the chunks of one document.
///
/// Cloning the iterator restarts nothing; cloning before iteration gives an
/// independent pass over the same windows.
#[derive(Debug, Clone)]
pub struct ChunkIter<'a> {
    text: &'a str,
    tokens: Vec<Range<usize>>,
    target: usize,
    stride: usize,
    next_token: usize,
    index: usize,
    byte_offset: usize,
    // (byte position in `text`, 1-based line at that position)
    line_cursor: (usize, usize),
    done: bool,
}

impl ChunkIter<'_> {
    fn line_at(&mut self, pos: usize) -> usize {
        let (cursor, line) = self.line_cursor;
        let line = if pos >= cursor {
            line + count_newlines(&self.text[cursor..pos])
        } else {
            line - count_newlines(&self.text[pos..cursor])
        };
        self.line_cursor = (pos, line);
        line
    }
}

impl Iterator for ChunkIter<'_> {
    type Item = TextChunk;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next_token >= self.tokens.len() {
            return None;
        }

        let first = self.next_token;
        let last = (first + self.target).min(self.tokens.len()) - 1;
        let start = self.tokens[first].start;
        let end = self.tokens[last].end;

        let end_line = self.line_at(end);
        let start_line = self.line_at(start);

        if last + 1 >= self.tokens.len() {
            self.done = true;
        } else {
            self.next_token = first + self.stride;
        }

        let text = &self.text[start..end];
        let chunk = TextChunk {
            index: self.index,
            start_byte: self.byte_offset + start,
            end_byte: self.byte_offset + end,
            start_line,
            end_line,
            text: text.to_string(),
            hash: content_hash(text),
        };
        self.index += 1;
        Some(chunk)
    }
}

fn token_spans(text: &str) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        match (c.is_whitespace(), start) {
            (true, Some(s)) => {
                spans.push(s..i);
                start = None;
            }
            (false, None) => start = Some(i),
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(s..text.len());
    }
    spans
}

fn count_newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn empty_and_blank_text_yield_nothing() {
        assert_eq!(chunk("", 10, 2).count(), 0);
        assert_eq!(chunk("  \n\t ", 10, 2).count(), 0);
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks: Vec<_> = chunk("the sky is blue", 400, 80).collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "the sky is blue");
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 1);
        assert_eq!(chunks[0].hash, content_hash("the sky is blue"));
    }

    #[test]
    fn windows_respect_target_and_overlap() {
        let text = words(23);
        let chunks: Vec<_> = chunk(&text, 10, 3).collect();

        for c in &chunks {
            assert!(c.text.split_whitespace().count() <= 10);
        }
        for pair in chunks.windows(2) {
            let a: Vec<_> = pair[0].text.split_whitespace().collect();
            let b: Vec<_> = pair[1].text.split_whitespace().collect();
            let shared = a.iter().rev().take(3).rev().copied().collect::<Vec<_>>();
            let head = b.iter().take(3).copied().collect::<Vec<_>>();
            // Full windows overlap by exactly three tokens.
            if a.len() == 10 {
                assert_eq!(shared, head);
            }
        }
        let last = chunks.last().map(|c| c.text.clone()).unwrap_or_default();
        assert!(last.ends_with("w22"));
    }

    #[test]
    fn overlap_is_clamped_below_target() {
        let chunker = TextChunker::new(4, 10);
        assert_eq!(chunker.overlap_tokens(), 3);
        let chunks: Vec<_> = chunker.chunks(&words(6)).collect();
        assert_eq!(chunks.len(), 3);

        let zero = TextChunker::new(0, 0);
        assert_eq!(zero.target_tokens(), 1);
        assert_eq!(zero.chunks("a b c").count(), 3);
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = format!("{}\n\n{}\n{}", words(50), words(30), words(70));
        let first: Vec<_> = chunk(&text, 16, 4).collect();
        let second: Vec<_> = chunk(&text, 16, 4).collect();
        assert_eq!(first, second);

        let iter = chunk(&text, 16, 4);
        let cloned = iter.clone();
        assert_eq!(iter.collect::<Vec<_>>(), cloned.collect::<Vec<_>>());
    }

    #[test]
    fn line_numbers_track_newlines() {
        let text = "alpha beta\ngamma delta\n\nepsilon zeta\neta theta";
        let chunks: Vec<_> = chunk(text, 4, 2).collect();

        assert_eq!(chunks[0].text, "alpha beta\ngamma delta");
        assert_eq!((chunks[0].start_line, chunks[0].end_line), (1, 2));
        assert_eq!(chunks[1].text, "gamma delta\n\nepsilon zeta");
        assert_eq!((chunks[1].start_line, chunks[1].end_line), (2, 4));
        assert_eq!(chunks[2].text, "epsilon zeta\neta theta");
        assert_eq!((chunks[2].start_line, chunks[2].end_line), (4, 5));
    }

    #[test]
    fn offsets_are_document_relative() {
        let doc = "---\ntitle: x\n---\nbody text here";
        let body_start = doc.find("body").unwrap_or(0);
        let chunks: Vec<_> = TextChunker::new(10, 0)
            .chunks_at(&doc[body_start..], body_start, 3)
            .collect();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_byte, body_start);
        assert_eq!(&doc[chunks[0].start_byte..chunks[0].end_byte], "body text here");
        assert_eq!(chunks[0].start_line, 4);
    }

    #[test]
    fn multibyte_text_slices_on_char_boundaries() {
        let text = "café naïve résumé über straße";
        let chunks: Vec<_> = chunk(text, 2, 1).collect();
        assert_eq!(chunks[0].text, "café naïve");
        assert_eq!(chunks.last().map(|c| c.text.as_str()), Some("über straße"));
    }
}
