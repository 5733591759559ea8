//! Token Estimation and Chunking
//!
//! Cheap size checks performed before any network call, and splitting of
//! oversized inputs into overlapping windows.
//!
//! ## Strategy
//! - Estimate tokens as one per four characters (floor)
//! - Reject inputs above the operation budget before sending
//! - Chunk-aware operations split input into windows of at most 90% of the
//!   budget, with a small overlap so context is not lost at the seams

use tracing::debug;

use crate::constants::{chunk, tokens};
use crate::types::{Result, SophiaError};

/// Estimate token count for a string (characters / 4, rounded down)
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / tokens::CHARS_PER_TOKEN
}

/// Reject input whose estimate exceeds `max_tokens`.
///
/// Returns the estimate on success so callers can log it.
pub fn validate_size(text: &str, max_tokens: usize) -> Result<usize> {
    let estimated = estimate_tokens(text);
    if estimated > max_tokens {
        debug!(estimated, max_tokens, "Input rejected by size check");
        return Err(SophiaError::InputTooLarge {
            estimated,
            max: max_tokens,
        });
    }
    Ok(estimated)
}

/// Ordered, overlapping windows covering an input with no gaps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSet {
    chunks: Vec<String>,
}

impl ChunkSet {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Never true: empty input still yields one empty chunk
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// More than one window was needed
    pub fn is_chunked(&self) -> bool {
        self.chunks.len() > 1
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(String::as_str)
    }

    pub fn into_inner(self) -> Vec<String> {
        self.chunks
    }
}

/// Window size in characters for a token budget
pub fn window_chars(max_tokens: usize) -> usize {
    let scaled = (max_tokens * tokens::CHARS_PER_TOKEN) as f64 * chunk::FILL_RATIO;
    chunk::MIN_WINDOW_CHARS.max(scaled as usize)
}

/// Overlap in characters between neighbouring windows
pub fn overlap_chars(window: usize) -> usize {
    chunk::MAX_OVERLAP_CHARS.min(window / chunk::OVERLAP_DIVISOR)
}

/// Split text into overlapping windows sized for `max_tokens`.
///
/// Lengths are counted in characters, so multi-byte text is never split
/// inside a code point. Each window after the first starts `overlap`
/// characters before the previous one ended; the last window ends exactly at
/// the end of the input.
pub fn chunk_text(text: &str, max_tokens: usize) -> ChunkSet {
    let window = window_chars(max_tokens);
    let overlap = overlap_chars(window);

    // Byte offset of every char boundary, including the end of the string
    let boundaries: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let n = boundaries.len() - 1;

    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = n.min(start + window);
        chunks.push(text[boundaries[start]..boundaries[end]].to_string());
        if end >= n {
            break;
        }
        start = end - overlap;
    }

    if chunks.len() > 1 {
        debug!(
            chunks = chunks.len(),
            window, overlap, "Split input into overlapping chunks"
        );
    }

    ChunkSet { chunks }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens(&"x".repeat(48_000)), 12_000);
        // Counted in chars, not bytes
        assert_eq!(estimate_tokens("éééé"), 1);
    }

    #[test]
    fn test_validate_size_boundary() {
        assert_eq!(validate_size(&"x".repeat(48_000), 12_000).unwrap(), 12_000);

        let err = validate_size(&"x".repeat(48_004), 12_000).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Input too large (12001 estimated tokens, max 12000). Please reduce input size."
        );
    }

    #[test]
    fn test_empty_input_single_empty_chunk() {
        let set = chunk_text("", 12_000);
        assert_eq!(set.len(), 1);
        assert!(!set.is_chunked());
        assert_eq!(set.iter().next(), Some(""));
    }

    #[test]
    fn test_window_and_overlap_sizes() {
        assert_eq!(window_chars(12_000), 43_200);
        assert_eq!(overlap_chars(43_200), 400);
        // Small budgets clamp to the minimum window
        assert_eq!(window_chars(10), 1_000);
        assert_eq!(overlap_chars(1_000), 100);
    }

    #[test]
    fn test_small_input_not_chunked() {
        let set = chunk_text("fn main() {}", 12_000);
        assert_eq!(set.len(), 1);
        assert_eq!(set.into_inner(), vec!["fn main() {}".to_string()]);
    }

    #[test]
    fn test_large_input_chunks_with_overlap() {
        // 50 000 chars against a 43 200 char window
        let text = "a".repeat(50_000);
        let set = chunk_text(&text, 12_000);
        assert_eq!(set.len(), 2);
        assert!(set.is_chunked());

        let chunks = set.into_inner();
        assert_eq!(chunks[0].len(), 43_200);
        // Second window starts 400 chars before the first ended
        assert_eq!(chunks[1].len(), 50_000 - (43_200 - 400));
    }

    #[test]
    fn test_multibyte_boundaries() {
        let text = "é".repeat(2_500);
        let set = chunk_text(&text, 10);
        for chunk in set.iter() {
            assert!(chunk.chars().all(|c| c == 'é'));
        }
        assert_eq!(set.iter().next().map(|c| c.chars().count()), Some(1_000));
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_input(text in "[a-z \\n]{0,5000}", max_tokens in 1usize..600) {
            let window = window_chars(max_tokens);
            let overlap = overlap_chars(window);
            let chunks = chunk_text(&text, max_tokens).into_inner();

            prop_assert!(!chunks.is_empty());
            for chunk in &chunks {
                prop_assert!(chunk.chars().count() <= window);
            }

            // Dropping each window's leading overlap reconstructs the input
            let mut rebuilt = chunks[0].clone();
            for chunk in &chunks[1..] {
                rebuilt.extend(chunk.chars().skip(overlap));
            }
            prop_assert_eq!(rebuilt, text);
        }
    }
}
