#[cfg(test)]
mod tests;

use std::sync::LazyLock;

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{MemoryError, Result};

/// A contiguous slice of a parent document, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The chunk text, an exact substring of the parent
    pub content: String,
    /// Position of this chunk within the parent
    pub chunk_index: usize,
    /// Character offset where the chunk starts in the parent
    pub start: usize,
    /// Character offset one past the chunk's last character
    pub end: usize,
}

/// Configuration for text chunking. Sizes are measured in characters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk length
    pub max_chunk_size: usize,
    /// Characters shared between the end of one chunk and the start of the next
    pub overlap_size: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            max_chunk_size: 500,
            overlap_size: 50,
        }
    }
}

// Split points, strongest first. A cut is made at the end of a match.
static BOUNDARY_PATTERNS: LazyLock<Vec<std::result::Result<Regex, fancy_regex::Error>>> =
    LazyLock::new(|| {
        [
            // paragraph break
            r"\n[ \t]*\n\s*",
            // sentence end followed by whitespace
            r#"(?<=[.!?])["')\]]*\s+"#,
            // line break
            r"\n+",
            // any whitespace run
            r"\s+",
        ]
        .into_iter()
        .map(Regex::new)
        .collect()
    });

/// Split `text` into ordered chunks of at most `max_size` characters where
/// consecutive chunks share exactly `overlap` characters.
///
/// Chunks end on the strongest boundary found in the second half of the
/// window and fall back to a hard cut at `max_size`. The result is a pure
/// function of the arguments, so re-chunking the same document reproduces
/// the same chunks.
#[inline]
pub fn split_text(text: &str, max_size: usize, overlap: usize) -> Result<Vec<TextChunk>> {
    if max_size == 0 {
        return Err(MemoryError::Chunking(
            "max chunk size must be greater than zero".to_string(),
        ));
    }
    if overlap >= max_size {
        return Err(MemoryError::Chunking(format!(
            "overlap ({}) must be smaller than max chunk size ({})",
            overlap, max_size
        )));
    }

    // offsets[k] is the byte offset of character k; the last entry is text.len()
    let offsets: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();
    let char_count = offsets.len() - 1;

    let mut chunks = Vec::new();
    if char_count == 0 {
        return Ok(chunks);
    }

    // Boundaries closer than this to the chunk start are ignored so that
    // every step advances past the overlap.
    let min_len = (max_size / 2).max(overlap + 1);

    let mut start = 0;
    loop {
        let hard_end = (start + max_size).min(char_count);
        let end = if hard_end == char_count {
            char_count
        } else {
            find_boundary(text, &offsets, start, hard_end, min_len)?.unwrap_or(hard_end)
        };

        chunks.push(TextChunk {
            content: text[offsets[start]..offsets[end]].to_string(),
            chunk_index: chunks.len(),
            start,
            end,
        });

        if end == char_count {
            break;
        }
        start = end - overlap;
    }

    debug!(
        "Split {} characters into {} chunks (max {}, overlap {})",
        char_count,
        chunks.len(),
        max_size,
        overlap
    );

    Ok(chunks)
}

/// Chunk text with the sizes from a [`ChunkingConfig`]
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>> {
    split_text(text, config.max_chunk_size, config.overlap_size)
}

/// Character index of the best cut in `(start + min_len)..=hard_end`, if any
fn find_boundary(
    text: &str,
    offsets: &[usize],
    start: usize,
    hard_end: usize,
    min_len: usize,
) -> Result<Option<usize>> {
    let window_start = offsets[start];
    let window = &text[window_start..offsets[hard_end]];

    for pattern in BOUNDARY_PATTERNS.iter() {
        let regex = pattern
            .as_ref()
            .map_err(|e| MemoryError::Chunking(format!("invalid boundary pattern: {}", e)))?;

        let mut best = None;
        for found in regex.find_iter(window) {
            let found =
                found.map_err(|e| MemoryError::Chunking(format!("boundary search failed: {}", e)))?;
            let byte_end = window_start + found.end();
            if let Ok(cut) = offsets.binary_search(&byte_end) {
                if cut - start >= min_len {
                    best = Some(cut);
                }
            }
        }

        if best.is_some() {
            return Ok(best);
        }
    }

    Ok(None)
}

/// Estimate token count using a simple heuristic
/// This is a rough approximation - actual tokenization would be more accurate
#[inline]
pub fn estimate_token_count(text: &str) -> usize {
    // Rough heuristic: 1 token ≈ 0.75 words for English text
    // Add extra tokens for punctuation and special characters
    let word_count = text.split_whitespace().count();
    let punct_count = text.chars().filter(|c| c.is_ascii_punctuation()).count();

    (punct_count as f64).mul_add(0.1, word_count as f64 / 0.75) as usize
}
