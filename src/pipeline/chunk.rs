//! Chunking: split page text into bounded, overlapping windows.
//!
//! Windows are measured in `char`s so a multi-byte character is never cut in
//! half. Within each window the splitter prefers to end just after the last
//! separator, but it falls back to a hard cut at `chunk_size` when no
//! separator is in range, so the size cap holds for any input.
//!
//! For one segment the chunks satisfy:
//!
//! * every chunk has at most `chunk_size` chars;
//! * consecutive chunks share exactly `chunk_overlap` chars;
//! * the first chunk followed by every later chunk minus its first
//!   `chunk_overlap` chars is the original segment.

use crate::config::ChunkingConfig;
use crate::pipeline::extract::TextSegment;
use serde::{Deserialize, Serialize};

/// A contiguous window of one page's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChunk {
    /// Position in the document's chunk sequence.
    pub index: usize,
    /// 1-indexed source page.
    pub page: usize,
    /// Char offset of the first char within the page text.
    pub start: usize,
    /// Char offset one past the last char within the page text.
    pub end: usize,
    pub text: String,
}

/// Split every segment, numbering chunks across the whole document.
pub fn chunk_segments(segments: &[TextSegment], config: &ChunkingConfig) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    for segment in segments {
        for (start, end) in split_windows(&segment.text, config) {
            chunks.push(TextChunk {
                index: chunks.len(),
                page: segment.page,
                start,
                end,
                text: slice_chars(&segment.text, start, end),
            });
        }
    }
    chunks
}

/// Compute `(start, end)` char ranges for one text.
///
/// `config` is assumed valid (see [`ChunkingConfig::validate`]).
pub fn split_windows(text: &str, config: &ChunkingConfig) -> Vec<(usize, usize)> {
    let chars: Vec<char> = text.chars().collect();
    let n = chars.len();
    if n == 0 {
        return Vec::new();
    }

    let size = config.chunk_size.max(1);
    let overlap = config.chunk_overlap.min(size - 1);
    let sep: Vec<char> = config.separator.chars().collect();

    let mut windows = Vec::new();
    let mut start = 0;
    loop {
        let hard_end = (start + size).min(n);
        if hard_end == n {
            windows.push((start, n));
            break;
        }

        // The split must leave more than `overlap` chars behind, otherwise
        // the next window would not advance.
        let end = last_separator_end(&chars, &sep, start + overlap + 1, hard_end).unwrap_or(hard_end);
        windows.push((start, end));
        start = end - overlap;
    }
    windows
}

/// Largest `e` in `[min_end, max_end]` such that `chars[..e]` ends with `sep`.
fn last_separator_end(chars: &[char], sep: &[char], min_end: usize, max_end: usize) -> Option<usize> {
    if sep.is_empty() || max_end < sep.len() {
        return None;
    }
    let lowest = min_end.max(sep.len());
    (lowest..=max_end)
        .rev()
        .find(|&e| chars[e - sep.len()..e] == *sep)
}

fn slice_chars(text: &str, start: usize, end: usize) -> String {
    text.chars().skip(start).take(end - start).collect()
}
