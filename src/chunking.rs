//! Splitting cleaned text into bounded, overlapping chunks.
//!
//! The splitter works in two phases. First the text is cut recursively
//! along a priority list of separators (paragraph break, line break,
//! sentence boundary, word boundary, single characters) into pieces no
//! longer than the chunk size, with each separator kept attached to the
//! piece it terminates so that concatenating all pieces reproduces the
//! input exactly. Then pieces are packed into chunks, and each new chunk
//! starts with the tail of the previous one so adjacent chunks share
//! `overlap` characters of context across the cut.
//!
//! All sizes are measured in characters, not bytes.

use serde::{Deserialize, Serialize};

/// Separator priority, coarsest first. Character-level splitting is the
/// implicit last resort.
const SEPARATORS: [&str; 6] = ["\n\n", "\n", ". ", "! ", "? ", " "];

/// A bounded slice of source text with positional metadata.
///
/// Created during ingestion and never mutated; re-ingesting a source
/// replaces its chunks wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub content: String,
    /// Identifier of the originating source (the URL it was scraped from).
    pub source_id: String,
    /// 0-based position within the source, stable across re-ingestion.
    pub sequence_index: usize,
}

/// Split `text` into overlapping segments of at most `chunk_size`
/// characters.
///
/// `overlap` is clamped below `chunk_size`. Empty input yields an empty
/// vector, not an error.
pub fn split_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let chunk_size = chunk_size.max(1);
    let overlap = overlap.min(chunk_size - 1);

    let pieces = split_recursive(text, chunk_size, &SEPARATORS);
    assemble(pieces, chunk_size, overlap)
}

/// Split a source document into indexed chunks.
pub fn chunk_source(
    text: &str,
    source_id: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<Chunk> {
    split_text(text, chunk_size, overlap)
        .into_iter()
        .enumerate()
        .map(|(sequence_index, content)| Chunk {
            content,
            source_id: source_id.to_string(),
            sequence_index,
        })
        .collect()
}

/// Cut text into pieces of at most `chunk_size` characters, trying the
/// given separators coarsest-first and recursing with finer ones for any
/// segment that still exceeds the budget.
fn split_recursive(text: &str, chunk_size: usize, separators: &[&str]) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return vec![text.to_string()];
    }

    let Some((separator, finer)) = separators.split_first() else {
        return split_chars(text, chunk_size);
    };

    let segments = split_keeping_separator(text, separator);
    if segments.len() == 1 {
        // Separator absent at this level; try the next-finer one.
        return split_recursive(text, chunk_size, finer);
    }

    let mut pieces = Vec::new();
    for segment in segments {
        if char_len(segment) <= chunk_size {
            pieces.push(segment.to_string());
        } else {
            pieces.extend(split_recursive(segment, chunk_size, finer));
        }
    }
    pieces
}

/// Split at a separator, keeping the separator attached to the preceding
/// segment so the pieces concatenate back to the input.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut segments = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        segments.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        segments.push(&text[start..]);
    }

    segments
}

/// Last-resort split into fixed character windows.
fn split_chars(text: &str, chunk_size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(chunk_size)
        .map(|window| window.iter().collect())
        .collect()
}

/// Pack pieces into chunks of at most `chunk_size` characters, carrying
/// the previous chunk's tail into the next one as overlap. The carried
/// tail is shortened when a long piece would otherwise push a chunk past
/// the budget.
fn assemble(pieces: Vec<String>, chunk_size: usize, overlap: usize) -> Vec<String> {
    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    // Characters of `current` that are carried overlap rather than new
    // content; a chunk is only emitted once it holds new content.
    let mut carried = 0;

    for piece in pieces {
        let piece_len = char_len(&piece);

        if current_len + piece_len > chunk_size && current_len > carried {
            let carry = overlap.min(chunk_size.saturating_sub(piece_len));
            let tail = tail_chars(&current, carry);
            chunks.push(current);
            current = tail;
            current_len = char_len(&current);
            carried = current_len;
        } else if current_len + piece_len > chunk_size {
            // Nothing but carry so far and the piece still does not fit;
            // shrink the carry instead of overshooting the budget.
            let carry = overlap.min(chunk_size.saturating_sub(piece_len));
            current = tail_chars(&current, carry);
            current_len = char_len(&current);
            carried = current_len;
        }

        current.push_str(&piece);
        current_len += piece_len;
    }

    if current_len > carried {
        chunks.push(current);
    }

    chunks
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn tail_chars(text: &str, n: usize) -> String {
    let len = char_len(text);
    text.chars().skip(len.saturating_sub(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(split_text("", 100, 10).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = split_text("Hello, world!", 100, 10);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn chunks_respect_the_size_bound() {
        let text = "word ".repeat(200);
        for chunk in split_text(&text, 50, 10) {
            assert!(chunk.chars().count() <= 50, "oversized chunk: {:?}", chunk);
        }
    }

    #[test]
    fn three_sentences_with_tiny_budget() {
        let chunks = split_text("A. B. C.", 5, 1);

        assert!(chunks.len() >= 3, "expected several small chunks");
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 5);
        }

        // All three sentences are covered, in order.
        let joined = chunks.join("");
        let a = joined.find('A').unwrap();
        let b = joined.find('B').unwrap();
        let c = joined.find('C').unwrap();
        assert!(a < b && b < c);

        // Adjacent chunks overlap by one character.
        for pair in chunks.windows(2) {
            let tail: String = pair[0].chars().rev().take(1).collect();
            assert!(pair[1].starts_with(&tail));
        }
    }

    #[test]
    fn stripping_overlap_reconstructs_the_text() {
        let text = "the quick brown fox jumps over the lazy dog again and again ".repeat(10);
        let overlap = 10;
        let chunks = split_text(&text, 50, overlap);
        assert!(chunks.len() > 1);

        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.extend(chunk.chars().skip(overlap));
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn overlap_at_least_chunk_size_is_clamped() {
        // Must terminate and keep the bound despite the bad overlap.
        let chunks = split_text("A. B. C.", 5, 7);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 5);
        }
    }

    #[test]
    fn paragraph_boundary_is_preferred() {
        let text = format!("{}\n\n{}", "a".repeat(30), "b".repeat(30));
        let chunks = split_text(&text, 40, 0);

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].starts_with('a'));
        assert!(chunks[1].chars().all(|c| c == 'b'));
    }

    #[test]
    fn unsplittable_run_falls_back_to_characters() {
        let text = "x".repeat(120);
        let chunks = split_text(&text, 50, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.join(""), text);
    }

    #[test]
    fn multibyte_characters_never_split_a_code_point() {
        let text = "café ☕ naïve 日本語 🎉 ".repeat(30);
        let chunks = split_text(&text, 40, 8);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40);
        }
    }

    #[test]
    fn chunk_source_assigns_sequential_indices() {
        let text = "one two three four five six seven eight nine ten ".repeat(5);
        let chunks = chunk_source(&text, "https://example.com/page", 60, 10);

        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence_index, i);
            assert_eq!(chunk.source_id, "https://example.com/page");
        }
    }
}
