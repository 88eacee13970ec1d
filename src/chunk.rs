//! Recursive character text splitter.
//!
//! Splits corpus text into overlapping passages of at most `chunk_size`
//! characters. The splitter tries coarse separators first (paragraphs, then
//! lines, sentences, words) and only falls back to finer ones for pieces that
//! are still too long, so chunk boundaries land on the most natural break
//! available.
//!
//! Each emitted chunk carries its character span in the source text, and
//! [`text_hash`] gives the SHA-256 digest used to detect unchanged chunks
//! between preparation runs.

use sha2::{Digest, Sha256};

use crate::models::TextSpan;

/// Separators tried in order. `""` splits into single characters.
const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Split `text` into trimmed, non-empty chunks of at most `chunk_size`
/// characters, carrying up to `chunk_overlap` characters between
/// neighbours.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<TextSpan> {
    if chunk_size == 0 || text.trim().is_empty() {
        return Vec::new();
    }
    let pieces = split_recursive(text, SEPARATORS, chunk_size, chunk_overlap);
    locate_spans(text, pieces, chunk_overlap)
}

/// SHA-256 hex digest of a chunk's text.
pub fn text_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(
    text: &str,
    separators: &[&str],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<String> {
    let idx = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
        .unwrap_or(separators.len().saturating_sub(1));
    let sep = separators.get(idx).copied().unwrap_or("");
    let finer = separators.get(idx + 1..).unwrap_or(&[]);

    // Separators stay attached to the end of the piece they terminate.
    let splits: Vec<&str> = if sep.is_empty() {
        text.char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect()
    } else {
        text.split_inclusive(sep).collect()
    };

    let mut out = Vec::new();
    let mut fitting: Vec<&str> = Vec::new();

    for piece in splits {
        if char_len(piece) <= chunk_size {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            out.extend(merge_pieces(&fitting, chunk_size, chunk_overlap));
            fitting.clear();
        }
        if finer.is_empty() {
            out.push(piece.trim().to_string());
        } else {
            out.extend(split_recursive(piece, finer, chunk_size, chunk_overlap));
        }
    }
    if !fitting.is_empty() {
        out.extend(merge_pieces(&fitting, chunk_size, chunk_overlap));
    }

    out.retain(|c| !c.is_empty());
    out
}

/// Greedily pack pieces into chunks, keeping a tail of up to
/// `chunk_overlap` characters as the head of the next chunk.
fn merge_pieces(pieces: &[&str], chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut window: Vec<&str> = Vec::new();
    let mut total = 0usize;

    for &piece in pieces {
        let len = char_len(piece);
        if total + len > chunk_size && !window.is_empty() {
            push_joined(&mut chunks, &window);
            while !window.is_empty() && (total > chunk_overlap || total + len > chunk_size) {
                total -= char_len(window[0]);
                window.remove(0);
            }
        }
        window.push(piece);
        total += len;
    }
    push_joined(&mut chunks, &window);
    chunks
}

fn push_joined(chunks: &mut Vec<String>, window: &[&str]) {
    let joined = window.concat();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

/// Find each chunk in the source by forward search.
///
/// A chunk never starts before the previous chunk's start, nor more than
/// `chunk_overlap` characters before the previous chunk's end, so the search
/// for each chunk begins at the later of those two positions. A chunk that
/// cannot be found is placed at the end of the previous one.
fn locate_spans(text: &str, pieces: Vec<String>, chunk_overlap: usize) -> Vec<TextSpan> {
    let mut spans = Vec::with_capacity(pieces.len());
    let mut search_from = 0usize;
    let mut cursor_byte = 0usize;

    for piece in pieces {
        let start_byte = text
            .get(search_from..)
            .and_then(|rest| rest.find(piece.as_str()))
            .map(|pos| search_from + pos)
            .unwrap_or(cursor_byte);

        let start_char = char_len(&text[..start_byte]);
        let end_char = start_char + char_len(&piece);
        cursor_byte = byte_offset(text, end_char);
        search_from = start_byte.max(byte_offset(text, end_char.saturating_sub(chunk_overlap)));

        spans.push(TextSpan {
            text: piece,
            start_char,
            end_char,
        });
    }
    spans
}

/// Byte offset of the `n`th character, clamped to the end of `text`.
fn byte_offset(text: &str, n: usize) -> usize {
    text.char_indices()
        .nth(n)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slice_chars(text: &str, start: usize, end: usize) -> String {
        text.chars().skip(start).take(end - start).collect()
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = split_text("Hello, Betty!", 800, 120);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Hello, Betty!");
        assert_eq!(chunks[0].start_char, 0);
        assert_eq!(chunks[0].end_char, 13);
    }

    #[test]
    fn test_empty_text() {
        assert!(split_text("", 800, 120).is_empty());
        assert!(split_text(" \n\n ", 800, 120).is_empty());
    }

    #[test]
    fn test_paragraphs_merge_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = split_text(text, 800, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_paragraphs_split_over_limit() {
        let text = "This is paragraph one.\n\nThis is paragraph two.\n\nThis is paragraph three.";
        let chunks = split_text(text, 30, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "This is paragraph one.");
        assert_eq!(chunks[2].text, "This is paragraph three.");
    }

    #[test]
    fn test_no_chunk_exceeds_size() {
        let text = (0..200)
            .map(|i| format!("Sentence number {} about the blue box.", i))
            .collect::<Vec<_>>()
            .join(" ");
        for size in [20, 64, 150] {
            for chunk in split_text(&text, size, size / 4) {
                assert!(
                    chunk.text.chars().count() <= size,
                    "chunk of {} chars exceeds {}",
                    chunk.text.chars().count(),
                    size
                );
            }
        }
    }

    #[test]
    fn test_long_word_split_by_characters() {
        let text = "x".repeat(25);
        let chunks = split_text(&text, 10, 0);
        let lens: Vec<usize> = chunks.iter().map(|c| c.text.len()).collect();
        assert_eq!(lens, vec![10, 10, 5]);
        let starts: Vec<usize> = chunks.iter().map(|c| c.start_char).collect();
        assert_eq!(starts, vec![0, 10, 20]);
    }

    #[test]
    fn test_consecutive_chunks_overlap() {
        let text = (0..60)
            .map(|i| format!("w{:02}", i))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = split_text(&text, 40, 12);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            assert!(
                pair[1].start_char < pair[0].end_char,
                "expected overlap between {:?} and {:?}",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_spans_point_at_chunk_text() {
        let text = "Club Silencio.\n\nNo hay banda. Il n'y a pas d'orchestre.\n\nÇa, c'est une illusion, tout.";
        for chunk in split_text(text, 24, 6) {
            assert_eq!(
                slice_chars(text, chunk.start_char, chunk.end_char),
                chunk.text
            );
        }
    }

    #[test]
    fn test_sentence_separator_kept() {
        let text = "Rita finds a key. Betty opens the box. The room is empty.";
        let chunks = split_text(text, 20, 0);
        assert_eq!(chunks[0].text, "Rita finds a key.");
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let a = split_text(text, 8, 2);
        let b = split_text(text, 8, 2);
        assert_eq!(a, b);
    }

    #[test]
    fn test_text_hash_stable() {
        assert_eq!(text_hash("Diane"), text_hash("Diane"));
        assert_ne!(text_hash("Diane"), text_hash("Betty"));
        assert_eq!(text_hash("").len(), 64);
    }
}
