//! Paragraph-boundary text chunker with optional overlap.
//!
//! Splits cleaned document text into [`Chunk`]s bounded by `max_tokens`.
//! Paragraphs (`\n\n`) are packed greedily; a paragraph larger than the
//! bound is hard-split at the last newline or space that fits.
//!
//! When `overlap_tokens > 0`, each chunk after the first is prefixed with
//! the tail of the previous piece (cut on a word boundary) so that context
//! survives across chunk edges. The overlap is capped at a quarter of the
//! chunk budget and the packed body shrinks to make room, so every chunk
//! stays within `max_tokens × 4` bytes.
//!
//! ```rust
//! use docsift_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("doc-123", "Hello world.\n\nSecond paragraph.", 256, 0);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use sha2::{Digest, Sha256};

use crate::models::Chunk;

/// Approximate characters-per-token ratio.
pub const CHARS_PER_TOKEN: usize = 4;

/// Split `text` into chunks with contiguous indices starting at 0.
///
/// Empty or whitespace-only text yields no chunks. Output is a pure
/// function of the inputs: the same text and bounds always give the same
/// chunk texts and hashes.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    max_tokens: usize,
    overlap_tokens: usize,
) -> Vec<Chunk> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);
    let overlap_chars = if max_chars >= 8 {
        (overlap_tokens * CHARS_PER_TOKEN).min(max_chars / 4)
    } else {
        0
    };
    // one byte for the space joining the overlap to the body
    let body_chars = if overlap_chars == 0 {
        max_chars
    } else {
        max_chars - overlap_chars - 1
    };

    let pieces = split_pieces(text, body_chars);

    let mut chunks = Vec::with_capacity(pieces.len());
    for (i, piece) in pieces.iter().enumerate() {
        let body = if i > 0 && overlap_chars > 0 {
            let tail = overlap_tail(&pieces[i - 1], overlap_chars);
            if tail.is_empty() {
                piece.clone()
            } else {
                format!("{} {}", tail, piece)
            }
        } else {
            piece.clone()
        };
        chunks.push(make_chunk(document_id, i as i64, &body));
    }
    chunks
}

/// Pack paragraphs into pieces of at most `max_chars` bytes.
fn split_pieces(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            pieces.push(std::mem::take(&mut current_buf));
        }

        if trimmed.len() > max_chars {
            hard_split(trimmed, max_chars, &mut pieces);
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        pieces.push(current_buf);
    }
    pieces
}

/// Split an oversized paragraph at newline or space boundaries.
fn hard_split(paragraph: &str, max_chars: usize, pieces: &mut Vec<String>) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        let split_at = if remaining.len() <= max_chars {
            remaining.len()
        } else {
            let boundary = snap_to_char_boundary(remaining, max_chars);
            if boundary == 0 {
                // a single character wider than the budget
                remaining.chars().next().map_or(remaining.len(), char::len_utf8)
            } else {
                remaining[..boundary]
                    .rfind(|c: char| c == '\n' || c == ' ')
                    .map(|pos| pos + 1)
                    .unwrap_or(boundary)
            }
        };

        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            pieces.push(piece.to_string());
        }
        remaining = remaining[split_at..].trim_start();
    }
}

/// The last `max_chars` bytes of `piece`, starting on a word boundary.
fn overlap_tail(piece: &str, max_chars: usize) -> &str {
    if piece.len() <= max_chars {
        return piece;
    }
    let mut start = piece.len() - max_chars;
    while !piece.is_char_boundary(start) {
        start += 1;
    }
    let tail = &piece[start..];
    match tail.find(char::is_whitespace) {
        Some(pos) => tail[pos..].trim_start(),
        None => tail,
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Hex SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

fn make_chunk(document_id: &str, index: i64, text: &str) -> Chunk {
    Chunk {
        document_id: document_id.to_string(),
        chunk_index: index,
        text: text.to_string(),
        hash: sha256_hex(text.as_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = chunk_text("doc1", "Hello, world!", 256, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].text, "Hello, world!");
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        assert!(chunk_text("doc1", "", 256, 0).is_empty());
        assert!(chunk_text("doc1", "  \n\n \t ", 256, 16).is_empty());
    }

    #[test]
    fn test_paragraphs_packed_under_limit() {
        let text = "First paragraph.\n\nSecond paragraph.\n\nThird paragraph.";
        let chunks = chunk_text("doc1", text, 256, 0);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.contains("First paragraph."));
        assert!(chunks[0].text.contains("Third paragraph."));
    }

    #[test]
    fn test_indices_contiguous_and_bounded() {
        let text = (0..50)
            .map(|i| format!("Paragraph number {} has a few words in it.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_text("doc1", &text, 20, 4);
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64, "index mismatch at position {}", i);
            assert!(c.text.len() <= 20 * CHARS_PER_TOKEN, "chunk {} too long", i);
            assert!(!c.text.trim().is_empty());
        }
    }

    #[test]
    fn test_long_paragraph_hard_split_on_spaces() {
        let text = "word ".repeat(200);
        let chunks = chunk_text("doc1", &text, 10, 0);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.len() <= 40);
            assert!(c.text.split(' ').all(|w| w == "word"));
        }
    }

    #[test]
    fn test_overlap_carries_previous_tail() {
        let text = "alpha beta gamma delta\n\nepsilon zeta eta theta";
        let chunks = chunk_text("doc1", text, 8, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text, "alpha beta gamma delta");
        assert!(chunks[1].text.starts_with("delta "));
        assert!(chunks[1].text.ends_with("epsilon zeta eta theta"));
    }

    #[test]
    fn test_multibyte_text_never_panics() {
        let text = "┌──────────────────┐\n│ Hello world      │\n└──────────────────┘ ünïcødé";
        for max in 1..8 {
            let chunks = chunk_text("doc1", text, max, 1);
            assert!(!chunks.is_empty());
            for c in &chunks {
                assert!(!c.text.is_empty());
            }
        }
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha\n\nBeta\n\nGamma\n\nDelta";
        let c1 = chunk_text("doc1", text, 2, 0);
        let c2 = chunk_text("doc1", text, 2, 0);
        assert_eq!(c1, c2);
    }
}
