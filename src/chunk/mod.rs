//! Deterministic text chunking
//!
//! Fixed-size overlapping character windows. No heuristics, no randomness:
//! the same text under the same config always produces the same chunks, and
//! each chunk's hash gives it a stable vector point id.

use crate::config::ChunkConfig;
use crate::parse::ParsedUnit;
use uuid::Uuid;

/// A chunk of text ready for embedding
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunk {
    /// Chunk text
    pub text: String,

    /// Sequence index across the whole document, in document order
    pub index: usize,

    /// Label of the unit this chunk came from ("page 3", "prices!row12")
    pub unit_label: String,

    /// Character offsets within the unit text
    pub char_start: usize,
    pub char_end: usize,

    /// blake3 hash of the chunk text
    pub hash: String,
}

/// blake3 hex digest of arbitrary bytes
pub fn compute_content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Stable vector point id for a chunk within one document identity.
/// Re-chunking identical content under the same identity maps to the same
/// point; the same text under two sources, or repeated within one document,
/// gets distinct points.
pub fn point_id(source: &str, sequence_index: usize, chunk_hash: &str) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}|{}|{}", source, sequence_index, chunk_hash).as_bytes(),
    )
}

/// Chunk a document's units into overlapping windows. Sequence indices are
/// global across units so chunk order reconstructs document order.
pub fn chunk_units(units: &[ParsedUnit], config: &ChunkConfig) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    for unit in units {
        chunk_unit_into(unit, config, &mut chunks);
    }
    chunks
}

fn chunk_unit_into(unit: &ParsedUnit, config: &ChunkConfig, out: &mut Vec<TextChunk>) {
    let text = unit.text.trim();
    if text.is_empty() {
        return;
    }

    let step = config.max_chars.saturating_sub(config.overlap_chars).max(1);
    let mut start = 0;

    while start < text.len() {
        let raw_end = start.saturating_add(config.max_chars).min(text.len());
        let end = ensure_char_boundary(text, raw_end);
        let chunk_text = text[start..end].trim();

        let is_last = end >= text.len();
        // A trailing sliver below min_chars folds into nothing only if a
        // previous chunk already covers its text via the overlap.
        if !chunk_text.is_empty() && (chunk_text.len() >= config.min_chars || out.is_empty() || !is_last)
        {
            let index = out.len();
            out.push(TextChunk {
                text: chunk_text.to_string(),
                index,
                unit_label: unit.label.clone(),
                char_start: start,
                char_end: end,
                hash: compute_content_hash(chunk_text.as_bytes()),
            });
        }

        if is_last {
            break;
        }
        // The backward walk can land on `start` when the step is smaller than
        // the character under it; take the next boundary forward instead so
        // the window always advances.
        let next = ensure_char_boundary(text, start + step);
        start = if next > start {
            next
        } else {
            next_char_boundary(text, start + 1)
        };
    }
}

/// Walk back to the nearest UTF-8 character boundary at or before `pos`
fn ensure_char_boundary(text: &str, mut pos: usize) -> usize {
    pos = pos.min(text.len());
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

/// Walk forward to the nearest UTF-8 character boundary at or after `pos`
fn next_char_boundary(text: &str, mut pos: usize) -> usize {
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos.min(text.len())
}
