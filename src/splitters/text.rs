//! Line- and character-based splitting.

use crate::models::{Chunk, ChunkType, SectionInfo};

use super::ChunkSizes;

/// Split `content` into pieces no longer than `max` bytes whose
/// concatenation is exactly `content`.
///
/// Cuts prefer line boundaries; a single line longer than `max` is cut
/// at the last char boundary that fits. Nothing is trimmed, so this is
/// safe wherever losslessness matters.
pub fn split_preserving(content: &str, max: usize) -> Vec<String> {
    if content.len() <= max {
        return vec![content.to_string()];
    }

    let mut pieces = Vec::new();
    let mut current = String::new();
    for line in content.split_inclusive('\n') {
        if line.len() > max {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }
            for piece in split_chars(line, max) {
                pieces.push(piece);
            }
            continue;
        }
        if current.len() + line.len() > max && !current.is_empty() {
            pieces.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }
    if !current.is_empty() {
        pieces.push(current);
    }
    pieces
}

/// Cut a string at char boundaries into pieces of at most `max` bytes.
fn split_chars(s: &str, max: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0;
    while start < s.len() {
        let mut end = (start + max).min(s.len());
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        pieces.push(s[start..end].to_string());
        start = end;
    }
    pieces
}

/// Universal fallback splitter for plain text.
///
/// Packs consecutive lines up to the preferred size; oversized lines are
/// hard-cut at `max`.
pub struct TextSplitter {
    sizes: ChunkSizes,
}

impl TextSplitter {
    pub fn new(sizes: ChunkSizes) -> Self {
        Self { sizes }
    }

    pub fn split(&self, content: &str) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let mut current = String::new();

        let mut flush = |buf: &mut String, chunks: &mut Vec<Chunk>| {
            let text = buf.trim_end_matches('\n');
            if !text.trim().is_empty() {
                chunks.push(Chunk::new(
                    vec![ChunkType::Text],
                    text,
                    SectionInfo::root(),
                ));
            }
            buf.clear();
        };

        for line in content.split_inclusive('\n') {
            if current.len() + line.len() > self.sizes.preferred && !current.is_empty() {
                flush(&mut current, &mut chunks);
            }
            if line.len() > self.sizes.max {
                flush(&mut current, &mut chunks);
                for piece in split_chars(line.trim_end_matches('\n'), self.sizes.max) {
                    chunks.push(Chunk::new(
                        vec![ChunkType::Text],
                        piece,
                        SectionInfo::root(),
                    ));
                }
                continue;
            }
            current.push_str(line);
        }
        flush(&mut current, &mut chunks);
        chunks
    }
}
