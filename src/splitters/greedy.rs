//! Greedy size merger.

use crate::models::Chunk;

use super::ChunkSizes;

/// Merge consecutive same-section chunks while the packed block stays
/// within the preferred size (and always within the hard max).
///
/// Section path changes are merge barriers, so a heading and its body
/// may pack together but sibling sections never bleed into each other.
pub fn merge_chunks(chunks: Vec<Chunk>, sizes: ChunkSizes) -> Vec<Chunk> {
    let mut merged: Vec<Chunk> = Vec::new();

    for chunk in chunks {
        match merged.last_mut() {
            Some(last)
                if last.same_section(&chunk)
                    && fits(last.content.len(), chunk.content.len(), sizes) =>
            {
                last.content.push('\n');
                last.content.push_str(&chunk.content);
                for t in chunk.types {
                    if !last.types.contains(&t) {
                        last.types.push(t);
                    }
                }
            }
            _ => merged.push(chunk),
        }
    }

    merged
}

fn fits(current: usize, addition: usize, sizes: ChunkSizes) -> bool {
    let combined = current + 1 + addition;
    combined <= sizes.preferred && combined <= sizes.max
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChunkType, SectionInfo};

    fn chunk(content: &str, path: &[&str]) -> Chunk {
        Chunk::new(
            vec![ChunkType::Text],
            content,
            SectionInfo::new(path.len(), path.iter().map(|s| s.to_string()).collect()),
        )
    }

    #[test]
    fn merges_same_section_up_to_preferred() {
        let sizes = ChunkSizes {
            preferred: 30,
            max: 100,
        };
        let chunks = vec![
            chunk("first", &["A"]),
            chunk("second", &["A"]),
            chunk("third is long enough to not fit", &["A"]),
        ];
        let merged = merge_chunks(chunks, sizes);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].content, "first\nsecond");
    }

    #[test]
    fn never_merges_across_sections() {
        let sizes = ChunkSizes {
            preferred: 1000,
            max: 4000,
        };
        let chunks = vec![chunk("a", &["A"]), chunk("b", &["B"])];
        let merged = merge_chunks(chunks, sizes);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merged_types_are_unioned() {
        let sizes = ChunkSizes::default();
        let mut heading = chunk("# A", &["A"]);
        heading.types = vec![ChunkType::Heading];
        let body = chunk("body", &["A"]);
        let merged = merge_chunks(vec![heading, body], sizes);
        assert_eq!(merged.len(), 1);
        assert!(merged[0].has_type(ChunkType::Heading));
        assert!(merged[0].has_type(ChunkType::Text));
    }
}
