//! Semantic markdown splitter.
//!
//! Walks a markdown document line by line and emits ordered chunks
//! tagged `heading`, `text`, `code` or `table`, each carrying the
//! heading-trail section path. Every heading opens a new section: its
//! path is the ancestor path truncated at its level plus itself, so
//! `# A` → `## B` → `### C` yields paths `[A]`, `[A,B]`, `[A,B,C]`.

use crate::models::{Chunk, ChunkType, SectionInfo};

use super::text::split_preserving;
use super::ChunkSizes;

pub struct SemanticMarkdownSplitter {
    sizes: ChunkSizes,
}

impl SemanticMarkdownSplitter {
    pub fn new(sizes: ChunkSizes) -> Self {
        Self { sizes }
    }

    pub fn split(&self, content: &str) -> Vec<Chunk> {
        let lines: Vec<&str> = content.lines().collect();
        let mut chunks: Vec<Chunk> = Vec::new();
        // Stack of (heading level, title) forming the current trail.
        let mut stack: Vec<(usize, String)> = Vec::new();
        let mut text_buf: Vec<&str> = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];

            if let Some((level, title)) = parse_heading(line) {
                self.flush_text(&mut text_buf, &stack, &mut chunks);
                stack.retain(|(l, _)| *l < level);
                stack.push((level, title));
                self.push_bounded(
                    &mut chunks,
                    vec![ChunkType::Heading],
                    line,
                    section_of(&stack),
                );
                i += 1;
            } else if let Some(fence) = parse_fence_open(line) {
                self.flush_text(&mut text_buf, &stack, &mut chunks);
                let (block_end, block) = collect_fenced(&lines, i, fence);
                self.push_code_block(&mut chunks, &block, &stack);
                i = block_end;
            } else if is_table_start(&lines, i) {
                self.flush_text(&mut text_buf, &stack, &mut chunks);
                let (block_end, block) = collect_table(&lines, i);
                self.push_table_block(&mut chunks, &block, &stack);
                i = block_end;
            } else if line.trim().is_empty() {
                self.flush_text(&mut text_buf, &stack, &mut chunks);
                i += 1;
            } else {
                text_buf.push(line);
                i += 1;
            }
        }
        self.flush_text(&mut text_buf, &stack, &mut chunks);
        chunks
    }

    fn flush_text(&self, buf: &mut Vec<&str>, stack: &[(usize, String)], chunks: &mut Vec<Chunk>) {
        if buf.is_empty() {
            return;
        }
        let content = buf.join("\n");
        buf.clear();
        self.push_bounded(chunks, vec![ChunkType::Text], &content, section_of(stack));
    }

    /// Emit one chunk, character-splitting anything over the hard max.
    fn push_bounded(
        &self,
        chunks: &mut Vec<Chunk>,
        types: Vec<ChunkType>,
        content: &str,
        section: SectionInfo,
    ) {
        if content.len() <= self.sizes.max {
            chunks.push(Chunk::new(types, content, section));
            return;
        }
        for piece in split_preserving(content, self.sizes.max) {
            chunks.push(Chunk::new(
                types.clone(),
                piece.trim_end_matches('\n'),
                section.clone(),
            ));
        }
    }

    fn push_code_block(&self, chunks: &mut Vec<Chunk>, block: &[&str], stack: &[(usize, String)]) {
        let section = section_of(stack);
        let content = block.join("\n");
        if content.len() <= self.sizes.max {
            chunks.push(Chunk::new(vec![ChunkType::Code], content, section));
            return;
        }

        // Oversized block: re-fence each piece so every chunk remains a
        // valid code block with its language tag.
        let fence_open = block.first().copied().unwrap_or("```");
        let has_close = block.len() > 1 && block.last().is_some_and(|l| is_fence_close(l));
        let body_end = if has_close {
            block.len() - 1
        } else {
            block.len()
        };
        let body = block[1..body_end].join("\n");
        let budget = self
            .sizes
            .max
            .saturating_sub(fence_open.len() + 5)
            .max(64);
        for piece in split_preserving(&body, budget) {
            let piece = piece.trim_end_matches('\n');
            chunks.push(Chunk::new(
                vec![ChunkType::Code],
                format!("{fence_open}\n{piece}\n```"),
                section.clone(),
            ));
        }
    }

    fn push_table_block(&self, chunks: &mut Vec<Chunk>, block: &[&str], stack: &[(usize, String)]) {
        let section = section_of(stack);
        let content = block.join("\n");
        if content.len() <= self.sizes.max || block.len() < 3 {
            self.push_bounded(chunks, vec![ChunkType::Table], &content, section);
            return;
        }

        // Oversized table: replay the header and separator row onto each
        // slice of body rows.
        let header = block[0];
        let separator = block[1];
        let prefix_len = header.len() + separator.len() + 2;
        let mut rows: Vec<&str> = Vec::new();
        let mut rows_len = 0usize;

        let mut flush = |rows: &mut Vec<&str>, rows_len: &mut usize, chunks: &mut Vec<Chunk>| {
            if rows.is_empty() {
                return;
            }
            let mut piece = String::with_capacity(prefix_len + *rows_len);
            piece.push_str(header);
            piece.push('\n');
            piece.push_str(separator);
            for row in rows.iter() {
                piece.push('\n');
                piece.push_str(row);
            }
            chunks.push(Chunk::new(vec![ChunkType::Table], piece, section.clone()));
            rows.clear();
            *rows_len = 0;
        };

        for row in &block[2..] {
            if prefix_len + rows_len + row.len() + 1 > self.sizes.max && !rows.is_empty() {
                flush(&mut rows, &mut rows_len, chunks);
            }
            rows.push(row);
            rows_len += row.len() + 1;
        }
        flush(&mut rows, &mut rows_len, chunks);
    }
}

fn section_of(stack: &[(usize, String)]) -> SectionInfo {
    let path: Vec<String> = stack.iter().map(|(_, t)| t.clone()).collect();
    SectionInfo::new(path.len(), path)
}

/// Parse an ATX heading, returning `(level, title)`.
fn parse_heading(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &trimmed[hashes..];
    if !rest.is_empty() && !rest.starts_with(' ') && !rest.starts_with('\t') {
        return None;
    }
    let title = rest.trim().trim_end_matches('#').trim_end().to_string();
    Some((hashes, title))
}

struct Fence {
    marker: char,
    len: usize,
}

fn parse_fence_open(line: &str) -> Option<Fence> {
    let trimmed = line.trim_start();
    for marker in ['`', '~'] {
        let len = trimmed.chars().take_while(|&c| c == marker).count();
        if len >= 3 {
            return Some(Fence { marker, len });
        }
    }
    None
}

fn is_fence_close(line: &str) -> bool {
    let trimmed = line.trim();
    (trimmed.chars().all(|c| c == '`') && trimmed.len() >= 3)
        || (trimmed.chars().all(|c| c == '~') && trimmed.len() >= 3)
}

/// Collect a fenced block starting at `start`; returns (next index, lines).
fn collect_fenced<'a>(lines: &[&'a str], start: usize, fence: Fence) -> (usize, Vec<&'a str>) {
    let mut block = vec![lines[start]];
    let mut i = start + 1;
    while i < lines.len() {
        let line = lines[i];
        block.push(line);
        let trimmed = line.trim();
        let closes = trimmed.chars().all(|c| c == fence.marker) && trimmed.len() >= fence.len;
        i += 1;
        if closes && !trimmed.is_empty() {
            break;
        }
    }
    (i, block)
}

fn is_table_start(lines: &[&str], i: usize) -> bool {
    let Some(line) = lines.get(i) else {
        return false;
    };
    let Some(next) = lines.get(i + 1) else {
        return false;
    };
    line.trim_start().starts_with('|') && is_table_separator(next)
}

fn is_table_separator(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|')
        && trimmed.contains('-')
        && trimmed
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' ' | '\t'))
}

fn collect_table<'a>(lines: &[&'a str], start: usize) -> (usize, Vec<&'a str>) {
    let mut block = Vec::new();
    let mut i = start;
    while i < lines.len() && lines[i].trim_start().starts_with('|') {
        block.push(lines[i]);
        i += 1;
    }
    (i, block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(chunks: &[Chunk]) -> Vec<Vec<String>> {
        chunks.iter().map(|c| c.section.path.clone()).collect()
    }

    #[test]
    fn nested_headings_build_paths() {
        let splitter = SemanticMarkdownSplitter::new(ChunkSizes::default());
        let chunks = splitter.split("# A\ntext\n## B\nmore\n### C\ninside\n");

        let expected: Vec<(&str, Vec<&str>)> = vec![
            ("# A", vec!["A"]),
            ("text", vec!["A"]),
            ("## B", vec!["A", "B"]),
            ("more", vec!["A", "B"]),
            ("### C", vec!["A", "B", "C"]),
            ("inside", vec!["A", "B", "C"]),
        ];
        assert_eq!(chunks.len(), expected.len());
        for (chunk, (content, path)) in chunks.iter().zip(expected) {
            assert_eq!(chunk.content, content);
            assert_eq!(chunk.section.path, path);
        }
    }

    #[test]
    fn sibling_heading_truncates_path() {
        let splitter = SemanticMarkdownSplitter::new(ChunkSizes::default());
        let chunks = splitter.split("# A\n## B\nx\n## C\ny\n");
        assert_eq!(
            paths(&chunks),
            vec![
                vec!["A".to_string()],
                vec!["A".to_string(), "B".to_string()],
                vec!["A".to_string(), "B".to_string()],
                vec!["A".to_string(), "C".to_string()],
                vec!["A".to_string(), "C".to_string()],
            ]
        );
    }

    #[test]
    fn code_blocks_keep_fences() {
        let splitter = SemanticMarkdownSplitter::new(ChunkSizes::default());
        let chunks = splitter.split("# A\n```rust\nfn main() {}\n```\n");
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].has_type(ChunkType::Code));
        assert_eq!(chunks[1].content, "```rust\nfn main() {}\n```");
    }

    #[test]
    fn oversize_code_refences_each_piece() {
        let sizes = ChunkSizes {
            preferred: 60,
            max: 120,
        };
        let splitter = SemanticMarkdownSplitter::new(sizes);
        let body = "let value = 1;\n".repeat(30);
        let chunks = splitter.split(&format!("```rust\n{body}```\n"));
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.len() <= sizes.max);
            assert!(chunk.content.starts_with("```rust\n"));
            assert!(chunk.content.ends_with("```"));
            assert!(chunk.has_type(ChunkType::Code));
        }
    }

    #[test]
    fn tables_are_detected_and_split_with_header() {
        let sizes = ChunkSizes {
            preferred: 80,
            max: 160,
        };
        let splitter = SemanticMarkdownSplitter::new(sizes);
        let mut md = String::from("| name | value |\n| --- | --- |\n");
        for i in 0..40 {
            md.push_str(&format!("| row{i} | {i} |\n"));
        }
        let chunks = splitter.split(&md);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.has_type(ChunkType::Table));
            assert!(chunk.content.starts_with("| name | value |\n| --- | --- |"));
            assert!(chunk.content.len() <= sizes.max);
        }
    }

    #[test]
    fn text_over_max_is_character_split() {
        let sizes = ChunkSizes {
            preferred: 50,
            max: 100,
        };
        let splitter = SemanticMarkdownSplitter::new(sizes);
        let long = "word ".repeat(60);
        let chunks = splitter.split(&long);
        assert!(chunks.iter().all(|c| c.content.len() <= sizes.max));
    }
}
