//! Tree-sitter driven source-code splitter.
//!
//! Parses source into an AST, extracts per-language boundaries
//! (functions, classes, methods, comments), and cuts the file into
//! linear line segments attributed to their innermost enclosing
//! boundary. Concatenating the emitted chunk contents in order
//! reproduces the input byte-for-byte.

use tracing::debug;
use tree_sitter::{Node, Parser};

use crate::error::{IngestError, Result};
use crate::models::{Chunk, ChunkType, SectionInfo};

use super::text::split_preserving;
use super::ChunkSizes;

/// Languages with grammar support.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLanguage {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Tsx,
    Go,
    Java,
}

struct LanguageRules {
    /// Node kinds that open a structural boundary (named scopes).
    structural: &'static [&'static str],
    /// Node kinds that open a content boundary (comments).
    content: &'static [&'static str],
}

const RUST_RULES: LanguageRules = LanguageRules {
    structural: &[
        "function_item",
        "impl_item",
        "struct_item",
        "enum_item",
        "trait_item",
        "mod_item",
        "macro_definition",
    ],
    content: &["line_comment", "block_comment"],
};

const PYTHON_RULES: LanguageRules = LanguageRules {
    structural: &["function_definition", "class_definition"],
    content: &["comment"],
};

const JAVASCRIPT_RULES: LanguageRules = LanguageRules {
    structural: &[
        "function_declaration",
        "generator_function_declaration",
        "class_declaration",
        "method_definition",
    ],
    content: &["comment"],
};

const TYPESCRIPT_RULES: LanguageRules = LanguageRules {
    structural: &[
        "function_declaration",
        "generator_function_declaration",
        "class_declaration",
        "method_definition",
        "interface_declaration",
        "enum_declaration",
        "type_alias_declaration",
    ],
    content: &["comment"],
};

const GO_RULES: LanguageRules = LanguageRules {
    structural: &["function_declaration", "method_declaration", "type_declaration"],
    content: &["comment"],
};

const JAVA_RULES: LanguageRules = LanguageRules {
    structural: &[
        "class_declaration",
        "interface_declaration",
        "enum_declaration",
        "method_declaration",
        "constructor_declaration",
    ],
    content: &["line_comment", "block_comment"],
};

impl SourceLanguage {
    /// Map a path or URL to a language by extension.
    pub fn from_path(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let ext = path.rsplit('.').next()?.to_lowercase();
        match ext.as_str() {
            "rs" => Some(Self::Rust),
            "py" | "pyi" => Some(Self::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(Self::JavaScript),
            "ts" | "mts" => Some(Self::TypeScript),
            "tsx" => Some(Self::Tsx),
            "go" => Some(Self::Go),
            "java" => Some(Self::Java),
            _ => None,
        }
    }

    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.split(';').next().unwrap_or(mime).trim();
        match mime {
            "text/x-rust" => Some(Self::Rust),
            "text/x-python" | "application/x-python" => Some(Self::Python),
            "text/javascript" | "application/javascript" | "text/jsx" => Some(Self::JavaScript),
            "application/typescript" | "text/typescript" => Some(Self::TypeScript),
            "text/tsx" => Some(Self::Tsx),
            "text/x-go" => Some(Self::Go),
            "text/x-java" | "text/x-java-source" => Some(Self::Java),
            _ => None,
        }
    }

    fn grammar(&self) -> tree_sitter::Language {
        match self {
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::Tsx => tree_sitter_typescript::LANGUAGE_TSX.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
            Self::Java => tree_sitter_java::LANGUAGE.into(),
        }
    }

    fn rules(&self) -> &'static LanguageRules {
        match self {
            Self::Rust => &RUST_RULES,
            Self::Python => &PYTHON_RULES,
            Self::JavaScript => &JAVASCRIPT_RULES,
            Self::TypeScript | Self::Tsx => &TYPESCRIPT_RULES,
            Self::Go => &GO_RULES,
            Self::Java => &JAVA_RULES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundaryType {
    Structural,
    Content,
}

/// One AST boundary. `parent` is an arena index, never an owning
/// reference, and is only walked upward for path construction.
#[derive(Debug)]
struct Boundary {
    name: Option<String>,
    start_line: usize,
    end_line: usize,
    boundary_type: BoundaryType,
    parent: Option<usize>,
}

/// Source splitter preserving `{level, path}` hierarchy.
pub struct TreesitterSourceSplitter {
    sizes: ChunkSizes,
}

impl TreesitterSourceSplitter {
    pub fn new(sizes: ChunkSizes) -> Self {
        Self { sizes }
    }

    pub fn split(&self, source: &str, language: SourceLanguage) -> Result<Vec<Chunk>> {
        if source.is_empty() {
            return Ok(Vec::new());
        }

        let mut parser = Parser::new();
        parser
            .set_language(&language.grammar())
            .map_err(|e| IngestError::Processing(format!("grammar load failed: {e}")))?;
        let Some(tree) = parser.parse(source, None) else {
            debug!("tree-sitter produced no tree; falling back to size chunks");
            return Ok(self.fallback(source));
        };

        let boundaries = collect_boundaries(tree.root_node(), source, language.rules());
        let lines: Vec<&str> = source.split_inclusive('\n').collect();

        // Line indices where a chunk may start: segment the file at every
        // boundary edge.
        let mut breakpoints: Vec<usize> = vec![0, lines.len()];
        for b in &boundaries {
            breakpoints.push(b.start_line.min(lines.len()));
            breakpoints.push((b.end_line + 1).min(lines.len()));
        }
        breakpoints.sort_unstable();
        breakpoints.dedup();

        let mut chunks: Vec<Chunk> = Vec::new();
        let mut structural_emitted = vec![false; boundaries.len()];
        // Whitespace-only segments are never emitted alone; they ride on
        // the next chunk (or the previous one at EOF).
        let mut pending_ws = String::new();

        for window in breakpoints.windows(2) {
            let (seg_start, seg_end) = (window[0], window[1]);
            if seg_start >= seg_end {
                continue;
            }
            let mut content: String = lines[seg_start..seg_end].concat();
            if content.trim().is_empty() {
                pending_ws.push_str(&content);
                continue;
            }
            if !pending_ws.is_empty() {
                content = std::mem::take(&mut pending_ws) + &content;
            }

            let innermost = innermost_boundary(&boundaries, seg_start, seg_end);
            let (path, structural) = match innermost {
                Some(idx) => {
                    let path = boundary_path(&boundaries, idx);
                    let is_structural = boundaries[idx].boundary_type == BoundaryType::Structural
                        && !structural_emitted[idx];
                    if is_structural {
                        structural_emitted[idx] = true;
                    }
                    (path, is_structural)
                }
                None => (Vec::new(), false),
            };
            let section = SectionInfo::new(path.len(), path);

            if content.len() <= self.sizes.max {
                chunks.push(Chunk::new(chunk_types(structural), content, section));
            } else {
                for (i, piece) in split_preserving(&content, self.sizes.max)
                    .into_iter()
                    .enumerate()
                {
                    chunks.push(Chunk::new(
                        chunk_types(structural && i == 0),
                        piece,
                        section.clone(),
                    ));
                }
            }
        }

        if !pending_ws.is_empty() {
            match chunks.last_mut() {
                Some(last) => last.content.push_str(&pending_ws),
                None => chunks.push(Chunk::new(
                    vec![ChunkType::Code],
                    pending_ws,
                    SectionInfo::root(),
                )),
            }
        }

        Ok(chunks)
    }

    fn fallback(&self, source: &str) -> Vec<Chunk> {
        split_preserving(source, self.sizes.max)
            .into_iter()
            .map(|piece| Chunk::new(vec![ChunkType::Code], piece, SectionInfo::root()))
            .collect()
    }
}

fn chunk_types(structural: bool) -> Vec<ChunkType> {
    if structural {
        vec![ChunkType::Code, ChunkType::Structural]
    } else {
        vec![ChunkType::Code]
    }
}

fn collect_boundaries(root: Node<'_>, source: &str, rules: &LanguageRules) -> Vec<Boundary> {
    let mut boundaries = Vec::new();
    walk_node(root, None, source, rules, &mut boundaries);
    boundaries
}

fn walk_node(
    node: Node<'_>,
    parent: Option<usize>,
    source: &str,
    rules: &LanguageRules,
    out: &mut Vec<Boundary>,
) {
    let kind = node.kind();
    let mut enclosing = parent;

    if rules.structural.contains(&kind) {
        out.push(Boundary {
            name: boundary_name(node, source),
            start_line: node.start_position().row,
            end_line: node.end_position().row,
            boundary_type: BoundaryType::Structural,
            parent,
        });
        enclosing = Some(out.len() - 1);
    } else if rules.content.contains(&kind) {
        out.push(Boundary {
            name: None,
            start_line: node.start_position().row,
            end_line: node.end_position().row,
            boundary_type: BoundaryType::Content,
            parent,
        });
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk_node(child, enclosing, source, rules, out);
    }
}

fn boundary_name(node: Node<'_>, source: &str) -> Option<String> {
    let name_node = node
        .child_by_field_name("name")
        .or_else(|| node.child_by_field_name("type"));
    name_node
        .and_then(|n| n.utf8_text(source.as_bytes()).ok())
        .map(str::to_string)
}

/// Innermost boundary fully containing `[start, end)`: smallest line
/// span wins, nesting depth breaks ties.
fn innermost_boundary(boundaries: &[Boundary], start: usize, end: usize) -> Option<usize> {
    boundaries
        .iter()
        .enumerate()
        .filter(|(_, b)| b.start_line <= start && end.saturating_sub(1) <= b.end_line)
        .min_by_key(|(idx, b)| {
            let span = b.end_line - b.start_line;
            let depth = depth_of(boundaries, *idx);
            (span, usize::MAX - depth)
        })
        .map(|(idx, _)| idx)
}

fn depth_of(boundaries: &[Boundary], mut idx: usize) -> usize {
    let mut depth = 0;
    while let Some(parent) = boundaries[idx].parent {
        depth += 1;
        idx = parent;
    }
    depth
}

/// Sequence of named ancestors ending at the boundary itself.
fn boundary_path(boundaries: &[Boundary], idx: usize) -> Vec<String> {
    let mut path = Vec::new();
    let mut current = Some(idx);
    while let Some(i) = current {
        if let Some(name) = &boundaries[i].name {
            path.push(name.clone());
        }
        current = boundaries[i].parent;
    }
    path.reverse();
    path
}
