//! Content chunks produced by the splitters.

use serde::{Deserialize, Serialize};

/// Classification tags carried by a chunk. A chunk may carry several,
/// e.g. `[Code, Structural]` for the opening chunk of a function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Text,
    Code,
    Table,
    Heading,
    Structural,
}

/// Position of a chunk within the document hierarchy.
///
/// For markdown the path is the heading trail (`["A", "B"]` inside
/// `# A` → `## B`); for source code it is the chain of enclosing named
/// boundaries (`["Widget", "render"]` for a method body).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionInfo {
    pub level: usize,
    pub path: Vec<String>,
}

impl SectionInfo {
    pub fn root() -> Self {
        Self {
            level: 0,
            path: Vec::new(),
        }
    }

    pub fn new(level: usize, path: Vec<String>) -> Self {
        Self { level, path }
    }
}

/// One splitter-produced piece of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub types: Vec<ChunkType>,
    pub content: String,
    pub section: SectionInfo,
}

impl Chunk {
    pub fn new(types: Vec<ChunkType>, content: impl Into<String>, section: SectionInfo) -> Self {
        Self {
            types,
            content: content.into(),
            section,
        }
    }

    /// True when both chunks belong to the same section path. The greedy
    /// merger never merges across a path change.
    pub fn same_section(&self, other: &Chunk) -> bool {
        self.section.path == other.section.path
    }

    pub fn has_type(&self, t: ChunkType) -> bool {
        self.types.contains(&t)
    }
}
