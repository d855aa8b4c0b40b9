//! Structural output of the extractor.
//!
//! These types are serializable so the CLI can emit them as JSON.

use serde::{Deserialize, Serialize};

/// An ATX heading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderNode {
    /// Heading level (1-6), the number of leading `#`s
    pub level: usize,
    /// Heading text with inline markup stripped
    pub title: String,
    /// 0-based line index of the heading in the source
    #[serde(rename = "lineOffset")]
    pub line_offset: usize,
    /// Navigation id, unique within the document
    #[serde(rename = "anchorId")]
    pub anchor_id: String,
}

impl HeaderNode {
    pub fn new(level: usize, title: impl Into<String>, line_offset: usize) -> Self {
        Self {
            level,
            title: title.into(),
            line_offset,
            anchor_id: String::new(),
        }
    }
}

/// Diagram languages recognized in fenced blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagramKind {
    /// Mermaid flow/sequence diagrams
    Mermaid,
}

/// A fenced block whose language tag names a diagram language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagramBlock {
    pub kind: DiagramKind,
    /// Fenced block body without the fence lines
    #[serde(rename = "rawContent")]
    pub raw_content: String,
    /// Line of the opening fence
    #[serde(rename = "lineOffset")]
    pub line_offset: usize,
    /// Line of the closing fence, or the last line when unterminated
    #[serde(rename = "endLine")]
    pub end_line: usize,
    pub terminated: bool,
}

/// An ordinary fenced code block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub language: Option<String>,
    pub content: String,
    #[serde(rename = "lineOffset")]
    pub line_offset: usize,
    #[serde(rename = "endLine")]
    pub end_line: usize,
}

/// Everything the extractor pulls out of one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Structure {
    pub headers: Vec<HeaderNode>,
    pub diagrams: Vec<DiagramBlock>,
    #[serde(rename = "codeBlocks")]
    pub code_blocks: Vec<CodeBlock>,
}

impl Structure {
    /// Diagram block covering `line`, if any.
    pub fn diagram_at_line(&self, line: usize) -> Option<&DiagramBlock> {
        self.diagrams
            .iter()
            .find(|d| d.line_offset <= line && line <= d.end_line)
    }

    /// Deepest heading level present.
    pub fn max_depth(&self) -> usize {
        self.headers.iter().map(|h| h.level).max().unwrap_or(0)
    }
}
