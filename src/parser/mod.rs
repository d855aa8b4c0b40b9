//! Markdown structure extraction.
//!
//! This module turns raw markdown into an ordered list of ATX headings and the
//! fenced blocks of the document, separating diagram blocks from ordinary code.
//!
//! Extraction is total: malformed input degrades gracefully. An unterminated
//! fence runs to the end of the document, and lines that only look like
//! headings (`#NoSpace`, seven hashes) are treated as prose.

pub mod anchors;
pub mod output;
pub mod utils;

pub use anchors::{AnchorMap, Toc, TocTree, allocate, slugify};
pub use output::{CodeBlock, DiagramBlock, DiagramKind, HeaderNode, Structure};

use std::path::Path;

use utils::{FenceOpen, parse_fence_open, split_heading, strip_markdown_inline};

/// Fence language tag that marks a mermaid diagram.
pub const MERMAID_TOKEN: &str = "mermaid";

/// Parse a markdown file and extract its structure.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn parse_file(path: &Path) -> std::io::Result<Structure> {
    let content = std::fs::read_to_string(path)?;
    Ok(extract(&content))
}

/// Extract headings and fenced blocks, recognizing ```` ```mermaid ```` as diagrams.
pub fn extract(raw_text: &str) -> Structure {
    extract_with_token(raw_text, MERMAID_TOKEN)
}

/// Extract headings and fenced blocks.
///
/// A fenced block is a [`DiagramBlock`] when its language tag equals
/// `diagram_token` ignoring case; every other fenced block, including
/// untagged ones, is a [`CodeBlock`]. Headings inside fences are ignored.
/// Anchors are allocated before returning.
pub fn extract_with_token(raw_text: &str, diagram_token: &str) -> Structure {
    let mut structure = Structure::default();
    let mut open: Option<OpenFence> = None;

    for (line_no, line) in raw_text.lines().enumerate() {
        if let Some(mut fence) = open.take() {
            if fence.fence.is_closed_by(line) {
                fence.finish(&mut structure, line_no, true, diagram_token);
            } else {
                fence.body.push(line);
                open = Some(fence);
            }
            continue;
        }

        if let Some(fence) = parse_fence_open(line) {
            open = Some(OpenFence {
                fence,
                line_offset: line_no,
                body: Vec::new(),
            });
            continue;
        }

        if let Some((level, title)) = split_heading(line) {
            structure
                .headers
                .push(HeaderNode::new(level, strip_markdown_inline(title), line_no));
        }
    }

    if let Some(fence) = open {
        log::debug!(
            "unterminated fence at line {}, extending to end of document",
            fence.line_offset
        );
        let last_line = raw_text.lines().count().saturating_sub(1);
        fence.finish(&mut structure, last_line, false, diagram_token);
    }

    anchors::allocate(&mut structure.headers);
    structure
}

struct OpenFence<'a> {
    fence: FenceOpen,
    line_offset: usize,
    body: Vec<&'a str>,
}

impl OpenFence<'_> {
    fn finish(self, structure: &mut Structure, end_line: usize, terminated: bool, token: &str) {
        let content = self.body.join("\n");
        let language = self.fence.language();

        if language.is_some_and(|lang| lang.eq_ignore_ascii_case(token)) {
            structure.diagrams.push(DiagramBlock {
                kind: DiagramKind::Mermaid,
                raw_content: content,
                line_offset: self.line_offset,
                end_line,
                terminated,
            });
        } else {
            structure.code_blocks.push(CodeBlock {
                language: language.map(str::to_string),
                content,
                line_offset: self.line_offset,
                end_line,
            });
        }
    }
}
