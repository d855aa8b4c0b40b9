//! Anchor allocation and the table of contents.
//!
//! Anchors are derived from heading titles and must be stable across reloads
//! of unchanged content, since browser previews and exported HTML link to them.

use indexmap::IndexMap;
use indextree::{Arena, NodeId};

use super::output::{HeaderNode, Structure};
use crate::document::{DocumentModel, Version};

/// Anchor id → line offset, in document order.
pub type AnchorMap = IndexMap<String, usize>;

/// Generate URL-friendly slug from heading text.
///
/// Lowercases the text, collapses every run of non-alphanumeric characters
/// into a single hyphen and trims hyphens from both ends.
///
/// # Examples
///
/// ```
/// use mdlens::parser::anchors::slugify;
///
/// assert_eq!(slugify("Hello World"), "hello-world");
/// assert_eq!(slugify("API Reference"), "api-reference");
/// assert_eq!(slugify("  --Edge__Case!! "), "edge-case");
/// ```
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut pending_hyphen = false;

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.extend(ch.to_lowercase());
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Assign a unique `anchor_id` to every header, in order.
///
/// Collisions get `-2`, `-3`, ... appended in order of first appearance.
/// Headers whose title slugs to nothing fall back to `section-<line_offset>`.
pub fn allocate(headers: &mut [HeaderNode]) -> AnchorMap {
    let mut anchors = AnchorMap::with_capacity(headers.len());

    for header in headers.iter_mut() {
        let slug = slugify(&header.title);
        let base = if slug.is_empty() {
            format!("section-{}", header.line_offset)
        } else {
            slug
        };

        let mut candidate = base.clone();
        let mut suffix = 2;
        while anchors.contains_key(&candidate) {
            candidate = format!("{base}-{suffix}");
            suffix += 1;
        }

        header.anchor_id = candidate.clone();
        anchors.insert(candidate, header.line_offset);
    }

    anchors
}

/// Table of contents for one document version.
#[derive(Debug, Clone)]
pub struct Toc {
    version: Version,
    content_hash: String,
    structure: Structure,
    anchors: AnchorMap,
}

impl Toc {
    /// Extract structure from `doc` and allocate anchors.
    pub fn build(doc: &DocumentModel, diagram_token: &str) -> Self {
        let structure = super::extract_with_token(doc.raw_text(), diagram_token);
        let anchors = structure
            .headers
            .iter()
            .map(|h| (h.anchor_id.clone(), h.line_offset))
            .collect();

        log::debug!(
            "built toc for {} v{}: {} headers, {} diagrams",
            doc.display_name(),
            doc.version(),
            structure.headers.len(),
            structure.diagrams.len()
        );

        Self {
            version: doc.version(),
            content_hash: doc.content_hash().to_string(),
            structure,
            anchors,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Carry this TOC forward to a new version with identical content.
    pub(crate) fn restamp(&mut self, version: Version) {
        self.version = version;
    }

    pub fn headers(&self) -> &[HeaderNode] {
        &self.structure.headers
    }

    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    pub fn anchors(&self) -> &AnchorMap {
        &self.anchors
    }

    /// Line to scroll to when `anchor` is selected.
    pub fn resolve(&self, anchor: &str) -> Option<usize> {
        self.anchors.get(anchor).copied()
    }

    /// The heading at or immediately before `line`.
    pub fn heading_at_line(&self, line: usize) -> Option<&HeaderNode> {
        self.headers()
            .iter()
            .take_while(|h| h.line_offset <= line)
            .last()
    }

    /// Build the heading hierarchy.
    pub fn tree(&self) -> TocTree {
        TocTree::build(self.headers())
    }
}

/// Heading hierarchy over header indices.
///
/// A header is a child of the nearest preceding header with a strictly smaller
/// level; skipped levels (`#` then `###`) attach directly.
#[derive(Debug)]
pub struct TocTree {
    arena: Arena<usize>,
    nodes: Vec<NodeId>,
    roots: Vec<NodeId>,
}

impl TocTree {
    pub fn build(headers: &[HeaderNode]) -> Self {
        let mut arena = Arena::with_capacity(headers.len());
        let mut nodes = Vec::with_capacity(headers.len());
        let mut roots = Vec::new();
        let mut stack: Vec<(usize, NodeId)> = Vec::new();

        for (index, header) in headers.iter().enumerate() {
            let node = arena.new_node(index);
            nodes.push(node);

            while stack.last().is_some_and(|&(level, _)| level >= header.level) {
                stack.pop();
            }

            match stack.last() {
                Some(&(_, parent)) => parent.append(node, &mut arena),
                None => roots.push(node),
            }
            stack.push((header.level, node));
        }

        Self {
            arena,
            nodes,
            roots,
        }
    }

    /// Indices of top-level headers.
    pub fn roots(&self) -> Vec<usize> {
        self.roots.iter().map(|&id| *self.arena[id].get()).collect()
    }

    pub fn parent_of(&self, index: usize) -> Option<usize> {
        let id = *self.nodes.get(index)?;
        self.arena[id].parent().map(|p| *self.arena[p].get())
    }

    pub fn children_of(&self, index: usize) -> Vec<usize> {
        self.nodes
            .get(index)
            .map(|&id| {
                id.children(&self.arena)
                    .map(|child| *self.arena[child].get())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nesting depth, 0 for roots.
    pub fn depth_of(&self, index: usize) -> usize {
        self.nodes
            .get(index)
            .map(|&id| id.ancestors(&self.arena).count() - 1)
            .unwrap_or(0)
    }

    /// Render the hierarchy with box-drawing characters.
    pub fn render_box_tree(&self, headers: &[HeaderNode]) -> String {
        let mut out = String::new();
        for &root in &self.roots {
            out.push_str(&headers[*self.arena[root].get()].title);
            out.push('\n');
            self.render_children(root, headers, "", &mut out);
        }
        out
    }

    fn render_children(&self, node: NodeId, headers: &[HeaderNode], prefix: &str, out: &mut String) {
        let children: Vec<NodeId> = node.children(&self.arena).collect();
        for (i, &child) in children.iter().enumerate() {
            let is_last = i + 1 == children.len();
            let connector = if is_last { "└── " } else { "├── " };
            out.push_str(prefix);
            out.push_str(connector);
            out.push_str(&headers[*self.arena[child].get()].title);
            out.push('\n');

            let extension = if is_last { "    " } else { "│   " };
            self.render_children(child, headers, &format!("{prefix}{extension}"), out);
        }
    }
}
