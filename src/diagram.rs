//! Diagram and document previews.
//!
//! A terminal cannot draw mermaid diagrams, so each diagram block is shown as
//! a boxed placeholder with the first few lines of its source. The full
//! diagram is rendered by writing a small HTML page and opening it in the
//! system browser. The whole document can be previewed the same way, with
//! heading ids matching the TOC anchors so links can land on a section.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::DiagramConfig;
use crate::document::DocumentModel;
use crate::export::{HtmlRenderer, MERMAID_LOADER, PAGE_STYLE};
use crate::parser::{DiagramBlock, DiagramKind, Structure};

const OPEN_HINT: &str = "[open in browser to view]";

fn kind_label(kind: DiagramKind) -> &'static str {
    match kind {
        DiagramKind::Mermaid => "MERMAID DIAGRAM",
    }
}

/// Cut `text` to at most `width` display columns, ending in `...` when cut.
fn truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }

    let budget = width.saturating_sub(3);
    let mut used = 0;
    let mut out = String::new();
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        out.push(c);
    }
    out.push_str("...");
    out
}

fn row(text: &str, width: usize) -> String {
    let text = truncate(text, width);
    let pad = width.saturating_sub(text.width());
    format!("║  {}{} ║", text, " ".repeat(pad))
}

fn centered(text: &str, width: usize) -> String {
    let text = truncate(text, width);
    let left = width.saturating_sub(text.width()) / 2;
    row(&format!("{}{}", " ".repeat(left), text), width)
}

/// Boxed placeholder for `block`: title, open hint, and the first
/// `preview_lines` lines of source, each cut to `width` columns.
pub fn placeholder_lines(block: &DiagramBlock, preview_lines: usize, width: usize) -> Vec<String> {
    let width = width.max(OPEN_HINT.len());
    let border = "═".repeat(width + 3);
    let source: Vec<&str> = block.raw_content.trim().lines().collect();

    let mut lines = vec![
        format!("╔{border}╗"),
        centered(kind_label(block.kind), width),
        row("", width),
        row(OPEN_HINT, width),
        row("", width),
    ];
    lines.extend(source.iter().take(preview_lines).map(|l| row(l, width)));
    if source.len() > preview_lines {
        lines.push(row("...", width));
    }
    lines.push(format!("╚{border}╝"));
    lines
}

/// `raw_text` with every diagram block replaced by its placeholder, fenced as
/// plain text so the markdown renderer leaves the box drawing alone.
pub fn render_with_placeholders(
    raw_text: &str,
    diagrams: &[DiagramBlock],
    config: &DiagramConfig,
) -> String {
    let lines: Vec<&str> = raw_text.lines().collect();
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut cursor = 0;

    for block in diagrams {
        let start = block.line_offset.min(lines.len());
        if start < cursor {
            continue;
        }
        out.extend(lines[cursor..start].iter().map(|l| l.to_string()));
        out.push("```".to_string());
        out.extend(placeholder_lines(block, config.preview_lines, config.preview_width));
        out.push("```".to_string());
        cursor = (block.end_line + 1).min(lines.len());
    }
    out.extend(lines[cursor..].iter().map(|l| l.to_string()));

    out.join("\n")
}

/// Standalone page that renders `block` with mermaid.js.
pub fn preview_html(block: &DiagramBlock) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Diagram at line {line}</title>
{MERMAID_LOADER}    <style>
{PAGE_STYLE}    </style>
</head>
<body>
<pre class="mermaid">
{source}</pre>
</body>
</html>
"#,
        line = block.line_offset + 1,
        source = html_escape::encode_text(&block.raw_content),
    )
}

/// Write the preview page for `block` into `dir`.
pub fn write_preview(block: &DiagramBlock, dir: &Path) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("diagram_line_{}.html", block.line_offset + 1));
    fs::write(&path, preview_html(block))?;
    log::debug!("wrote diagram preview {}", path.display());
    Ok(path)
}

/// Write the preview page and open it with the system browser.
pub fn open_preview(block: &DiagramBlock, dir: &Path) -> io::Result<PathBuf> {
    let path = write_preview(block, dir)?;
    open::that(&path)?;
    log::info!("opened diagram preview {}", path.display());
    Ok(path)
}

/// Write a browser preview of the whole document into `dir` as
/// `<stem>_preview.html`.
pub fn write_document_preview(
    document: &DocumentModel,
    structure: &Structure,
    renderer: &HtmlRenderer,
    dir: &Path,
) -> io::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(format!("{}_preview.html", document.stem()));
    fs::write(&path, renderer.render_preview(document, structure))?;
    log::debug!("wrote document preview {}", path.display());
    Ok(path)
}

/// `file://` URL for a preview page, optionally deep-linked to `anchor`.
pub fn preview_url(path: &Path, anchor: Option<&str>) -> String {
    let mut url = format!("file://{}", path.display());
    if let Some(anchor) = anchor.filter(|a| !a.is_empty()) {
        url.push('#');
        url.push_str(anchor);
    }
    url
}

/// Open a written preview page in the system browser.
pub fn open_page(path: &Path, anchor: Option<&str>) -> io::Result<String> {
    let url = preview_url(path, anchor);
    open::that(&url)?;
    log::info!("opened {}", url);
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn diagram(body: &str) -> DiagramBlock {
        let md = format!("```mermaid\n{body}\n```\n");
        parser::extract(&md).diagrams.remove(0)
    }

    #[test]
    fn test_placeholder_rows_share_width() {
        let block = diagram("graph TD\n  A-->B\n  B-->C\n  C-->D");
        let lines = placeholder_lines(&block, 3, 36);

        let widths: Vec<usize> = lines.iter().map(|l| l.width()).collect();
        assert!(widths.iter().all(|&w| w == widths[0]));
        assert!(lines[1].contains("MERMAID DIAGRAM"));
        assert!(lines.iter().any(|l| l.contains("A-->B")));
        assert!(!lines.iter().any(|l| l.contains("C-->D")));
        assert_eq!(lines[lines.len() - 2].trim_matches(|c| c == '║' || c == ' '), "...");
    }

    #[test]
    fn test_long_lines_are_truncated() {
        let long = "x".repeat(60);
        let block = diagram(&long);
        let lines = placeholder_lines(&block, 3, 36);

        let preview = lines.iter().find(|l| l.contains('x')).unwrap();
        assert!(preview.contains(&format!("{}...", "x".repeat(33))));
        assert_eq!(preview.width(), lines[0].width());
    }

    #[test]
    fn test_no_ellipsis_row_for_short_diagrams() {
        let block = diagram("graph LR\n  A-->B");
        let lines = placeholder_lines(&block, 3, 36);
        assert!(!lines.iter().any(|l| l.contains("║  ...")));
    }

    #[test]
    fn test_render_replaces_only_diagram_blocks() {
        let md = "# Doc\n\n```mermaid\ngraph TD\n```\n\n```rust\nfn x() {}\n```\ntail";
        let structure = parser::extract(md);
        let rendered = render_with_placeholders(md, &structure.diagrams, &DiagramConfig::default());

        assert!(rendered.starts_with("# Doc\n\n```\n╔"));
        assert!(rendered.contains("MERMAID DIAGRAM"));
        assert!(!rendered.contains("```mermaid"));
        assert!(rendered.contains("```rust\nfn x() {}\n```\ntail"));
    }

    #[test]
    fn test_preview_page_loads_mermaid() {
        let dir = tempfile::tempdir().unwrap();
        let block = diagram("graph TD\n  A-->B");

        let path = write_preview(&block, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "diagram_line_1.html");

        let html = fs::read_to_string(path).unwrap();
        assert!(html.contains("mermaid.min.js"));
        assert!(html.contains("<pre class=\"mermaid\">\ngraph TD\n  A--&gt;B</pre>"));
    }

    #[test]
    fn test_document_preview_renders_diagrams_and_anchors() {
        let dir = tempfile::tempdir().unwrap();
        let md = "# Guide\n\n## Flow\n\n```mermaid\ngraph TD\n  A-->B\n```\n";
        let doc = DocumentModel::new(Some(PathBuf::from("guide.md")), md);
        let structure = parser::extract(md);
        let renderer = HtmlRenderer::new("InspiredGitHub", false, "mermaid");

        let path = write_document_preview(&doc, &structure, &renderer, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "guide_preview.html");

        let html = fs::read_to_string(&path).unwrap();
        assert!(html.contains("mermaid.min.js"));
        assert!(html.contains(r#"<h2 id="flow">"#));
        assert!(html.contains("<pre class=\"mermaid\">"));
    }

    #[test]
    fn test_preview_url_deep_links() {
        let path = Path::new("/tmp/mdlens/guide_preview.html");
        assert_eq!(
            preview_url(path, Some("flow")),
            "file:///tmp/mdlens/guide_preview.html#flow"
        );
        assert_eq!(preview_url(path, Some("")), "file:///tmp/mdlens/guide_preview.html");
        assert_eq!(preview_url(path, None), "file:///tmp/mdlens/guide_preview.html");
    }
}
