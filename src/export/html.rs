//! Standalone HTML rendering.
//!
//! The page carries its stylesheet inline and code blocks are highlighted with
//! inline `style` attributes, so the file can be copied anywhere and still
//! render as exported.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use pulldown_cmark::{CodeBlockKind, CowStr, Event, Options, Parser, Tag, TagEnd};
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

use super::{CancelToken, Converter, ExportFormat, ExportInput};
use crate::document::DocumentModel;
use crate::error::ExportError;
use crate::parser::Structure;

pub(crate) const PAGE_STYLE: &str = r#"
    body {
        font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, sans-serif;
        line-height: 1.6;
        color: #333;
        max-width: 800px;
        margin: 0 auto;
        padding: 20px;
        background-color: white;
    }
    pre {
        background-color: #f0f0f0;
        padding: 10px;
        border-radius: 5px;
        overflow-x: auto;
    }
    code {
        background-color: #f0f0f0;
        padding: 2px 4px;
        border-radius: 3px;
        font-family: 'Courier New', Courier, monospace;
    }
    pre code {
        padding: 0;
        background-color: transparent;
    }
    blockquote {
        border-left: 4px solid #ddd;
        margin: 0;
        padding-left: 20px;
        color: #666;
    }
    table {
        border-collapse: collapse;
    }
    th, td {
        border: 1px solid #ddd;
        padding: 4px 8px;
    }
    h1, h2, h3, h4, h5, h6 {
        color: #111;
        margin-top: 24px;
        margin-bottom: 16px;
    }
    a {
        color: #0066cc;
        text-decoration: none;
    }
    a:hover {
        text-decoration: underline;
    }
    .mermaid {
        text-align: center;
        margin: 20px 0;
        background-color: transparent;
    }
    @media print {
        body {
            background-color: white;
            margin: 0;
            padding: 10mm;
        }
    }
"#;

pub(crate) const MERMAID_LOADER: &str = r#"    <script src="https://cdn.jsdelivr.net/npm/mermaid/dist/mermaid.min.js"></script>
    <script>
        mermaid.initialize({ startOnLoad: true, theme: 'default' });
    </script>
"#;

/// Markdown to standalone HTML.
pub struct HtmlRenderer {
    syntax_set: SyntaxSet,
    theme: Option<Theme>,
    mermaid_loader: bool,
    diagram_token: String,
}

impl HtmlRenderer {
    pub fn new(theme_name: &str, mermaid_loader: bool, diagram_token: &str) -> Self {
        let mut themes = ThemeSet::load_defaults().themes;
        let theme = themes.remove(theme_name).or_else(|| {
            log::warn!("unknown syntax theme {theme_name:?}, code blocks will not be highlighted");
            None
        });

        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme,
            mermaid_loader,
            diagram_token: diagram_token.to_string(),
        }
    }

    /// Render a complete HTML page for `document`.
    pub fn render(&self, document: &DocumentModel, structure: &Structure) -> String {
        self.render_page(document, structure, self.mermaid_loader)
    }

    /// Render a page for viewing in a browser: the mermaid loader is always
    /// included so diagrams draw in place.
    pub fn render_preview(&self, document: &DocumentModel, structure: &Structure) -> String {
        self.render_page(document, structure, true)
    }

    fn render_page(&self, document: &DocumentModel, structure: &Structure, mermaid_loader: bool) -> String {
        let title = structure
            .headers
            .iter()
            .find(|h| h.level == 1 && !h.title.is_empty())
            .map(|h| h.title.clone())
            .unwrap_or_else(|| document.display_name());

        let body = self.render_body(document.raw_text(), structure);
        let loader = if mermaid_loader { MERMAID_LOADER } else { "" };

        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title}</title>
{loader}    <style>
{PAGE_STYLE}    </style>
</head>
<body>
{body}</body>
</html>
"#,
            title = html_escape::encode_text(&title),
        )
    }

    /// Render only the `<body>` contents.
    ///
    /// Headings get the anchor ids allocated for the TOC, diagram blocks become
    /// `<pre class="mermaid">` and other fenced code is syntax highlighted.
    pub fn render_body(&self, raw_text: &str, structure: &Structure) -> String {
        let anchors_by_line: HashMap<usize, &str> = structure
            .headers
            .iter()
            .map(|h| (h.line_offset, h.anchor_id.as_str()))
            .collect();
        let line_starts = line_starts(raw_text);

        let mut events: Vec<Event<'_>> = Vec::new();
        let mut code: Option<(Option<String>, String)> = None;

        for (event, range) in Parser::new_ext(raw_text, markdown_options()).into_offset_iter() {
            match event {
                Event::Start(Tag::Heading {
                    level,
                    id,
                    classes,
                    attrs,
                }) => {
                    let line = line_starts.partition_point(|&start| start <= range.start) - 1;
                    let id = anchors_by_line
                        .get(&line)
                        .map(|anchor| CowStr::from(anchor.to_string()))
                        .or(id);
                    events.push(Event::Start(Tag::Heading {
                        level,
                        id,
                        classes,
                        attrs,
                    }));
                }
                Event::Start(Tag::CodeBlock(kind)) => {
                    let language = match kind {
                        CodeBlockKind::Fenced(info) => info
                            .split_whitespace()
                            .next()
                            .map(str::to_string),
                        CodeBlockKind::Indented => None,
                    };
                    code = Some((language, String::new()));
                }
                Event::Text(text) if code.is_some() => {
                    if let Some((_, body)) = code.as_mut() {
                        body.push_str(&text);
                    }
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((language, body)) = code.take() {
                        events.push(Event::Html(self.code_block(language.as_deref(), &body).into()));
                    }
                }
                other => events.push(other),
            }
        }

        let mut out = String::new();
        pulldown_cmark::html::push_html(&mut out, events.into_iter());
        out
    }

    fn code_block(&self, language: Option<&str>, body: &str) -> String {
        if language.is_some_and(|lang| lang.eq_ignore_ascii_case(&self.diagram_token)) {
            return format!(
                "<pre class=\"mermaid\">\n{}</pre>\n",
                html_escape::encode_text(body)
            );
        }

        let highlighted = language.zip(self.theme.as_ref()).and_then(|(lang, theme)| {
            let syntax = self.syntax_set.find_syntax_by_token(lang)?;
            highlighted_html_for_string(body, &self.syntax_set, syntax, theme)
                .map_err(|e| log::debug!("highlighting {lang} failed: {e}"))
                .ok()
        });

        highlighted.unwrap_or_else(|| {
            let class = language
                .map(|lang| format!(" class=\"language-{}\"", html_escape::encode_double_quoted_attribute(lang)))
                .unwrap_or_default();
            format!("<pre><code{class}>{}</code></pre>\n", html_escape::encode_text(body))
        })
    }
}

/// Byte offset at which every line starts.
fn line_starts(text: &str) -> Vec<usize> {
    std::iter::once(0)
        .chain(text.match_indices('\n').map(|(i, _)| i + 1))
        .collect()
}

fn markdown_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

/// Writes the shared standalone HTML rendering.
pub struct HtmlConverter;

impl Converter for HtmlConverter {
    fn format(&self) -> ExportFormat {
        ExportFormat::StandaloneMarkup
    }

    fn convert(
        &self,
        input: &ExportInput<'_>,
        output: &Path,
        _cancel: &CancelToken,
    ) -> Result<(), ExportError> {
        fs::write(output, input.html).map_err(|e| ExportError::write(output, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;

    fn render(md: &str) -> String {
        let renderer = HtmlRenderer::new("InspiredGitHub", false, "mermaid");
        let doc = DocumentModel::transient(md);
        renderer.render(&doc, &parser::extract(md))
    }

    #[test]
    fn test_page_is_self_contained() {
        let html = render("# Guide\n\nSome *text*.");

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<style>"));
        assert!(html.contains("<title>Guide</title>"));
        assert!(!html.contains("<link"));
        assert!(!html.contains("<script"));
        assert!(html.contains("<em>text</em>"));
    }

    #[test]
    fn test_headings_use_allocated_anchors() {
        let html = render("# Overview\n\n## Overview\n\n## **Bold** Title");

        assert!(html.contains(r#"<h1 id="overview">"#));
        assert!(html.contains(r#"<h2 id="overview-2">"#));
        assert!(html.contains(r#"<h2 id="bold-title">"#));
    }

    #[test]
    fn test_mermaid_blocks_are_isolated() {
        let html = render("```Mermaid\ngraph TD\n  A-->B\n```\n");

        assert!(html.contains("<pre class=\"mermaid\">\ngraph TD\n  A--&gt;B\n</pre>"));
    }

    #[test]
    fn test_code_is_highlighted_inline() {
        let html = render("```rust\nfn main() {}\n```\n");
        assert!(html.contains("style="));
        assert!(html.contains("main"));
    }

    #[test]
    fn test_unknown_language_is_escaped_plain_code() {
        let html = render("```nosuchlang\n<tag> & more\n```\n");
        assert!(html.contains(r#"<code class="language-nosuchlang">&lt;tag&gt; &amp; more"#));
    }

    #[test]
    fn test_loader_is_opt_in() {
        let renderer = HtmlRenderer::new("InspiredGitHub", true, "mermaid");
        let doc = DocumentModel::transient("text");
        let html = renderer.render(&doc, &parser::extract("text"));
        assert!(html.contains("mermaid.initialize"));
    }

    #[test]
    fn test_title_falls_back_to_file_name() {
        let renderer = HtmlRenderer::new("InspiredGitHub", false, "mermaid");
        let doc = DocumentModel::new(Some("notes/todo.md".into()), "no heading");
        let html = renderer.render(&doc, &parser::extract("no heading"));
        assert!(html.contains("<title>todo.md</title>"));
    }
}
