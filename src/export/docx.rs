//! Minimal Office Open XML (.docx) writer.
//!
//! Produces a package with a document part, a style sheet covering the
//! heading levels and code, and core properties. Inline formatting is limited
//! to bold, italic, strikethrough and monospace runs.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use pulldown_cmark::{Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use zip::CompressionMethod;
use zip::write::SimpleFileOptions;

use super::{CancelToken, Converter, ExportFormat, ExportInput};
use crate::error::ExportError;

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Default Extension="xml" ContentType="application/xml"/>
<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>
<Override PartName="/word/styles.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.styles+xml"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
</Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
</Relationships>"#;

const DOCUMENT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/styles" Target="styles.xml"/>
</Relationships>"#;

const WORD_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";

/// Paragraph styles referenced from the document part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParaStyle {
    Normal,
    Heading(usize),
    Code,
    Quote,
    ListItem,
}

impl ParaStyle {
    fn id(self) -> Option<String> {
        match self {
            Self::Normal => None,
            Self::Heading(level) => Some(format!("Heading{level}")),
            Self::Code => Some("Code".to_string()),
            Self::Quote => Some("Quote".to_string()),
            Self::ListItem => Some("ListParagraph".to_string()),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct RunStyle {
    bold: bool,
    italic: bool,
    strike: bool,
    mono: bool,
}

#[derive(Debug)]
struct Run {
    text: String,
    style: RunStyle,
    break_before: bool,
}

#[derive(Debug)]
struct Paragraph {
    style: ParaStyle,
    runs: Vec<Run>,
}

/// Flattens markdown events into word-processor paragraphs.
#[derive(Default)]
struct Collector {
    paragraphs: Vec<Paragraph>,
    current: Option<Paragraph>,
    run_style: RunStyle,
    quote_depth: usize,
    list_depth: usize,
    pending_break: bool,
    item_fresh: bool,
}

impl Collector {
    fn block_style(&self) -> ParaStyle {
        if self.list_depth > 0 {
            ParaStyle::ListItem
        } else if self.quote_depth > 0 {
            ParaStyle::Quote
        } else {
            ParaStyle::Normal
        }
    }

    fn open(&mut self, style: ParaStyle) {
        self.flush();
        self.current = Some(Paragraph {
            style,
            runs: Vec::new(),
        });
    }

    fn flush(&mut self) {
        if let Some(paragraph) = self.current.take() {
            if !paragraph.runs.is_empty() {
                self.paragraphs.push(paragraph);
            }
        }
        self.pending_break = false;
        self.item_fresh = false;
    }

    fn push_text(&mut self, text: &str, style: RunStyle) {
        if self.current.is_none() {
            self.open(self.block_style());
        }
        let break_before = std::mem::take(&mut self.pending_break);
        if let Some(paragraph) = self.current.as_mut() {
            // The parser splits text at entities and markup characters
            if !break_before
                && let Some(last) = paragraph.runs.last_mut()
                && last.style == style
            {
                last.text.push_str(text);
                return;
            }
            paragraph.runs.push(Run {
                text: text.to_string(),
                style,
                break_before,
            });
        }
    }

    fn code_block(&mut self, body: &str) {
        self.flush();
        for line in body.trim_end_matches('\n').split('\n') {
            self.paragraphs.push(Paragraph {
                style: ParaStyle::Code,
                runs: vec![Run {
                    text: line.to_string(),
                    style: RunStyle {
                        mono: true,
                        ..RunStyle::default()
                    },
                    break_before: false,
                }],
            });
        }
    }

    fn collect(mut self, markdown: &str) -> Vec<Paragraph> {
        let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
        let mut code: Option<String> = None;

        for event in Parser::new_ext(markdown, options) {
            match event {
                Event::Start(Tag::Heading { level, .. }) => {
                    self.open(ParaStyle::Heading(heading_number(level)));
                }
                Event::Start(Tag::Paragraph) => {
                    // A loose list item already opened the paragraph holding its bullet
                    if !std::mem::take(&mut self.item_fresh) {
                        self.open(self.block_style());
                    }
                }
                Event::Start(Tag::Item) => {
                    self.open(ParaStyle::ListItem);
                    self.push_text("• ", RunStyle::default());
                    self.item_fresh = true;
                }
                Event::Start(Tag::List(_)) => {
                    self.flush();
                    self.list_depth += 1;
                }
                Event::End(TagEnd::List(_)) => {
                    self.flush();
                    self.list_depth = self.list_depth.saturating_sub(1);
                }
                Event::Start(Tag::BlockQuote { .. }) => {
                    self.flush();
                    self.quote_depth += 1;
                }
                Event::End(end) if matches!(end, TagEnd::BlockQuote { .. }) => {
                    self.flush();
                    self.quote_depth = self.quote_depth.saturating_sub(1);
                }
                Event::Start(Tag::CodeBlock(_)) => code = Some(String::new()),
                Event::End(TagEnd::CodeBlock) => {
                    if let Some(body) = code.take() {
                        self.code_block(&body);
                    }
                }
                Event::Start(Tag::Emphasis) => self.run_style.italic = true,
                Event::End(TagEnd::Emphasis) => self.run_style.italic = false,
                Event::Start(Tag::Strong) => self.run_style.bold = true,
                Event::End(TagEnd::Strong) => self.run_style.bold = false,
                Event::Start(Tag::Strikethrough) => self.run_style.strike = true,
                Event::End(TagEnd::Strikethrough) => self.run_style.strike = false,
                Event::End(TagEnd::Heading(_) | TagEnd::Paragraph | TagEnd::Item) => self.flush(),
                Event::Text(text) => match code.as_mut() {
                    Some(body) => body.push_str(&text),
                    None => self.push_text(&text, self.run_style),
                },
                Event::Code(text) => {
                    let style = RunStyle {
                        mono: true,
                        ..self.run_style
                    };
                    self.push_text(&text, style);
                }
                Event::Html(html) | Event::InlineHtml(html) => {
                    self.push_text(&html, self.run_style);
                }
                Event::SoftBreak => self.push_text(" ", self.run_style),
                Event::HardBreak => self.pending_break = true,
                Event::Rule => self.flush(),
                Event::TaskListMarker(done) => {
                    self.push_text(if done { "[x] " } else { "[ ] " }, self.run_style);
                }
                _ => {}
            }
        }

        self.flush();
        self.paragraphs
    }
}

fn heading_number(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn document_xml(paragraphs: &[Paragraph]) -> String {
    let mut body = String::new();
    for paragraph in paragraphs {
        body.push_str("<w:p>");
        if let Some(style) = paragraph.style.id() {
            body.push_str(&format!("<w:pPr><w:pStyle w:val=\"{style}\"/></w:pPr>"));
        }
        for run in &paragraph.runs {
            body.push_str("<w:r>");
            // CT_RPr is a sequence: rFonts precedes b, i and strike
            let mut props = String::new();
            if run.style.mono {
                props.push_str("<w:rFonts w:ascii=\"Consolas\" w:hAnsi=\"Consolas\"/>");
            }
            if run.style.bold {
                props.push_str("<w:b/>");
            }
            if run.style.italic {
                props.push_str("<w:i/>");
            }
            if run.style.strike {
                props.push_str("<w:strike/>");
            }
            if !props.is_empty() {
                body.push_str(&format!("<w:rPr>{props}</w:rPr>"));
            }
            if run.break_before {
                body.push_str("<w:br/>");
            }
            body.push_str(&format!(
                "<w:t xml:space=\"preserve\">{}</w:t></w:r>",
                html_escape::encode_text(&run.text)
            ));
        }
        body.push_str("</w:p>");
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="{WORD_NS}"><w:body>{body}<w:sectPr/></w:body></w:document>"#
    )
}

fn styles_xml() -> String {
    let sizes = [32, 28, 26, 24, 22, 22];
    let headings: String = sizes
        .iter()
        .enumerate()
        .map(|(i, size)| {
            let level = i + 1;
            format!(
                r#"<w:style w:type="paragraph" w:styleId="Heading{level}"><w:name w:val="heading {level}"/><w:basedOn w:val="Normal"/><w:next w:val="Normal"/><w:pPr><w:keepNext/><w:spacing w:before="240" w:after="120"/><w:outlineLvl w:val="{i}"/></w:pPr><w:rPr><w:b/><w:sz w:val="{size}"/></w:rPr></w:style>"#
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:styles xmlns:w="{WORD_NS}"><w:style w:type="paragraph" w:default="1" w:styleId="Normal"><w:name w:val="Normal"/><w:pPr><w:spacing w:after="120"/></w:pPr><w:rPr><w:sz w:val="22"/></w:rPr></w:style>{headings}<w:style w:type="paragraph" w:styleId="Code"><w:name w:val="Code"/><w:basedOn w:val="Normal"/><w:pPr><w:shd w:val="clear" w:color="auto" w:fill="F0F0F0"/><w:spacing w:after="0"/></w:pPr><w:rPr><w:rFonts w:ascii="Consolas" w:hAnsi="Consolas"/><w:sz w:val="20"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="Quote"><w:name w:val="Quote"/><w:basedOn w:val="Normal"/><w:pPr><w:ind w:left="720"/></w:pPr><w:rPr><w:i/><w:color w:val="666666"/></w:rPr></w:style><w:style w:type="paragraph" w:styleId="ListParagraph"><w:name w:val="List Paragraph"/><w:basedOn w:val="Normal"/><w:pPr><w:ind w:left="720"/></w:pPr></w:style></w:styles>"#
    )
}

fn core_xml(title: &str, created: DateTime<Utc>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcterms="http://purl.org/dc/terms/" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance"><dc:title>{}</dc:title><dcterms:created xsi:type="dcterms:W3CDTF">{}</dcterms:created></cp:coreProperties>"#,
        html_escape::encode_text(title),
        created.format("%Y-%m-%dT%H:%M:%SZ")
    )
}

/// Write `markdown` as a .docx package at `output`, stamped as created at
/// `created`.
pub fn write_docx(
    markdown: &str,
    title: &str,
    created: DateTime<Utc>,
    output: &Path,
) -> Result<(), ExportError> {
    let paragraphs = Collector::default().collect(markdown);
    let file = File::create(output).map_err(|e| ExportError::write(output, e))?;

    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let parts = [
        ("[Content_Types].xml", CONTENT_TYPES.to_string()),
        ("_rels/.rels", PACKAGE_RELS.to_string()),
        ("word/_rels/document.xml.rels", DOCUMENT_RELS.to_string()),
        ("word/document.xml", document_xml(&paragraphs)),
        ("word/styles.xml", styles_xml()),
        ("docProps/core.xml", core_xml(title, created)),
    ];

    for (name, contents) in parts {
        zip.start_file(name, options)
            .map_err(|e| ExportError::write(output, e))?;
        zip.write_all(contents.as_bytes())
            .map_err(|e| ExportError::write(output, e))?;
    }

    zip.finish().map_err(|e| ExportError::write(output, e))?;
    Ok(())
}

/// Native word-processor export.
pub struct DocxConverter;

impl Converter for DocxConverter {
    fn format(&self) -> ExportFormat {
        ExportFormat::WordProcessorDocument
    }

    fn convert(
        &self,
        input: &ExportInput<'_>,
        output: &Path,
        _cancel: &CancelToken,
    ) -> Result<(), ExportError> {
        let title = input
            .structure
            .headers
            .first()
            .map(|h| h.title.clone())
            .unwrap_or_else(|| input.document.display_name());
        write_docx(input.document.raw_text(), &title, input.captured_at, output)
    }
}
