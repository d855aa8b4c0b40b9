use clap::{Parser, ValueEnum};
use mdlens::ExportFormat;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mdlens")]
#[command(version)]
#[command(about = "Markdown structure, search and export from the command line")]
#[command(
    long_about = "mdlens - the document core of a terminal markdown viewer.\n\n\
    Lists the table of contents, searches the text, previews diagram blocks and\n\
    exports to HTML, PDF and DOCX. With --watch it keeps the document loaded and\n\
    repeats the requested output whenever the file changes.\n\n\
    Examples:\n  \
    mdlens --toc README.md                   # Heading tree\n  \
    mdlens -l -o json README.md              # Headings with anchors as JSON\n  \
    mdlens --search install README.md        # Find text\n  \
    mdlens --export html --export docx doc.md\n  \
    mdlens --diagrams doc.md                 # Show diagram placeholders\n  \
    mdlens --open --anchor usage README.md   # View in the browser at a section"
)]
pub struct Cli {
    /// Markdown file to open
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub file: PathBuf,

    /// Show the heading tree with box-drawing characters
    #[arg(long = "toc")]
    pub toc: bool,

    /// List headings with their anchor ids and lines
    #[arg(short = 'l', long = "list", conflicts_with = "toc")]
    pub list: bool,

    /// Output format
    ///
    ///   plain - Human-readable text (default)
    ///   json  - JSON for scripting
    #[arg(short = 'o', long = "output", default_value = "plain")]
    pub output: OutputFormat,

    /// Search for literal text (case-insensitive unless --case-sensitive)
    #[arg(short = 's', long = "search", value_name = "QUERY")]
    pub search: Option<String>,

    /// Match case when searching
    #[arg(long = "case-sensitive", requires = "search")]
    pub case_sensitive: bool,

    /// Export to a format; repeat for several
    ///
    /// Accepts html, pdf, docx or the long names standalone-markup,
    /// paginated-document, word-processor-document. Use "all" for every
    /// configured format.
    #[arg(short = 'e', long = "export", value_name = "FORMAT", value_parser = parse_export_format)]
    pub export: Vec<ExportTarget>,

    /// Directory export artifacts are written to (overrides config)
    #[arg(long = "export-dir", value_name = "DIR")]
    pub export_dir: Option<PathBuf>,

    /// Show diagram blocks as terminal placeholders
    #[arg(long = "diagrams")]
    pub diagrams: bool,

    /// Open the Nth diagram (1-based) in the browser
    #[arg(long = "open-diagram", value_name = "N")]
    pub open_diagram: Option<usize>,

    /// Open the document in the browser: the HTML just exported, if any,
    /// otherwise a preview page with diagrams rendered
    #[arg(short = 'b', long = "open")]
    pub open: bool,

    /// Section to jump to when opening in the browser
    #[arg(long = "anchor", value_name = "ID", requires = "open")]
    pub anchor: Option<String>,

    /// Keep running and repeat the output whenever the file changes
    #[arg(short = 'w', long = "watch")]
    pub watch: bool,
}

impl Cli {
    /// Whether any output mode was requested explicitly.
    pub fn has_mode(&self) -> bool {
        self.toc
            || self.list
            || self.search.is_some()
            || !self.export.is_empty()
            || self.diagrams
            || self.open_diagram.is_some()
            || self.open
    }
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Plain text output
    Plain,
    /// JSON output
    Json,
}

/// A single `--export` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportTarget {
    All,
    Format(ExportFormat),
}

fn parse_export_format(value: &str) -> Result<ExportTarget, String> {
    if value.eq_ignore_ascii_case("all") {
        return Ok(ExportTarget::All);
    }
    value
        .to_ascii_lowercase()
        .parse::<ExportFormat>()
        .map(ExportTarget::Format)
        .map_err(|_| {
            format!(
                "unknown export format '{value}' (expected html, pdf, docx or all)"
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_export_values() {
        let cli = Cli::try_parse_from([
            "mdlens", "doc.md", "--export", "html", "-e", "DOCX", "-e", "paginated-document",
        ])
        .unwrap();
        assert_eq!(
            cli.export,
            vec![
                ExportTarget::Format(ExportFormat::StandaloneMarkup),
                ExportTarget::Format(ExportFormat::WordProcessorDocument),
                ExportTarget::Format(ExportFormat::PaginatedDocument),
            ]
        );
        assert!(Cli::try_parse_from(["mdlens", "doc.md", "--export", "rtf"]).is_err());
    }

    #[test]
    fn test_case_sensitive_requires_search() {
        assert!(Cli::try_parse_from(["mdlens", "doc.md", "--case-sensitive"]).is_err());
        let cli = Cli::try_parse_from(["mdlens", "doc.md", "-s", "x", "--case-sensitive"]).unwrap();
        assert!(cli.case_sensitive);
        assert!(cli.has_mode());
    }

    #[test]
    fn test_anchor_requires_open() {
        assert!(Cli::try_parse_from(["mdlens", "doc.md", "--anchor", "usage"]).is_err());
        let cli = Cli::try_parse_from(["mdlens", "doc.md", "-b", "--anchor", "usage"]).unwrap();
        assert!(cli.open);
        assert_eq!(cli.anchor.as_deref(), Some("usage"));
        assert!(cli.has_mode());
    }
}
