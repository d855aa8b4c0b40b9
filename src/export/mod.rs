//! Multi-format export.
//!
//! Every requested format is converted independently: a missing PDF renderer
//! never prevents the HTML or DOCX artifacts from being written. The only
//! batch-wide failure is an export directory that cannot be created.

mod docx;
mod html;
mod process;
mod runner;

pub use docx::DocxConverter;
pub use html::{HtmlConverter, HtmlRenderer};
pub(crate) use html::{MERMAID_LOADER, PAGE_STYLE};
pub use process::ProcessConverter;
pub use runner::{ExportHandle, ExportRunner};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::config::ExportConfig;
use crate::document::{DocumentModel, Version};
use crate::error::ExportError;
use crate::parser::{self, Structure};

/// Timestamp layout used in artifact file names (ISO 8601 basic format).
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Supported output formats.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
pub enum ExportFormat {
    /// Self-contained HTML with inline styling
    #[strum(to_string = "standalone-markup", serialize = "html")]
    StandaloneMarkup,
    /// PDF produced by an external renderer
    #[strum(to_string = "paginated-document", serialize = "pdf")]
    PaginatedDocument,
    /// Office Open XML word-processor document
    #[strum(to_string = "word-processor-document", serialize = "docx")]
    WordProcessorDocument,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::StandaloneMarkup => "html",
            Self::PaginatedDocument => "pdf",
            Self::WordProcessorDocument => "docx",
        }
    }
}

/// Outcome of one format conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum ExportStatus {
    Succeeded,
    Failed(String),
}

/// One exported file and how its conversion went.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportArtifact {
    pub format: ExportFormat,
    #[serde(rename = "outputPath")]
    pub output_path: PathBuf,
    pub status: ExportStatus,
    #[serde(skip)]
    pub error: Option<ExportError>,
    pub timestamp: DateTime<Utc>,
}

impl ExportArtifact {
    fn new(format: ExportFormat, output_path: PathBuf, timestamp: DateTime<Utc>) -> Self {
        Self {
            format,
            output_path,
            status: ExportStatus::Succeeded,
            error: None,
            timestamp,
        }
    }

    fn fail(&mut self, error: ExportError) {
        self.status = ExportStatus::Failed(error.to_string());
        self.error = Some(error);
    }

    pub fn succeeded(&self) -> bool {
        self.status == ExportStatus::Succeeded
    }
}

/// Per-format results of one export batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportReport {
    pub version: Version,
    /// The batch read the last good version while a reload was pending.
    pub stale: bool,
    pub artifacts: Vec<ExportArtifact>,
}

impl ExportReport {
    /// Report with every requested format failed for the same reason.
    pub fn failed(
        version: Version,
        artifacts: impl IntoIterator<Item = ExportArtifact>,
        error: &ExportError,
    ) -> Self {
        let artifacts = artifacts
            .into_iter()
            .map(|mut artifact| {
                artifact.fail(error.clone());
                artifact
            })
            .collect();
        Self {
            version,
            stale: false,
            artifacts,
        }
    }

    pub fn with_stale(mut self, stale: bool) -> Self {
        self.stale = stale;
        self
    }

    pub fn succeeded_count(&self) -> usize {
        self.artifacts.iter().filter(|a| a.succeeded()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ExportArtifact> {
        self.artifacts.iter().filter(|a| !a.succeeded())
    }

    /// One-line status, e.g.
    /// `2 of 3 succeeded; paginated-document failed: converter unavailable: ...`.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} of {} succeeded",
            self.succeeded_count(),
            self.artifacts.len()
        );
        for artifact in self.failures() {
            if let ExportStatus::Failed(reason) = &artifact.status {
                summary.push_str(&format!("; {} failed: {}", artifact.format, reason));
            }
        }
        summary
    }
}

/// Shared cancellation flag for an export batch.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a converter may draw on. The standalone HTML is rendered once
/// per batch and shared, since the PDF renderer consumes it too.
pub struct ExportInput<'a> {
    pub document: &'a DocumentModel,
    pub structure: &'a Structure,
    pub html: &'a str,
    /// Batch timestamp, the same one embedded in the artifact file names.
    pub captured_at: DateTime<Utc>,
}

/// Converts a document into one output format.
pub trait Converter: Send + Sync {
    fn format(&self) -> ExportFormat;

    /// Write the artifact to `output`. Implementations that wait on external
    /// work should poll `cancel` and stop early with [`ExportError::Cancelled`].
    fn convert(
        &self,
        input: &ExportInput<'_>,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<(), ExportError>;
}

/// `<dir>/<stem>_<timestamp>.<ext>`
pub fn artifact_path(
    dir: &Path,
    stem: &str,
    captured_at: DateTime<Utc>,
    format: ExportFormat,
) -> PathBuf {
    dir.join(format!(
        "{}_{}.{}",
        stem,
        captured_at.format(TIMESTAMP_FORMAT),
        format.extension()
    ))
}

/// Runs export batches against a fixed set of converters.
pub struct ExportOrchestrator {
    directory: PathBuf,
    diagram_token: String,
    renderer: HtmlRenderer,
    converters: Vec<Box<dyn Converter>>,
}

impl ExportOrchestrator {
    /// Orchestrator with the built-in converters configured from `config`.
    pub fn new(config: &ExportConfig, diagram_token: &str) -> Self {
        let orchestrator = Self::bare(config, diagram_token);
        orchestrator
            .with_converter(HtmlConverter)
            .with_converter(ProcessConverter::pdf(&config.pdf))
            .with_converter(DocxConverter)
    }

    /// Orchestrator without converters; every format fails until one is added.
    pub fn bare(config: &ExportConfig, diagram_token: &str) -> Self {
        Self {
            directory: config.directory.clone(),
            diagram_token: diagram_token.to_string(),
            renderer: HtmlRenderer::new(&config.syntax_theme, config.mermaid_loader, diagram_token),
            converters: Vec::new(),
        }
    }

    /// Register a converter, replacing any existing one for the same format.
    pub fn with_converter(mut self, converter: impl Converter + 'static) -> Self {
        self.converters.retain(|c| c.format() != converter.format());
        self.converters.push(Box::new(converter));
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) {
        self.directory = directory.into();
    }

    pub fn renderer(&self) -> &HtmlRenderer {
        &self.renderer
    }

    /// Export `document` to every format in `formats`.
    ///
    /// Always returns exactly one artifact per requested format, in format
    /// order. Individual failures are recorded in the artifact status.
    pub fn export(
        &self,
        document: &DocumentModel,
        formats: &BTreeSet<ExportFormat>,
        captured_at: DateTime<Utc>,
    ) -> ExportReport {
        self.export_cancellable(document, formats, captured_at, &CancelToken::new())
    }

    /// The artifacts a batch captured at `captured_at` would produce, all
    /// still marked as succeeded.
    pub fn planned_artifacts(
        &self,
        document: &DocumentModel,
        formats: &BTreeSet<ExportFormat>,
        captured_at: DateTime<Utc>,
    ) -> Vec<ExportArtifact> {
        let stem = document.stem();
        formats
            .iter()
            .map(|&format| {
                ExportArtifact::new(
                    format,
                    artifact_path(&self.directory, &stem, captured_at, format),
                    captured_at,
                )
            })
            .collect()
    }

    pub fn export_cancellable(
        &self,
        document: &DocumentModel,
        formats: &BTreeSet<ExportFormat>,
        captured_at: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> ExportReport {
        let mut artifacts = self.planned_artifacts(document, formats, captured_at);

        if let Err(e) = fs::create_dir_all(&self.directory) {
            log::warn!(
                "export directory {} unavailable: {}",
                self.directory.display(),
                e
            );
            let error = ExportError::DirectoryFailed {
                path: self.directory.clone(),
                message: e.to_string(),
            };
            return ExportReport::failed(document.version(), artifacts, &error);
        }

        let structure = parser::extract_with_token(document.raw_text(), &self.diagram_token);
        let html = self.renderer.render(document, &structure);
        let input = ExportInput {
            document,
            structure: &structure,
            html: &html,
            captured_at,
        };

        for artifact in &mut artifacts {
            if cancel.is_cancelled() {
                artifact.fail(ExportError::Cancelled);
                continue;
            }

            match self.convert_one(&input, artifact, cancel) {
                Ok(()) => log::info!(
                    "exported {} to {}",
                    artifact.format,
                    artifact.output_path.display()
                ),
                Err(e) => {
                    log::warn!("{} export failed: {}", artifact.format, e);
                    artifact.fail(e);
                }
            }
        }

        ExportReport {
            version: document.version(),
            stale: false,
            artifacts,
        }
    }

    /// Convert into a staging file next to the artifact and move it into place
    /// only on success. A failed or cancelled conversion removes its own
    /// staging file and never touches `output_path`.
    fn convert_one(
        &self,
        input: &ExportInput<'_>,
        artifact: &ExportArtifact,
        cancel: &CancelToken,
    ) -> Result<(), ExportError> {
        let converter = self
            .converters
            .iter()
            .find(|c| c.format() == artifact.format)
            .ok_or_else(|| {
                ExportError::ConverterUnavailable(format!(
                    "no converter registered for {}",
                    artifact.format
                ))
            })?;

        let staging = tempfile::Builder::new()
            .prefix(".mdlens-")
            .suffix(&format!(".{}", artifact.format.extension()))
            .tempfile_in(&self.directory)
            .map_err(|e| ExportError::write(&self.directory, e))?
            .into_temp_path();

        converter.convert(input, &staging, cancel)?;

        staging
            .persist(&artifact.output_path)
            .map_err(|e| ExportError::write(&artifact.output_path, e.error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    struct FailingConverter(ExportFormat);

    impl Converter for FailingConverter {
        fn format(&self) -> ExportFormat {
            self.0
        }

        fn convert(&self, _: &ExportInput<'_>, _: &Path, _: &CancelToken) -> Result<(), ExportError> {
            Err(ExportError::ConverterUnavailable("renderer unavailable".into()))
        }
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 14, 25, 30).unwrap()
    }

    fn all_formats() -> BTreeSet<ExportFormat> {
        ExportFormat::iter().collect()
    }

    fn config_in(dir: &Path) -> ExportConfig {
        ExportConfig {
            directory: dir.to_path_buf(),
            ..ExportConfig::default()
        }
    }

    #[test]
    fn test_format_names() {
        assert_eq!(ExportFormat::StandaloneMarkup.to_string(), "standalone-markup");
        assert_eq!(
            ExportFormat::from_str("word-processor-document").unwrap(),
            ExportFormat::WordProcessorDocument
        );
        assert_eq!(ExportFormat::from_str("pdf").unwrap(), ExportFormat::PaginatedDocument);
        assert!(ExportFormat::from_str("rtf").is_err());
    }

    #[test]
    fn test_artifact_path_is_deterministic() {
        let path = artifact_path(
            Path::new("exports"),
            "notes",
            fixed_time(),
            ExportFormat::WordProcessorDocument,
        );
        assert_eq!(path, PathBuf::from("exports/notes_20261019T142530Z.docx"));
    }

    #[test]
    fn test_isolation_with_unavailable_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = ExportOrchestrator::new(&config_in(dir.path()), "mermaid")
            .with_converter(FailingConverter(ExportFormat::PaginatedDocument));
        let doc = DocumentModel::new(Some(PathBuf::from("guide.md")), "# Guide\n\nHello.");

        let report = orchestrator.export(&doc, &all_formats(), fixed_time());

        assert_eq!(report.artifacts.len(), 3);
        assert_eq!(report.succeeded_count(), 2);
        for artifact in &report.artifacts {
            if artifact.format == ExportFormat::PaginatedDocument {
                assert!(!artifact.succeeded());
                assert!(!artifact.output_path.exists());
            } else {
                let size = fs::metadata(&artifact.output_path).unwrap().len();
                assert!(size > 0);
            }
        }
        assert_eq!(
            report.summary(),
            "2 of 3 succeeded; paginated-document failed: converter unavailable: renderer unavailable"
        );
    }

    #[test]
    fn test_directory_failure_fails_every_format() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, "file in the way").unwrap();

        let orchestrator = ExportOrchestrator::new(&config_in(&blocker.join("exports")), "mermaid");
        let doc = DocumentModel::transient("# Hi");
        let report = orchestrator.export(&doc, &all_formats(), fixed_time());

        assert_eq!(report.artifacts.len(), 3);
        assert_eq!(report.succeeded_count(), 0);
        assert!(
            report
                .artifacts
                .iter()
                .all(|a| matches!(a.error, Some(ExportError::DirectoryFailed { .. })))
        );
    }

    #[test]
    fn test_missing_converter_is_reported_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = ExportOrchestrator::bare(&config_in(dir.path()), "mermaid");
        let formats = BTreeSet::from([ExportFormat::WordProcessorDocument]);

        let report = orchestrator.export(&DocumentModel::transient("x"), &formats, fixed_time());
        assert_eq!(report.artifacts.len(), 1);
        assert!(matches!(
            report.artifacts[0].error,
            Some(ExportError::ConverterUnavailable(_))
        ));
    }

    #[test]
    fn test_cancelled_batch_skips_remaining_formats() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = ExportOrchestrator::new(&config_in(dir.path()), "mermaid");
        let cancel = CancelToken::new();
        cancel.cancel();

        let report = orchestrator.export_cancellable(
            &DocumentModel::transient("# Hi"),
            &all_formats(),
            fixed_time(),
            &cancel,
        );
        assert!(
            report
                .artifacts
                .iter()
                .all(|a| a.error == Some(ExportError::Cancelled))
        );
    }

    /// Writes its output, then fails as if cancelled halfway through.
    struct AbortingConverter;

    impl Converter for AbortingConverter {
        fn format(&self) -> ExportFormat {
            ExportFormat::PaginatedDocument
        }

        fn convert(&self, _: &ExportInput<'_>, output: &Path, _: &CancelToken) -> Result<(), ExportError> {
            fs::write(output, "partial").unwrap();
            Err(ExportError::Cancelled)
        }
    }

    #[test]
    fn test_failed_conversion_leaves_existing_artifact_alone() {
        let dir = tempfile::tempdir().unwrap();
        let doc = DocumentModel::new(Some(PathBuf::from("notes.md")), "# Notes");
        let formats = BTreeSet::from([ExportFormat::PaginatedDocument]);
        let existing = artifact_path(dir.path(), "notes", fixed_time(), ExportFormat::PaginatedDocument);
        fs::write(&existing, "finished by another batch").unwrap();

        let orchestrator = ExportOrchestrator::bare(&config_in(dir.path()), "mermaid")
            .with_converter(AbortingConverter);
        let report = orchestrator.export(&doc, &formats, fixed_time());

        assert_eq!(report.artifacts[0].error, Some(ExportError::Cancelled));
        assert_eq!(fs::read_to_string(&existing).unwrap(), "finished by another batch");
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_failed_report_covers_every_planned_format() {
        let orchestrator = ExportOrchestrator::bare(&config_in(Path::new("exports")), "mermaid");
        let doc = DocumentModel::new(Some(PathBuf::from("notes.md")), "# Notes");
        let planned = orchestrator.planned_artifacts(&doc, &all_formats(), fixed_time());
        let error = ExportError::ConverterUnavailable("export worker: out of threads".into());

        let report = ExportReport::failed(doc.version(), planned, &error);
        assert_eq!(report.artifacts.len(), 3);
        assert_eq!(report.succeeded_count(), 0);
        assert!(report.artifacts.iter().all(|a| a.error.as_ref() == Some(&error)));
    }

    #[test]
    fn test_transient_document_uses_fallback_stem() {
        let dir = tempfile::tempdir().unwrap();
        let orchestrator = ExportOrchestrator::new(&config_in(dir.path()), "mermaid");
        let formats = BTreeSet::from([ExportFormat::StandaloneMarkup]);

        let report = orchestrator.export(&DocumentModel::transient("# Hi"), &formats, fixed_time());
        let name = report.artifacts[0].output_path.file_name().unwrap();
        assert_eq!(name, "markdown_export_20261019T142530Z.html");
        assert!(report.artifacts[0].succeeded());
    }
}
