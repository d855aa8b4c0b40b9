//! Versioned in-memory document.
//!
//! A [`DocumentModel`] is immutable once published. Every reload produces a
//! new model with a bumped version, so derived state (TOC, search matches,
//! export reports) can carry the version it was computed from and be
//! discarded once the version moves on.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Monotonic counter distinguishing successive loads of the same document.
pub type Version = u64;

/// Stem used for export file names when the document has no path.
pub const FALLBACK_STEM: &str = "markdown_export";

/// One loaded version of a markdown document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentModel {
    path: Option<PathBuf>,
    raw_text: String,
    version: Version,
    content_hash: String,
}

impl DocumentModel {
    /// Create the first version of a document.
    pub fn new(path: Option<PathBuf>, raw_text: impl Into<String>) -> Self {
        Self::with_version(path, raw_text.into(), 1)
    }

    /// Create a document that is not backed by a file (stdin, scratch buffers).
    pub fn transient(raw_text: impl Into<String>) -> Self {
        Self::new(None, raw_text)
    }

    pub(crate) fn with_version(path: Option<PathBuf>, raw_text: String, version: Version) -> Self {
        let content_hash = content_hash(&raw_text);
        Self {
            path,
            raw_text,
            version,
            content_hash,
        }
    }

    /// Build the successor of this document from freshly read text.
    ///
    /// The version is always bumped, even when the text is byte-identical;
    /// consumers compare [`content_hash`](Self::content_hash) to skip work.
    pub fn next_version(&self, raw_text: String) -> Self {
        Self::with_version(self.path.clone(), raw_text, self.version + 1)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn raw_text(&self) -> &str {
        &self.raw_text
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// SHA-256 hex digest of the raw text.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Whether an artifact stamped with `version` still describes this document.
    pub fn is_current(&self, version: Version) -> bool {
        self.version == version
    }

    /// File stem used to name export artifacts.
    pub fn stem(&self) -> String {
        self.path
            .as_deref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| FALLBACK_STEM.to_string())
    }

    /// Human readable name for titles and status lines.
    pub fn display_name(&self) -> String {
        self.path
            .as_deref()
            .and_then(|p| p.file_name())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "untitled".to_string())
    }

    /// Number of lines as the search index and extractor count them.
    pub fn line_count(&self) -> usize {
        self.raw_text.lines().count()
    }
}

/// Digest used to suppress redundant recomputation after no-op reloads.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}
