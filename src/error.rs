//! Error types surfaced to the interactive surface.
//!
//! None of these abort the application: reload failures leave the document on
//! its last good version, and export failures are recorded per artifact.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Why a reload could not be applied.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReloadError {
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("permission denied: {}", .0.display())]
    PermissionDenied(PathBuf),

    #[error("could not read {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("document has no backing file to reload")]
    NoSource,
}

impl ReloadError {
    /// Classify an I/O error raised while reading `path`.
    pub fn from_io(path: PathBuf, err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            _ => Self::Io {
                path,
                message: err.to_string(),
            },
        }
    }
}

/// Why a single export format, or a whole batch, failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExportError {
    /// The export directory could not be created; fails every format.
    #[error("cannot create export directory {}: {message}", .path.display())]
    DirectoryFailed { path: PathBuf, message: String },

    #[error("converter unavailable: {0}")]
    ConverterUnavailable(String),

    #[error("converter failed: {0}")]
    ConverterFailed(String),

    #[error("write failed for {}: {message}", .path.display())]
    Write { path: PathBuf, message: String },

    #[error("render failed: {0}")]
    Render(String),

    #[error("cancelled")]
    Cancelled,
}

impl ExportError {
    pub(crate) fn write(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        Self::Write {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_error_classification() {
        let path = PathBuf::from("gone.md");
        let missing = io::Error::new(io::ErrorKind::NotFound, "nope");
        assert_eq!(
            ReloadError::from_io(path.clone(), &missing),
            ReloadError::NotFound(path.clone())
        );

        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(
            ReloadError::from_io(path.clone(), &denied),
            ReloadError::PermissionDenied(_)
        ));

        let other = io::Error::other("disk on fire");
        let err = ReloadError::from_io(path, &other);
        assert_eq!(err.to_string(), "could not read gone.md: disk on fire");
    }

    #[test]
    fn test_export_error_messages() {
        assert_eq!(
            ExportError::ConverterUnavailable("wkhtmltopdf not found".into()).to_string(),
            "converter unavailable: wkhtmltopdf not found"
        );
        assert_eq!(ExportError::Cancelled.to_string(), "cancelled");
    }
}
