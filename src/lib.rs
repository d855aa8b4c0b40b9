//! # mdlens
//!
//! The document core of a terminal markdown viewer: structure extraction,
//! literal search, multi-format export and live reload.
//!
//! Everything derived from a document (table of contents, search matches,
//! export reports) is tagged with the [`Version`] of the document it was
//! computed from. A reload bumps the version; consumers holding results for an
//! older version discard or refresh them.
//!
//! ## Features
//!
//! - ATX heading extraction with deterministic, collision-free anchor ids
//! - Mermaid diagram blocks isolated from ordinary fenced code
//! - Case-(in)sensitive literal search with cyclic navigation
//! - HTML, PDF and DOCX export where each format fails independently
//! - Reload coordination driven by an explicit change channel
//!
//! ## Example
//!
//! ```rust
//! use mdlens::{DocumentModel, Toc, search};
//!
//! let doc = DocumentModel::transient("# Title\n\ncontent content\n## Sub\nmore content");
//!
//! let toc = Toc::build(&doc, mdlens::parser::MERMAID_TOKEN);
//! assert_eq!(toc.resolve("sub"), Some(3));
//!
//! let mut cursor = search::SearchCursor::new(search::build(
//!     doc.raw_text(),
//!     doc.version(),
//!     "content",
//!     false,
//! ));
//! assert_eq!(cursor.position_label(), "1/3");
//! cursor.previous();
//! assert_eq!(cursor.position_label(), "3/3");
//! ```

/// Configuration module for persisting user preferences.
///
/// Covers export targets and converters, search limits, diagram placeholders
/// and live reload.
pub mod config;

/// Reload state machine and the change-signal channel.
pub mod coordinator;

/// Terminal placeholders and browser previews for diagram blocks.
pub mod diagram;

/// Versioned, immutable document text.
pub mod document;

/// Error types for reloads and exports.
pub mod error;

/// Multi-format export with per-format failure isolation.
pub mod export;

/// Parser module for markdown documents.
///
/// Extracts headings, diagram blocks and code blocks, and allocates anchors.
pub mod parser;

/// Literal full-text search and match navigation.
pub mod search;

/// Composition of a document with its cached TOC, search and exports.
pub mod session;

/// File system watcher producing change signals.
pub mod watcher;

// Re-export commonly used types for convenience
pub use config::Config;
pub use coordinator::{ChangeCoordinator, ChangeNotifier, ReloadOutcome, ReloadState};
pub use document::{DocumentModel, Version};
pub use error::{ExportError, ReloadError};
pub use export::{ExportArtifact, ExportFormat, ExportOrchestrator, ExportReport};
pub use parser::{DiagramBlock, HeaderNode, Structure, Toc, extract, parse_file};
pub use search::{SearchCursor, SearchMatch};
pub use session::DocumentSession;
pub use watcher::FileWatcher;
