mod commands;

pub use commands::{Cli, ExportTarget, OutputFormat};
