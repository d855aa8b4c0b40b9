use crate::export::ExportFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub search: SearchConfig,

    /// Diagram detection and placeholder rendering
    #[serde(default)]
    pub diagram: DiagramConfig,

    /// Live reload of the open file
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory artifacts are written to, created on first export
    #[serde(default = "default_export_dir")]
    pub directory: PathBuf,

    /// Formats exported when none are given explicitly
    #[serde(default = "default_export_formats")]
    pub formats: Vec<ExportFormat>,

    /// External converter for paginated (PDF) output
    #[serde(default)]
    pub pdf: ConverterConfig,

    /// syntect theme used for code blocks in HTML output
    #[serde(default = "default_syntax_theme")]
    pub syntax_theme: String,

    /// Include the mermaid.js loader so diagrams render in a browser.
    /// Off by default: the loader is the only external reference in the page.
    #[serde(default)]
    pub mermaid_loader: bool,
}

/// External process invocation. `{input}` and `{output}` in `args` are
/// replaced by the HTML source and the target file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    #[serde(default = "default_pdf_program")]
    pub program: String,

    #[serde(default = "default_pdf_args")]
    pub args: Vec<String>,

    #[serde(default = "default_converter_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub case_sensitive: bool,

    /// Longer queries are truncated
    #[serde(default = "default_max_query_len")]
    pub max_query_len: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramConfig {
    /// Fence language tag marking a diagram (compared ignoring case)
    #[serde(default = "default_diagram_language")]
    pub language: String,

    #[serde(default = "default_preview_lines")]
    pub preview_lines: usize,

    #[serde(default = "default_preview_width")]
    pub preview_width: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    #[serde(default = "default_watch_enabled")]
    pub enabled: bool,

    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            directory: default_export_dir(),
            formats: default_export_formats(),
            pdf: ConverterConfig::default(),
            syntax_theme: default_syntax_theme(),
            mermaid_loader: false,
        }
    }
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: default_pdf_program(),
            args: default_pdf_args(),
            timeout_secs: default_converter_timeout(),
        }
    }
}

impl ConverterConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            max_query_len: default_max_query_len(),
        }
    }
}

impl Default for DiagramConfig {
    fn default() -> Self {
        Self {
            language: default_diagram_language(),
            preview_lines: default_preview_lines(),
            preview_width: default_preview_width(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: default_watch_enabled(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("exports")
}

fn default_export_formats() -> Vec<ExportFormat> {
    vec![
        ExportFormat::StandaloneMarkup,
        ExportFormat::PaginatedDocument,
        ExportFormat::WordProcessorDocument,
    ]
}

fn default_syntax_theme() -> String {
    "InspiredGitHub".to_string()
}

fn default_pdf_program() -> String {
    "wkhtmltopdf".to_string()
}

fn default_pdf_args() -> Vec<String> {
    vec![
        "--quiet".to_string(),
        "{input}".to_string(),
        "{output}".to_string(),
    ]
}

fn default_converter_timeout() -> u64 {
    120
}

fn default_max_query_len() -> usize {
    256
}

fn default_diagram_language() -> String {
    crate::parser::MERMAID_TOKEN.to_string()
}

fn default_preview_lines() -> usize {
    3
}

fn default_preview_width() -> usize {
    36
}

fn default_watch_enabled() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    100
}

impl Config {
    /// Get the platform-specific config file path
    /// - macOS: ~/Library/Application Support/mdlens/config.toml
    /// - Linux: ~/.config/mdlens/config.toml
    /// - Windows: %APPDATA%/mdlens/config.toml
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("mdlens").join("config.toml"))
    }

    /// Load config from file, or return default if file doesn't exist
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Load config from a specific file, falling back to defaults when the
    /// file is missing or malformed.
    pub fn load_from(path: &Path) -> Self {
        let Ok(contents) = fs::read_to_string(path) else {
            return Self::default();
        };

        match toml::from_str(&contents) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("ignoring invalid config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Save config to file
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let path = Self::config_path().ok_or("Could not determine config directory")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.export.directory, PathBuf::from("exports"));
        assert_eq!(config.export.formats.len(), 3);
        assert_eq!(config.diagram.language, "mermaid");
        assert_eq!(config.diagram.preview_lines, 3);
        assert!(!config.search.case_sensitive);
        assert_eq!(config.watch.debounce(), Duration::from_millis(100));
    }

    #[test]
    fn test_partial_file_keeps_field_defaults() {
        let config: Config = toml::from_str(
            r#"
[export]
directory = "out"
formats = ["standalone-markup"]

[export.pdf]
program = "pandoc"
"#,
        )
        .unwrap();

        assert_eq!(config.export.directory, PathBuf::from("out"));
        assert_eq!(config.export.formats, vec![ExportFormat::StandaloneMarkup]);
        assert_eq!(config.export.pdf.program, "pandoc");
        assert_eq!(config.export.pdf.args, default_pdf_args());
        assert_eq!(config.search.max_query_len, 256);
    }

    #[test]
    fn test_save_and_load_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.search.case_sensitive = true;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path);
        assert!(loaded.search.case_sensitive);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "export = 42").unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.export.directory, PathBuf::from("exports"));
    }
}
