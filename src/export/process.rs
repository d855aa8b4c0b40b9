//! External converter processes.
//!
//! Paginated output is delegated to a renderer installed on the host
//! (`wkhtmltopdf` by default). The renderer reads the standalone HTML from a
//! temporary file; its absence is the common failure and is reported as
//! [`ExportError::ConverterUnavailable`].

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use super::{CancelToken, Converter, ExportFormat, ExportInput};
use crate::config::ConverterConfig;
use crate::error::ExportError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Runs `program args...` with `{input}`/`{output}` substituted.
#[derive(Debug, Clone)]
pub struct ProcessConverter {
    format: ExportFormat,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessConverter {
    pub fn new(
        format: ExportFormat,
        program: impl Into<String>,
        args: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            format,
            program: program.into(),
            args,
            timeout,
        }
    }

    /// PDF converter from the `[export.pdf]` config section.
    pub fn pdf(config: &ConverterConfig) -> Self {
        Self::new(
            ExportFormat::PaginatedDocument,
            config.program.clone(),
            config.args.clone(),
            config.timeout(),
        )
    }

    fn expand_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace("{input}", &input).replace("{output}", &output))
            .collect()
    }
}

impl Converter for ProcessConverter {
    fn format(&self) -> ExportFormat {
        self.format
    }

    fn convert(
        &self,
        input: &ExportInput<'_>,
        output: &Path,
        cancel: &CancelToken,
    ) -> Result<(), ExportError> {
        let failed = |e: io::Error| ExportError::ConverterFailed(e.to_string());

        let mut source = tempfile::Builder::new()
            .prefix("mdlens-")
            .suffix(".html")
            .tempfile()
            .map_err(failed)?;
        source.write_all(input.html.as_bytes()).map_err(failed)?;
        source.flush().map_err(failed)?;

        let mut stderr = tempfile::tempfile().map_err(failed)?;
        let stderr_sink = stderr.try_clone().map_err(failed)?;

        let args = self.expand_args(source.path(), output);
        log::debug!("running {} {:?}", self.program, args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_sink))
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => {
                    ExportError::ConverterUnavailable(format!("{} not found", self.program))
                }
                _ => ExportError::ConverterUnavailable(format!("{}: {}", self.program, e)),
            })?;

        let started = Instant::now();
        let status = loop {
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExportError::Cancelled);
            }

            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() > self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ExportError::ConverterFailed(format!(
                        "{} timed out after {}s",
                        self.program,
                        self.timeout.as_secs()
                    )));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(failed(e)),
            }
        };

        if !status.success() {
            let mut message = String::new();
            let _ = stderr.seek(SeekFrom::Start(0));
            let _ = stderr.read_to_string(&mut message);
            let message = message.trim();
            return Err(ExportError::ConverterFailed(if message.is_empty() {
                format!("{} exited with {}", self.program, status)
            } else {
                format!("{} exited with {}: {}", self.program, status, message)
            }));
        }

        match std::fs::metadata(output) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(ExportError::ConverterFailed(format!(
                "{} produced no output",
                self.program
            ))),
        }
    }
}
