//! Background export batches.
//!
//! At most one batch is in flight per runner. A new request cancels the
//! previous one and waits for its worker to stop before starting; converters
//! stop at the next format boundary or as soon as their child process notices
//! the cancel flag.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread::{self, JoinHandle};

use chrono::Utc;

use super::{CancelToken, ExportFormat, ExportOrchestrator, ExportReport};
use crate::coordinator::Snapshot;
use crate::document::Version;
use crate::error::ExportError;

/// A batch running on a worker thread.
pub struct ExportHandle {
    cancel: CancelToken,
    receiver: Receiver<ExportReport>,
    version: Version,
    thread: Option<JoinHandle<()>>,
}

impl ExportHandle {
    /// Version of the document snapshot being exported.
    pub fn version(&self) -> Version {
        self.version
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// The report, if the batch has finished.
    ///
    /// Returns `Err(())` when the worker went away without reporting.
    fn try_report(&mut self) -> Result<Option<ExportReport>, ()> {
        match self.receiver.try_recv() {
            Ok(report) => {
                self.join();
                Ok(Some(report))
            }
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.join();
                Err(())
            }
        }
    }

    fn wait(mut self) -> Option<ExportReport> {
        let report = self.receiver.recv().ok();
        self.join();
        report
    }

    /// Cancel and block until the worker has stopped touching the export
    /// directory. Its report is discarded.
    fn stop(mut self) {
        self.cancel();
        self.join();
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            log::warn!("export worker for version {} panicked", self.version);
        }
    }
}

/// Runs export batches off the caller's thread.
pub struct ExportRunner {
    orchestrator: Arc<ExportOrchestrator>,
    in_flight: Option<ExportHandle>,
}

impl ExportRunner {
    pub fn new(orchestrator: ExportOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            in_flight: None,
        }
    }

    pub fn orchestrator(&self) -> &ExportOrchestrator {
        &self.orchestrator
    }

    /// Start exporting `snapshot`, superseding any batch still running.
    ///
    /// The report carries the snapshot's staleness. If no worker thread can be
    /// started, the next [`poll`](Self::poll) or [`wait`](Self::wait) yields a
    /// report with every requested format failed.
    pub fn request(&mut self, snapshot: Snapshot, formats: BTreeSet<ExportFormat>) {
        let Snapshot { document, stale } = snapshot;
        let version = document.version();

        if let Some(previous) = self.in_flight.take() {
            log::info!(
                "superseding export of version {} with version {}",
                previous.version(),
                version
            );
            previous.stop();
        }

        let cancel = CancelToken::new();
        let (sender, receiver) = mpsc::channel();
        let fallback = sender.clone();
        let orchestrator = Arc::clone(&self.orchestrator);
        let worker_cancel = cancel.clone();
        let captured_at = Utc::now();
        let planned = self
            .orchestrator
            .planned_artifacts(&document, &formats, captured_at);

        let spawned = thread::Builder::new()
            .name(format!("mdlens-export-v{version}"))
            .spawn(move || {
                let report = orchestrator
                    .export_cancellable(&document, &formats, captured_at, &worker_cancel)
                    .with_stale(stale);
                let _ = sender.send(report);
            });

        let thread = match spawned {
            Ok(thread) => Some(thread),
            Err(e) => {
                log::warn!("could not start export worker: {e}");
                let error = ExportError::ConverterUnavailable(format!("export worker: {e}"));
                let _ = fallback.send(ExportReport::failed(version, planned, &error).with_stale(stale));
                None
            }
        };

        self.in_flight = Some(ExportHandle {
            cancel,
            receiver,
            version,
            thread,
        });
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Version of the batch currently in flight.
    pub fn in_flight_version(&self) -> Option<Version> {
        self.in_flight.as_ref().map(ExportHandle::version)
    }

    /// Non-blocking: the finished report of the in-flight batch, if any.
    pub fn poll(&mut self) -> Option<ExportReport> {
        let handle = self.in_flight.as_mut()?;
        match handle.try_report() {
            Ok(Some(report)) => {
                self.in_flight = None;
                Some(report)
            }
            Ok(None) => None,
            Err(()) => {
                self.in_flight = None;
                None
            }
        }
    }

    /// Block until the in-flight batch finishes.
    pub fn wait(&mut self) -> Option<ExportReport> {
        self.in_flight.take()?.wait()
    }

    /// Cancel the in-flight batch without starting another.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            handle.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExportConfig;
    use crate::document::DocumentModel;
    use crate::export::{Converter, ExportInput};
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    /// Blocks until cancelled, like a converter process that never exits.
    /// Documents past version 1 convert normally.
    struct StallingConverter;

    impl Converter for StallingConverter {
        fn format(&self) -> ExportFormat {
            ExportFormat::PaginatedDocument
        }

        fn convert(&self, input: &ExportInput<'_>, output: &Path, cancel: &CancelToken) -> Result<(), ExportError> {
            if input.document.version() > 1 {
                fs::write(output, "%PDF").unwrap();
                return Ok(());
            }
            while !cancel.is_cancelled() {
                thread::sleep(Duration::from_millis(5));
            }
            Err(ExportError::Cancelled)
        }
    }

    fn runner_in(dir: &Path) -> ExportRunner {
        let config = ExportConfig {
            directory: dir.to_path_buf(),
            ..ExportConfig::default()
        };
        ExportRunner::new(
            ExportOrchestrator::new(&config, "mermaid").with_converter(StallingConverter),
        )
    }

    fn fresh(document: DocumentModel) -> Snapshot {
        Snapshot {
            document: Arc::new(document),
            stale: false,
        }
    }

    #[test]
    fn test_background_export_reports() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = runner_in(dir.path());
        let doc = DocumentModel::new(Some("notes.md".into()), "# Notes");

        runner.request(fresh(doc), BTreeSet::from([ExportFormat::StandaloneMarkup]));
        assert!(runner.is_busy());

        let report = runner.wait().unwrap();
        assert_eq!(report.version, 1);
        assert!(!report.stale);
        assert_eq!(report.succeeded_count(), 1);
        assert!(!runner.is_busy());
    }

    #[test]
    fn test_new_request_supersedes_in_flight_batch() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = runner_in(dir.path());
        let first = DocumentModel::new(Some("notes.md".into()), "# One");
        let second = first.next_version("# Two".into());

        runner.request(fresh(first), BTreeSet::from([ExportFormat::PaginatedDocument]));
        let stalled = runner.in_flight.as_ref().map(|h| h.cancel.clone()).unwrap();

        runner.request(fresh(second), BTreeSet::from([ExportFormat::StandaloneMarkup]));
        assert!(stalled.is_cancelled());
        assert_eq!(runner.in_flight_version(), Some(2));

        let report = runner.wait().unwrap();
        assert_eq!(report.version, 2);
        assert!(report.artifacts[0].succeeded());
    }

    #[test]
    fn test_superseded_batch_never_removes_newer_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = runner_in(dir.path());
        let first = DocumentModel::new(Some("notes.md".into()), "# One");
        let second = first.next_version("# Two".into());
        let pdf = BTreeSet::from([ExportFormat::PaginatedDocument]);

        runner.request(fresh(first), pdf.clone());
        thread::sleep(Duration::from_millis(20));
        runner.request(fresh(second), pdf);

        let report = runner.wait().unwrap();
        let artifact = &report.artifacts[0];
        assert!(artifact.succeeded());
        assert_eq!(fs::read_to_string(&artifact.output_path).unwrap(), "%PDF");

        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn test_stale_snapshot_is_flagged_on_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = runner_in(dir.path());
        let snapshot = Snapshot {
            document: Arc::new(DocumentModel::new(Some("notes.md".into()), "# Notes")),
            stale: true,
        };

        runner.request(snapshot, BTreeSet::from([ExportFormat::StandaloneMarkup]));
        assert!(runner.wait().unwrap().stale);
    }

    #[test]
    fn test_cancel_clears_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = runner_in(dir.path());
        let doc = DocumentModel::transient("# x");

        runner.request(fresh(doc), BTreeSet::from([ExportFormat::PaginatedDocument]));
        runner.cancel();
        assert!(!runner.is_busy());
        assert!(runner.poll().is_none());
    }
}
