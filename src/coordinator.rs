//! Reload coordination.
//!
//! The coordinator owns the current [`DocumentModel`] and is the only place a
//! new version is produced. "File changed" signals arrive over a channel
//! ([`ChangeNotifier`]) or directly; reloading happens only when the host
//! asks for it, so a burst of signals collapses into one read.
//!
//! ```text
//! Clean ──signal──▶ StaleSignalled ──apply──▶ Reloading ──ok──▶ Clean
//!   ▲                     ▲                        │
//!   │                     └──────signal──── Error ◀┘ err
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use crate::document::{DocumentModel, Version};
use crate::error::ReloadError;

/// Where reloads read document text from.
pub trait DocumentSource: Send + Sync {
    fn read(&self, path: &Path) -> Result<String, ReloadError>;
}

/// Reads documents from the filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl DocumentSource for FsSource {
    fn read(&self, path: &Path) -> Result<String, ReloadError> {
        fs::read_to_string(path).map_err(|e| ReloadError::from_io(path.to_path_buf(), &e))
    }
}

/// Reload lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadState {
    Clean,
    StaleSignalled,
    Reloading,
    Error(ReloadError),
}

/// Sending half of the change channel. Cheap to clone and safe to move to a
/// watcher thread.
#[derive(Debug, Clone)]
pub struct ChangeNotifier(Sender<()>);

impl ChangeNotifier {
    /// Report that the backing file changed. Never blocks; signals sent after
    /// the coordinator is dropped are discarded.
    pub fn notify(&self) {
        let _ = self.0.send(());
    }
}

/// Result of a successful reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub version: Version,
    /// False when the new text hashes the same as the previous version
    pub content_changed: bool,
}

/// The read half of a reload, detached from the coordinator so it can run on
/// another thread.
pub struct ReloadJob {
    path: Option<PathBuf>,
    source: Arc<dyn DocumentSource>,
}

impl ReloadJob {
    pub fn run(self) -> ReloadResult {
        let text = match &self.path {
            Some(path) => self.source.read(path),
            None => Err(ReloadError::NoSource),
        };
        ReloadResult(text)
    }
}

/// Output of [`ReloadJob::run`], handed back to [`ChangeCoordinator::complete`].
#[derive(Debug)]
pub struct ReloadResult(Result<String, ReloadError>);

/// The current document together with whether it is known to be outdated.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub document: Arc<DocumentModel>,
    /// True unless the coordinator is `Clean`
    pub stale: bool,
}

/// Owns the current document and drives reloads.
pub struct ChangeCoordinator {
    current: Arc<DocumentModel>,
    state: ReloadState,
    source: Arc<dyn DocumentSource>,
    sender: Sender<()>,
    receiver: Receiver<()>,
    /// A signal arrived while a reload was running
    pending_signal: bool,
}

impl ChangeCoordinator {
    pub fn new(document: DocumentModel) -> Self {
        Self::with_source(document, Arc::new(FsSource))
    }

    pub fn with_source(document: DocumentModel, source: Arc<dyn DocumentSource>) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            current: Arc::new(document),
            state: ReloadState::Clean,
            source,
            sender,
            receiver,
            pending_signal: false,
        }
    }

    /// Load version 1 of the document at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ReloadError> {
        let path = path.into();
        let text = FsSource.read(&path)?;
        Ok(Self::new(DocumentModel::new(Some(path), text)))
    }

    pub fn notifier(&self) -> ChangeNotifier {
        ChangeNotifier(self.sender.clone())
    }

    pub fn state(&self) -> &ReloadState {
        &self.state
    }

    /// The last known-good document.
    pub fn current(&self) -> Arc<DocumentModel> {
        Arc::clone(&self.current)
    }

    pub fn version(&self) -> Version {
        self.current.version()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            document: self.current(),
            stale: self.state != ReloadState::Clean,
        }
    }

    /// Record that the backing file changed.
    pub fn signal_changed(&mut self) {
        match self.state {
            ReloadState::Reloading => self.pending_signal = true,
            ReloadState::StaleSignalled => {}
            _ => {
                log::debug!("{} changed on disk", self.current.display_name());
                self.state = ReloadState::StaleSignalled;
            }
        }
    }

    /// Drain the change channel. Returns true if any signal was received.
    pub fn poll_signals(&mut self) -> bool {
        let mut received = false;
        loop {
            match self.receiver.try_recv() {
                Ok(()) => received = true,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        if received {
            self.signal_changed();
        }
        received
    }

    /// Move to `Reloading` and hand out the read to perform.
    ///
    /// Returns `None` unless a change has been signalled.
    pub fn begin_reload(&mut self) -> Option<ReloadJob> {
        if self.state != ReloadState::StaleSignalled {
            return None;
        }

        self.state = ReloadState::Reloading;
        Some(ReloadJob {
            path: self.current.path().map(Path::to_path_buf),
            source: Arc::clone(&self.source),
        })
    }

    /// Publish the result of a reload started by [`begin_reload`].
    ///
    /// On failure the document stays on its last good version. Returns `None`
    /// and changes nothing unless a reload is in progress.
    ///
    /// [`begin_reload`]: Self::begin_reload
    pub fn complete(&mut self, result: ReloadResult) -> Option<Result<ReloadOutcome, ReloadError>> {
        if self.state != ReloadState::Reloading {
            log::debug!("ignoring reload result outside of a reload");
            return None;
        }
        let pending = std::mem::take(&mut self.pending_signal);

        let outcome = match result.0 {
            Ok(text) => {
                let next = self.current.next_version(text);
                let outcome = ReloadOutcome {
                    version: next.version(),
                    content_changed: next.content_hash() != self.current.content_hash(),
                };
                log::info!(
                    "reloaded {} as v{}{}",
                    next.display_name(),
                    outcome.version,
                    if outcome.content_changed { "" } else { " (unchanged)" }
                );

                self.current = Arc::new(next);
                self.state = if pending {
                    ReloadState::StaleSignalled
                } else {
                    ReloadState::Clean
                };
                Ok(outcome)
            }
            Err(e) => {
                log::warn!("reload of {} failed: {}", self.current.display_name(), e);
                self.state = if pending {
                    ReloadState::StaleSignalled
                } else {
                    ReloadState::Error(e.clone())
                };
                Err(e)
            }
        };
        Some(outcome)
    }

    /// Perform a pending reload on the calling thread.
    ///
    /// Returns `None` when no change has been signalled.
    pub fn apply(&mut self) -> Option<Result<ReloadOutcome, ReloadError>> {
        let job = self.begin_reload()?;
        self.complete(job.run())
    }
}
