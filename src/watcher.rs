//! File system watcher feeding the change coordinator.
//!
//! Watches the open document and turns debounced modification events into a
//! single "changed" signal. It never reads the file; reloading is the
//! coordinator's job.

use notify::{
    Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{AccessKind, AccessMode, ModifyKind},
};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};

use crate::coordinator::ChangeNotifier;

/// Watches one file for external modification.
pub struct FileWatcher {
    watcher: RecommendedWatcher,
    receiver: Receiver<Result<Event, notify::Error>>,
    current_path: Option<PathBuf>,
    /// Events within this window of the last reported change are folded into it
    last_change: Instant,
    debounce: Duration,
}

impl FileWatcher {
    pub fn new(debounce: Duration) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel();
        let watcher = notify::recommended_watcher(tx)?;

        Ok(Self {
            watcher,
            receiver: rx,
            current_path: None,
            last_change: Instant::now(),
            debounce,
        })
    }

    /// Start watching `path`, replacing any previously watched file.
    pub fn watch(&mut self, path: &Path) -> Result<(), notify::Error> {
        if let Some(old_path) = self.current_path.take() {
            let _ = self.watcher.unwatch(&old_path);
        }

        // Editors may report the path they were given or its canonical form
        let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.watcher.watch(&path, RecursiveMode::NonRecursive)?;
        log::debug!("watching {}", path.display());
        self.current_path = Some(path);
        self.last_change = Instant::now();

        Ok(())
    }

    pub fn unwatch(&mut self) {
        if let Some(path) = self.current_path.take() {
            let _ = self.watcher.unwatch(&path);
        }
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// Drain pending events; true when a debounced change occurred.
    pub fn check_for_changes(&mut self) -> bool {
        let mut changed = false;

        loop {
            match self.receiver.try_recv() {
                Ok(Ok(event)) => changed |= self.is_relevant_event(&event),
                Ok(Err(e)) => log::warn!("watch error: {e}"),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        if changed {
            let now = Instant::now();
            if now.duration_since(self.last_change) >= self.debounce {
                self.last_change = now;
                return true;
            }
        }

        false
    }

    /// Forward a debounced change to `notifier`. Returns whether one was sent.
    pub fn forward_to(&mut self, notifier: &ChangeNotifier) -> bool {
        let changed = self.check_for_changes();
        if changed {
            notifier.notify();
        }
        changed
    }

    fn is_relevant_event(&self, event: &Event) -> bool {
        let Some(watched) = self.current_path.as_ref() else {
            return false;
        };
        if !event.paths.iter().any(|p| p == watched) {
            return false;
        }

        is_change_kind(&event.kind)
    }
}

fn is_change_kind(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
            | EventKind::Create(_)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange};

    #[test]
    fn test_watcher_creation() {
        let watcher = FileWatcher::new(Duration::from_millis(100));
        assert!(watcher.is_ok());
    }

    #[test]
    fn test_relevant_event_kinds() {
        assert!(is_change_kind(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(is_change_kind(&EventKind::Access(AccessKind::Close(AccessMode::Write))));
        assert!(is_change_kind(&EventKind::Create(CreateKind::File)));
        assert!(!is_change_kind(&EventKind::Access(AccessKind::Read)));
    }

    #[test]
    fn test_events_for_other_files_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.md");
        std::fs::write(&path, "# a").unwrap();

        let mut watcher = FileWatcher::new(Duration::ZERO).unwrap();
        watcher.watch(&path).unwrap();

        let other = Event::new(EventKind::Create(CreateKind::File)).add_path(dir.path().join("x.md"));
        assert!(!watcher.is_relevant_event(&other));

        let own = Event::new(EventKind::Create(CreateKind::File))
            .add_path(watcher.current_path().unwrap().to_path_buf());
        assert!(watcher.is_relevant_event(&own));

        watcher.unwatch();
        assert!(watcher.current_path().is_none());
    }
}
