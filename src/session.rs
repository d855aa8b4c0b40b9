//! The document session: one open file and everything derived from it.
//!
//! Derived state is cached with the version it was built from. A reload that
//! leaves the content hash unchanged carries the cached TOC forward instead of
//! re-extracting; search results are reported stale until refreshed.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::Config;
use crate::coordinator::{
    ChangeCoordinator, ChangeNotifier, ReloadJob, ReloadOutcome, ReloadResult, ReloadState, Snapshot,
};
use crate::diagram;
use crate::document::{DocumentModel, Version};
use crate::error::ReloadError;
use crate::export::{ExportFormat, ExportOrchestrator, ExportReport, ExportRunner};
use crate::parser::Toc;
use crate::search::{self, SearchCursor};

pub struct DocumentSession {
    config: Config,
    coordinator: ChangeCoordinator,
    toc: Option<Toc>,
    search: Option<SearchCursor>,
    exports: ExportRunner,
}

impl DocumentSession {
    pub fn new(coordinator: ChangeCoordinator, config: Config) -> Self {
        let orchestrator = ExportOrchestrator::new(&config.export, &config.diagram.language);
        Self::with_orchestrator(coordinator, config, orchestrator)
    }

    /// Session exporting through a caller-assembled orchestrator.
    pub fn with_orchestrator(
        coordinator: ChangeCoordinator,
        config: Config,
        orchestrator: ExportOrchestrator,
    ) -> Self {
        Self {
            config,
            coordinator,
            toc: None,
            search: None,
            exports: ExportRunner::new(orchestrator),
        }
    }

    /// Open the file at `path`.
    pub fn open(path: impl Into<PathBuf>, config: Config) -> Result<Self, ReloadError> {
        Ok(Self::new(ChangeCoordinator::open(path)?, config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn document(&self) -> Arc<DocumentModel> {
        self.coordinator.current()
    }

    pub fn version(&self) -> Version {
        self.coordinator.version()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.coordinator.snapshot()
    }

    pub fn reload_state(&self) -> &ReloadState {
        self.coordinator.state()
    }

    pub fn coordinator_mut(&mut self) -> &mut ChangeCoordinator {
        &mut self.coordinator
    }

    /// The table of contents for the current version.
    pub fn toc(&mut self) -> &Toc {
        let doc = self.coordinator.current();

        match &mut self.toc {
            Some(toc) if toc.version() == doc.version() => {}
            Some(toc) if toc.content_hash() == doc.content_hash() => {
                log::debug!("content unchanged, reusing toc for v{}", doc.version());
                toc.restamp(doc.version());
            }
            slot => *slot = Some(Toc::build(&doc, &self.config.diagram.language)),
        }

        self.toc
            .get_or_insert_with(|| Toc::build(&doc, &self.config.diagram.language))
    }

    /// Line to scroll to for `anchor` in the current version.
    pub fn resolve_anchor(&mut self, anchor: &str) -> Option<usize> {
        self.toc().resolve(anchor)
    }

    /// Run a new search against the last good version.
    ///
    /// Queries longer than the configured limit are cut to it. While a reload
    /// is pending the result is flagged `stale`.
    pub fn search(&mut self, query: &str, case_sensitive: bool) -> &mut SearchCursor {
        let limit = self.config.search.max_query_len;
        let query: String = query.chars().take(limit).collect();
        let Snapshot { document, stale } = self.coordinator.snapshot();

        let mut set = search::build(document.raw_text(), document.version(), &query, case_sensitive);
        set.stale = stale;
        self.search.insert(SearchCursor::new(set))
    }

    pub fn search_cursor(&self) -> Option<&SearchCursor> {
        self.search.as_ref()
    }

    pub fn search_cursor_mut(&mut self) -> Option<&mut SearchCursor> {
        self.search.as_mut()
    }

    /// Whether the active search was built against an older version, or
    /// while a reload was pending.
    pub fn search_is_stale(&self) -> bool {
        self.search
            .as_ref()
            .is_some_and(|cursor| cursor.matches().stale || cursor.is_stale(self.version()))
    }

    /// Reissue the last query against the current version, keeping focus on
    /// the match at or after the previously focused position.
    pub fn refresh_search(&mut self) -> Option<&mut SearchCursor> {
        let previous = self.search.take()?;
        let focus = previous.current().map(|m| (m.line_offset, m.start_column));
        let set = previous.matches();

        let cursor = self.search(&set.query, set.case_sensitive);
        if let Some((line, column)) = focus {
            cursor.seek(line, column);
        }
        Some(cursor)
    }

    pub fn clear_search(&mut self) {
        self.search = None;
    }

    pub fn notifier(&self) -> ChangeNotifier {
        self.coordinator.notifier()
    }

    /// Drain change signals and reload on the calling thread if any arrived.
    pub fn poll_changes(&mut self) -> Option<Result<ReloadOutcome, ReloadError>> {
        self.coordinator.poll_signals();
        self.coordinator.apply()
    }

    /// Drain change signals and hand out the read for a pending reload, to be
    /// run off the interactive thread. Searches and exports issued before
    /// [`complete_reload`](Self::complete_reload) see the last good version,
    /// flagged stale.
    pub fn begin_reload(&mut self) -> Option<ReloadJob> {
        self.coordinator.poll_signals();
        self.coordinator.begin_reload()
    }

    /// Publish the result of a job from [`begin_reload`](Self::begin_reload).
    pub fn complete_reload(
        &mut self,
        result: ReloadResult,
    ) -> Option<Result<ReloadOutcome, ReloadError>> {
        self.coordinator.complete(result)
    }

    /// Export the last good version in the background, superseding any export
    /// still running. The report is flagged stale if a reload was pending.
    pub fn request_export(&mut self, formats: BTreeSet<ExportFormat>) {
        self.exports.request(self.coordinator.snapshot(), formats);
    }

    /// Export in the configured default formats.
    pub fn request_default_export(&mut self) {
        let formats = self.config.export.formats.iter().copied().collect();
        self.request_export(formats);
    }

    /// Write a browser preview of the current version into `dir`. Heading ids
    /// are the TOC anchors.
    pub fn write_document_preview(&mut self, dir: &Path) -> io::Result<PathBuf> {
        let structure = self.toc().structure().clone();
        let document = self.coordinator.current();
        let renderer = self.exports.orchestrator().renderer();
        diagram::write_document_preview(&document, &structure, renderer, dir)
    }

    pub fn poll_export(&mut self) -> Option<ExportReport> {
        self.exports.poll()
    }

    pub fn wait_export(&mut self) -> Option<ExportReport> {
        self.exports.wait()
    }

    pub fn exports(&self) -> &ExportRunner {
        &self.exports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::DocumentSource;
    use std::path::Path;
    use std::sync::Mutex;

    struct SharedText(Mutex<String>);

    impl DocumentSource for SharedText {
        fn read(&self, _: &Path) -> Result<String, ReloadError> {
            Ok(self.0.lock().unwrap().clone())
        }
    }

    fn session(text: &str) -> (DocumentSession, Arc<SharedText>) {
        let source = Arc::new(SharedText(Mutex::new(text.to_string())));
        let doc = DocumentModel::new(Some("doc.md".into()), text);
        let coordinator = ChangeCoordinator::with_source(doc, source.clone());
        (DocumentSession::new(coordinator, Config::default()), source)
    }

    fn reload(session: &mut DocumentSession, source: &SharedText, text: &str) -> ReloadOutcome {
        *source.0.lock().unwrap() = text.to_string();
        session.notifier().notify();
        session.poll_changes().unwrap().unwrap()
    }

    #[test]
    fn test_scenario_toc_and_search() {
        let (mut session, _) = session("# Title\n\ncontent content\n## Sub\nmore content");

        let headers: Vec<_> = session
            .toc()
            .headers()
            .iter()
            .map(|h| (h.level, h.title.clone(), h.line_offset, h.anchor_id.clone()))
            .collect();
        assert_eq!(
            headers,
            vec![
                (1, "Title".to_string(), 0, "title".to_string()),
                (2, "Sub".to_string(), 3, "sub".to_string()),
            ]
        );
        assert_eq!(session.resolve_anchor("sub"), Some(3));

        let cursor = session.search("content", false);
        assert_eq!(cursor.matches().len(), 3);
        assert_eq!(cursor.position_label(), "1/3");
    }

    #[test]
    fn test_unchanged_reload_restamps_toc() {
        let (mut session, source) = session("# A\n## B");
        assert_eq!(session.toc().version(), 1);

        let outcome = reload(&mut session, &source, "# A\n## B");
        assert!(!outcome.content_changed);
        assert_eq!(session.toc().version(), 2);
        assert_eq!(session.toc().headers().len(), 2);
    }

    #[test]
    fn test_changed_reload_rebuilds_toc() {
        let (mut session, source) = session("# A");
        session.toc();

        reload(&mut session, &source, "# A\n## New");
        let toc = session.toc();
        assert_eq!(toc.version(), 2);
        assert_eq!(toc.resolve("new"), Some(1));
    }

    #[test]
    fn test_search_goes_stale_and_refreshes() {
        let (mut session, source) = session("one match\ntwo match\nthree match");
        session.search("match", false).next();
        assert_eq!(session.search_cursor().unwrap().position_label(), "2/3");

        reload(&mut session, &source, "zero\none match\ntwo match\nthree match");
        assert!(session.search_is_stale());

        let cursor = session.refresh_search().unwrap();
        assert!(!cursor.is_stale(2));
        assert_eq!(cursor.matches().len(), 3);
        // Focus stays on line 1 column 4, now the first match
        assert_eq!(cursor.current().map(|m| m.line_offset), Some(1));
        assert!(!session.search_is_stale());
    }

    #[test]
    fn test_search_during_reload_is_flagged_stale() {
        let (mut session, source) = session("old match");
        *source.0.lock().unwrap() = "new\nnew match".to_string();
        session.notifier().notify();

        let job = session.begin_reload().unwrap();
        assert_eq!(*session.reload_state(), ReloadState::Reloading);

        let cursor = session.search("match", false);
        assert!(cursor.matches().stale);
        assert_eq!(cursor.matches().version, 1);
        assert_eq!(cursor.current().map(|m| m.line_offset), Some(0));
        assert!(session.search_is_stale());

        let result = std::thread::spawn(move || job.run()).join().unwrap();
        let outcome = session.complete_reload(result).unwrap().unwrap();
        assert_eq!(outcome.version, 2);

        let cursor = session.refresh_search().unwrap();
        assert!(!cursor.matches().stale);
        assert_eq!(cursor.current().map(|m| m.line_offset), Some(1));
        assert!(!session.search_is_stale());
    }

    #[test]
    fn test_export_during_reload_is_flagged_stale() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, source) = session("# v1");
        let mut config = Config::default();
        config.export.directory = dir.path().to_path_buf();
        session.exports = ExportRunner::new(ExportOrchestrator::new(&config.export, "mermaid"));

        *source.0.lock().unwrap() = "# v2".to_string();
        session.notifier().notify();
        let _job = session.begin_reload().unwrap();

        session.request_export(BTreeSet::from([ExportFormat::StandaloneMarkup]));
        let report = session.wait_export().unwrap();
        assert!(report.stale);
        assert_eq!(report.version, 1);
    }

    #[test]
    fn test_document_preview_follows_reload() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, source) = session("# First");
        reload(&mut session, &source, "# First\n\n## Added");

        let path = session.write_document_preview(dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "doc_preview.html");
        let html = std::fs::read_to_string(path).unwrap();
        assert!(html.contains(r#"<h2 id="added">"#));
    }

    #[test]
    fn test_long_queries_are_truncated() {
        let (mut session, _) = session("abc");
        let long = "a".repeat(1000);
        let cursor = session.search(&long, false);
        assert_eq!(cursor.matches().query.chars().count(), 256);
    }

    #[test]
    fn test_export_uses_current_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let (mut session, source) = session("# v1");
        let mut config = Config::default();
        config.export.directory = dir.path().to_path_buf();
        let orchestrator = ExportOrchestrator::new(&config.export, "mermaid");
        session.exports = ExportRunner::new(orchestrator);

        reload(&mut session, &source, "# v2");
        session.request_export(BTreeSet::from([ExportFormat::StandaloneMarkup]));

        let report = session.wait_export().unwrap();
        assert_eq!(report.version, 2);
        let html = std::fs::read_to_string(&report.artifacts[0].output_path).unwrap();
        assert!(html.contains("v2"));
    }
}
