//! Literal full-text search over one document version.
//!
//! Matches are found line by line, left to right, never overlapping: scanning
//! resumes at the end of each match. Columns count characters, not bytes, so
//! the rendering surface can highlight without re-deriving offsets.

use regex::RegexBuilder;
use serde::Serialize;

use crate::document::Version;

/// One highlighted occurrence of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SearchMatch {
    #[serde(rename = "lineOffset")]
    pub line_offset: usize,
    /// First character of the match
    #[serde(rename = "startColumn")]
    pub start_column: usize,
    /// One past the last character of the match
    #[serde(rename = "endColumn")]
    pub end_column: usize,
    pub version: Version,
}

/// Direction for cyclic match navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// All matches for one query against one document version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSet {
    pub version: Version,
    pub query: String,
    #[serde(rename = "caseSensitive")]
    pub case_sensitive: bool,
    /// Built from the last good version while a reload was pending
    pub stale: bool,
    pub matches: Vec<SearchMatch>,
}

impl MatchSet {
    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Whether this batch was computed against a different version.
    pub fn is_stale(&self, current: Version) -> bool {
        self.version != current
    }
}

/// Find every occurrence of `query` in `raw_text`.
///
/// An empty query yields an empty set. Matching is literal: regex
/// metacharacters in `query` have no special meaning.
///
/// # Examples
///
/// ```
/// use mdlens::search::build;
///
/// let set = build("# Title\n\ncontent content\n## Sub\nmore content", 1, "CONTENT", false);
/// let lines: Vec<_> = set.matches.iter().map(|m| m.line_offset).collect();
/// assert_eq!(lines, vec![2, 2, 4]);
/// ```
pub fn build(raw_text: &str, version: Version, query: &str, case_sensitive: bool) -> MatchSet {
    let mut set = MatchSet {
        version,
        query: query.to_string(),
        case_sensitive,
        stale: false,
        matches: Vec::new(),
    };

    if query.is_empty() {
        return set;
    }

    let pattern = match RegexBuilder::new(&regex::escape(query))
        .case_insensitive(!case_sensitive)
        .build()
    {
        Ok(pattern) => pattern,
        Err(err) => {
            log::warn!("search query rejected: {err}");
            return set;
        }
    };

    for (line_offset, line) in raw_text.lines().enumerate() {
        // Walk byte offsets forward once per line to convert them to columns
        let mut byte_cursor = 0;
        let mut column_cursor = 0;
        let mut column_at = |byte: usize| {
            column_cursor += line[byte_cursor..byte].chars().count();
            byte_cursor = byte;
            column_cursor
        };

        for found in pattern.find_iter(line) {
            let start_column = column_at(found.start());
            let end_column = column_at(found.end());
            set.matches.push(SearchMatch {
                line_offset,
                start_column,
                end_column,
                version,
            });
        }
    }

    log::debug!(
        "search {:?} (case_sensitive={}) found {} matches in v{}",
        query,
        case_sensitive,
        set.matches.len(),
        version
    );
    set
}

/// Cyclic navigation over `len` matches.
///
/// Returns `None` when there are no matches.
pub fn navigate(len: usize, current_index: usize, direction: Direction) -> Option<usize> {
    if len == 0 {
        return None;
    }

    let current = current_index.min(len - 1);
    Some(match direction {
        Direction::Forward => (current + 1) % len,
        Direction::Backward => (current + len - 1) % len,
    })
}

/// A match set plus the currently focused match.
#[derive(Debug, Clone)]
pub struct SearchCursor {
    set: MatchSet,
    current: usize,
}

impl SearchCursor {
    pub fn new(set: MatchSet) -> Self {
        Self { set, current: 0 }
    }

    pub fn matches(&self) -> &MatchSet {
        &self.set
    }

    pub fn version(&self) -> Version {
        self.set.version
    }

    pub fn is_stale(&self, current: Version) -> bool {
        self.set.is_stale(current)
    }

    pub fn current_index(&self) -> Option<usize> {
        (!self.set.is_empty()).then_some(self.current)
    }

    /// The focused match, or `None` when there are no matches.
    pub fn current(&self) -> Option<&SearchMatch> {
        self.set.matches.get(self.current)
    }

    pub fn next(&mut self) -> Option<&SearchMatch> {
        self.step(Direction::Forward)
    }

    pub fn previous(&mut self) -> Option<&SearchMatch> {
        self.step(Direction::Backward)
    }

    fn step(&mut self, direction: Direction) -> Option<&SearchMatch> {
        self.current = navigate(self.set.len(), self.current, direction)?;
        self.current()
    }

    /// Focus the first match at or after `line`/`column`, wrapping to the
    /// first match when none follows.
    pub fn seek(&mut self, line: usize, column: usize) -> Option<&SearchMatch> {
        let index = self
            .set
            .matches
            .partition_point(|m| (m.line_offset, m.start_column) < (line, column));
        self.current = if index < self.set.len() { index } else { 0 };
        self.current()
    }

    /// Matches on one line, for highlighting.
    pub fn matches_on_line(&self, line: usize) -> impl Iterator<Item = &SearchMatch> {
        self.set.matches.iter().filter(move |m| m.line_offset == line)
    }

    /// Position text such as `3/10`, or `0/0` without matches.
    pub fn position_label(&self) -> String {
        match self.current_index() {
            Some(index) => format!("{}/{}", index + 1, self.set.len()),
            None => "0/0".to_string(),
        }
    }
}
