//! Utility functions for markdown parsing.
//!
//! Shared line-level helpers used by the structure extractor.

/// Strip inline markdown formatting from text.
///
/// Used to produce clean TOC titles from raw ATX heading text.
///
/// Handles: images and links (keeping alt/link text), `<autolinks>`,
/// `**bold**`, `__bold__`, `*italic*`, `_italic_` (with snake_case protection),
/// `` `code` ``, and `~~strikethrough~~`.
///
/// # Examples
///
/// ```
/// # use mdlens::parser::utils::strip_markdown_inline;
/// assert_eq!(strip_markdown_inline("**bold** text"), "bold text");
/// assert_eq!(strip_markdown_inline("`code` here"), "code here");
/// assert_eq!(strip_markdown_inline("see [docs](https://example.com)"), "see docs");
/// assert_eq!(strip_markdown_inline("snake_case_var"), "snake_case_var");
/// ```
pub fn strip_markdown_inline(text: &str) -> String {
    use regex::Regex;
    use std::sync::OnceLock;

    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    let patterns = PATTERNS.get_or_init(|| {
        vec![
            (Regex::new(r"!\[([^\]]*)\]\([^)]*\)").unwrap(), "$1"),
            (Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap(), "$1"),
            (Regex::new(r"\[([^\]]+)\]\[[^\]]*\]").unwrap(), "$1"),
            (Regex::new(r"<((?:https?|mailto):[^>\s]+)>").unwrap(), "$1"),
            (Regex::new(r"~~(.+?)~~").unwrap(), "$1"),
            (Regex::new(r"\*\*(.+?)\*\*").unwrap(), "$1"),
            (Regex::new(r"__(.+?)__").unwrap(), "$1"),
            (Regex::new(r"`+([^`]+?)`+").unwrap(), "$1"),
            (Regex::new(r"\*(.+?)\*").unwrap(), "$1"),
            (
                Regex::new(r"(^|[^a-zA-Z0-9])_([^_]+)_([^a-zA-Z0-9]|$)").unwrap(),
                "$1$2$3",
            ),
        ]
    });

    let mut result = text.to_string();
    for (pattern, replacement) in patterns {
        result = pattern.replace_all(&result, *replacement).to_string();
    }
    result.trim().to_string()
}

/// Split an ATX heading line into its level and raw title text.
///
/// The optional closing sequence of `#`s is removed from the title, so
/// `## Setup ##` yields `(2, "Setup")` while `# C#` keeps its trailing hash.
pub fn split_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }

    // '#' is one byte, so the level doubles as a byte index
    let rest = &trimmed[level..];
    match rest.chars().next() {
        None => return Some((level, "")),
        Some(c) if c.is_whitespace() => {}
        Some(_) => return None,
    }

    let title = rest.trim();
    let without_closing = title.trim_end_matches('#');
    let title = if without_closing.is_empty() {
        ""
    } else if without_closing.ends_with(char::is_whitespace) {
        without_closing.trim_end()
    } else {
        title
    };

    Some((level, title))
}

/// An opening code fence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FenceOpen {
    /// Fence character, '`' or '~'
    pub marker: char,
    /// Length of the opening marker run
    pub len: usize,
    /// Info string after the marker, trimmed
    pub info: String,
}

impl FenceOpen {
    /// Language tag: first word of the info string.
    pub fn language(&self) -> Option<&str> {
        self.info.split_whitespace().next()
    }

    /// Whether `line` closes this fence.
    pub fn is_closed_by(&self, line: &str) -> bool {
        let Some(rest) = strip_fence_indent(line) else {
            return false;
        };
        let run = rest.chars().take_while(|&c| c == self.marker).count();
        run >= self.len && rest[run..].trim().is_empty()
    }
}

/// Recognize a fence-open line: up to three spaces of indentation followed by
/// three or more backticks or tildes and an optional info string.
///
/// # Examples
///
/// ```
/// # use mdlens::parser::utils::parse_fence_open;
/// let fence = parse_fence_open("```rust ignore").unwrap();
/// assert_eq!(fence.language(), Some("rust"));
/// assert!(parse_fence_open("``not a fence``").is_none());
/// ```
pub fn parse_fence_open(line: &str) -> Option<FenceOpen> {
    let rest = strip_fence_indent(line)?;
    let marker = rest.chars().next()?;
    if marker != '`' && marker != '~' {
        return None;
    }

    let len = rest.chars().take_while(|&c| c == marker).count();
    if len < 3 {
        return None;
    }

    let info = rest[len..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }

    Some(FenceOpen {
        marker,
        len,
        info: info.to_string(),
    })
}

fn strip_fence_indent(line: &str) -> Option<&str> {
    let rest = line.trim_start_matches(' ');
    if line.len() - rest.len() > 3 {
        None
    } else {
        Some(rest)
    }
}
