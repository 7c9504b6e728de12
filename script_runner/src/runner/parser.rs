//! Statement boundary detection
//!
//! Scripts are split with line-oriented heuristics only: a statement ends on
//! the first line that contains the current delimiter (or, in full-line mode,
//! that consists of nothing but the delimiter). Delimiters inside string
//! literals or block comments are not recognised as such.

use once_cell::sync::Lazy;
use regex::Regex;

/// Separator written after every line appended to a command
pub const LINE_SEPARATOR: &str = "\n";

/// `-- @DELIMITER $$` and friends, case-insensitive
static DELIMITER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*((--)|(//))?\s*(//)?\s*@DELIMITER\s+([^\s]+)")
        .expect("delimiter directive pattern is valid")
});

/// Whether a trimmed line is a single-line comment
pub fn is_comment(trimmed_line: &str) -> bool {
    trimmed_line.starts_with("//") || trimmed_line.starts_with("--")
}

/// The new delimiter named by a directive line, if it is one
pub fn delimiter_directive(trimmed_line: &str) -> Option<&str> {
    DELIMITER_PATTERN
        .captures(trimmed_line)
        .and_then(|captures| captures.get(5))
        .map(|token| token.as_str())
}

/// How a line was consumed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// A comment; never part of a statement
    Comment,
    /// The line closed the buffered statement, which is ready to execute
    StatementEnd,
    /// The line was appended to the buffered statement
    Continuation,
    Blank,
}

/// Mutable state carried across the lines of one run
#[derive(Debug, Clone)]
pub struct ParseState {
    command: String,
    delimiter: String,
    full_line_delimiter: bool,
}

impl ParseState {
    pub fn new(delimiter: impl Into<String>, full_line_delimiter: bool) -> Self {
        Self {
            command: String::new(),
            delimiter: delimiter.into(),
            full_line_delimiter,
        }
    }

    /// The statement text assembled so far
    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Whether anything other than whitespace is waiting for a delimiter
    pub fn has_pending_command(&self) -> bool {
        !self.command.trim().is_empty()
    }

    /// Forget the dispatched statement
    pub fn clear(&mut self) {
        self.command.clear();
    }

    /// Consume one line of the script
    ///
    /// On [`LineKind::StatementEnd`] the complete statement is available via
    /// [`ParseState::command`] until [`ParseState::clear`] is called.
    pub fn feed(&mut self, line: &str) -> LineKind {
        let trimmed = line.trim();

        if is_comment(trimmed) {
            if let Some(delimiter) = delimiter_directive(trimmed) {
                tracing::debug!(from = %self.delimiter, to = %delimiter, "Delimiter changed");
                self.delimiter = delimiter.to_string();
            }
            LineKind::Comment
        } else if self.ends_statement(trimmed) {
            // anything after the last delimiter on the line is dropped
            let end = line.rfind(self.delimiter.as_str()).unwrap_or(line.len());
            self.command.push_str(&line[..end]);
            self.command.push_str(LINE_SEPARATOR);
            LineKind::StatementEnd
        } else if !trimmed.is_empty() {
            self.command.push_str(line);
            self.command.push_str(LINE_SEPARATOR);
            LineKind::Continuation
        } else {
            LineKind::Blank
        }
    }

    fn ends_statement(&self, trimmed_line: &str) -> bool {
        if self.full_line_delimiter {
            trimmed_line == self.delimiter
        } else {
            trimmed_line.contains(self.delimiter.as_str())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::*;

    #[rstest]
    #[case("-- @DELIMITER $$", Some("$$"))]
    #[case("// @delimiter //", Some("//"))]
    #[case("--// @Delimiter GO", Some("GO"))]
    #[case("@DELIMITER |", Some("|"))]
    #[case("--   @DELIMITER   ;;  trailing words", Some(";;"))]
    #[case("-- @DELIMITER", None)]
    #[case("-- change the delimiter to $$", None)]
    fn test_delimiter_directive(#[case] line: &str, #[case] expected: Option<&str>) {
        assert_eq!(delimiter_directive(line), expected);
    }

    #[rstest]
    #[case("-- comment", true)]
    #[case("// comment", true)]
    #[case("SELECT 1; -- trailing", false)]
    #[case("/* block */", false)]
    fn test_is_comment(#[case] line: &str, #[case] expected: bool) {
        assert_eq!(is_comment(line), expected);
    }

    #[test]
    fn test_statement_spans_lines() {
        let mut state = ParseState::new(";", false);

        assert_eq!(state.feed("CREATE TABLE t ("), LineKind::Continuation);
        assert_eq!(state.feed(""), LineKind::Blank);
        assert_eq!(state.feed("  x INT"), LineKind::Continuation);
        assert_eq!(state.feed(");"), LineKind::StatementEnd);
        assert_eq!(state.command(), "CREATE TABLE t (\n  x INT\n)\n");

        state.clear();
        assert!(!state.has_pending_command());
    }

    #[test]
    fn test_text_after_last_delimiter_is_dropped() {
        let mut state = ParseState::new(";", false);

        assert_eq!(state.feed("SELECT 1; SELECT 2; -- done"), LineKind::StatementEnd);
        assert_eq!(state.command(), "SELECT 1; SELECT 2\n");
    }

    #[test]
    fn test_comment_is_not_buffered() {
        let mut state = ParseState::new(";", false);

        assert_eq!(state.feed("INSERT INTO t"), LineKind::Continuation);
        assert_eq!(state.feed("  -- a comment; with a delimiter"), LineKind::Comment);
        assert_eq!(state.feed("VALUES (1);"), LineKind::StatementEnd);
        assert_eq!(state.command(), "INSERT INTO t\nVALUES (1)\n");
    }

    #[test]
    fn test_directive_changes_delimiter_for_later_lines() {
        let mut state = ParseState::new(";", false);

        assert_eq!(state.feed("-- @DELIMITER $$"), LineKind::Comment);
        assert_eq!(state.delimiter(), "$$");
        assert_eq!(state.feed("BEGIN x := 1;"), LineKind::Continuation);
        assert_eq!(state.feed("END$$"), LineKind::StatementEnd);
        assert_eq!(state.command(), "BEGIN x := 1;\nEND\n");
    }

    #[test]
    fn test_full_line_delimiter() {
        let mut state = ParseState::new("GO", true);

        assert_eq!(state.feed("SELECT 'GO' AS word"), LineKind::Continuation);
        assert_eq!(state.feed("  GO  "), LineKind::StatementEnd);
        assert_eq!(state.command(), "SELECT 'GO' AS word\n  \n");
    }

    #[test]
    fn test_pending_command() {
        let mut state = ParseState::new(";", false);
        state.feed("SELECT 1");
        assert!(state.has_pending_command());
    }
}
