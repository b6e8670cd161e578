//! Source buffers and locations.
//!
//! A [`CodeFile`] pairs a path with the source text read from it. Every
//! [`Location`] produced by the pipeline points into exactly one code file,
//! so tokens and diagnostics can recover their lexeme and line context
//! without copying the source around.

use std::fmt;
use std::rc::Rc;

/// An immutable pairing of a path string and a source string.
///
/// If the code came from a file, `path` should be the path it was read from.
/// REPL submissions use a synthetic path such as `"<repl>"`.
#[derive(Debug)]
pub struct CodeFile {
    pub path: String,
    pub src: String,
}

impl CodeFile {
    pub fn new(src: impl Into<String>, path: impl Into<String>) -> Rc<CodeFile> {
        Rc::new(CodeFile {
            path: path.into(),
            src: src.into(),
        })
    }
}

/// A span of text within a code file.
///
/// Stores the byte start, byte length, and line number. The column is not
/// stored; [`Location::path_line_col`] computes it by scanning back to the
/// preceding newline.
#[derive(Debug, Clone)]
pub struct Location {
    pub file: Rc<CodeFile>,
    pub start: usize,
    pub length: usize,
    pub line: usize,
}

impl Location {
    pub fn new(file: Rc<CodeFile>, start: usize, length: usize, line: usize) -> Self {
        Location {
            file,
            start,
            length,
            line,
        }
    }

    /// The text this location spans.
    pub fn slice(&self) -> &str {
        &self.file.src[self.start..self.start + self.length]
    }

    /// Converts the location to `(file path, line number, column number)`.
    ///
    /// Both line and column are 1-based.
    pub fn path_line_col(&self) -> (&str, usize, usize) {
        let line_start = self.file.src[..self.start]
            .rfind('\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        (&self.file.path, self.line, self.start - line_start + 1)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (path, line, col) = self.path_line_col();
        write!(f, "{}:{}:{}", path, line, col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_slices_source() {
        let file = CodeFile::new("let x = 1", "test.nico");
        let loc = Location::new(file, 4, 1, 1);
        assert_eq!(loc.slice(), "x");
    }

    #[test]
    fn column_is_one_based_on_first_line() {
        let file = CodeFile::new("3 /(1-1)", "script.nico");
        let loc = Location::new(file, 2, 1, 1);
        let (path, line, col) = loc.path_line_col();
        assert_eq!(path, "script.nico");
        assert_eq!(line, 1);
        assert_eq!(col, 3);
    }

    #[test]
    fn column_resets_after_newline() {
        let file = CodeFile::new("let a = 1\nlet b = 2", "t.nico");
        // `b` is at byte 14, the fifth column of line 2.
        let loc = Location::new(file, 14, 1, 2);
        let (_, line, col) = loc.path_line_col();
        assert_eq!(line, 2);
        assert_eq!(col, 5);
    }

    #[test]
    fn display_formats_path_line_col() {
        let file = CodeFile::new("pass", "a.nico");
        let loc = Location::new(file, 0, 4, 1);
        assert_eq!(loc.to_string(), "a.nico:1:1");
    }
}
