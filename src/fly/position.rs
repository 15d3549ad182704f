//! Source positions attached to AST nodes and diagnostics.

use std::fmt;
use std::sync::Arc;

/// A `file:line:column` location in Fly source text.
///
/// Lines and columns are 1-based. The file name is shared between all
/// positions produced from one source so cloning stays cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    /// Name of the originating file.
    pub file: Arc<str>,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column number, counted in characters.
    pub column: usize,
}

impl Position {
    /// Creates a position in the given file.
    #[must_use]
    pub fn new(file: impl Into<Arc<str>>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// Position of the first character of a file.
    #[must_use]
    pub fn start_of(file: impl Into<Arc<str>>) -> Self {
        Self::new(file, 1, 1)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::start_of("<input>")
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}
