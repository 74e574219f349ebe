use serde::{Deserialize, Serialize};

/// A location inside the source code.
///
/// Columns are 0-based; `col_end == -1` means "until the end of the line".
/// Every AST node carries one of these, and every error annotation points
/// at one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Loc {
    pub filename: String,
    pub line_start: u32,
    pub line_end: u32,
    pub col_start: i32,
    pub col_end: i32,
}

impl Loc {
    pub fn new(
        filename: impl Into<String>,
        line_start: u32,
        line_end: u32,
        col_start: i32,
        col_end: i32,
    ) -> Self {
        Self {
            filename: filename.into(),
            line_start,
            line_end,
            col_start,
            col_end,
        }
    }

    /// A placeholder location for synthesized nodes and tests.
    pub fn fake() -> Self {
        Self::new("<fake>", 1, 1, 1, 1)
    }

    /// A location spanning a whole source line.
    pub fn whole_line(filename: impl Into<String>, line: u32) -> Self {
        Self::new(filename, line, line, 0, -1)
    }

    /// A new location spanning from `start` to `end`.
    ///
    /// Both must point into the same file.
    pub fn combine(start: &Self, end: &Self) -> Self {
        debug_assert_eq!(start.filename, end.filename);
        Self::new(
            start.filename.clone(),
            start.line_start,
            end.line_end,
            start.col_start,
            end.col_end,
        )
    }

    /// A new location which starts where this one ends.
    ///
    /// Used e.g. to point at the missing `return` at the end of a function.
    pub fn make_end_loc(&self) -> Self {
        Self {
            line_start: self.line_end,
            col_start: self.col_end,
            ..self.clone()
        }
    }

    pub fn with_col_end(&self, col_end: i32) -> Self {
        Self {
            col_end,
            ..self.clone()
        }
    }
}

impl std::fmt::Display for Loc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.filename,
            self.line_start,
            self.col_start + 1
        )
    }
}
