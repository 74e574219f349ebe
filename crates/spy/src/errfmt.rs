//! Renders a [`SpyError`] to text.
//!
//! The core never touches the filesystem: source lines come from a
//! [`SourceProvider`] supplied by the host (the driver keeps the text of
//! every module it parsed). Rendering returns a `String`; writing it
//! anywhere is the caller's business.

use ahash::AHashMap;

use crate::errors::{Annotation, Level, SpyError};
use crate::location::Loc;

/// Source text lookup used by the formatter.
pub trait SourceProvider {
    /// The 1-based `line` of `filename`, without the trailing newline.
    fn line(&self, filename: &str, line: u32) -> Option<String>;
}

/// In-memory [`SourceProvider`] keyed by filename.
#[derive(Debug, Default)]
pub struct SourceMap {
    files: AHashMap<String, Vec<String>>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, filename: impl Into<String>, text: &str) {
        let lines = text.lines().map(str::to_owned).collect();
        self.files.insert(filename.into(), lines);
    }
}

impl SourceProvider for SourceMap {
    fn line(&self, filename: &str, line: u32) -> Option<String> {
        let lines = self.files.get(filename)?;
        lines.get(line.checked_sub(1)? as usize).cloned()
    }
}

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

/// Formats errors into the `kind: message` + underlined-annotations shape.
pub struct ErrorFormatter<'a> {
    src: &'a dyn SourceProvider,
    use_colors: bool,
    out: String,
}

impl<'a> ErrorFormatter<'a> {
    pub fn new(src: &'a dyn SourceProvider, use_colors: bool) -> Self {
        Self {
            src,
            use_colors,
            out: String::new(),
        }
    }

    /// One-shot rendering of a single error.
    pub fn format_error(
        err: &SpyError,
        src: &'a dyn SourceProvider,
        use_colors: bool,
    ) -> String {
        let mut fmt = Self::new(src, use_colors);
        fmt.emit_error(err);
        fmt.build()
    }

    pub fn build(self) -> String {
        self.out
    }

    pub fn emit_error(&mut self, err: &SpyError) {
        let prefix = self.paint(RED, &err.kind.to_string());
        self.out.push_str(&format!("{prefix}: {}\n", err.message));
        for ann in &err.annotations {
            self.emit_annotation(ann);
        }
    }

    pub fn emit_annotation(&mut self, ann: &Annotation) {
        let loc = &ann.loc;
        self.out
            .push_str(&format!("  | {}:{}\n", loc.filename, loc.line_start));
        let srcline = self
            .src
            .line(&loc.filename, loc.line_start)
            .unwrap_or_default();
        let underline = make_underline(&srcline, loc, &ann.message);
        let color = match ann.level {
            Level::Note => GREEN,
            Level::Error | Level::Panic => RED,
        };
        let underline = self.paint(color, &underline);
        self.out.push_str(&format!("  | {srcline}\n"));
        self.out.push_str(&format!("  | {underline}\n\n"));
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_owned()
        }
    }
}

fn make_underline(srcline: &str, loc: &Loc, message: &str) -> String {
    let a = loc.col_start.max(0) as usize;
    let mut b = loc.col_end;
    if b < 0 {
        b += srcline.len() as i32 + 1;
    }
    let n = (b.max(0) as usize).saturating_sub(a);
    let underline = if n <= 2 {
        "^".repeat(n.max(1))
    } else {
        format!("|{}|", "_".repeat(n - 2))
    };
    let mut line = " ".repeat(a);
    line.push_str(&underline);
    if !message.is_empty() {
        line.push(' ');
        line.push_str(message);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn sample_src() -> SourceMap {
        let mut src = SourceMap::new();
        src.insert("x.spy", "def foo() -> i32:\n    return 1 + 'hello'\n");
        src
    }

    #[test]
    fn renders_kind_and_message() {
        let err = SpyError::new(ErrorKind::TypeError, "cannot do `i32` + `str`");
        let text = ErrorFormatter::format_error(&err, &sample_src(), false);
        assert!(text.starts_with("TypeError: cannot do `i32` + `str`"));
    }

    #[test]
    fn underlines_the_range() {
        let err = SpyError::simple(
            ErrorKind::TypeError,
            "mismatched types",
            "this is `str`",
            Loc::new("x.spy", 2, 2, 15, 22),
        );
        let text = ErrorFormatter::format_error(&err, &sample_src(), false);
        assert!(text.contains("return 1 + 'hello'"));
        assert!(text.contains("|_____| this is `str`"));
    }

    #[test]
    fn whole_line_underline() {
        let err = SpyError::simple(
            ErrorKind::NameError,
            "name `y` is not defined",
            "",
            Loc::whole_line("x.spy", 1),
        );
        let text = ErrorFormatter::format_error(&err, &sample_src(), false);
        assert!(text.contains("def foo() -> i32:"));
    }
}
