use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::location::Loc;

/// Result type alias for operations that can fail with a compiler error.
pub type SpyResult<T> = Result<T, SpyError>;

/// The error taxonomy.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and
/// `Into<&'static str>` implementations; the string representation matches
/// the variant name exactly (e.g. `TypeError` -> "TypeError").
///
/// *Static* errors are those detected while evaluating blue code or while
/// redshifting; under lazy error mode they can be downgraded to residual
/// `raise` statements. All the other kinds abort redshift unconditionally.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
pub enum ErrorKind {
    /// Base class: matches any error in catch checks.
    Exception,
    /// Grouping for the static errors below.
    StaticError,

    // --- static errors ---
    TypeError,
    ScopeError,
    NameError,
    ParseError,
    ImportError,

    // --- runtime errors ---
    ValueError,
    IndexError,
    ZeroDivisionError,
    PanicError,
    AssertionError,
    KeyError,

    /// Functionality explicitly marked not-implemented.
    #[strum(serialize = "WIP")]
    Wip,
}

impl ErrorKind {
    /// Whether this kind can be downgraded to a residual raise under lazy
    /// error mode.
    pub fn is_static(self) -> bool {
        matches!(
            self,
            Self::StaticError
                | Self::TypeError
                | Self::ScopeError
                | Self::NameError
                | Self::ParseError
                | Self::ImportError
        )
    }

    /// Checks whether this kind would be caught by a handler for
    /// `handler_kind`. `Exception` catches everything; `StaticError`
    /// catches every static kind.
    pub fn matches(self, handler_kind: Self) -> bool {
        if self == handler_kind {
            return true;
        }
        match handler_kind {
            Self::Exception => true,
            Self::StaticError => self.is_static(),
            _ => false,
        }
    }
}

/// Severity of a single error annotation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
pub enum Level {
    Error,
    Note,
    Panic,
}

/// One underlined range in the rendered error report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub level: Level,
    pub message: String,
    pub loc: Loc,
}

/// The error envelope carried by every failure in the core.
///
/// A primary message plus zero or more location annotations. The core never
/// prints; rendering is done by [`crate::errfmt`] on behalf of the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpyError {
    pub kind: ErrorKind,
    pub message: String,
    pub annotations: Vec<Annotation>,
}

impl SpyError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            annotations: Vec::new(),
        }
    }

    /// Builds an error with a single primary annotation.
    pub fn simple(
        kind: ErrorKind,
        message: impl Into<String>,
        annotation: impl Into<String>,
        loc: Loc,
    ) -> Self {
        let mut err = Self::new(kind, message);
        err.add(Level::Error, annotation, loc);
        err
    }

    pub fn wip(message: impl Into<String>, loc: Loc) -> Self {
        Self::simple(ErrorKind::Wip, message, "not implemented yet", loc)
    }

    pub fn add(&mut self, level: Level, message: impl Into<String>, loc: Loc) {
        self.annotations.push(Annotation {
            level,
            message: message.into(),
            loc,
        });
    }

    /// Chainable variant of [`SpyError::add`].
    pub fn with(mut self, level: Level, message: impl Into<String>, loc: Loc) -> Self {
        self.add(level, message, loc);
        self
    }

    /// Attaches a fallback primary annotation if none is present yet.
    ///
    /// Statement/expression dispatch uses this so that an error raised deep
    /// inside the evaluator still points at some source range.
    pub fn add_location_maybe(&mut self, loc: Loc) {
        if self.annotations.is_empty() {
            self.add(Level::Error, "", loc);
        }
    }

    pub fn matches(&self, kind: ErrorKind) -> bool {
        self.kind.matches(kind)
    }
}

impl std::fmt::Display for SpyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for SpyError {}
