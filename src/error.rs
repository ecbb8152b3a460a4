use core::fmt;
use std::sync::Arc;

use thiserror::Error;


/// The broad category of a failure. At the top-level load loop a syntax or
/// eval error skips just the failing form, while a read or EOF error ends the
/// current source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Eval,
    Read,
    Eof,
}

impl ErrorKind {
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Eval => "eval",
            Self::Read => "read",
            Self::Eof => "eof",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Position of a top-level form in its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: Arc<str>,
    pub line: usize,
    pub col: usize,
}

impl Location {
    pub fn new(file: impl Into<Arc<str>>, line: usize, col: usize) -> Self {
        Self { file: file.into(), line, col }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct LootError {
    pub kind: ErrorKind,
    pub message: String,
    pub location: Option<Location>,
}

impl LootError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), location: None }
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Syntax, message)
    }

    pub fn eval(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Eval, message)
    }

    pub fn read(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Read, message)
    }

    pub fn eof(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Eof, message)
    }

    /// Attach a location unless the error already carries a more precise one.
    pub fn at(mut self, location: &Location) -> Self {
        if self.location.is_none() {
            self.location = Some(location.clone());
        }
        self
    }

    /// The one-line diagnostic printed when a handler recovers from this error.
    pub fn diagnostic(&self, progname: &str) -> String {
        match &self.location {
            Some(location) => format!("{}: {}: {} raised at {}", progname, self.kind, self.message, location),
            None => format!("{}: {}: {}", progname, self.kind, self.message),
        }
    }
}

pub type LootResult<T> = Result<T, LootError>;


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_includes_location() {
        let error = LootError::eval("unbound variable f").at(&Location::new("test.scm", 3, 7));
        assert_eq!(error.diagnostic("loot"), "loot: eval: unbound variable f raised at test.scm:3:7");
        assert_eq!(error.to_string(), "eval: unbound variable f");
    }

    #[test]
    fn first_location_wins() {
        let error = LootError::read("unexpected )")
            .at(&Location::new("a.scm", 1, 1))
            .at(&Location::new("b.scm", 9, 9));
        assert_eq!(error.location.map(|l| l.file.to_string()), Some("a.scm".to_owned()));
    }
}
