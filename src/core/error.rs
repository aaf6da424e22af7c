use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use crate::core::diagnostic::Diagnostic;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    Grammar,
    NameNotAllowed,
    IllegalCombine,
    Unsupported,
    Evaluation,
    CacheMismatch,
    NotFound,
    Permission,
    Io,
}

impl ErrorKind {
    /// Kinds raised by the parser or validator; these always carry a `Diagnostic`.
    pub fn is_diagnostic(self) -> bool {
        matches!(
            self,
            ErrorKind::Grammar
                | ErrorKind::NameNotAllowed
                | ErrorKind::IllegalCombine
                | ErrorKind::Unsupported
        )
    }
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    path: Option<PathBuf>,
    diagnostic: Option<Diagnostic>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            path: None,
            diagnostic: None,
            source: None,
        }
    }

    pub fn from_diagnostic(kind: ErrorKind, diagnostic: Diagnostic) -> Self {
        Self::new(kind)
            .with_message(diagnostic.message.clone())
            .with_diagnostic(diagnostic)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn diagnostic(&self) -> Option<&Diagnostic> {
        self.diagnostic.as_ref()
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostic = Some(diagnostic);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(diagnostic) = &self.diagnostic {
            write!(
                f,
                " ({}, line {}, column {})",
                diagnostic.source_name, diagnostic.line, diagnostic.column
            )?;
        }
        if let Some(path) = &self.path {
            write!(f, " (path: {})", path.display())?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn io_error_kind(err: &io::Error) -> ErrorKind {
    match err.kind() {
        io::ErrorKind::NotFound => ErrorKind::NotFound,
        io::ErrorKind::PermissionDenied => ErrorKind::Permission,
        _ => ErrorKind::Io,
    }
}

pub fn io_error(err: io::Error, path: &Path, message: &str) -> Error {
    Error::new(io_error_kind(&err))
        .with_message(message.to_string())
        .with_path(path)
        .with_source(err)
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::Grammar => 3,
        ErrorKind::NameNotAllowed => 4,
        ErrorKind::IllegalCombine => 5,
        ErrorKind::Unsupported => 6,
        ErrorKind::Evaluation => 7,
        ErrorKind::CacheMismatch => 8,
        ErrorKind::NotFound => 9,
        ErrorKind::Permission => 10,
        ErrorKind::Io => 11,
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ErrorKind, io_error, to_exit_code};
    use crate::core::diagnostic::Diagnostic;
    use std::io;
    use std::path::Path;

    #[test]
    fn exit_code_mapping_is_stable() {
        let cases = [
            (ErrorKind::Internal, 1),
            (ErrorKind::Usage, 2),
            (ErrorKind::Grammar, 3),
            (ErrorKind::NameNotAllowed, 4),
            (ErrorKind::IllegalCombine, 5),
            (ErrorKind::Unsupported, 6),
            (ErrorKind::Evaluation, 7),
            (ErrorKind::CacheMismatch, 8),
            (ErrorKind::NotFound, 9),
            (ErrorKind::Permission, 10),
            (ErrorKind::Io, 11),
        ];

        for (kind, code) in cases {
            assert_eq!(to_exit_code(kind), code);
        }
    }

    #[test]
    fn display_includes_diagnostic_position() {
        let diagnostic = Diagnostic {
            message: "invalid syntax".to_string(),
            source_name: "<string>".to_string(),
            line: 1,
            column: 5,
            source_line_text: "foo = 42".to_string(),
        };
        let err = Error::from_diagnostic(ErrorKind::Grammar, diagnostic);
        assert_eq!(
            err.to_string(),
            "Grammar: invalid syntax (<string>, line 1, column 5)"
        );
    }

    #[test]
    fn io_errors_map_to_resource_kinds() {
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        let err = io_error(denied, Path::new("/tmp/x"), "failed to open");
        assert_eq!(err.kind(), ErrorKind::Permission);
        assert_eq!(err.path(), Some(Path::new("/tmp/x")));

        let missing = io::Error::from(io::ErrorKind::NotFound);
        assert_eq!(
            io_error(missing, Path::new("x"), "m").kind(),
            ErrorKind::NotFound
        );
    }
}
