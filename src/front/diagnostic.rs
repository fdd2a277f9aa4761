//! Diagnostics reported by the binder.
//!
//! Codes follow rustc numbering so the messages read familiar:
//!
//! | Code | Severity | Raised for |
//! |------|----------|------------|
//! | E0425 | error | value name not in scope |
//! | E0412 | error | type name not in scope |
//! | E0599 | error | no method / associated item / variant |
//! | E0609 | error | no field |
//! | E0560 | error | unknown field in a struct literal |
//! | E0070 | error | assignment to a non-place |
//! | E0067 | error | compound assignment to a non-place |
//! | E0046 | error | trait impl missing required items |
//! | E0428 | error | name defined twice in a module |
//! | E0124 | error | field declared twice |
//! | E0201 | error | duplicate item in the impls of a type |
//! | unused_variables | warning | local never read |

use std::fmt;

use proc_macro2::Span;

/// 1-based line, 0-based column, as reported by `proc-macro2` span locations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Location { line, column }
    }

    pub fn of(span: Span) -> Self {
        let start = span.start();
        Location::new(start.line, start.column)
    }

    pub fn end_of(span: Span) -> Self {
        let end = span.end();
        Location::new(end.line, end.column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column + 1)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Code {
    UnresolvedName,
    UnresolvedType,
    NoMember,
    NoField,
    UnknownLiteralField,
    InvalidAssign,
    InvalidCompoundAssign,
    MissingTraitItems,
    DuplicateItem,
    DuplicateField,
    DuplicateImplItem,
    UnusedVariable,
}

impl Code {
    pub fn as_str(self) -> &'static str {
        match self {
            Code::UnresolvedName => "E0425",
            Code::UnresolvedType => "E0412",
            Code::NoMember => "E0599",
            Code::NoField => "E0609",
            Code::UnknownLiteralField => "E0560",
            Code::InvalidAssign => "E0070",
            Code::InvalidCompoundAssign => "E0067",
            Code::MissingTraitItems => "E0046",
            Code::DuplicateItem => "E0428",
            Code::DuplicateField => "E0124",
            Code::DuplicateImplItem => "E0201",
            Code::UnusedVariable => "unused_variables",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            Code::UnusedVariable => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// Errors a feature reduction is expected to leave behind; the broken-statement
    /// remover consumes exactly these.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Code::UnresolvedName
                | Code::NoMember
                | Code::NoField
                | Code::InvalidAssign
                | Code::InvalidCompoundAssign
        )
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Diagnostic {
    pub code: Code,
    pub severity: Severity,
    pub location: Location,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: Code, location: Location, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            severity: code.severity(),
            location,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// The line of `text` the diagnostic points at.
    pub fn source_line<'t>(&self, text: &'t str) -> Option<&'t str> {
        text.lines().nth(self.location.line.checked_sub(1)?)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{level}[{}] at {}: {}", self.code, self.location, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_codes() {
        let transient: Vec<&str> = [
            Code::UnresolvedName,
            Code::UnresolvedType,
            Code::NoMember,
            Code::NoField,
            Code::UnknownLiteralField,
            Code::InvalidAssign,
            Code::InvalidCompoundAssign,
            Code::MissingTraitItems,
        ]
        .into_iter()
        .filter(|code| code.is_transient())
        .map(Code::as_str)
        .collect();
        assert_eq!(transient, ["E0425", "E0599", "E0609", "E0070", "E0067"]);
    }

    #[test]
    fn test_display_and_source_line() {
        let diag = Diagnostic::new(Code::NoField, Location::new(2, 4), "no field `rank`");
        assert_eq!(diag.to_string(), "error[E0609] at 2:5: no field `rank`");
        assert_eq!(diag.source_line("fn a() {\n    x.rank\n}"), Some("    x.rank"));
        assert!(Diagnostic::new(Code::UnusedVariable, Location::default(), "x").source_line("").is_none());
    }
}
