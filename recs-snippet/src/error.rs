//! Compile-time and runtime errors for snippets

use crate::ast::{Program, Span};
use recs_core::KeySpecError;
use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;

/// Lexing or parsing failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct SyntaxError {
    /// 1-based line
    pub line: usize,
    /// 1-based column
    pub column: usize,
    /// What went wrong
    pub message: String,
}

impl SyntaxError {
    /// Create a syntax error at `span`
    pub fn new(span: Span, message: impl Into<String>) -> Self {
        Self {
            line: span.line,
            column: span.column,
            message: message.into(),
        }
    }
}

/// Class of a runtime fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Unknown name
    NameError,
    /// Operation applied to a value of the wrong type
    TypeError,
    /// Missing mapping key
    KeyError,
    /// Sequence index out of range
    IndexError,
    /// Right type, bad value
    ValueError,
    /// Division or modulo by zero
    ZeroDivisionError,
    /// Integer overflow or non-finite float result
    OverflowError,
    /// Unknown attribute or method
    AttributeError,
}

impl FaultKind {
    /// Name shown in diagnostics
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultKind::NameError => "NameError",
            FaultKind::TypeError => "TypeError",
            FaultKind::KeyError => "KeyError",
            FaultKind::IndexError => "IndexError",
            FaultKind::ValueError => "ValueError",
            FaultKind::ZeroDivisionError => "ZeroDivisionError",
            FaultKind::OverflowError => "OverflowError",
            FaultKind::AttributeError => "AttributeError",
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snippet raised while running against one record
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct Fault {
    /// Fault class
    pub kind: FaultKind,
    /// Human-readable message
    pub message: String,
    // Enclosing statements, innermost first.
    frames: SmallVec<[Span; 4]>,
}

impl Fault {
    /// Create a fault
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            frames: SmallVec::new(),
        }
    }

    pub(crate) fn name_error(name: &str) -> Self {
        Self::new(FaultKind::NameError, format!("name '{name}' is not defined"))
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::TypeError, message)
    }

    pub(crate) fn key_error(key: impl fmt::Display) -> Self {
        Self::new(FaultKind::KeyError, format!("'{key}'"))
    }

    pub(crate) fn index_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::IndexError, message)
    }

    pub(crate) fn value_error(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ValueError, message)
    }

    pub(crate) fn zero_division(message: impl Into<String>) -> Self {
        Self::new(FaultKind::ZeroDivisionError, message)
    }

    pub(crate) fn overflow(message: impl Into<String>) -> Self {
        Self::new(FaultKind::OverflowError, message)
    }

    pub(crate) fn no_attribute(type_name: &str, name: &str) -> Self {
        Self::new(
            FaultKind::AttributeError,
            format!("'{type_name}' object has no attribute '{name}'"),
        )
    }

    pub(crate) fn push_frame(&mut self, span: Span) {
        self.frames.push(span);
    }

    /// Positions of the enclosing statements, outermost first
    pub fn frames(&self) -> impl Iterator<Item = Span> + '_ {
        self.frames.iter().rev().copied()
    }

    /// Render a traceback: one line per enclosing statement, then the fault.
    pub fn render(&self, program: &Program) -> String {
        let mut out = String::new();
        for span in self.frames() {
            out.push_str(&format!(
                "  {span}: {}\n",
                program.line_text(span.line).trim()
            ));
        }
        out.push_str(&self.to_string());
        out
    }
}

impl From<KeySpecError> for Fault {
    fn from(err: KeySpecError) -> Self {
        let kind = match &err {
            KeySpecError::NoSuchKey { .. } => FaultKind::KeyError,
            KeySpecError::IndexOutOfRange { .. } => FaultKind::IndexError,
            KeySpecError::ScalarTraversal { .. } => FaultKind::TypeError,
            KeySpecError::NotAnIndex { .. } | KeySpecError::EmptyPath => FaultKind::ValueError,
        };
        Self::new(kind, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn syntax_error_names_position() {
        let err = SyntaxError::new(Span::new(2, 7), "unexpected ')'");
        assert_eq!(err.to_string(), "line 2, column 7: unexpected ')'");
    }

    #[test]
    fn traceback_lists_outermost_statement_first() {
        let program = Program::new(Vec::new(), "for x in r.items {\n    r.total += x\n}");
        let mut fault = Fault::type_error("unsupported operand type(s) for +: 'int' and 'string'");
        fault.push_frame(Span::new(2, 5));
        fault.push_frame(Span::new(1, 1));

        assert_eq!(
            fault.render(&program),
            "  line 1, column 1: for x in r.items {\n  line 2, column 5: r.total += x\nTypeError: unsupported operand type(s) for +: 'int' and 'string'"
        );
    }

    #[test]
    fn keyspec_errors_map_to_fault_kinds() {
        let fault = Fault::from(KeySpecError::NotAnIndex {
            segment: "bad".to_string(),
        });
        assert_eq!(fault.kind, FaultKind::ValueError);
        assert!(fault.message.contains("did you forget to prefix with a '#'?"));
    }
}
