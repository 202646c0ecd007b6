//! # Error Types
//!
//! This module defines all error types for the settings engine.
//!
//! Every error carries a [`FilePos`] so diagnostics can point at the exact
//! place in the source document that caused the failure.
//!
//! ## Error Types
//! - `Syntax` - no grammar alternative matched where one was required
//! - `UnknownSetting` - identifier not in any active symbol table
//! - `TypeMismatch` - value shape does not fit the setting's declared kind
//! - `Validation` - well-typed value rejected by a semantic validator
//! - `DivisionByZero` - zero denominator in a rational literal
//! - `BadLocation` - setting assigned inside a context it is not allowed in
//! - `AppendUnsupported` - `+=` applied to a non-composable kind
//! - `MissingId` / `UnknownId` - structure identity errors
//!
//! A failed assignment is fatal to that assignment only: the previous value
//! of the setting stays in force and parsing resumes at the next item.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Source location of a parsed value or a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FilePos {
    pub file: String,
    pub line: usize,
    pub col: usize,
}

impl FilePos {
    pub fn new(file: &str, line: usize, col: usize) -> Self {
        Self {
            file: file.to_string(),
            line,
            col,
        }
    }
}

impl fmt::Display for FilePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, col {} of `{}'", self.line, self.col, self.file)
    }
}

/// Labels used when formatting diagnostics.
///
/// The wording of the position labels is data, not hard-coded English, so a
/// host application can localize them.
#[derive(Debug, Clone)]
pub struct DiagnosticLabels {
    pub line: String,
    pub col: String,
}

impl Default for DiagnosticLabels {
    fn default() -> Self {
        Self {
            line: "line".to_string(),
            col: "col".to_string(),
        }
    }
}

/// A user-facing diagnostic produced by a failed assignment or parse.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub setting: Option<String>,
    pub pos: FilePos,
}

impl Diagnostic {
    /// Format the diagnostic with the given position labels.
    ///
    /// Convention: ``<message> for setting `<name>' in line N, col M of `<file>'``
    /// with the `line`/`col` labels taken from `labels`.
    pub fn format(&self, labels: &DiagnosticLabels) -> String {
        match &self.setting {
            Some(name) => format!(
                "{} for setting `{}' in {} {}, {} {} of `{}'",
                self.message,
                name,
                labels.line,
                self.pos.line,
                labels.col,
                self.pos.col,
                self.pos.file
            ),
            None => format!(
                "{} in {} {}, {} {} of `{}'",
                self.message,
                labels.line,
                self.pos.line,
                labels.col,
                self.pos.col,
                self.pos.file
            ),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrepError {
    /// No grammar alternative matched where one was required.
    #[error("syntax error at {pos}: {message}")]
    Syntax { pos: FilePos, message: String },

    /// Identifier not present in any active symbol table at this location.
    #[error("unknown setting `{name}' at {pos}")]
    UnknownSetting { name: String, pos: FilePos },

    /// Value shape does not match the setting's declared kind.
    #[error("wrong value type for setting `{name}' at {pos}: expected {expected}")]
    TypeMismatch {
        name: String,
        expected: String,
        pos: FilePos,
    },

    /// Well-typed value rejected by a semantic validator.
    #[error("invalid value for setting `{name}' at {pos}: {message}")]
    Validation {
        name: String,
        message: String,
        pos: FilePos,
    },

    /// Zero denominator in a rational literal.
    #[error("division by zero at {pos}")]
    DivisionByZero { pos: FilePos },

    /// Setting assigned inside a structural context it is not allowed in.
    #[error("cannot set setting `{name}' inside {location} at {pos}")]
    BadLocation {
        name: String,
        location: String,
        pos: FilePos,
    },

    /// `+=` applied to a setting whose kind cannot be composed.
    #[error("cannot append to setting `{name}' at {pos}")]
    AppendUnsupported { name: String, pos: FilePos },

    /// Structure completed without a required id.
    #[error("missing id for {kind} at {pos}")]
    MissingId { kind: String, pos: FilePos },

    /// Lookup of a structure id that was never defined.
    #[error("unknown {kind} id `{id}' at {pos}")]
    UnknownId {
        kind: String,
        id: String,
        pos: FilePos,
    },
}

impl PrepError {
    /// The source position the error points at.
    pub fn pos(&self) -> &FilePos {
        match self {
            PrepError::Syntax { pos, .. }
            | PrepError::UnknownSetting { pos, .. }
            | PrepError::TypeMismatch { pos, .. }
            | PrepError::Validation { pos, .. }
            | PrepError::DivisionByZero { pos }
            | PrepError::BadLocation { pos, .. }
            | PrepError::AppendUnsupported { pos, .. }
            | PrepError::MissingId { pos, .. }
            | PrepError::UnknownId { pos, .. } => pos,
        }
    }

    /// The setting name involved, if the error concerns one.
    pub fn setting(&self) -> Option<&str> {
        match self {
            PrepError::UnknownSetting { name, .. }
            | PrepError::TypeMismatch { name, .. }
            | PrepError::Validation { name, .. }
            | PrepError::BadLocation { name, .. }
            | PrepError::AppendUnsupported { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Convert into a user-facing diagnostic record.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let message = match self {
            PrepError::Syntax { message, .. } => format!("syntax error: {}", message),
            PrepError::UnknownSetting { .. } => "unknown setting".to_string(),
            PrepError::TypeMismatch { expected, .. } => {
                format!("wrong value type, expected {}", expected)
            }
            PrepError::Validation { message, .. } => format!("invalid value: {}", message),
            PrepError::DivisionByZero { .. } => "division by zero".to_string(),
            PrepError::BadLocation { location, .. } => {
                format!("not allowed inside {}", location)
            }
            PrepError::AppendUnsupported { .. } => "append not supported".to_string(),
            PrepError::MissingId { kind, .. } => format!("missing id for {}", kind),
            PrepError::UnknownId { kind, id, .. } => format!("unknown {} id `{}'", kind, id),
        };
        Diagnostic {
            message,
            setting: self.setting().map(|s| s.to_string()),
            pos: self.pos().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_format_with_setting() {
        let err = PrepError::Validation {
            name: "beat".to_string(),
            message: "must be a power of two".to_string(),
            pos: FilePos::new("score.fms", 3, 7),
        };
        let formatted = err.to_diagnostic().format(&DiagnosticLabels::default());
        assert_eq!(
            formatted,
            "invalid value: must be a power of two for setting `beat' in line 3, col 7 of `score.fms'"
        );
    }

    #[test]
    fn test_diagnostic_labels_are_data() {
        let err = PrepError::DivisionByZero {
            pos: FilePos::new("in.fms", 1, 5),
        };
        let labels = DiagnosticLabels {
            line: "Zeile".to_string(),
            col: "Spalte".to_string(),
        };
        let formatted = err.to_diagnostic().format(&labels);
        assert_eq!(
            formatted,
            "division by zero in Zeile 1, Spalte 5 of `in.fms'"
        );
    }

    #[test]
    fn test_error_display() {
        let err = PrepError::UnknownSetting {
            name: "bogus".to_string(),
            pos: FilePos::new("a.fms", 2, 1),
        };
        assert_eq!(
            err.to_string(),
            "unknown setting `bogus' at line 2, col 1 of `a.fms'"
        );
    }
}
