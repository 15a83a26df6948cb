// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// The possible errors that can arise from reading, editing, or writing a configuration table.
#[derive(Debug)]
pub enum Error {
    Parse(ParseError),
    Validation(ValidationError),
    /// An entry index outside of the table.
    Index { requested: usize, size: usize },
    Io { path: PathBuf, source: io::Error },
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Parse(e) => Some(e),
            Self::Validation(e) => Some(e),
            Self::Index { .. } => None,
            Self::Io { source, .. } => Some(source),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "Parse error: {e}"),
            Self::Validation(e) => write!(f, "Invalid value: {e}"),
            Self::Index { requested, size } => {
                write!(f, "No entry at index {requested} (table has {size} entries)")
            }
            Self::Io { path, source } => write!(f, "IO error on {}: {source}", path.display()),
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<ValidationError> for Error {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

/// A line of a configuration file that could not be understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// 1-based line number in the source text.
    pub line: usize,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, line: usize) -> Self {
        Self { kind, line }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// Wrong number of fields, bad numbers, unbalanced parentheses and the like.
    MalformedLine,
    /// A qualifier that is not recognized or that contradicts another one on the same host.
    UnknownQualifier(String),
    /// The same exported path appears on more than one line.
    DuplicatePath,
}

impl std::error::Error for ParseError {}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ParseErrorKind::MalformedLine => write!(f, "line {}: malformed line", self.line),
            ParseErrorKind::UnknownQualifier(q) => {
                write!(f, "line {}: unknown or conflicting qualifier '{q}'", self.line)
            }
            ParseErrorKind::DuplicatePath => {
                write!(f, "line {}: path is already exported", self.line)
            }
        }
    }
}

/// A field value that was rejected before it reached the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

impl std::error::Error for ValidationError {}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

/// Parse a non-negative integer field, as used for dump frequencies, pass numbers, and the
/// numeric mount parameters.
pub fn parse_count(field: &'static str, value: &str) -> Result<u32, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::new(field, "must not be empty"));
    }
    value
        .parse::<u32>()
        .map_err(|_| ValidationError::new(field, format!("'{value}' is not a non-negative integer")))
}
