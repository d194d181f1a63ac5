//! Source location tracking
//!
//! Every token carries a [`Position`] so that compile errors can point back at
//! the offending lexeme. Positions are cheap to clone: the file name is shared.

use std::fmt;
use std::sync::Arc;

/// Placeholder file name used when source text does not come from disk
pub const UNKNOWN_FILE: &str = "Unknown";

/// A location in a source file
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    /// File the lexeme was read from
    pub file: Arc<str>,
    /// Line number (0-indexed)
    pub line: u32,
    /// Column number (0-indexed, in characters)
    pub column: u32,
    /// Length of the lexeme in characters
    pub length: usize,
    /// Byte offset of the lexeme start
    pub offset: usize,
}

impl Position {
    pub fn new(file: Arc<str>, line: u32, column: u32, length: usize, offset: usize) -> Self {
        Self {
            file,
            line,
            column,
            length,
            offset,
        }
    }

    /// Same location with a different lexeme length
    pub fn with_length(&self, length: usize) -> Self {
        Self {
            length,
            ..self.clone()
        }
    }

    /// Zero-length position directly after this one
    pub fn after(&self) -> Self {
        Self {
            column: self.column + self.length as u32,
            offset: self.offset + self.length,
            length: 0,
            ..self.clone()
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::new(Arc::from(UNKNOWN_FILE), 0, 0, 0, 0)
    }
}

impl fmt::Display for Position {
    /// Rendered 1-indexed on the line, the way editors report it
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line + 1, self.column)
    }
}
