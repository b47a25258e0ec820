//! Structured error types shared by every molkit crate.

use thiserror::Error;

/// Unified error type for all molkit operations.
#[derive(Debug, Error)]
pub enum MolkitError {
    /// I/O error (file not found, permission denied, truncated stream)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error without a more precise location
    #[error("parse error: {0}")]
    Parse(String),

    /// Malformed SMILES, located by character offset
    #[error("SMILES error at offset {offset}: {message}")]
    Smiles { offset: usize, message: String },

    /// Malformed Molfile/SDF text, located by 1-based line number
    #[error("molfile error at line {line}: {message}")]
    Molfile { line: usize, message: String },

    /// An atom, bond, or S-group index that does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation is not defined for the current state of its target
    #[error("precondition violated: {0}")]
    Precondition(String),

    /// Two fingerprints of different sizes were compared
    #[error("fingerprint length mismatch: {left} vs {right} bits")]
    LengthMismatch { left: usize, right: usize },

    /// Invalid input (bad arguments, values the target format cannot encode)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The caller's cancellation token fired
    #[error("operation cancelled")]
    Cancelled,

    /// Catch-all for other errors
    #[error("{0}")]
    Other(String),
}

impl MolkitError {
    /// Build a [`MolkitError::Smiles`] at the given character offset.
    pub fn smiles(offset: usize, message: impl Into<String>) -> Self {
        MolkitError::Smiles { offset, message: message.into() }
    }

    /// Build a [`MolkitError::Molfile`] at the given 1-based line.
    pub fn molfile(line: usize, message: impl Into<String>) -> Self {
        MolkitError::Molfile { line, message: message.into() }
    }
}

/// Convenience alias used throughout molkit.
pub type Result<T> = std::result::Result<T, MolkitError>;
