//! Domain error types
//!
//! Validation failures and invalid state transitions raised by domain types.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Local file cannot be uploaded (missing, not a file, empty, too large)
    #[error("Invalid file {path}: {reason}")]
    InvalidFile {
        /// Path as given by the caller
        path: String,
        /// Why the file was rejected
        reason: String,
    },

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Part number outside `1..=part_count`
    #[error("Part {part} out of range (plan has {count} parts)")]
    PartOutOfRange {
        /// Requested 1-based part number
        part: u32,
        /// Number of parts in the plan
        count: u32,
    },
}

impl DomainError {
    /// Shorthand for [`DomainError::InvalidFile`].
    pub fn invalid_file(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidFile {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
