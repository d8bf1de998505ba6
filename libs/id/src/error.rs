//! Error types for ID parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating IDs.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The ID string is empty.
    #[error("ID cannot be empty")]
    Empty,

    /// The ID contains whitespace or a control character.
    #[error("ID contains invalid character {character:?} at position {position}")]
    InvalidCharacter { character: char, position: usize },

    /// A release target key did not have exactly three components.
    #[error("invalid release target key: {message}")]
    InvalidKey { message: String },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
