//! Identifier error model.

use thiserror::Error;

pub type IdResult<T> = Result<T, IdError>;

/// Failure to interpret text as one of the relaybus identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid identifier: {0}")]
    Invalid(String),

    #[error("identifier must not be empty")]
    Empty,
}

impl IdError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}
