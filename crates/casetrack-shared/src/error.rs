//! Error taxonomy for casetrack.

use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// One failing field from payload validation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing input. Carries every failing field, not just
    /// the first one.
    #[error("validation failed: {} field(s)", .0.len())]
    Validation(Vec<FieldError>),

    /// A referenced case or event does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The automation gateway rejected or timed out on a forward. Callers
    /// in the intake path log and discard this; it never fails a request.
    #[error("automation gateway error: {0}")]
    Upstream(String),

    /// A store query failed. Fatal for the request that issued it.
    #[error("store error: {0}")]
    Store(String),
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Store(e.to_string())
    }
}

impl Error {
    /// True when the underlying store error is a uniqueness violation,
    /// the backstop for concurrent duplicate creates.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Error::Store(msg) if msg.contains("UNIQUE constraint failed"))
    }
}
