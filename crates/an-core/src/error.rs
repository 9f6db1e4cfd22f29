//! # AppError
//!
//! Centralized error handling for the annotation engine.
//! Every boundary operation reports one of these; the API layer maps them to
//! status codes without ever revealing whether a hidden thread exists.

use thiserror::Error;

/// The primary error type for all an-core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Resource not found (e.g., Thread, Collaborator)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Missing or empty input (url, selector, body)
    #[error("validation error: {0}")]
    Validation(String),

    /// Access-control denial
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// A precondition of the action is unmet. Carries the machine-readable code
    /// the client maps to a message (`must_close`, `thread_closed`).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Infrastructure failure (e.g., DB down)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(what: &str, id: impl ToString) -> Self {
        AppError::NotFound(what.to_string(), id.to_string())
    }

    /// Short code sent to clients in the `error` field.
    pub fn code(&self) -> &str {
        match self {
            AppError::NotFound(..) => "not_found",
            AppError::Validation(_) => "missing",
            AppError::Forbidden(_) => "forbidden",
            AppError::Conflict(code) => code,
            AppError::Internal(_) => "internal",
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(format!("{err:#}"))
    }
}

/// A specialized Result type for annotation logic.
pub type Result<T> = std::result::Result<T, AppError>;

pub const MUST_CLOSE: &str = "must_close";
pub const THREAD_CLOSED: &str = "thread_closed";
