//! services/proctor/src/error.rs
//!
//! Defines the primary error type for the proctor service.

use crate::config::ConfigError;
use exam_access_core::{AccessError, PortError};

/// The primary error type for the `proctor` service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A token or session operation was refused by the core.
    #[error("{0}")]
    Access(#[from] AccessError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// The actor's role or class does not allow the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Log in first")]
    NotLoggedIn,

    #[error("No exam is open on this console")]
    NoExam,

    /// Represents a standard Input/Output error (e.g., reading fixtures or stdin).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed fixtures or console lines.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Fixture data that parses but does not make sense.
    #[error("Invalid fixture: {0}")]
    Fixture(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// Stable machine-readable name for console error messages.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Config(_) => "config",
            ServiceError::Access(e) => match e {
                AccessError::InvalidRequest(_) => "invalid_request",
                AccessError::NotFound(_) => "not_found",
                AccessError::NotActive => "deactivated",
                AccessError::ValueMismatch => "wrong_code",
                AccessError::Expired => "expired",
                AccessError::InvalidState { .. } => "invalid_state",
                AccessError::AlreadyStarted => "already_started",
                AccessError::OutOfRange { .. } => "out_of_range",
                AccessError::InvalidQuestion(_) => "invalid_question",
                AccessError::CodeExhausted(_) => "code_exhausted",
                AccessError::Halted(_) => "halted",
            },
            ServiceError::Port(PortError::NotFound(_)) => "not_found",
            ServiceError::Port(PortError::Unauthorized) => "unauthorized",
            ServiceError::Port(PortError::Unexpected(_)) => "unavailable",
            ServiceError::Forbidden(_) => "forbidden",
            ServiceError::NotLoggedIn => "not_logged_in",
            ServiceError::NoExam => "no_exam",
            ServiceError::Io(_) => "io",
            ServiceError::Json(_) => "malformed",
            ServiceError::Fixture(_) => "fixture",
            ServiceError::Internal(_) => "internal",
        }
    }
}
