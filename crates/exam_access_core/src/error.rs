//! crates/exam_access_core/src/error.rs
//!
//! The error type returned by every token and session operation.

use crate::domain::{RejectReason, SessionId};

/// Expected, recoverable failures of the access and session core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Exam code has been deactivated")]
    NotActive,

    #[error("Exam code does not match")]
    ValueMismatch,

    #[error("Exam code has expired")]
    Expired,

    /// The operation is not allowed in the current lifecycle state.
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("Exam session already started")]
    AlreadyStarted,

    #[error("Question index {index} is out of range (exam has {len} questions)")]
    OutOfRange { index: i64, len: usize },

    #[error("Question {0} is not part of this exam")]
    InvalidQuestion(String),

    #[error("Could not generate a fresh exam code after {0} attempts")]
    CodeExhausted(u32),

    /// Raised once `finalize` was requested before submission; the session is unusable after that.
    #[error("Exam session {0} halted: finalize was requested before submission")]
    Halted(SessionId),
}

impl From<RejectReason> for AccessError {
    fn from(reason: RejectReason) -> Self {
        match reason {
            RejectReason::NotActive => AccessError::NotActive,
            RejectReason::ValueMismatch => AccessError::ValueMismatch,
            RejectReason::Expired => AccessError::Expired,
        }
    }
}

impl AccessError {
    /// The entry rejection this error represents, if any.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            AccessError::NotActive => Some(RejectReason::NotActive),
            AccessError::ValueMismatch => Some(RejectReason::ValueMismatch),
            AccessError::Expired => Some(RejectReason::Expired),
            _ => None,
        }
    }
}

/// A convenience type alias for `Result<T, AccessError>`.
pub type AccessResult<T> = Result<T, AccessError>;
