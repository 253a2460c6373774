//! crates/exam_access_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the exam-access core.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to stay independent of how identity, question banks and results are provided.

use async_trait::async_trait;

use crate::domain::{Actor, ExamSnapshot, SubmissionResult};
use crate::events::ExamEvent;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the collaborators behind the ports.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Collaborator Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait IdentityService: Send + Sync {
    /// Resolves an actor id to the person and role behind it.
    async fn resolve_actor(&self, actor_id: &str) -> PortResult<Actor>;
}

#[async_trait]
pub trait QuestionBankService: Send + Sync {
    /// Returns the ordered questions of an exam as they are right now.
    async fn exam_snapshot(&self, exam_ref: &str) -> PortResult<ExamSnapshot>;
}

#[async_trait]
pub trait ResultsStore: Send + Sync {
    async fn save_submission(&self, result: SubmissionResult) -> PortResult<()>;

    async fn submissions_for_exam(&self, exam_ref: &str) -> PortResult<Vec<SubmissionResult>>;
}

//=========================================================================================
// In-process Ports
//=========================================================================================

/// Source of fresh exam code values.
pub trait CodeGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Receives domain events. Implementations must not block.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ExamEvent);
}
