//! services/proctor/src/adapters/results.rs
//!
//! An in-memory results store. Submissions live as long as the process.

use async_trait::async_trait;
use exam_access_core::domain::SubmissionResult;
use exam_access_core::ports::{PortResult, ResultsStore};
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct InMemoryResultsStore {
    submissions: RwLock<Vec<SubmissionResult>>,
}

impl InMemoryResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.submissions.read().await.len()
    }
}

#[async_trait]
impl ResultsStore for InMemoryResultsStore {
    /// Saving the same session twice keeps the first result.
    async fn save_submission(&self, result: SubmissionResult) -> PortResult<()> {
        let mut submissions = self.submissions.write().await;
        if submissions.iter().any(|s| s.session_id == result.session_id) {
            warn!(
                "Submission for session {} already stored; ignoring duplicate",
                result.session_id
            );
            return Ok(());
        }
        info!(
            "Stored submission of {} for exam {} ({})",
            result.student_ref,
            result.exam_ref,
            result.reason.as_str()
        );
        submissions.push(result);
        Ok(())
    }

    async fn submissions_for_exam(&self, exam_ref: &str) -> PortResult<Vec<SubmissionResult>> {
        Ok(self
            .submissions
            .read()
            .await
            .iter()
            .filter(|s| s.exam_ref == exam_ref)
            .cloned()
            .collect())
    }
}
