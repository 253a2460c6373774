//! services/proctor/src/adapters/question_bank.rs
//!
//! A question bank adapter serving exams loaded from fixtures.

use async_trait::async_trait;
use exam_access_core::domain::ExamSnapshot;
use exam_access_core::ports::{PortError, PortResult, QuestionBankService};
use std::collections::HashMap;

/// Implements the `QuestionBankService` port. Every call hands out a fresh copy,
/// so sessions never share question state.
#[derive(Debug, Clone, Default)]
pub struct FixtureQuestionBank {
    exams: HashMap<String, ExamSnapshot>,
}

impl FixtureQuestionBank {
    pub fn new(exams: impl IntoIterator<Item = ExamSnapshot>) -> Self {
        Self {
            exams: exams
                .into_iter()
                .map(|exam| (exam.exam_ref.clone(), exam))
                .collect(),
        }
    }
}

#[async_trait]
impl QuestionBankService for FixtureQuestionBank {
    async fn exam_snapshot(&self, exam_ref: &str) -> PortResult<ExamSnapshot> {
        self.exams
            .get(exam_ref)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("exam '{}'", exam_ref)))
    }
}
