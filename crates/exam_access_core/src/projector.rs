//! crates/exam_access_core/src/projector.rs
//!
//! Read-only views of a session for the exam-taking screen.

use crate::domain::{QuestionId, SessionId, SessionState, SubmissionReason};
use crate::session::ExamSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionStatus {
    pub index: usize,
    pub question_id: QuestionId,
    pub answered: bool,
    pub flagged: bool,
    pub current: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionProjection {
    pub session_id: SessionId,
    pub state: SessionState,
    pub remaining_seconds: u32,
    pub current_index: usize,
    pub answered_count: usize,
    pub flagged_count: usize,
    pub total_questions: usize,
    pub questions: Vec<QuestionStatus>,
    pub submission_reason: Option<SubmissionReason>,
}

impl SessionProjection {
    /// Share of questions answered, from 0.0 to 1.0.
    pub fn progress(&self) -> f64 {
        if self.total_questions == 0 {
            0.0
        } else {
            self.answered_count as f64 / self.total_questions as f64
        }
    }

    /// Remaining time as `MM:SS` (minutes keep growing past 59).
    pub fn remaining_label(&self) -> String {
        format!(
            "{:02}:{:02}",
            self.remaining_seconds / 60,
            self.remaining_seconds % 60
        )
    }

    pub fn unanswered(&self) -> impl Iterator<Item = &QuestionStatus> {
        self.questions.iter().filter(|q| !q.answered)
    }
}

pub fn project(session: &ExamSession) -> SessionProjection {
    let questions: Vec<QuestionStatus> = session
        .questions
        .iter()
        .enumerate()
        .map(|(index, question)| QuestionStatus {
            index,
            question_id: question.id.clone(),
            answered: session.answers.contains_key(&question.id),
            flagged: session.flags.contains(&question.id),
            current: index == session.current_index,
        })
        .collect();

    SessionProjection {
        session_id: session.session_id,
        state: session.state,
        remaining_seconds: session.remaining_seconds,
        current_index: session.current_index,
        answered_count: questions.iter().filter(|q| q.answered).count(),
        flagged_count: questions.iter().filter(|q| q.flagged).count(),
        total_questions: questions.len(),
        questions,
        submission_reason: session.submission.as_ref().map(|result| result.reason),
    }
}
