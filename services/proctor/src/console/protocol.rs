//! services/proctor/src/console/protocol.rs
//!
//! Defines the line-delimited JSON protocol between a console operator (teacher
//! or student) and the proctor. Each line on stdin is one `ClientMessage`; each
//! line on stdout is one `ServerMessage`.

use chrono::{DateTime, Utc};
use exam_access_core::domain::{
    AccessToken, AnswerValue, QuestionKind, QuestionSnapshot, SubmissionResult,
    SupersededValue, TokenId,
};
use exam_access_core::projector::{QuestionStatus, SessionProjection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

//=========================================================================================
// Messages Sent FROM the Console TO the Proctor
//=========================================================================================

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identifies the person at the console. A second login replaces the first.
    Login { actor_id: String },
    Logout,

    // --- Teacher commands ---
    IssueToken {
        exam_ref: String,
        #[serde(default)]
        class_ref: Option<String>,
        #[serde(default)]
        subject_ref: Option<String>,
        /// Rotate with the configured default interval.
        #[serde(default)]
        rotate: bool,
        /// Rotate with this interval; implies `rotate`.
        #[serde(default)]
        rotation_seconds: Option<u32>,
        /// Countdown for attempts admitted by this code, instead of the exam's own.
        #[serde(default)]
        duration_seconds: Option<u32>,
    },
    RotateToken { token_id: TokenId },
    DeactivateToken { token_id: TokenId },
    ReactivateToken {
        token_id: TokenId,
        /// Resume scheduled rotation as well.
        #[serde(default)]
        rearm: bool,
    },
    ListTokens { exam_ref: String },
    TokenHistory { token_id: TokenId },
    ListResults { exam_ref: String },

    // --- Student commands ---
    EnterExam { code: String },
    Answer { question_id: String, value: AnswerDto },
    ClearAnswer { question_id: String },
    ToggleFlag { question_id: String },
    GoTo { index: usize },
    Next,
    Previous,
    RequestSubmit,
    ConfirmSubmit,
    CancelSubmit,
    Status,
    LeaveExam,
}

//=========================================================================================
// Messages Sent FROM the Proctor TO the Console
//=========================================================================================

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    LoggedIn {
        actor_id: String,
        display_name: String,
        role: &'static str,
    },
    LoggedOut,
    TokenIssued { token: TokenDto },
    /// Sent for scheduled and manual rotations alike.
    CodeRotated { token: TokenDto },
    TokenDeactivated { token_id: TokenId },
    TokenReactivated { token: TokenDto, rearmed: bool },
    Tokens { exam_ref: String, tokens: Vec<TokenDto> },
    /// Codes a token has shown and replaced, oldest first.
    TokenHistory {
        token_id: TokenId,
        history: Vec<SupersededDto>,
    },
    /// The presented code did not open an exam. `reason` is one of
    /// `expired`, `wrong_code` and `deactivated`.
    EntryRejected {
        reason: &'static str,
        message: &'static str,
    },
    ExamStarted {
        session_id: Uuid,
        exam_ref: String,
        title: String,
        questions: Vec<QuestionDto>,
        progress: ProgressDto,
    },
    Progress { progress: ProgressDto },
    SubmitPending {
        unanswered: Vec<String>,
        remaining_seconds: u32,
    },
    SubmitCancelled { progress: ProgressDto },
    ExamSubmitted {
        result: SubmissionDto,
        message: String,
    },
    ExamLeft { session_id: Uuid, state: &'static str },
    Results {
        exam_ref: String,
        submissions: Vec<SubmissionDto>,
    },
    Error { code: &'static str, message: String },
}

//=========================================================================================
// Data Transfer Objects
//=========================================================================================

/// An answer on the wire: a string for free text, an array for selected options.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum AnswerDto {
    Text(String),
    Options(Vec<String>),
}

impl From<AnswerDto> for AnswerValue {
    fn from(dto: AnswerDto) -> Self {
        match dto {
            AnswerDto::Text(text) => AnswerValue::Text(text),
            AnswerDto::Options(options) => AnswerValue::options(options),
        }
    }
}

impl From<&AnswerValue> for AnswerDto {
    fn from(value: &AnswerValue) -> Self {
        match value {
            AnswerValue::Text(text) => AnswerDto::Text(text.clone()),
            AnswerValue::Options(options) => AnswerDto::Options(options.iter().cloned().collect()),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct TokenDto {
    pub id: TokenId,
    pub exam_ref: String,
    pub class_ref: Option<String>,
    pub subject_ref: Option<String>,
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub rotation_seconds: Option<u32>,
    pub active: bool,
    pub rotations: u32,
    pub duration_seconds: Option<u32>,
}

impl From<&AccessToken> for TokenDto {
    fn from(token: &AccessToken) -> Self {
        Self {
            id: token.id,
            exam_ref: token.exam_ref.clone(),
            class_ref: token.class_ref.clone(),
            subject_ref: token.subject_ref.clone(),
            value: token.value.clone(),
            issued_at: token.issued_at,
            expires_at: token.expires_at,
            rotation_seconds: token
                .rotation
                .filter(|policy| policy.enabled)
                .map(|policy| policy.interval_seconds),
            active: token.active,
            rotations: token.rotations,
            duration_seconds: token.duration_seconds,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SupersededDto {
    pub value: String,
    pub valid_from: DateTime<Utc>,
    pub superseded_at: DateTime<Utc>,
}

impl From<&SupersededValue> for SupersededDto {
    fn from(entry: &SupersededValue) -> Self {
        Self {
            value: entry.value.clone(),
            valid_from: entry.valid_from,
            superseded_at: entry.superseded_at,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct QuestionDto {
    pub id: String,
    pub prompt: String,
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl From<&QuestionSnapshot> for QuestionDto {
    fn from(question: &QuestionSnapshot) -> Self {
        let (kind, options) = match &question.kind {
            QuestionKind::FreeText => ("free_text", Vec::new()),
            QuestionKind::SingleChoice { options } => ("single_choice", options.clone()),
            QuestionKind::MultipleChoice { options } => ("multiple_choice", options.clone()),
        };
        Self {
            id: question.id.clone(),
            prompt: question.prompt.clone(),
            kind,
            options,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct QuestionStatusDto {
    pub index: usize,
    pub question_id: String,
    pub answered: bool,
    pub flagged: bool,
    pub current: bool,
}

impl From<&QuestionStatus> for QuestionStatusDto {
    fn from(status: &QuestionStatus) -> Self {
        Self {
            index: status.index,
            question_id: status.question_id.clone(),
            answered: status.answered,
            flagged: status.flagged,
            current: status.current,
        }
    }
}

/// What the exam-taking screen renders after every student action.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ProgressDto {
    pub session_id: Uuid,
    pub state: &'static str,
    pub remaining_seconds: u32,
    pub remaining_label: String,
    pub current_index: usize,
    pub answered_count: usize,
    pub flagged_count: usize,
    pub total_questions: usize,
    pub questions: Vec<QuestionStatusDto>,
}

impl From<&SessionProjection> for ProgressDto {
    fn from(view: &SessionProjection) -> Self {
        Self {
            session_id: view.session_id,
            state: view.state.as_str(),
            remaining_seconds: view.remaining_seconds,
            remaining_label: view.remaining_label(),
            current_index: view.current_index,
            answered_count: view.answered_count,
            flagged_count: view.flagged_count,
            total_questions: view.total_questions,
            questions: view.questions.iter().map(QuestionStatusDto::from).collect(),
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SubmissionDto {
    pub session_id: Uuid,
    pub exam_ref: String,
    pub student_ref: String,
    pub answers: BTreeMap<String, AnswerDto>,
    pub flags: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    /// `submitted` or `time_expired`.
    pub reason: &'static str,
}

impl From<&SubmissionResult> for SubmissionDto {
    fn from(result: &SubmissionResult) -> Self {
        Self {
            session_id: result.session_id,
            exam_ref: result.exam_ref.clone(),
            student_ref: result.student_ref.clone(),
            answers: result
                .answers
                .iter()
                .map(|(id, value)| (id.clone(), AnswerDto::from(value)))
                .collect(),
            flags: result.flags.iter().cloned().collect(),
            started_at: result.started_at,
            submitted_at: result.submitted_at,
            reason: result.reason.as_str(),
        }
    }
}
