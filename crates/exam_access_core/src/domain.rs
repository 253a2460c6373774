//! crates/exam_access_core/src/domain.rs
//!
//! Defines the pure, core data structures for exam access and exam taking.
//! These structs are independent of any storage or serialization format.

use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use uuid::Uuid;

pub type TokenId = Uuid;
pub type SessionId = Uuid;
pub type QuestionId = String;

//=========================================================================================
// Access Tokens
//=========================================================================================

/// How often a token's code is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub enabled: bool,
    pub interval_seconds: u32,
}

impl RotationPolicy {
    /// A policy that rotates every `interval_seconds`.
    pub fn every(interval_seconds: u32) -> Self {
        Self {
            enabled: true,
            interval_seconds,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::seconds(i64::from(self.interval_seconds))
    }
}

/// What a teacher asks for when issuing an access code.
#[derive(Debug, Clone, Default)]
pub struct IssueRequest {
    pub exam_ref: String,
    pub class_ref: Option<String>,
    pub subject_ref: Option<String>,
    pub rotation: Option<RotationPolicy>,
    /// Countdown for attempts admitted by this code, instead of the exam's own.
    pub duration_seconds: Option<u32>,
}

impl IssueRequest {
    pub fn new(exam_ref: impl Into<String>) -> Self {
        Self {
            exam_ref: exam_ref.into(),
            ..Self::default()
        }
    }

    pub fn for_class(mut self, class_ref: impl Into<String>) -> Self {
        self.class_ref = Some(class_ref.into());
        self
    }

    pub fn for_subject(mut self, subject_ref: impl Into<String>) -> Self {
        self.subject_ref = Some(subject_ref.into());
        self
    }

    pub fn rotating(mut self, policy: RotationPolicy) -> Self {
        self.rotation = Some(policy);
        self
    }

    pub fn timed(mut self, duration_seconds: u32) -> Self {
        self.duration_seconds = Some(duration_seconds);
        self
    }
}

/// A short-lived code gating entry to one exam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub id: TokenId,
    pub exam_ref: String,
    pub class_ref: Option<String>,
    pub subject_ref: Option<String>,
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub rotation: Option<RotationPolicy>,
    pub active: bool,
    /// How many times `value` has been replaced since issuance.
    pub rotations: u32,
    pub duration_seconds: Option<u32>,
}

impl AccessToken {
    /// True when the token carries an enabled rotation policy.
    pub fn rotates(&self) -> bool {
        self.rotation.map(|p| p.enabled).unwrap_or(false)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The countdown for an attempt admitted by this token.
    pub fn attempt_duration(&self, authored_seconds: u32) -> u32 {
        self.duration_seconds.unwrap_or(authored_seconds)
    }
}

/// A code that was once current for a token and has since been replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupersededValue {
    pub value: String,
    pub valid_from: DateTime<Utc>,
    pub superseded_at: DateTime<Utc>,
}

/// Why a presented code was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectReason {
    NotActive,
    ValueMismatch,
    Expired,
}

impl RejectReason {
    /// Stable machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NotActive => "deactivated",
            RejectReason::ValueMismatch => "wrong_code",
            RejectReason::Expired => "expired",
        }
    }

    /// A message a student can act on.
    pub fn message(&self) -> &'static str {
        match self {
            RejectReason::NotActive => {
                "This exam code has been deactivated. Ask your teacher to reopen the exam."
            }
            RejectReason::ValueMismatch => {
                "That exam code is not correct. Check the code currently shown by your teacher."
            }
            RejectReason::Expired => "This exam code has expired. Ask your teacher for a new code.",
        }
    }
}

/// Outcome of checking a presented code against a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected(RejectReason),
}

//=========================================================================================
// Exams and Exam Sessions
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionKind {
    FreeText,
    SingleChoice { options: Vec<String> },
    MultipleChoice { options: Vec<String> },
}

/// One question as it looked when the session started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionSnapshot {
    pub id: QuestionId,
    pub prompt: String,
    pub kind: QuestionKind,
}

/// The fixed question sequence captured at session start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamSnapshot {
    pub exam_ref: String,
    pub title: String,
    /// Default duration authored on the exam.
    pub duration_seconds: u32,
    pub questions: Vec<QuestionSnapshot>,
}

impl ExamSnapshot {
    pub fn question_ids(&self) -> Vec<QuestionId> {
        self.questions.iter().map(|q| q.id.clone()).collect()
    }
}

/// A captured answer: free text or a set of selected options.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum AnswerValue {
    Text(String),
    Options(BTreeSet<String>),
}

impl AnswerValue {
    pub fn text(value: impl Into<String>) -> Self {
        AnswerValue::Text(value.into())
    }

    pub fn options<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AnswerValue::Options(values.into_iter().map(Into::into).collect())
    }

    /// Blank answers count as "unanswered".
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Text(text) => text.trim().is_empty(),
            AnswerValue::Options(selected) => selected.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    NotStarted,
    InProgress,
    Submitting,
    Submitted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::NotStarted => "not_started",
            SessionState::InProgress => "in_progress",
            SessionState::Submitting => "submitting",
            SessionState::Submitted => "submitted",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which path ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionReason {
    /// The student confirmed the submission.
    Manual,
    /// The countdown reached zero.
    TimeExpired,
}

impl SubmissionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionReason::Manual => "submitted",
            SubmissionReason::TimeExpired => "time_expired",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            SubmissionReason::Manual => "Your exam has been submitted.",
            SubmissionReason::TimeExpired => {
                "Time expired. Your answers were submitted automatically."
            }
        }
    }
}

/// The frozen outcome of a session, handed to the results store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    pub session_id: SessionId,
    pub exam_ref: String,
    pub student_ref: String,
    pub answers: BTreeMap<QuestionId, AnswerValue>,
    pub flags: BTreeSet<QuestionId>,
    pub started_at: DateTime<Utc>,
    pub submitted_at: DateTime<Utc>,
    pub reason: SubmissionReason,
}

//=========================================================================================
// Actors
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

/// Represents the person behind a console - resolved by the identity port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub actor_id: String,
    pub display_name: String,
    pub role: Role,
    /// The class a student belongs to. Teachers usually have none.
    pub class_ref: Option<String>,
}
