//! crates/exam_access_core/src/session.rs
//!
//! One student's attempt at an exam and the controller that drives it.
//!
//! ```text
//! NotStarted --start--> InProgress --request_submit--> Submitting --confirm_submit--> Submitted
//!                           ^                              |
//!                           +--------cancel_submit---------+
//!             InProgress / Submitting --countdown reaches 0--> Submitted (time expired)
//! ```
//!
//! The countdown keeps running while a submission waits for confirmation.
//! Whichever of confirmation and countdown exhaustion reaches `Submitted`
//! first wins; the other becomes a silent no-op.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::clock::{Scheduler, TimerControl, TimerId};
use crate::domain::{
    AnswerValue, ExamSnapshot, QuestionId, QuestionKind, QuestionSnapshot, SessionId,
    SessionState, SubmissionReason, SubmissionResult,
};
use crate::error::{AccessError, AccessResult};
use crate::events::ExamEvent;
use crate::ports::EventSink;
use crate::projector::{project, SessionProjection};

/// The countdown ticks once per second.
pub const COUNTDOWN_PERIOD: Duration = Duration::from_secs(1);

//=========================================================================================
// ExamSession (pure state)
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExamSession {
    pub session_id: SessionId,
    pub student_ref: String,
    pub exam_ref: String,
    pub title: String,
    /// Questions frozen at start; later edits to the exam do not reach the session.
    pub questions: Vec<QuestionSnapshot>,
    pub state: SessionState,
    pub current_index: usize,
    pub answers: BTreeMap<QuestionId, AnswerValue>,
    pub flags: BTreeSet<QuestionId>,
    pub duration_seconds: u32,
    pub remaining_seconds: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    /// Built once when the session enters `Submitted`.
    pub submission: Option<SubmissionResult>,
    pub halted: bool,
}

enum Tick {
    Running,
    Expired(SubmissionResult),
    Stopped,
}

impl ExamSession {
    pub fn new(session_id: SessionId, student_ref: impl Into<String>) -> Self {
        Self {
            session_id,
            student_ref: student_ref.into(),
            exam_ref: String::new(),
            title: String::new(),
            questions: Vec::new(),
            state: SessionState::NotStarted,
            current_index: 0,
            answers: BTreeMap::new(),
            flags: BTreeSet::new(),
            duration_seconds: 0,
            remaining_seconds: 0,
            started_at: None,
            submitted_at: None,
            submission: None,
            halted: false,
        }
    }

    pub fn question_ids(&self) -> Vec<QuestionId> {
        self.questions.iter().map(|q| q.id.clone()).collect()
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    fn ensure_not_halted(&self) -> AccessResult<()> {
        if self.halted {
            Err(AccessError::Halted(self.session_id))
        } else {
            Ok(())
        }
    }

    fn ensure_in_progress(&self, operation: &'static str) -> AccessResult<()> {
        self.ensure_not_halted()?;
        if self.state == SessionState::InProgress {
            Ok(())
        } else {
            Err(AccessError::InvalidState {
                operation,
                state: self.state.as_str(),
            })
        }
    }

    fn question(&self, question_id: &str) -> AccessResult<&QuestionSnapshot> {
        self.questions
            .iter()
            .find(|q| q.id == question_id)
            .ok_or_else(|| AccessError::InvalidQuestion(question_id.to_string()))
    }

    fn begin(
        &mut self,
        snapshot: ExamSnapshot,
        duration_seconds: u32,
        now: DateTime<Utc>,
    ) -> AccessResult<()> {
        self.ensure_not_halted()?;
        if self.state != SessionState::NotStarted {
            return Err(AccessError::AlreadyStarted);
        }
        if snapshot.questions.is_empty() {
            return Err(AccessError::InvalidRequest(format!(
                "exam '{}' has no questions",
                snapshot.exam_ref
            )));
        }
        if duration_seconds == 0 {
            return Err(AccessError::InvalidRequest(
                "exam duration must be greater than zero".to_string(),
            ));
        }

        self.exam_ref = snapshot.exam_ref;
        self.title = snapshot.title;
        self.questions = snapshot.questions;
        self.current_index = 0;
        self.duration_seconds = duration_seconds;
        self.remaining_seconds = duration_seconds;
        self.started_at = Some(now);
        self.state = SessionState::InProgress;
        Ok(())
    }

    fn record_answer(&mut self, question_id: &str, value: AnswerValue) -> AccessResult<()> {
        self.ensure_in_progress("answer")?;
        let value = normalize_answer(self.question(question_id)?, value)?;
        if value.is_blank() {
            self.answers.remove(question_id);
        } else {
            self.answers.insert(question_id.to_string(), value);
        }
        Ok(())
    }

    fn clear_answer(&mut self, question_id: &str) -> AccessResult<()> {
        self.ensure_in_progress("clear an answer")?;
        self.question(question_id)?;
        self.answers.remove(question_id);
        Ok(())
    }

    fn toggle_flag(&mut self, question_id: &str) -> AccessResult<bool> {
        self.ensure_in_progress("flag a question")?;
        self.question(question_id)?;
        if self.flags.remove(question_id) {
            Ok(false)
        } else {
            self.flags.insert(question_id.to_string());
            Ok(true)
        }
    }

    /// Out-of-range targets are rejected, never clamped.
    fn go_to(&mut self, index: i64) -> AccessResult<usize> {
        self.ensure_in_progress("navigate")?;
        let len = self.questions.len();
        match usize::try_from(index) {
            Ok(target) if target < len => {
                self.current_index = target;
                Ok(target)
            }
            _ => Err(AccessError::OutOfRange { index, len }),
        }
    }

    fn step(&mut self, delta: i64) -> AccessResult<usize> {
        let current = i64::try_from(self.current_index).unwrap_or(i64::MAX);
        self.go_to(current.saturating_add(delta))
    }

    fn tick(&mut self, now: DateTime<Utc>) -> Tick {
        if self.halted
            || !matches!(
                self.state,
                SessionState::InProgress | SessionState::Submitting
            )
        {
            return Tick::Stopped;
        }

        // Catch up with the wall clock when ticks arrive late; never count up.
        let elapsed = self
            .started_at
            .map(|started| (now - started).num_seconds().max(0))
            .unwrap_or(0);
        let by_clock = self
            .duration_seconds
            .saturating_sub(u32::try_from(elapsed).unwrap_or(u32::MAX));
        self.remaining_seconds = self.remaining_seconds.saturating_sub(1).min(by_clock);

        if self.remaining_seconds == 0 {
            Tick::Expired(self.seal(now, SubmissionReason::TimeExpired))
        } else {
            Tick::Running
        }
    }

    fn seal(&mut self, now: DateTime<Utc>, reason: SubmissionReason) -> SubmissionResult {
        self.state = SessionState::Submitted;
        self.submitted_at = Some(now);
        let result = SubmissionResult {
            session_id: self.session_id,
            exam_ref: self.exam_ref.clone(),
            student_ref: self.student_ref.clone(),
            answers: self.answers.clone(),
            flags: self.flags.clone(),
            started_at: self.started_at.unwrap_or(now),
            submitted_at: now,
            reason,
        };
        self.submission = Some(result.clone());
        result
    }
}

/// Checks an answer against the question kind. Choice answers are stored as option sets.
fn normalize_answer(question: &QuestionSnapshot, value: AnswerValue) -> AccessResult<AnswerValue> {
    match (&question.kind, value) {
        (QuestionKind::FreeText, AnswerValue::Text(text)) => Ok(AnswerValue::Text(text)),
        (QuestionKind::FreeText, AnswerValue::Options(_)) => Err(AccessError::InvalidRequest(
            format!("question {} expects a text answer", question.id),
        )),
        (
            QuestionKind::SingleChoice { options } | QuestionKind::MultipleChoice { options },
            value,
        ) => {
            let selected: BTreeSet<String> = match value {
                AnswerValue::Options(selected) => selected,
                AnswerValue::Text(text) if text.trim().is_empty() => BTreeSet::new(),
                AnswerValue::Text(text) => BTreeSet::from([text.trim().to_string()]),
            };
            if let Some(unknown) = selected.iter().find(|choice| !options.contains(*choice)) {
                return Err(AccessError::InvalidRequest(format!(
                    "'{}' is not an option of question {}",
                    unknown, question.id
                )));
            }
            if matches!(question.kind, QuestionKind::SingleChoice { .. }) && selected.len() > 1 {
                return Err(AccessError::InvalidRequest(format!(
                    "question {} accepts a single option",
                    question.id
                )));
            }
            Ok(AnswerValue::Options(selected))
        }
    }
}

//=========================================================================================
// ExamSessionController
//=========================================================================================

/// Owns one session and its countdown timer.
///
/// Whoever owns the controller must call [`ExamSessionController::abandon`] (or
/// drop it) when the student leaves, so no stale countdown outlives it.
pub struct ExamSessionController {
    session: Arc<Mutex<ExamSession>>,
    scheduler: Arc<dyn Scheduler>,
    events: Arc<dyn EventSink>,
    countdown: Mutex<Option<TimerId>>,
}

impl ExamSessionController {
    pub fn new(
        student_ref: impl Into<String>,
        scheduler: Arc<dyn Scheduler>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            session: Arc::new(Mutex::new(ExamSession::new(Uuid::new_v4(), student_ref))),
            scheduler,
            events,
            countdown: Mutex::new(None),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session.lock().session_id
    }

    /// Starts the attempt on a frozen snapshot and arms the countdown.
    pub fn start(&self, snapshot: ExamSnapshot, duration_seconds: u32) -> AccessResult<()> {
        let now = self.scheduler.now();
        let started = {
            let mut session = self.session.lock();
            session.begin(snapshot, duration_seconds, now)?;
            ExamEvent::SessionStarted {
                session_id: session.session_id,
                exam_ref: session.exam_ref.clone(),
                student_ref: session.student_ref.clone(),
                started_at: now,
                remaining_seconds: session.remaining_seconds,
            }
        };

        self.arm_countdown();
        info!(
            "Exam session {} started ({}s)",
            self.session_id(),
            duration_seconds
        );
        self.events.publish(started);
        Ok(())
    }

    fn arm_countdown(&self) {
        let session = Arc::clone(&self.session);
        let events = Arc::clone(&self.events);
        let timer = self.scheduler.schedule_repeating(
            COUNTDOWN_PERIOD,
            Box::new(move |now| {
                let outcome = session.lock().tick(now);
                match outcome {
                    Tick::Running => TimerControl::Continue,
                    Tick::Expired(result) => {
                        info!(
                            "Time expired for exam session {}; submitted automatically",
                            result.session_id
                        );
                        events.publish(ExamEvent::SessionSubmitted(result));
                        TimerControl::Stop
                    }
                    Tick::Stopped => TimerControl::Stop,
                }
            }),
        );
        let previous = self.countdown.lock().replace(timer);
        if let Some(previous) = previous {
            self.scheduler.cancel(previous);
        }
    }

    fn cancel_countdown(&self) {
        let timer = self.countdown.lock().take();
        if let Some(timer) = timer {
            self.scheduler.cancel(timer);
        }
    }

    pub fn answer(&self, question_id: &str, value: AnswerValue) -> AccessResult<()> {
        self.session.lock().record_answer(question_id, value)
    }

    pub fn clear_answer(&self, question_id: &str) -> AccessResult<()> {
        self.session.lock().clear_answer(question_id)
    }

    /// Flips the review flag of a question and returns the new flag state.
    pub fn toggle_flag(&self, question_id: &str) -> AccessResult<bool> {
        self.session.lock().toggle_flag(question_id)
    }

    pub fn go_to(&self, index: usize) -> AccessResult<usize> {
        let index = i64::try_from(index).unwrap_or(i64::MAX);
        self.session.lock().go_to(index)
    }

    pub fn next(&self) -> AccessResult<usize> {
        self.session.lock().step(1)
    }

    pub fn previous(&self) -> AccessResult<usize> {
        self.session.lock().step(-1)
    }

    /// Moves to `Submitting`, pending the caller's confirmation.
    ///
    /// Already submitting or submitted sessions are left alone.
    pub fn request_submit(&self) -> AccessResult<SessionState> {
        let mut session = self.session.lock();
        session.ensure_not_halted()?;
        match session.state {
            SessionState::InProgress => {
                session.state = SessionState::Submitting;
                debug!("Exam session {} awaiting submit confirmation", session.session_id);
                Ok(SessionState::Submitting)
            }
            SessionState::Submitting | SessionState::Submitted => Ok(session.state),
            SessionState::NotStarted => Err(AccessError::InvalidState {
                operation: "request submission",
                state: session.state.as_str(),
            }),
        }
    }

    /// Confirms a pending submission.
    ///
    /// If the countdown already submitted the session, the cached result is
    /// returned and nothing changes.
    pub fn confirm_submit(&self) -> AccessResult<SubmissionResult> {
        let now = self.scheduler.now();
        let result = {
            let mut session = self.session.lock();
            session.ensure_not_halted()?;
            if let Some(result) = &session.submission {
                debug!(
                    "Exam session {} already submitted; confirmation ignored",
                    session.session_id
                );
                return Ok(result.clone());
            }
            if session.state != SessionState::Submitting {
                return Err(AccessError::InvalidState {
                    operation: "confirm submission",
                    state: session.state.as_str(),
                });
            }
            session.seal(now, SubmissionReason::Manual)
        };

        self.cancel_countdown();
        info!("Exam session {} submitted", result.session_id);
        self.events.publish(ExamEvent::SessionSubmitted(result.clone()));
        Ok(result)
    }

    /// Returns to `InProgress` with answers, flags and position intact.
    pub fn cancel_submit(&self) -> AccessResult<SessionState> {
        let mut session = self.session.lock();
        session.ensure_not_halted()?;
        match session.state {
            SessionState::Submitting => {
                session.state = SessionState::InProgress;
                Ok(SessionState::InProgress)
            }
            SessionState::Submitted => Ok(SessionState::Submitted),
            state => Err(AccessError::InvalidState {
                operation: "cancel submission",
                state: state.as_str(),
            }),
        }
    }

    /// Returns the frozen submission result.
    ///
    /// Calling this on a session that never reached `Submitted` breaks the
    /// controller's contract: the session is halted (countdown cancelled, every
    /// further operation fails with `Halted`) and `Halted` is returned.
    pub fn finalize(&self) -> AccessResult<SubmissionResult> {
        let session_id = {
            let mut session = self.session.lock();
            if let Some(result) = &session.submission {
                return Ok(result.clone());
            }
            session.halted = true;
            session.session_id
        };

        error!(
            "finalize requested for exam session {} before submission; halting the session",
            session_id
        );
        self.cancel_countdown();
        Err(AccessError::Halted(session_id))
    }

    /// Stops the countdown of a session the student walked away from.
    pub fn abandon(&self) {
        let timer = self.countdown.lock().take();
        if let Some(timer) = timer {
            self.scheduler.cancel(timer);
            info!("Exam session {} abandoned; countdown cancelled", self.session_id());
        }
    }

    pub fn state(&self) -> SessionState {
        self.session.lock().state
    }

    pub fn remaining_seconds(&self) -> u32 {
        self.session.lock().remaining_seconds
    }

    pub fn snapshot(&self) -> ExamSession {
        self.session.lock().clone()
    }

    pub fn projection(&self) -> SessionProjection {
        project(&self.session.lock())
    }
}

impl Drop for ExamSessionController {
    fn drop(&mut self) {
        self.cancel_countdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::events::RecordingSink;

    fn sample_exam() -> ExamSnapshot {
        ExamSnapshot {
            exam_ref: "exam-1".to_string(),
            title: "Fractions".to_string(),
            duration_seconds: 600,
            questions: vec![
                QuestionSnapshot {
                    id: "q1".to_string(),
                    prompt: "Explain a half.".to_string(),
                    kind: QuestionKind::FreeText,
                },
                QuestionSnapshot {
                    id: "q2".to_string(),
                    prompt: "1/2 + 1/4?".to_string(),
                    kind: QuestionKind::SingleChoice {
                        options: vec!["A".into(), "B".into(), "C".into()],
                    },
                },
                QuestionSnapshot {
                    id: "q3".to_string(),
                    prompt: "Which equal 1/2?".to_string(),
                    kind: QuestionKind::MultipleChoice {
                        options: vec!["2/4".into(), "3/6".into(), "2/3".into()],
                    },
                },
            ],
        }
    }

    fn controller() -> (Arc<ManualClock>, Arc<RecordingSink>, ExamSessionController) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sink = Arc::new(RecordingSink::new());
        let controller = ExamSessionController::new("student-1", clock.clone(), sink.clone());
        (clock, sink, controller)
    }

    #[test]
    fn start_initialises_the_attempt() {
        let (clock, sink, controller) = controller();

        controller.start(sample_exam(), 60).unwrap();

        let session = controller.snapshot();
        assert_eq!(session.state, SessionState::InProgress);
        assert_eq!(session.current_index, 0);
        assert_eq!(session.remaining_seconds, 60);
        assert_eq!(session.started_at, Some(clock.now()));
        assert_eq!(session.question_ids(), vec!["q1", "q2", "q3"]);
        assert_eq!(clock.pending_timers(), 1);
        assert!(matches!(sink.events()[0], ExamEvent::SessionStarted { .. }));
        assert_eq!(
            controller.start(sample_exam(), 60),
            Err(AccessError::AlreadyStarted)
        );
    }

    #[test]
    fn start_rejects_empty_exams_and_zero_duration() {
        let (_, _, controller) = controller();
        let mut empty = sample_exam();
        empty.questions.clear();

        assert!(matches!(
            controller.start(empty, 60),
            Err(AccessError::InvalidRequest(_))
        ));
        assert!(matches!(
            controller.start(sample_exam(), 0),
            Err(AccessError::InvalidRequest(_))
        ));
        assert_eq!(controller.state(), SessionState::NotStarted);
    }

    #[test]
    fn operations_require_an_exam_in_progress() {
        let (_, _, controller) = controller();

        assert_eq!(
            controller.answer("q1", AnswerValue::text("x")),
            Err(AccessError::InvalidState {
                operation: "answer",
                state: "not_started"
            })
        );
        assert!(matches!(
            controller.toggle_flag("q1"),
            Err(AccessError::InvalidState { .. })
        ));
        assert!(matches!(controller.go_to(0), Err(AccessError::InvalidState { .. })));
        assert!(matches!(
            controller.request_submit(),
            Err(AccessError::InvalidState { .. })
        ));
    }

    #[test]
    fn last_answer_wins() {
        let (_, _, controller) = controller();
        controller.start(sample_exam(), 60).unwrap();

        controller.answer("q1", AnswerValue::text("A")).unwrap();
        controller.answer("q1", AnswerValue::text("B")).unwrap();

        let session = controller.snapshot();
        assert_eq!(session.answers.get("q1"), Some(&AnswerValue::text("B")));
        assert_eq!(controller.projection().answered_count, 1);
    }

    #[test]
    fn answers_must_fit_the_question() {
        let (_, _, controller) = controller();
        controller.start(sample_exam(), 60).unwrap();

        assert_eq!(
            controller.answer("q9", AnswerValue::text("A")),
            Err(AccessError::InvalidQuestion("q9".to_string()))
        );
        assert!(matches!(
            controller.answer("q1", AnswerValue::options(["A"])),
            Err(AccessError::InvalidRequest(_))
        ));
        assert!(matches!(
            controller.answer("q2", AnswerValue::text("D")),
            Err(AccessError::InvalidRequest(_))
        ));
        assert!(matches!(
            controller.answer("q2", AnswerValue::options(["A", "B"])),
            Err(AccessError::InvalidRequest(_))
        ));

        controller.answer("q2", AnswerValue::text("B")).unwrap();
        controller
            .answer("q3", AnswerValue::options(["2/4", "3/6"]))
            .unwrap();

        let session = controller.snapshot();
        assert_eq!(session.answers.get("q2"), Some(&AnswerValue::options(["B"])));
        assert_eq!(
            session.answers.get("q3"),
            Some(&AnswerValue::options(["2/4", "3/6"]))
        );
    }

    #[test]
    fn blank_answers_clear_the_entry() {
        let (_, _, controller) = controller();
        controller.start(sample_exam(), 60).unwrap();

        controller.answer("q1", AnswerValue::text("draft")).unwrap();
        controller.answer("q1", AnswerValue::text("  ")).unwrap();
        controller.answer("q3", AnswerValue::options(["2/4"])).unwrap();
        controller.clear_answer("q3").unwrap();

        assert!(controller.snapshot().answers.is_empty());
    }

    #[test]
    fn flags_are_independent_of_answers() {
        let (_, _, controller) = controller();
        controller.start(sample_exam(), 60).unwrap();

        assert!(controller.toggle_flag("q2").unwrap());
        controller.answer("q2", AnswerValue::text("A")).unwrap();
        assert!(!controller.toggle_flag("q2").unwrap());
        assert!(controller.toggle_flag("q3").unwrap());

        let session = controller.snapshot();
        assert_eq!(session.flags, BTreeSet::from(["q3".to_string()]));
        assert_eq!(session.answered_count(), 1);
    }

    #[test]
    fn navigation_rejects_out_of_range_targets() {
        let (_, _, controller) = controller();
        controller.start(sample_exam(), 60).unwrap();

        assert_eq!(controller.go_to(2), Ok(2));
        assert_eq!(
            controller.go_to(3),
            Err(AccessError::OutOfRange { index: 3, len: 3 })
        );
        assert_eq!(
            controller.next(),
            Err(AccessError::OutOfRange { index: 3, len: 3 })
        );
        assert_eq!(controller.previous(), Ok(1));
        assert_eq!(controller.previous(), Ok(0));
        assert_eq!(
            controller.previous(),
            Err(AccessError::OutOfRange { index: -1, len: 3 })
        );
        assert_eq!(controller.snapshot().current_index, 0);
    }

    #[test]
    fn countdown_exhaustion_submits_automatically() {
        let (clock, sink, controller) = controller();
        controller.start(sample_exam(), 5).unwrap();
        controller.answer("q1", AnswerValue::text("half")).unwrap();

        let mut last = controller.remaining_seconds();
        for _ in 0..4 {
            clock.advance_secs(1);
            let now = controller.remaining_seconds();
            assert!(now < last);
            last = now;
            assert_eq!(controller.state(), SessionState::InProgress);
        }
        clock.advance_secs(1);

        let session = controller.snapshot();
        assert_eq!(session.state, SessionState::Submitted);
        assert_eq!(session.remaining_seconds, 0);
        let started = session.started_at.unwrap();
        let submitted = session.submitted_at.unwrap();
        assert_eq!((submitted - started).num_seconds(), 5);

        let submissions = sink.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].reason, SubmissionReason::TimeExpired);
        assert_eq!(clock.pending_timers(), 0);
        assert!(matches!(
            controller.answer("q1", AnswerValue::text("late")),
            Err(AccessError::InvalidState { .. })
        ));
    }

    #[test]
    fn manual_submission_stops_the_countdown() {
        let (clock, sink, controller) = controller();
        controller.start(sample_exam(), 30).unwrap();
        clock.advance_secs(10);

        assert_eq!(controller.request_submit(), Ok(SessionState::Submitting));
        let result = controller.confirm_submit().unwrap();

        assert_eq!(result.reason, SubmissionReason::Manual);
        assert_eq!(controller.state(), SessionState::Submitted);
        assert_eq!(controller.remaining_seconds(), 20);
        assert_eq!(clock.pending_timers(), 0);
        clock.advance_secs(60);
        assert_eq!(sink.submissions(), vec![result]);
    }

    #[test]
    fn cancelling_a_submission_keeps_everything() {
        let (clock, _, controller) = controller();
        controller.start(sample_exam(), 30).unwrap();
        controller.answer("q1", AnswerValue::text("kept")).unwrap();
        controller.toggle_flag("q3").unwrap();
        controller.go_to(1).unwrap();

        controller.request_submit().unwrap();
        assert!(matches!(
            controller.answer("q1", AnswerValue::text("blocked")),
            Err(AccessError::InvalidState { .. })
        ));
        clock.advance_secs(3);
        assert_eq!(controller.cancel_submit(), Ok(SessionState::InProgress));

        let session = controller.snapshot();
        assert_eq!(session.answers.get("q1"), Some(&AnswerValue::text("kept")));
        assert!(session.flags.contains("q3"));
        assert_eq!(session.current_index, 1);
        // The countdown kept running while the confirmation was pending.
        assert_eq!(session.remaining_seconds, 27);
    }

    #[test]
    fn countdown_beating_confirmation_is_not_an_error() {
        let (clock, sink, controller) = controller();
        controller.start(sample_exam(), 3).unwrap();
        clock.advance_secs(1);

        controller.request_submit().unwrap();
        clock.advance_secs(2);

        assert_eq!(controller.state(), SessionState::Submitted);
        let expired = controller.finalize().unwrap();
        assert_eq!(expired.reason, SubmissionReason::TimeExpired);
        assert_eq!(controller.confirm_submit(), Ok(expired.clone()));
        assert_eq!(controller.cancel_submit(), Ok(SessionState::Submitted));
        assert_eq!(controller.request_submit(), Ok(SessionState::Submitted));
        assert_eq!(sink.submissions().len(), 1);
    }

    #[test]
    fn finalize_returns_the_same_result_every_time() {
        let (_, _, controller) = controller();
        controller.start(sample_exam(), 30).unwrap();
        controller.answer("q1", AnswerValue::text("x")).unwrap();
        controller.request_submit().unwrap();
        controller.confirm_submit().unwrap();

        let first = controller.finalize().unwrap();
        let second = controller.finalize().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.answers.len(), 1);
    }

    #[test]
    fn finalize_before_submission_halts_the_session() {
        let (clock, sink, controller) = controller();
        controller.start(sample_exam(), 30).unwrap();
        let session_id = controller.session_id();

        assert_eq!(controller.finalize(), Err(AccessError::Halted(session_id)));
        assert_eq!(clock.pending_timers(), 0);
        assert_eq!(
            controller.answer("q1", AnswerValue::text("x")),
            Err(AccessError::Halted(session_id))
        );
        assert_eq!(controller.request_submit(), Err(AccessError::Halted(session_id)));
        clock.advance_secs(60);
        assert!(sink.submissions().is_empty());
    }

    #[test]
    fn abandoning_or_dropping_cancels_the_countdown() {
        let (clock, sink, controller) = controller();
        controller.start(sample_exam(), 5).unwrap();
        controller.abandon();
        clock.advance_secs(10);
        assert_eq!(clock.pending_timers(), 0);
        assert!(sink.submissions().is_empty());

        let other = ExamSessionController::new("student-2", clock.clone(), sink.clone());
        other.start(sample_exam(), 5).unwrap();
        assert_eq!(clock.pending_timers(), 1);
        drop(other);
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn late_ticks_catch_up_with_the_clock() {
        let mut session = ExamSession::new(Uuid::new_v4(), "student-1");
        let start = Utc::now();
        session.begin(sample_exam(), 10, start).unwrap();

        assert!(matches!(
            session.tick(start + chrono::Duration::seconds(4)),
            Tick::Running
        ));
        assert_eq!(session.remaining_seconds, 6);
        assert!(matches!(
            session.tick(start + chrono::Duration::seconds(12)),
            Tick::Expired(_)
        ));
        assert_eq!(session.remaining_seconds, 0);
        assert!(matches!(session.tick(start), Tick::Stopped));
    }
}
