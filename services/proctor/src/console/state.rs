//! services/proctor/src/console/state.rs
//!
//! Defines the application's shared state and the per-console session state.

use crate::adapters::{FixtureQuestionBank, Fixtures, InMemoryResultsStore, RosterIdentity};
use crate::config::Config;
use crate::console::events::ChannelSink;
use exam_access_core::clock::Scheduler;
use exam_access_core::codegen::RandomCodeGenerator;
use exam_access_core::domain::{Actor, SessionId, SessionState};
use exam_access_core::events::ExamEvent;
use exam_access_core::ports::{IdentityService, QuestionBankService, ResultsStore};
use exam_access_core::registry::TokenRegistry;
use exam_access_core::rotation::TokenRotator;
use exam_access_core::session::ExamSessionController;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

//=========================================================================================
// AppState (Shared Across the Whole Process)
//=========================================================================================

/// The shared application state, created once at startup and passed to the console.
pub struct AppState {
    pub config: Arc<Config>,
    pub scheduler: Arc<dyn Scheduler>,
    pub rotator: Arc<TokenRotator>,
    pub events: Arc<ChannelSink>,
    pub identity: Arc<dyn IdentityService>,
    pub question_bank: Arc<dyn QuestionBankService>,
    pub results: Arc<dyn ResultsStore>,
}

impl AppState {
    /// Wires the core onto the given scheduler. The returned receiver carries every
    /// event the core publishes and must be handed to the console loop.
    pub fn new<S>(
        config: Arc<Config>,
        scheduler: Arc<S>,
        identity: Arc<dyn IdentityService>,
        question_bank: Arc<dyn QuestionBankService>,
        results: Arc<dyn ResultsStore>,
    ) -> (Self, mpsc::UnboundedReceiver<ExamEvent>)
    where
        S: Scheduler + 'static,
    {
        let (sink, events_rx) = ChannelSink::new();
        let events = Arc::new(sink);
        let registry = Arc::new(TokenRegistry::new(
            scheduler.clone(),
            Arc::new(RandomCodeGenerator::new(config.token_code_length)),
            config.token_ttl(),
        ));
        let rotator = Arc::new(TokenRotator::new(
            registry,
            scheduler.clone(),
            events.clone(),
        ));

        let state = Self {
            config,
            scheduler,
            rotator,
            events,
            identity,
            question_bank,
            results,
        };
        (state, events_rx)
    }

    /// Seeds the in-memory adapters from fixture data.
    pub fn from_fixtures<S>(
        config: Arc<Config>,
        scheduler: Arc<S>,
        fixtures: Fixtures,
    ) -> (Self, mpsc::UnboundedReceiver<ExamEvent>)
    where
        S: Scheduler + 'static,
    {
        let identity = Arc::new(RosterIdentity::new(fixtures.actors));
        let question_bank = Arc::new(FixtureQuestionBank::new(fixtures.exams));
        info!("Roster holds {} actors", identity.len());
        Self::new(
            config,
            scheduler,
            identity,
            question_bank,
            Arc::new(InMemoryResultsStore::new()),
        )
    }

    pub fn registry(&self) -> &TokenRegistry {
        self.rotator.registry()
    }

    /// A controller for a new attempt, wired to this process's scheduler and events.
    pub fn new_controller(&self, student_ref: &str) -> ExamSessionController {
        ExamSessionController::new(student_ref, self.scheduler.clone(), self.events.clone())
    }
}

//=========================================================================================
// ConsoleSession (Specific to One Console)
//=========================================================================================

/// A student's current attempt.
pub struct ActiveExam {
    pub controller: ExamSessionController,
}

/// The state for a single console: who is logged in and what they are doing.
#[derive(Default)]
pub struct ConsoleSession {
    pub actor: Option<Actor>,
    pub exam: Option<ActiveExam>,
}

impl ConsoleSession {
    pub fn exam_session_id(&self) -> Option<SessionId> {
        self.exam.as_ref().map(|exam| exam.controller.session_id())
    }

    /// True while an attempt is running or waiting for confirmation.
    pub fn exam_in_progress(&self) -> bool {
        self.exam
            .as_ref()
            .map(|exam| {
                matches!(
                    exam.controller.state(),
                    SessionState::InProgress | SessionState::Submitting
                )
            })
            .unwrap_or(false)
    }

    /// Drops the current attempt, stopping its countdown.
    pub fn leave_exam(&mut self) -> Option<(SessionId, SessionState)> {
        let exam = self.exam.take()?;
        let session_id = exam.controller.session_id();
        let state = exam.controller.state();
        exam.controller.abandon();
        if state != SessionState::Submitted {
            info!(
                "Student left exam session {} while {}",
                session_id, state
            );
        }
        Some((session_id, state))
    }

    /// Clears everything, as on logout or end of input.
    pub fn reset(&mut self) {
        self.leave_exam();
        self.actor = None;
    }
}
