//! services/proctor/src/console/events.rs
//!
//! Bridges core events into the console loop.
//!
//! Core callbacks publish synchronously from timer tasks; `ChannelSink` hands
//! each event to an unbounded channel so publishing never blocks. The console
//! loop drains that channel with [`on_event`], which stores finished attempts
//! and tells the person at the console about things they did not ask for
//! (scheduled code rotations, time running out).

use exam_access_core::events::ExamEvent;
use exam_access_core::ports::EventSink;
use exam_access_core::domain::{Role, SubmissionReason};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::console::protocol::{ServerMessage, SubmissionDto, TokenDto};
use crate::console::state::{AppState, ConsoleSession};

pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ExamEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: ExamEvent) {
        if self.tx.send(event).is_err() {
            debug!("Console closed; dropping exam event");
        }
    }
}

/// Handles one core event on behalf of the console and returns what to show, if anything.
pub async fn on_event(
    app: &AppState,
    session: &ConsoleSession,
    event: ExamEvent,
) -> Option<ServerMessage> {
    match event {
        ExamEvent::SessionSubmitted(result) => {
            if let Err(e) = app.results.save_submission(result.clone()).await {
                error!(
                    "Failed to store submission for session {}: {}",
                    result.session_id, e
                );
            }
            // Manual submissions are answered by the confirm command itself.
            let ours = session.exam_session_id() == Some(result.session_id);
            (ours && result.reason == SubmissionReason::TimeExpired).then(|| {
                ServerMessage::ExamSubmitted {
                    message: result.reason.message().to_string(),
                    result: SubmissionDto::from(&result),
                }
            })
        }
        ExamEvent::TokenRotated(token) => {
            let teacher = session
                .actor
                .as_ref()
                .map(|actor| actor.role == Role::Teacher)
                .unwrap_or(false);
            teacher.then(|| ServerMessage::CodeRotated {
                token: TokenDto::from(&token),
            })
        }
        other => {
            debug!("Exam event needs no console output: {:?}", other);
            None
        }
    }
}
