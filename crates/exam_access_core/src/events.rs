//! crates/exam_access_core/src/events.rs
//!
//! Observable events emitted by the rotation driver and the session controller.
//! Callers use them to show new codes to the exam's audience and to hand
//! finished attempts to the results store.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::domain::{AccessToken, SessionId, SubmissionResult, TokenId};
use crate::ports::EventSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExamEvent {
    TokenIssued(AccessToken),
    TokenRotated(AccessToken),
    TokenDeactivated { token_id: TokenId },
    TokenReactivated { token_id: TokenId },
    SessionStarted {
        session_id: SessionId,
        exam_ref: String,
        student_ref: String,
        started_at: DateTime<Utc>,
        remaining_seconds: u32,
    },
    SessionSubmitted(SubmissionResult),
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn publish(&self, _event: ExamEvent) {}
}

/// Keeps every event in memory, in publication order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ExamEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExamEvent> {
        self.events.lock().clone()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<ExamEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn submissions(&self) -> Vec<SubmissionResult> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                ExamEvent::SessionSubmitted(result) => Some(result.clone()),
                _ => None,
            })
            .collect()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, event: ExamEvent) {
        self.events.lock().push(event);
    }
}
