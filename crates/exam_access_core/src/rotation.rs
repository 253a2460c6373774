//! crates/exam_access_core/src/rotation.rs
//!
//! Drives scheduled code rotation for tokens with an enabled rotation policy.
//!
//! Deactivating a token cancels its rotation timer. Reactivating it does not
//! re-arm the timer; an operator who froze a code gets a frozen code back until
//! [`TokenRotator::arm`] is called explicitly.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::clock::{Scheduler, TimerControl, TimerId};
use crate::domain::{AccessToken, IssueRequest, TokenId};
use crate::error::{AccessError, AccessResult};
use crate::events::ExamEvent;
use crate::ports::EventSink;
use crate::registry::TokenRegistry;

pub struct TokenRotator {
    registry: Arc<TokenRegistry>,
    scheduler: Arc<dyn Scheduler>,
    events: Arc<dyn EventSink>,
    timers: Mutex<HashMap<TokenId, TimerId>>,
}

impl TokenRotator {
    pub fn new(
        registry: Arc<TokenRegistry>,
        scheduler: Arc<dyn Scheduler>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            registry,
            scheduler,
            events,
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<TokenRegistry> {
        &self.registry
    }

    /// Issues a token, announces it, and arms rotation when the policy asks for it.
    pub fn issue(&self, request: IssueRequest) -> AccessResult<AccessToken> {
        let token = self.registry.issue(request)?;
        self.events.publish(ExamEvent::TokenIssued(token.clone()));
        if token.rotates() {
            self.arm(token.id)?;
        }
        Ok(token)
    }

    /// Starts (or restarts) the rotation timer of an active, rotating token.
    pub fn arm(&self, token_id: TokenId) -> AccessResult<()> {
        let token = self.registry.get(token_id)?;
        if !token.active {
            return Err(AccessError::InvalidState {
                operation: "arm rotation",
                state: "inactive",
            });
        }
        let Some(policy) = token.rotation.filter(|policy| policy.enabled) else {
            return Err(AccessError::InvalidState {
                operation: "arm rotation",
                state: "without a rotation policy",
            });
        };

        self.disarm(token_id);

        let registry = Arc::clone(&self.registry);
        let events = Arc::clone(&self.events);
        let timer = self.scheduler.schedule_repeating(
            Duration::from_secs(u64::from(policy.interval_seconds)),
            Box::new(move |now| match registry.rotate(token_id, now) {
                Ok(token) => {
                    events.publish(ExamEvent::TokenRotated(token));
                    TimerControl::Continue
                }
                Err(AccessError::NotFound(_)) => {
                    warn!("Token {} vanished; stopping its rotation timer", token_id);
                    TimerControl::Stop
                }
                Err(e) => {
                    // The previous code stays valid until the next tick or its expiry.
                    warn!("Scheduled rotation of token {} skipped: {}", token_id, e);
                    TimerControl::Continue
                }
            }),
        );
        self.timers.lock().insert(token_id, timer);
        info!(
            "Armed rotation for token {} every {}s",
            token_id, policy.interval_seconds
        );
        Ok(())
    }

    /// Cancels the rotation timer of a token, if any. Returns whether one was armed.
    pub fn disarm(&self, token_id: TokenId) -> bool {
        let timer = self.timers.lock().remove(&token_id);
        match timer {
            Some(timer) => {
                self.scheduler.cancel(timer);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, token_id: TokenId) -> bool {
        self.timers.lock().contains_key(&token_id)
    }

    /// Rotates a token right now, outside its schedule.
    pub fn rotate_now(&self, token_id: TokenId) -> AccessResult<AccessToken> {
        let token = self.registry.rotate(token_id, self.scheduler.now())?;
        self.events.publish(ExamEvent::TokenRotated(token.clone()));
        Ok(token)
    }

    pub fn deactivate(&self, token_id: TokenId) -> AccessResult<AccessToken> {
        let token = self.registry.deactivate(token_id)?;
        self.disarm(token_id);
        self.events.publish(ExamEvent::TokenDeactivated { token_id });
        Ok(token)
    }

    /// Reactivates a token without resuming its rotation.
    pub fn reactivate(&self, token_id: TokenId) -> AccessResult<AccessToken> {
        let token = self.registry.reactivate(token_id)?;
        self.events.publish(ExamEvent::TokenReactivated { token_id });
        Ok(token)
    }

    /// Cancels every armed timer.
    pub fn dispose(&self) {
        let timers: Vec<TimerId> = self.timers.lock().drain().map(|(_, timer)| timer).collect();
        for timer in timers {
            self.scheduler.cancel(timer);
        }
    }
}

impl Drop for TokenRotator {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::codegen::RandomCodeGenerator;
    use crate::domain::{Admission, RejectReason, RotationPolicy};
    use crate::events::RecordingSink;
    use chrono::Utc;

    struct Fixture {
        clock: Arc<ManualClock>,
        sink: Arc<RecordingSink>,
        rotator: TokenRotator,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sink = Arc::new(RecordingSink::new());
        let registry = Arc::new(TokenRegistry::new(
            clock.clone(),
            Arc::new(RandomCodeGenerator::default()),
            chrono::Duration::hours(2),
        ));
        let rotator = TokenRotator::new(registry, clock.clone(), sink.clone());
        Fixture {
            clock,
            sink,
            rotator,
        }
    }

    fn rotated_count(sink: &RecordingSink) -> usize {
        sink.events()
            .iter()
            .filter(|event| matches!(event, ExamEvent::TokenRotated(_)))
            .count()
    }

    #[test]
    fn rotation_replaces_the_code_once_per_interval() {
        let f = fixture();
        let token = f
            .rotator
            .issue(IssueRequest::new("exam-1").rotating(RotationPolicy::every(300)))
            .unwrap();
        assert!(f.rotator.is_armed(token.id));

        f.clock.advance_secs(301);

        let current = f.rotator.registry().get(token.id).unwrap();
        assert_eq!(current.rotations, 1);
        assert_ne!(current.value, token.value);
        assert_eq!(
            f.rotator
                .registry()
                .validate(token.id, &token.value, f.clock.now())
                .unwrap(),
            Admission::Rejected(RejectReason::ValueMismatch)
        );
        assert_eq!(rotated_count(&f.sink), 1);
        assert!(matches!(f.sink.events()[0], ExamEvent::TokenIssued(_)));
    }

    #[test]
    fn every_rotation_differs_from_the_previous_code() {
        let f = fixture();
        let token = f
            .rotator
            .issue(IssueRequest::new("exam-1").rotating(RotationPolicy::every(10)))
            .unwrap();

        let mut previous = token.value;
        for _ in 0..20 {
            f.clock.advance_secs(10);
            let current = f.rotator.registry().get(token.id).unwrap().value;
            assert_ne!(current, previous);
            previous = current;
        }
    }

    #[test]
    fn non_rotating_tokens_are_not_armed() {
        let f = fixture();
        let token = f.rotator.issue(IssueRequest::new("exam-1")).unwrap();

        assert!(!f.rotator.is_armed(token.id));
        assert!(matches!(
            f.rotator.arm(token.id),
            Err(AccessError::InvalidState { .. })
        ));
        f.clock.advance_secs(3600);
        assert_eq!(f.rotator.registry().get(token.id).unwrap().value, token.value);
    }

    #[test]
    fn deactivation_cancels_and_reactivation_does_not_resume() {
        let f = fixture();
        let token = f
            .rotator
            .issue(IssueRequest::new("exam-1").rotating(RotationPolicy::every(60)))
            .unwrap();

        f.rotator.deactivate(token.id).unwrap();
        assert!(!f.rotator.is_armed(token.id));
        assert_eq!(f.clock.pending_timers(), 0);

        f.rotator.reactivate(token.id).unwrap();
        f.clock.advance_secs(600);
        assert_eq!(rotated_count(&f.sink), 0);
        assert_eq!(f.rotator.registry().get(token.id).unwrap().value, token.value);

        f.rotator.arm(token.id).unwrap();
        f.clock.advance_secs(60);
        assert_eq!(rotated_count(&f.sink), 1);
    }

    #[test]
    fn failed_scheduled_rotation_is_swallowed() {
        let f = fixture();
        let token = f
            .rotator
            .issue(IssueRequest::new("exam-1").rotating(RotationPolicy::every(60)))
            .unwrap();

        // Deactivate behind the rotator's back: the timer stays armed but rotation fails.
        f.rotator.registry().deactivate(token.id).unwrap();
        f.clock.advance_secs(120);

        assert_eq!(rotated_count(&f.sink), 0);
        assert!(f.rotator.is_armed(token.id));
        assert_eq!(f.clock.pending_timers(), 1);
    }

    #[test]
    fn rotate_now_announces_the_new_code() {
        let f = fixture();
        let token = f.rotator.issue(IssueRequest::new("exam-1")).unwrap();

        let rotated = f.rotator.rotate_now(token.id).unwrap();

        assert_ne!(rotated.value, token.value);
        assert_eq!(
            f.sink.events().last(),
            Some(&ExamEvent::TokenRotated(rotated))
        );
    }

    #[test]
    fn dispose_cancels_all_timers() {
        let f = fixture();
        for exam in ["exam-1", "exam-2"] {
            f.rotator
                .issue(IssueRequest::new(exam).rotating(RotationPolicy::every(30)))
                .unwrap();
        }
        assert_eq!(f.clock.pending_timers(), 2);

        f.rotator.dispose();

        assert_eq!(f.clock.pending_timers(), 0);
    }
}
