//! services/proctor/src/console/scheduler.rs
//!
//! The production `Scheduler`: every timer is a tokio task driven by
//! `tokio::time::interval_at` and stopped through its own `CancellationToken`.
//!
//! Wall-clock time is derived from a fixed epoch plus tokio's monotonic clock,
//! so paused-time tests see `now()` move exactly as the timers do.

use chrono::{DateTime, Utc};
use exam_access_core::clock::{Clock, Scheduler, TimerControl, TimerId, TimerTask, MIN_TIMER_PERIOD};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
struct MonotonicClock {
    epoch_wall: DateTime<Utc>,
    epoch: Instant,
}

impl MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Instant::now().saturating_duration_since(self.epoch);
        match chrono::Duration::from_std(elapsed) {
            Ok(elapsed) => self.epoch_wall + elapsed,
            Err(_) => Utc::now(),
        }
    }
}

/// Must be used from inside a tokio runtime.
pub struct TokioScheduler {
    clock: MonotonicClock,
    root: CancellationToken,
    timers: Arc<Mutex<HashMap<TimerId, CancellationToken>>>,
    next_id: AtomicU64,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    /// A scheduler whose `now()` reads `epoch_wall` at construction time.
    pub fn starting_at(epoch_wall: DateTime<Utc>) -> Self {
        Self {
            clock: MonotonicClock {
                epoch_wall,
                epoch: Instant::now(),
            },
            root: CancellationToken::new(),
            timers: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn active_timers(&self) -> usize {
        self.timers.lock().len()
    }

    /// Cancels every timer this scheduler has started.
    pub fn shutdown(&self) {
        self.root.cancel();
        self.timers.lock().clear();
    }
}

impl Default for TokioScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.root.cancel();
    }
}

impl Clock for TokioScheduler {
    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_repeating(&self, period: Duration, mut task: TimerTask) -> TimerId {
        let period = period.max(MIN_TIMER_PERIOD);
        let id = TimerId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let token = self.root.child_token();
        self.timers.lock().insert(id, token.clone());

        let timers = Arc::clone(&self.timers);
        let clock = self.clock;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!("Timer {} cancelled", id.get());
                        break;
                    }
                    _ = interval.tick() => {
                        if task(clock.now()) == TimerControl::Stop {
                            debug!("Timer {} finished", id.get());
                            break;
                        }
                    }
                }
            }
            timers.lock().remove(&id);
        });
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        let token = self.timers.lock().remove(&id);
        match token {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}
