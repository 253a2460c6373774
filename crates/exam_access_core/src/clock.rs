//! crates/exam_access_core/src/clock.rs
//!
//! Time sources and timers. Every timing effect in the core (code rotation,
//! exam countdowns) goes through [`Scheduler`], so tests can swap the wall
//! clock for a [`ManualClock`] and step through time deterministically.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::Duration;

/// Abstraction over "now".
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock reading the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Handle for a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

/// Returned by a timer task to keep or drop its timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerControl {
    Continue,
    Stop,
}

/// A repeating callback. It receives the instant it fired at.
pub type TimerTask = Box<dyn FnMut(DateTime<Utc>) -> TimerControl + Send + 'static>;

/// Periodic and delayed callbacks.
///
/// Callbacks for one timer never overlap, and timers scheduled for the same
/// instant fire in the order they were scheduled.
pub trait Scheduler: Clock {
    /// Runs `task` every `period`, first at `now + period`, until it returns
    /// [`TimerControl::Stop`] or the timer is cancelled.
    fn schedule_repeating(&self, period: Duration, task: TimerTask) -> TimerId;

    /// Cancels a timer. Returns `false` if it had already finished.
    fn cancel(&self, id: TimerId) -> bool;

    /// Runs `task` once after `delay`.
    fn schedule_once(
        &self,
        delay: Duration,
        task: Box<dyn FnOnce(DateTime<Utc>) + Send + 'static>,
    ) -> TimerId {
        let mut task = Some(task);
        self.schedule_repeating(
            delay,
            Box::new(move |now| {
                if let Some(task) = task.take() {
                    task(now);
                }
                TimerControl::Stop
            }),
        )
    }
}

/// Shortest period a timer may have; zero periods would spin forever.
pub const MIN_TIMER_PERIOD: Duration = Duration::from_millis(1);

pub(crate) fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::weeks(52 * 1000))
}

//=========================================================================================
// ManualClock
//=========================================================================================

struct ManualTimer {
    due: DateTime<Utc>,
    period: chrono::Duration,
    /// `None` while the task is running.
    task: Option<TimerTask>,
}

struct ManualState {
    now: DateTime<Utc>,
    next_id: u64,
    timers: BTreeMap<TimerId, ManualTimer>,
}

/// A deterministic clock and scheduler. Time only moves when [`ManualClock::advance`]
/// is called, and every timer falling due inside the advanced window fires in
/// deadline order with `now` set to its deadline.
pub struct ManualClock {
    state: Mutex<ManualState>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: start,
                next_id: 0,
                timers: BTreeMap::new(),
            }),
        }
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }

    /// Moves time forward by `by`, firing due timers along the way.
    pub fn advance(&self, by: Duration) {
        let target = self.state.lock().now + to_chrono(by);

        loop {
            // The lock is released before the task runs so tasks may schedule or cancel timers.
            let next = {
                let mut state = self.state.lock();
                let due = state
                    .timers
                    .iter()
                    .filter(|(_, timer)| timer.task.is_some() && timer.due <= target)
                    .min_by_key(|(id, timer)| (timer.due, **id))
                    .map(|(id, timer)| (*id, timer.due));

                match due {
                    Some((id, due)) => {
                        if due > state.now {
                            state.now = due;
                        }
                        state
                            .timers
                            .get_mut(&id)
                            .and_then(|timer| timer.task.take())
                            .map(|task| (id, due, task))
                    }
                    None => None,
                }
            };

            let Some((id, due, mut task)) = next else {
                break;
            };

            let control = task(due);

            let mut state = self.state.lock();
            match (control, state.timers.get_mut(&id)) {
                (TimerControl::Continue, Some(timer)) => {
                    timer.due = due + timer.period;
                    timer.task = Some(task);
                }
                _ => {
                    state.timers.remove(&id);
                }
            }
        }

        let mut state = self.state.lock();
        if state.now < target {
            state.now = target;
        }
    }

    /// Number of timers that have not finished or been cancelled.
    pub fn pending_timers(&self) -> usize {
        self.state.lock().timers.len()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state.lock().now
    }
}

impl Scheduler for ManualClock {
    fn schedule_repeating(&self, period: Duration, task: TimerTask) -> TimerId {
        let period = to_chrono(period.max(MIN_TIMER_PERIOD));
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = TimerId(state.next_id);
        let due = state.now + period;
        state.timers.insert(
            id,
            ManualTimer {
                due,
                period,
                task: Some(task),
            },
        );
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.state.lock().timers.remove(&id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> Arc<Mutex<Vec<(&'static str, i64)>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn repeating_timer_fires_once_per_period_at_its_deadline() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let fired = recorder();

        let log = fired.clone();
        clock.schedule_repeating(
            Duration::from_secs(2),
            Box::new(move |now| {
                log.lock().push(("tick", (now - start).num_seconds()));
                TimerControl::Continue
            }),
        );

        clock.advance_secs(7);

        assert_eq!(*fired.lock(), vec![("tick", 2), ("tick", 4), ("tick", 6)]);
        assert_eq!((clock.now() - start).num_seconds(), 7);
    }

    #[test]
    fn timers_due_together_fire_in_scheduling_order() {
        let start = Utc::now();
        let clock = ManualClock::new(start);
        let fired = recorder();

        for name in ["first", "second", "third"] {
            let log = fired.clone();
            clock.schedule_once(
                Duration::from_secs(1),
                Box::new(move |_| log.lock().push((name, 1))),
            );
        }
        clock.advance_secs(1);

        let names: Vec<_> = fired.lock().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["first", "second", "third"]);
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn stop_and_cancel_end_a_timer() {
        let clock = ManualClock::new(Utc::now());
        let fired = recorder();

        let log = fired.clone();
        let mut remaining = 2;
        clock.schedule_repeating(
            Duration::from_secs(1),
            Box::new(move |_| {
                log.lock().push(("stopper", 0));
                remaining -= 1;
                if remaining == 0 {
                    TimerControl::Stop
                } else {
                    TimerControl::Continue
                }
            }),
        );
        let log = fired.clone();
        let cancelled = clock.schedule_repeating(
            Duration::from_secs(1),
            Box::new(move |_| {
                log.lock().push(("cancelled", 0));
                TimerControl::Continue
            }),
        );

        clock.advance_secs(1);
        assert!(clock.cancel(cancelled));
        assert!(!clock.cancel(cancelled));
        clock.advance_secs(5);

        let names: Vec<_> = fired.lock().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec!["stopper", "cancelled", "stopper"]);
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn a_task_can_cancel_another_timer_due_at_the_same_instant() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let fired = recorder();

        let victim_slot: Arc<Mutex<Option<TimerId>>> = Arc::new(Mutex::new(None));
        let slot = victim_slot.clone();
        let inner_clock = clock.clone();
        clock.schedule_once(
            Duration::from_secs(1),
            Box::new(move |_| {
                if let Some(id) = *slot.lock() {
                    inner_clock.cancel(id);
                }
            }),
        );
        let log = fired.clone();
        let victim = clock.schedule_once(
            Duration::from_secs(1),
            Box::new(move |_| log.lock().push(("victim", 1))),
        );
        *victim_slot.lock() = Some(victim);

        clock.advance_secs(3);

        assert!(fired.lock().is_empty());
    }

    #[test]
    fn zero_period_is_clamped() {
        let clock = ManualClock::new(Utc::now());
        let count = Arc::new(Mutex::new(0u32));
        let counter = count.clone();
        clock.schedule_repeating(
            Duration::ZERO,
            Box::new(move |_| {
                *counter.lock() += 1;
                TimerControl::Continue
            }),
        );

        clock.advance(Duration::from_millis(5));

        assert_eq!(*count.lock(), 5);
    }
}
