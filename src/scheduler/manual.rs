//! Virtual-clock scheduler.
//!
//! Time only moves when the caller says so. Used to drive the watchdog
//! deterministically in tests and by hosts that own their own frame loop.

use std::collections::BTreeMap;
use std::time::Duration;
use std::time::Instant;

use tracing::trace;

use super::Scheduler;
use super::TimerFired;
use super::TimerHandle;
use super::TimerKind;

/// Smallest period accepted for repeating timers.
const MIN_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy)]
struct Entry {
    kind: TimerKind,
    /// Offset from the scheduler origin.
    deadline: Duration,
    period: Option<Duration>,
    /// Tie-breaker: timers due at the same instant fire in arming order.
    seq: u64,
}

/// Scheduler backed by a manually advanced clock.
#[derive(Debug)]
pub struct ManualScheduler {
    origin: Instant,
    elapsed: Duration,
    next_id: u64,
    next_seq: u64,
    timers: BTreeMap<TimerHandle, Entry>,
}

impl ManualScheduler {
    /// Create a scheduler whose clock starts now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Duration::ZERO,
            next_id: 0,
            next_seq: 0,
            timers: BTreeMap::new(),
        }
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Registered timers, in handle order.
    pub fn timers(&self) -> impl Iterator<Item = (TimerHandle, TimerKind)> + '_ {
        self.timers.iter().map(|(handle, entry)| (*handle, entry.kind))
    }

    /// Whether a timer of the given kind is registered.
    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.timers.values().any(|entry| entry.kind == kind)
    }

    /// Pop the earliest timer due at or before `until`, moving the clock to
    /// its deadline. Repeating timers are re-armed for their next period.
    pub fn pop_due(&mut self, until: Duration) -> Option<TimerFired> {
        let (handle, entry) = self
            .timers
            .iter()
            .filter(|(_, entry)| entry.deadline <= until)
            .min_by_key(|(_, entry)| (entry.deadline, entry.seq))
            .map(|(handle, entry)| (*handle, *entry))?;

        self.elapsed = self.elapsed.max(entry.deadline);

        match entry.period {
            Some(period) => {
                let seq = self.bump_seq();
                if let Some(slot) = self.timers.get_mut(&handle) {
                    slot.deadline += period;
                    slot.seq = seq;
                }
            }
            None => {
                self.timers.remove(&handle);
            }
        }

        trace!("Manual timer {:?} ({:?}) fired at {:?}", handle, entry.kind, self.elapsed);
        Some(TimerFired {
            handle,
            kind: entry.kind,
        })
    }

    /// Move the clock forward to `until` without firing anything.
    ///
    /// Callers drain `pop_due` first; the clock never moves backwards.
    pub fn advance_to(&mut self, until: Duration) {
        self.elapsed = self.elapsed.max(until);
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    fn insert(&mut self, delay: Duration, period: Option<Duration>, kind: TimerKind) -> TimerHandle {
        let handle = TimerHandle::new(self.next_id);
        self.next_id += 1;
        let seq = self.bump_seq();

        self.timers.insert(
            handle,
            Entry {
                kind,
                deadline: self.elapsed + delay,
                period,
                seq,
            },
        );
        handle
    }
}

impl Default for ManualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> Instant {
        self.origin + self.elapsed
    }

    fn schedule_once(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle {
        self.insert(delay, None, kind)
    }

    fn schedule_repeating(&mut self, period: Duration, kind: TimerKind) -> TimerHandle {
        let period = period.max(MIN_PERIOD);
        self.insert(period, Some(period), kind)
    }

    fn cancel(&mut self, handle: TimerHandle) {
        self.timers.remove(&handle);
    }

    fn pending(&self) -> usize {
        self.timers.len()
    }
}
