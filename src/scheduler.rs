//! Timer scheduling abstraction.
//!
//! The watchdog never sleeps itself. It asks a `Scheduler` to arm timers and
//! receives `TimerFired` values back through its owner's event loop, so every
//! transition runs serially and cancellation is by handle.

mod manual;
mod runtime;

use std::time::Duration;
use std::time::Instant;

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

/// Opaque identifier for an armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

/// The three timers the watchdog uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Fires `timeout - warning_lead` after the last activity.
    WarningFire,
    /// Backstop that fires `warning_lead` after the warning is shown.
    Expiry,
    /// 1 Hz countdown ticker while the warning is visible.
    Countdown,
}

/// A timer elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub handle: TimerHandle,
    pub kind: TimerKind,
}

/// Arms and cancels timers on behalf of the watchdog.
pub trait Scheduler {
    /// Current time on this scheduler's clock.
    fn now(&self) -> Instant;

    /// Arm a timer that fires once after `delay`.
    fn schedule_once(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle;

    /// Arm a timer that fires every `period`, first after one period.
    fn schedule_repeating(&mut self, period: Duration, kind: TimerKind) -> TimerHandle;

    /// Cancel a timer.
    ///
    /// Cancelling a one-shot that already fired only releases its bookkeeping.
    fn cancel(&mut self, handle: TimerHandle);

    /// Number of timers currently registered.
    fn pending(&self) -> usize;
}
