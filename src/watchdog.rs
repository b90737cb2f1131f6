//! Session inactivity watchdog.
//!
//! Warn-then-logout state machine:
//! - `Running`: one timer armed, firing `timeout - warning_lead` after the
//!   last activity
//! - `Warning`: countdown ticker and expiry backstop armed
//! - `Expired`: termination invoked once; terminal for this instance
//!
//! The watchdog is synchronous. Timers are armed through a [`Scheduler`] and
//! their firings come back through [`InactivityWatchdog::on_timer`], so the
//! owner must deliver every call from a single task.

use std::fmt;
use std::time::Duration;
use std::time::Instant;

use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::domain::Phase;
use crate::domain::WarningPrompt;
use crate::domain::WatchdogSnapshot;
use crate::domain::WatchdogTimings;
use crate::error::ConfigError;
use crate::error::TerminationError;
use crate::host::WarningPresenter;
use crate::scheduler::ManualScheduler;
use crate::scheduler::Scheduler;
use crate::scheduler::TimerFired;
use crate::scheduler::TimerHandle;
use crate::scheduler::TimerKind;

/// Countdown tick period.
const TICK: Duration = Duration::from_secs(1);

/// Host callback invoked once when the session expires.
///
/// May dispatch asynchronous work and return immediately; the watchdog does
/// not wait for the session to actually end.
pub type TerminationCallback = Box<dyn FnMut() -> Result<(), TerminationError> + Send>;

/// Handles of the timers currently armed.
#[derive(Debug, Default)]
struct ArmedTimers {
    warning: Option<TimerHandle>,
    expiry: Option<TimerHandle>,
    countdown: Option<TimerHandle>,
}

impl ArmedTimers {
    fn slot(&mut self, kind: TimerKind) -> &mut Option<TimerHandle> {
        match kind {
            TimerKind::WarningFire => &mut self.warning,
            TimerKind::Expiry => &mut self.expiry,
            TimerKind::Countdown => &mut self.countdown,
        }
    }
}

/// Inactivity watchdog for one session.
pub struct InactivityWatchdog<S: Scheduler> {
    scheduler: S,
    presenter: Box<dyn WarningPresenter>,
    on_expire: TerminationCallback,

    timings: WatchdogTimings,
    phase: Phase,
    seconds_remaining: u32,
    last_activity_at: Option<Instant>,

    /// App is backgrounded; timers are cancelled until foreground.
    suspended: bool,
    warning_visible: bool,
    /// Set once the termination callback has been invoked.
    terminated: bool,

    timers: ArmedTimers,
}

impl<S: Scheduler> InactivityWatchdog<S> {
    /// Create an idle watchdog.
    pub fn new(
        scheduler: S,
        presenter: Box<dyn WarningPresenter>,
        on_expire: TerminationCallback,
    ) -> Self {
        let timings = WatchdogTimings::default();
        Self {
            scheduler,
            presenter,
            on_expire,
            seconds_remaining: timings.countdown_seconds(),
            timings,
            phase: Phase::Idle,
            last_activity_at: None,
            suspended: false,
            warning_visible: false,
            terminated: false,
            timers: ArmedTimers::default(),
        }
    }

    /// Begin a session with the given timings in milliseconds.
    ///
    /// Nothing is armed when validation fails. See [`Self::start_with`] for
    /// starts after expiry.
    pub fn start(&mut self, timeout_ms: u64, warning_lead_ms: u64) -> Result<(), ConfigError> {
        let timings = WatchdogTimings::from_millis(timeout_ms, warning_lead_ms)?;
        self.start_with(timings);
        Ok(())
    }

    /// Begin a session with already validated timings.
    ///
    /// Restarts the cycle when a session is already running. While the app is
    /// backgrounded the session is `Running` but nothing is armed until
    /// foreground. Ignored once the instance has expired, including after a
    /// `stop`; [`Self::is_terminated`] and the snapshot report the refusal.
    pub fn start_with(&mut self, timings: WatchdogTimings) {
        if self.terminated {
            warn!("Ignoring start: this session has already expired");
            return;
        }

        info!(
            "Session started (timeout={:?}, warning_lead={:?})",
            timings.timeout(),
            timings.warning_lead()
        );
        self.timings = timings;
        if self.suspended {
            debug!("App is backgrounded, timers wait for foreground");
        }
        self.reset();
    }

    /// Report user activity.
    pub fn notify_activity(&mut self) {
        match self.phase {
            Phase::Idle | Phase::Expired => {
                trace!("Ignoring activity in phase {}", self.phase);
            }
            Phase::Running | Phase::Warning if self.suspended => {
                // Foreground re-arms the whole cycle anyway.
                self.last_activity_at = Some(self.scheduler.now());
            }
            Phase::Running | Phase::Warning => {
                trace!("Activity in phase {}, resetting", self.phase);
                self.reset();
            }
        }
    }

    /// App moved to the background: suspend all timers, keep the phase.
    ///
    /// Remembered while idle too, so a session started in the background
    /// arms nothing until foreground.
    pub fn notify_background(&mut self) {
        if self.suspended || self.phase == Phase::Expired {
            trace!("Ignoring background in phase {}", self.phase);
            return;
        }

        debug!("App backgrounded in phase {}, suspending timers", self.phase);
        self.cancel_all();
        self.suspended = true;
    }

    /// App returned to the foreground: restart the full window.
    pub fn notify_foreground(&mut self) {
        if self.suspended {
            debug!("App foregrounded in phase {}", self.phase);
            self.suspended = false;
        }

        if !self.phase.is_active() {
            trace!("Ignoring foreground in phase {}", self.phase);
            return;
        }
        self.reset();
    }

    /// Cancel everything and return to `Idle`.
    ///
    /// An expired instance stays terminated: see [`Self::is_terminated`].
    pub fn stop(&mut self) {
        if self.phase != Phase::Idle {
            debug!("Stopping watchdog from phase {}", self.phase);
        }
        self.cancel_all();
        self.hide_warning();
        self.phase = Phase::Idle;
    }

    /// Deliver a timer firing. Firings for handles no longer armed are stale
    /// and ignored.
    pub fn on_timer(&mut self, fired: TimerFired) {
        let slot = self.timers.slot(fired.kind);
        if *slot != Some(fired.handle) {
            trace!("Ignoring stale timer {:?} ({:?})", fired.handle, fired.kind);
            return;
        }

        match fired.kind {
            TimerKind::WarningFire => {
                *slot = None;
                self.scheduler.cancel(fired.handle);
                self.enter_warning();
            }
            TimerKind::Expiry => {
                *slot = None;
                self.scheduler.cancel(fired.handle);
                self.expire();
            }
            TimerKind::Countdown => self.tick(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Countdown value. Meaningful only while the warning is visible.
    pub fn seconds_remaining(&self) -> u32 {
        self.seconds_remaining
    }

    pub fn last_activity_at(&self) -> Option<Instant> {
        self.last_activity_at
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Whether the termination callback has run. A terminated instance
    /// ignores `start`.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn snapshot(&self) -> WatchdogSnapshot {
        WatchdogSnapshot {
            phase: self.phase,
            seconds_remaining: self.warning_visible.then_some(self.seconds_remaining),
            suspended: self.suspended,
            terminated: self.terminated,
        }
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Re-arm from `Running` as if activity just happened.
    fn reset(&mut self) {
        self.cancel_all();
        self.hide_warning();

        if self.phase == Phase::Warning {
            debug!("Warning dismissed, back to running");
        }
        self.phase = Phase::Running;
        self.seconds_remaining = self.timings.countdown_seconds();
        self.last_activity_at = Some(self.scheduler.now());

        if !self.suspended {
            let handle = self
                .scheduler
                .schedule_once(self.timings.until_warning(), TimerKind::WarningFire);
            self.timers.warning = Some(handle);
        }
    }

    fn enter_warning(&mut self) {
        self.cancel_all();
        self.phase = Phase::Warning;
        self.seconds_remaining = self.timings.countdown_seconds();

        info!(
            "Inactivity detected, session will close in {}s",
            self.seconds_remaining
        );
        self.warning_visible = true;
        self.presenter.render(WarningPrompt::Visible {
            seconds_remaining: self.seconds_remaining,
        });

        self.timers.countdown = Some(self.scheduler.schedule_repeating(TICK, TimerKind::Countdown));
        self.timers.expiry = Some(
            self.scheduler
                .schedule_once(self.timings.warning_lead(), TimerKind::Expiry),
        );
    }

    fn tick(&mut self) {
        if self.seconds_remaining <= 1 {
            self.expire();
            return;
        }

        self.seconds_remaining -= 1;
        trace!("Countdown: {}s remaining", self.seconds_remaining);
        self.presenter.render(WarningPrompt::Visible {
            seconds_remaining: self.seconds_remaining,
        });
    }

    fn expire(&mut self) {
        self.cancel_all();
        self.hide_warning();
        self.phase = Phase::Expired;
        self.seconds_remaining = 0;

        if self.terminated {
            return;
        }
        self.terminated = true;

        info!("Session expired after inactivity, terminating");
        if let Err(e) = (self.on_expire)() {
            error!("Session termination failed: {}. Treating session as expired.", e);
        }
    }

    fn hide_warning(&mut self) {
        if self.warning_visible {
            self.warning_visible = false;
            self.presenter.render(WarningPrompt::Hidden);
        }
    }

    fn cancel_all(&mut self) {
        for kind in [TimerKind::WarningFire, TimerKind::Expiry, TimerKind::Countdown] {
            if let Some(handle) = self.timers.slot(kind).take() {
                self.scheduler.cancel(handle);
            }
        }
    }
}

impl InactivityWatchdog<ManualScheduler> {
    /// Advance the virtual clock, delivering every timer due on the way.
    pub fn advance(&mut self, by: Duration) {
        let until = self.scheduler.elapsed() + by;
        while let Some(fired) = self.scheduler.pop_due(until) {
            self.on_timer(fired);
        }
        self.scheduler.advance_to(until);
    }
}

impl<S: Scheduler> fmt::Debug for InactivityWatchdog<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InactivityWatchdog")
            .field("phase", &self.phase)
            .field("timings", &self.timings)
            .field("seconds_remaining", &self.seconds_remaining)
            .field("suspended", &self.suspended)
            .field("terminated", &self.terminated)
            .field("timers", &self.timers)
            .finish_non_exhaustive()
    }
}
