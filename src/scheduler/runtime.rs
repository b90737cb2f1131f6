//! Tokio-backed scheduler.
//!
//! Each timer is a spawned task racing a sleep (or interval) against a
//! cancellation token. Firings are delivered on an mpsc channel to whichever
//! task owns the watchdog, which keeps all state transitions on one task.

use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::Scheduler;
use super::TimerFired;
use super::TimerHandle;
use super::TimerKind;

/// Scheduler that arms real tokio timers.
///
/// Must be used from within a tokio runtime.
#[derive(Debug)]
pub struct TokioScheduler {
    tx: mpsc::UnboundedSender<TimerFired>,
    timers: HashMap<TimerHandle, CancellationToken>,
    next_id: u64,
}

impl TokioScheduler {
    /// Create a scheduler and the receiver its firings are delivered on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFired>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            tx,
            timers: HashMap::new(),
            next_id: 0,
        };
        (scheduler, rx)
    }

    fn register(&mut self) -> (TimerHandle, CancellationToken) {
        let handle = TimerHandle::new(self.next_id);
        self.next_id += 1;

        let token = CancellationToken::new();
        self.timers.insert(handle, token.clone());
        (handle, token)
    }
}

impl Scheduler for TokioScheduler {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn schedule_once(&mut self, delay: Duration, kind: TimerKind) -> TimerHandle {
        let (handle, token) = self.register();
        let tx = self.tx.clone();
        let deadline = tokio::time::Instant::now() + delay;

        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    trace!("Timer {:?} ({:?}) cancelled", handle, kind);
                }
                () = tokio::time::sleep_until(deadline) => {
                    // Receiver gone means the owner shut down.
                    let _ = tx.send(TimerFired { handle, kind });
                }
            }
        });

        handle
    }

    fn schedule_repeating(&mut self, period: Duration, kind: TimerKind) -> TimerHandle {
        // interval panics on a zero period.
        let period = period.max(Duration::from_millis(1));
        let (handle, token) = self.register();
        let tx = self.tx.clone();
        let start = tokio::time::Instant::now() + period;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(start, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = token.cancelled() => {
                        trace!("Repeating timer {:?} ({:?}) cancelled", handle, kind);
                        break;
                    }
                    _ = ticker.tick() => {
                        if tx.send(TimerFired { handle, kind }).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(token) = self.timers.remove(&handle) {
            token.cancel();
        }
    }

    fn pending(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        for token in self.timers.values() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_once_delivers_after_delay() {
        let (mut scheduler, mut rx) = TokioScheduler::new();
        let handle = scheduler.schedule_once(Duration::from_secs(30), TimerKind::WarningFire);

        tokio::time::sleep(Duration::from_millis(29_999)).await;
        assert!(rx.try_recv().is_err());

        let fired = rx.recv().await.unwrap();
        assert_eq!(fired, TimerFired { handle, kind: TimerKind::WarningFire });
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_delivers() {
        let (mut scheduler, mut rx) = TokioScheduler::new();
        let handle = scheduler.schedule_once(Duration::from_secs(1), TimerKind::Expiry);
        scheduler.cancel(handle);
        assert_eq!(scheduler.pending(), 0);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeating_ticks_each_period() {
        let (mut scheduler, mut rx) = TokioScheduler::new();
        let handle = scheduler.schedule_repeating(Duration::from_secs(1), TimerKind::Countdown);

        for _ in 0..3 {
            let fired = rx.recv().await.unwrap();
            assert_eq!(fired.handle, handle);
            assert_eq!(fired.kind, TimerKind::Countdown);
        }

        scheduler.cancel(handle);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_now_follows_paused_clock() {
        let (scheduler, _rx) = TokioScheduler::new();
        let before = scheduler.now();
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(scheduler.now() - before >= Duration::from_secs(10));
    }
}
