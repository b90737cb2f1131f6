//! App lifecycle signal source.
//!
//! Hosts publish foreground/background transitions through an
//! [`AppLifecycle`]; the watchdog service holds a [`LifecycleSubscription`]
//! for as long as it runs. Dropping the subscription deregisters it.

use tokio::sync::watch;
use tracing::debug;

use crate::domain::AppState;

/// Publisher of app lifecycle state.
#[derive(Debug)]
pub struct AppLifecycle {
    tx: watch::Sender<AppState>,
}

impl AppLifecycle {
    /// Create a source in the `Active` state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(AppState::Active);
        Self { tx }
    }

    /// Publish a state. Repeated values are not re-delivered.
    pub fn set(&self, state: AppState) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });

        if changed {
            debug!("App state changed to {}", state);
        }
    }

    pub fn current(&self) -> AppState {
        *self.tx.borrow()
    }

    /// Register a listener.
    pub fn subscribe(&self) -> LifecycleSubscription {
        LifecycleSubscription {
            rx: self.tx.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for AppLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// A registered lifecycle listener.
#[derive(Debug)]
pub struct LifecycleSubscription {
    rx: watch::Receiver<AppState>,
}

impl LifecycleSubscription {
    /// Wait for the next state change.
    ///
    /// Returns `None` once the source has been dropped.
    pub async fn changed(&mut self) -> Option<AppState> {
        self.rx.changed().await.ok()?;
        Some(*self.rx.borrow_and_update())
    }

    pub fn current(&self) -> AppState {
        *self.rx.borrow()
    }
}
