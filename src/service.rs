//! Watchdog service: one tokio task owning one watchdog.
//!
//! Commands, timer firings and lifecycle changes are multiplexed with
//! `tokio::select!` so every transition runs serially on the service task.
//! Hosts talk to it through a cloneable [`WatchdogHandle`].

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::domain::AppState;
use crate::domain::WatchdogSnapshot;
use crate::domain::WatchdogTimings;
use crate::error::ConfigError;
use crate::host::SessionTerminator;
use crate::host::WarningPresenter;
use crate::lifecycle::LifecycleSubscription;
use crate::scheduler::TimerFired;
use crate::scheduler::TokioScheduler;
use crate::watchdog::InactivityWatchdog;
use crate::watchdog::TerminationCallback;

/// Messages from handles to the service task.
#[derive(Debug)]
enum Command {
    Start(WatchdogTimings),
    Activity,
    Background,
    Foreground,
    Stop,
    Shutdown,
}

/// Spawns the watchdog service task.
pub struct WatchdogService;

impl WatchdogService {
    /// Spawn an idle watchdog service.
    ///
    /// The lifecycle subscription, when given, is held until shutdown. If the
    /// app is already backgrounded, sessions stay suspended until foreground.
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        presenter: Box<dyn WarningPresenter>,
        terminator: Arc<dyn SessionTerminator>,
        lifecycle: Option<LifecycleSubscription>,
    ) -> WatchdogHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(WatchdogSnapshot::default());
        let (termination_tx, termination_rx) = oneshot::channel();

        let (scheduler, timer_rx) = TokioScheduler::new();
        let watchdog = InactivityWatchdog::new(
            scheduler,
            presenter,
            termination_callback(terminator, termination_tx),
        );

        let task = tokio::spawn(run(
            watchdog,
            command_rx,
            timer_rx,
            lifecycle,
            snapshot_tx,
            termination_rx,
        ));

        WatchdogHandle {
            commands: command_tx,
            snapshots: snapshot_rx,
            task: Arc::new(tokio::sync::Mutex::new(Some(task))),
        }
    }
}

/// Build the callback that dispatches termination without awaiting it.
///
/// The spawned task is handed back through `done` so shutdown can wait for it.
fn termination_callback(
    terminator: Arc<dyn SessionTerminator>,
    done: oneshot::Sender<JoinHandle<()>>,
) -> TerminationCallback {
    let mut done = Some(done);
    Box::new(move || {
        let terminator = Arc::clone(&terminator);
        let task = tokio::spawn(async move {
            match terminator.terminate().await {
                Ok(()) => info!("Session terminated"),
                Err(e) => error!("Failed to terminate session: {}", e),
            }
        });

        if let Some(done) = done.take() {
            // Receiver gone means the service already exited; the task still runs.
            let _ = done.send(task);
        }
        Ok(())
    })
}

/// Service event loop.
async fn run(
    mut watchdog: InactivityWatchdog<TokioScheduler>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    mut timers: mpsc::UnboundedReceiver<TimerFired>,
    mut lifecycle: Option<LifecycleSubscription>,
    snapshots: watch::Sender<WatchdogSnapshot>,
    mut termination: oneshot::Receiver<JoinHandle<()>>,
) {
    debug!("Watchdog service started");

    if let Some(subscription) = &lifecycle
        && !subscription.current().is_foreground()
    {
        watchdog.notify_background();
        publish(&snapshots, &watchdog);
    }

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    debug!("All watchdog handles dropped, shutting down");
                    break;
                };
                match command {
                    Command::Start(timings) => watchdog.start_with(timings),
                    Command::Activity => watchdog.notify_activity(),
                    Command::Background => watchdog.notify_background(),
                    Command::Foreground => watchdog.notify_foreground(),
                    Command::Stop => watchdog.stop(),
                    Command::Shutdown => break,
                }
            }

            Some(fired) = timers.recv() => {
                watchdog.on_timer(fired);
            }

            state = next_lifecycle(&mut lifecycle) => {
                match state {
                    Some(state) if state.is_foreground() => watchdog.notify_foreground(),
                    Some(_) => watchdog.notify_background(),
                    None => {
                        debug!("Lifecycle source closed");
                        lifecycle = None;
                    }
                }
            }
        }

        publish(&snapshots, &watchdog);
    }

    watchdog.stop();
    snapshots.send_replace(watchdog.snapshot());
    // Deregister before waiting on any in-flight sign-out.
    drop(lifecycle);
    drop(watchdog);

    if let Ok(task) = termination.try_recv() {
        debug!("Waiting for session termination to finish");
        if let Err(e) = task.await {
            warn!("Session termination task failed: {}", e);
        }
    }

    debug!("Watchdog service stopped");
}

/// Publish the watchdog snapshot if it changed.
fn publish(
    snapshots: &watch::Sender<WatchdogSnapshot>,
    watchdog: &InactivityWatchdog<TokioScheduler>,
) {
    snapshots.send_if_modified(|current| {
        let next = watchdog.snapshot();
        if *current == next {
            false
        } else {
            *current = next;
            true
        }
    });
}

/// Next lifecycle state, or pending forever without a subscription.
async fn next_lifecycle(lifecycle: &mut Option<LifecycleSubscription>) -> Option<AppState> {
    match lifecycle {
        Some(subscription) => subscription.changed().await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running watchdog service.
#[derive(Debug, Clone)]
pub struct WatchdogHandle {
    commands: mpsc::UnboundedSender<Command>,
    snapshots: watch::Receiver<WatchdogSnapshot>,
    task: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl WatchdogHandle {
    /// Start a session. Fails before anything is armed if the timings are
    /// invalid.
    ///
    /// A start after the session expired is dropped, even after `stop`; the
    /// snapshot's `terminated` flag reports it.
    pub fn start(&self, timeout_ms: u64, warning_lead_ms: u64) -> Result<(), ConfigError> {
        let timings = WatchdogTimings::from_millis(timeout_ms, warning_lead_ms)?;
        self.start_with(timings);
        Ok(())
    }

    /// Start a session with already validated timings.
    pub fn start_with(&self, timings: WatchdogTimings) {
        self.send(Command::Start(timings));
    }

    pub fn notify_activity(&self) {
        self.send(Command::Activity);
    }

    pub fn notify_background(&self) {
        self.send(Command::Background);
    }

    pub fn notify_foreground(&self) {
        self.send(Command::Foreground);
    }

    pub fn stop(&self) {
        self.send(Command::Stop);
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> WatchdogSnapshot {
        *self.snapshots.borrow()
    }

    /// Receiver of snapshot updates, for rendering.
    pub fn subscribe(&self) -> watch::Receiver<WatchdogSnapshot> {
        self.snapshots.clone()
    }

    /// Resolve once the session has expired.
    ///
    /// Also resolves if the service stops before expiring.
    pub async fn expired(&self) {
        let mut snapshots = self.snapshots.clone();
        // Err means the service is gone.
        let _ = snapshots
            .wait_for(|snapshot| snapshot.terminated)
            .await;
    }

    /// Stop the watchdog and wait for the service and any in-flight
    /// termination to finish.
    ///
    /// Only the first call waits; later calls from other clones return
    /// immediately.
    pub async fn shutdown(self) {
        let Some(task) = self.task.lock().await.take() else {
            return;
        };

        self.send(Command::Shutdown);
        if let Err(e) = task.await {
            warn!("Watchdog service task failed: {}", e);
        }
    }

    /// Activity and lifecycle calls are best-effort and never fail.
    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Watchdog service not running, dropping command");
        }
    }
}
