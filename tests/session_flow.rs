//! End-to-end session flows through the public API.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use session_watchdog::AppLifecycle;
use session_watchdog::AppState;
use session_watchdog::Config;
use session_watchdog::InactivityWatchdog;
use session_watchdog::Phase;
use session_watchdog::TerminationError;
use session_watchdog::WarningPrompt;
use session_watchdog::WatchdogService;
use session_watchdog::host::AuthClient;
use session_watchdog::host::Navigator;
use session_watchdog::host::SignOutAndReset;
use session_watchdog::host::WarningPresenter;
use session_watchdog::scheduler::ManualScheduler;
use session_watchdog::scheduler::Scheduler;

#[derive(Default)]
struct RecordingAuth {
    sign_outs: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl AuthClient for RecordingAuth {
    async fn sign_out(&self) -> Result<(), TerminationError> {
        self.sign_outs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            Err(TerminationError::SignOut("offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct RecordingNavigator {
    routes: Mutex<Vec<String>>,
}

impl Navigator for RecordingNavigator {
    fn reset_to(&self, route: &str) {
        self.routes.lock().unwrap().push(route.to_string());
    }
}

#[derive(Clone, Default)]
struct RecordingPresenter {
    prompts: Arc<Mutex<Vec<WarningPrompt>>>,
}

impl WarningPresenter for RecordingPresenter {
    fn render(&mut self, prompt: WarningPrompt) {
        self.prompts.lock().unwrap().push(prompt);
    }
}

async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test(start_paused = true)]
async fn test_idle_session_signs_out_and_resets_navigation() {
    let auth = Arc::new(RecordingAuth::default());
    let navigator = Arc::new(RecordingNavigator::default());
    let presenter = RecordingPresenter::default();
    let config = Config::default();
    let terminator = Arc::new(SignOutAndReset::new(
        Arc::clone(&auth),
        Arc::clone(&navigator),
        config.entry_route.clone(),
    ));

    let handle = WatchdogService::spawn(Box::new(presenter.clone()), terminator, None);
    handle
        .start(config.timeout_ms, config.warning_lead_ms)
        .unwrap();

    sleep_ms(30_100).await;
    assert_eq!(handle.snapshot().phase, Phase::Warning);
    assert_eq!(handle.snapshot().seconds_remaining, Some(30));

    handle.expired().await;
    handle.shutdown().await;

    assert_eq!(auth.sign_outs.load(Ordering::SeqCst), 1);
    assert_eq!(*navigator.routes.lock().unwrap(), vec!["welcome".to_string()]);

    let prompts = presenter.prompts.lock().unwrap();
    assert_eq!(
        prompts.first(),
        Some(&WarningPrompt::Visible {
            seconds_remaining: 30
        })
    );
    assert_eq!(prompts.last(), Some(&WarningPrompt::Hidden));
}

#[tokio::test(start_paused = true)]
async fn test_failed_sign_out_keeps_navigation() {
    let auth = Arc::new(RecordingAuth {
        fail: true,
        ..Default::default()
    });
    let navigator = Arc::new(RecordingNavigator::default());
    let terminator = Arc::new(SignOutAndReset::new(
        Arc::clone(&auth),
        Arc::clone(&navigator),
        "welcome",
    ));

    let handle = WatchdogService::spawn(
        Box::new(RecordingPresenter::default()),
        terminator,
        None,
    );
    handle.start(5000, 2000).unwrap();

    handle.expired().await;
    handle.shutdown().await;

    assert_eq!(auth.sign_outs.load(Ordering::SeqCst), 1);
    assert!(navigator.routes.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_activity_and_lifecycle_keep_session_alive() {
    let auth = Arc::new(RecordingAuth::default());
    let navigator = Arc::new(RecordingNavigator::default());
    let terminator = Arc::new(SignOutAndReset::new(
        Arc::clone(&auth),
        Arc::clone(&navigator),
        "welcome",
    ));
    let lifecycle = AppLifecycle::new();

    let handle = WatchdogService::spawn(
        Box::new(RecordingPresenter::default()),
        terminator,
        Some(lifecycle.subscribe()),
    );
    handle.start(5000, 2000).unwrap();

    // Activity every 2s never lets the warning fire.
    for _ in 0..5 {
        sleep_ms(2000).await;
        handle.notify_activity();
    }
    sleep_ms(10).await;
    assert_eq!(handle.snapshot().phase, Phase::Running);

    // A long stay in the background does not expire the session.
    lifecycle.set(AppState::Background);
    sleep_ms(60_000).await;
    let snapshot = handle.snapshot();
    assert_eq!(snapshot.phase, Phase::Running);
    assert!(snapshot.suspended);

    // Returning to the foreground restarts the full window.
    lifecycle.set(AppState::Active);
    sleep_ms(2900).await;
    assert_eq!(handle.snapshot().phase, Phase::Running);
    assert!(!handle.snapshot().suspended);

    sleep_ms(200).await;
    assert_eq!(handle.snapshot().phase, Phase::Warning);

    handle.expired().await;
    handle.shutdown().await;

    assert_eq!(auth.sign_outs.load(Ordering::SeqCst), 1);
    assert_eq!(lifecycle.subscriber_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_session_started_in_background_waits_for_foreground() {
    let auth = Arc::new(RecordingAuth::default());
    let navigator = Arc::new(RecordingNavigator::default());
    let terminator = Arc::new(SignOutAndReset::new(
        Arc::clone(&auth),
        Arc::clone(&navigator),
        "welcome",
    ));
    let lifecycle = AppLifecycle::new();
    lifecycle.set(AppState::Background);

    let handle = WatchdogService::spawn(
        Box::new(RecordingPresenter::default()),
        terminator,
        Some(lifecycle.subscribe()),
    );
    handle.start(2000, 1000).unwrap();

    sleep_ms(30_000).await;
    assert!(handle.snapshot().suspended);
    assert_eq!(auth.sign_outs.load(Ordering::SeqCst), 0);

    lifecycle.set(AppState::Active);
    sleep_ms(1900).await;
    assert_eq!(auth.sign_outs.load(Ordering::SeqCst), 0);

    handle.expired().await;
    handle.shutdown().await;
    assert_eq!(auth.sign_outs.load(Ordering::SeqCst), 1);
}

#[test]
fn test_manual_clock_drives_full_session() {
    let terminations = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&terminations);
    let presenter = RecordingPresenter::default();

    let mut watchdog = InactivityWatchdog::new(
        ManualScheduler::new(),
        Box::new(presenter.clone()),
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }),
    );

    watchdog.start(60_000, 30_000).unwrap();
    watchdog.advance(Duration::from_secs(40));
    assert_eq!(watchdog.phase(), Phase::Warning);
    assert_eq!(watchdog.seconds_remaining(), 20);

    watchdog.notify_activity();
    assert_eq!(watchdog.phase(), Phase::Running);
    assert_eq!(
        presenter.prompts.lock().unwrap().last(),
        Some(&WarningPrompt::Hidden)
    );

    watchdog.advance(Duration::from_secs(60));
    assert_eq!(watchdog.phase(), Phase::Expired);
    assert_eq!(terminations.load(Ordering::SeqCst), 1);

    // Expired is terminal for this instance.
    watchdog.start(60_000, 30_000).unwrap();
    watchdog.notify_activity();
    watchdog.advance(Duration::from_secs(120));
    assert_eq!(terminations.load(Ordering::SeqCst), 1);
    assert_eq!(watchdog.scheduler().pending(), 0);
}
