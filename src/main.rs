//! session-watchdog - Session inactivity watchdog host.
//!
//! Starts a session, reads activity and lifecycle commands from stdin, renders
//! the inactivity warning on stdout, and signs the session out once it expires.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use session_watchdog::AppLifecycle;
use session_watchdog::AppState;
use session_watchdog::Config;
use session_watchdog::WarningPrompt;
use session_watchdog::WatchdogHandle;
use session_watchdog::WatchdogService;
use session_watchdog::host::HttpAuthClient;
use session_watchdog::host::LocalAuthClient;
use session_watchdog::host::Navigator;
use session_watchdog::host::SessionTerminator;
use session_watchdog::host::SignOutAndReset;
use session_watchdog::host::WarningPresenter;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tracing::debug;
use tracing::info;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Session inactivity watchdog.
///
/// Reads commands from stdin: activity, background, inactive, foreground,
/// start, stop, status, quit.
#[derive(Parser, Debug)]
#[command(name = "session-watchdog")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable dry-run mode (don't actually sign out).
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the inactivity timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Override the warning lead time in milliseconds.
    #[arg(long)]
    warning_lead_ms: Option<u64>,

    /// Print every snapshot change to stdout as JSON.
    #[arg(long)]
    print_events: bool,
}

/// A line of stdin input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputCommand {
    Activity,
    Lifecycle(AppState),
    Start,
    Stop,
    Status,
    Quit,
}

impl FromStr for InputCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "activity" | "touch" | "a" | "" => Ok(Self::Activity),
            "bg" => Ok(Self::Lifecycle(AppState::Background)),
            "foreground" | "fg" => Ok(Self::Lifecycle(AppState::Active)),
            "start" => Ok(Self::Start),
            "stop" => Ok(Self::Stop),
            "status" => Ok(Self::Status),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => other
                .parse::<AppState>()
                .map(Self::Lifecycle)
                .map_err(|_| format!("Unknown command: {other}")),
        }
    }
}

/// Prints the warning prompt to stdout.
struct ConsolePresenter;

impl WarningPresenter for ConsolePresenter {
    fn render(&mut self, prompt: WarningPrompt) {
        match prompt {
            WarningPrompt::Visible { seconds_remaining } => println!(
                "[WARNING] Inactivity detected \u{2014} your session will close in {seconds_remaining} seconds. Type 'activity' to stay connected."
            ),
            WarningPrompt::Hidden => println!("[WARNING] dismissed"),
        }
    }
}

/// Prints navigation resets to stdout.
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn reset_to(&self, route: &str) {
        println!("[NAVIGATE] -> {route}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args.log_level)?;

    info!("session-watchdog v{} starting", env!("CARGO_PKG_VERSION"));

    // Load config
    let mut config =
        Config::load_or_default(args.config.as_deref()).context("Failed to load configuration")?;

    if args.dry_run {
        config.dry_run = true;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }
    if let Some(warning_lead_ms) = args.warning_lead_ms {
        config.warning_lead_ms = warning_lead_ms;
    }

    let timings = config.timings().context("Invalid watchdog timings")?;
    info!(
        "Configuration loaded (timeout={:?}, warning_lead={:?}, dry_run={})",
        timings.timeout(),
        timings.warning_lead(),
        config.dry_run
    );

    let terminator = build_terminator(&config)?;
    run_session(&config, terminator, args.print_events).await
}

/// Initialize logging with the specified level.
fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_new(format!("session_watchdog={level}"))
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Invalid log level")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Sign out over HTTP when an endpoint is configured, else locally.
fn build_terminator(config: &Config) -> Result<Arc<dyn SessionTerminator>> {
    if config.uses_remote_sign_out()
        && let Some(ref endpoint) = config.sign_out_endpoint
    {
        let auth = HttpAuthClient::new(
            endpoint.clone(),
            config.sign_out_token.clone(),
            Duration::from_secs(config.sign_out_timeout_seconds),
        )
        .context("Failed to initialize sign-out client")?;
        info!("Signing out via {}", auth.endpoint());
        return Ok(Arc::new(SignOutAndReset::new(
            auth,
            ConsoleNavigator,
            config.entry_route.clone(),
        )));
    }

    Ok(Arc::new(SignOutAndReset::new(
        LocalAuthClient::new(config.dry_run),
        ConsoleNavigator,
        config.entry_route.clone(),
    )))
}

/// Run one session until it expires, stdin closes, or the user quits.
async fn run_session(
    config: &Config,
    terminator: Arc<dyn SessionTerminator>,
    print_events: bool,
) -> Result<()> {
    let lifecycle = AppLifecycle::new();
    let handle = WatchdogService::spawn(
        Box::new(ConsolePresenter),
        terminator,
        Some(lifecycle.subscribe()),
    );
    handle
        .start(config.timeout_ms, config.warning_lead_ms)
        .context("Failed to start session")?;

    if print_events {
        spawn_event_printer(&handle);
    }

    info!("Session started, waiting for activity...");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            () = handle.expired() => {
                info!("Session expired");
                break;
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping session");
                break;
            }

            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => {
                        if handle_input(&line, &handle, &lifecycle, config) {
                            break;
                        }
                    }
                    Ok(None) => {
                        debug!("stdin closed, waiting for session to expire");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("Failed to read stdin: {}", e);
                        stdin_open = false;
                    }
                }
            }
        }
    }

    handle.shutdown().await;
    info!("session-watchdog stopped");
    Ok(())
}

/// Apply one stdin line. Returns true when the user asked to quit.
fn handle_input(
    line: &str,
    handle: &WatchdogHandle,
    lifecycle: &AppLifecycle,
    config: &Config,
) -> bool {
    let command = match line.parse::<InputCommand>() {
        Ok(command) => command,
        Err(e) => {
            warn!("{}", e);
            return false;
        }
    };

    match command {
        InputCommand::Activity => handle.notify_activity(),
        InputCommand::Lifecycle(state) => lifecycle.set(state),
        InputCommand::Start => {
            if let Err(e) = handle.start(config.timeout_ms, config.warning_lead_ms) {
                warn!("Failed to start session: {}", e);
            }
        }
        InputCommand::Stop => handle.stop(),
        InputCommand::Status => print_snapshot(handle),
        InputCommand::Quit => return true,
    }
    false
}

fn print_snapshot(handle: &WatchdogHandle) {
    match serde_json::to_string(&handle.snapshot()) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!("Failed to serialize snapshot: {}", e),
    }
}

/// Print every snapshot change until the service stops.
fn spawn_event_printer(handle: &WatchdogHandle) {
    let mut snapshots = handle.subscribe();
    tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = *snapshots.borrow_and_update();
            match serde_json::to_string(&snapshot) {
                Ok(json) => println!("[EVENT] {json}"),
                Err(e) => warn!("Failed to serialize snapshot: {}", e),
            }
        }
    });
}
