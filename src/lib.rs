//! session-watchdog - Session inactivity watchdog.
//!
//! Signs a user out after a period without interaction, showing a countdown
//! warning first. The [`InactivityWatchdog`] state machine is synchronous and
//! scheduler-agnostic; [`WatchdogService`] runs one on a tokio task.

pub mod config;
pub mod domain;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod scheduler;
pub mod service;
pub mod watchdog;

pub use crate::config::Config;
pub use crate::domain::AppState;
pub use crate::domain::Phase;
pub use crate::domain::WarningPrompt;
pub use crate::domain::WatchdogSnapshot;
pub use crate::domain::WatchdogTimings;
pub use crate::error::ConfigError;
pub use crate::error::TerminationError;
pub use crate::lifecycle::AppLifecycle;
pub use crate::service::WatchdogHandle;
pub use crate::service::WatchdogService;
pub use crate::watchdog::InactivityWatchdog;
