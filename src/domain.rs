//! Domain types for the inactivity watchdog.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::ConfigError;

/// Watchdog lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// No session, no timers.
    #[default]
    Idle,
    /// Session active, counting toward the warning.
    Running,
    /// Warning visible, countdown active, counting toward expiry.
    Warning,
    /// Termination triggered. Terminal for this instance.
    Expired,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Warning => "warning",
            Self::Expired => "expired",
        }
    }

    /// Whether a session is live (timers may be armed).
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::Warning)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated pair of session timings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogTimings {
    timeout: Duration,
    warning_lead: Duration,
}

impl WatchdogTimings {
    /// Default total idle budget.
    pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;
    /// Default lead time before expiry at which the warning is shown.
    pub const DEFAULT_WARNING_LEAD_MS: u64 = 30_000;

    /// Validate and build timings from millisecond values.
    pub fn from_millis(timeout_ms: u64, warning_lead_ms: u64) -> Result<Self, ConfigError> {
        if timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        if warning_lead_ms == 0 {
            return Err(ConfigError::ZeroWarningLead);
        }
        if warning_lead_ms > timeout_ms {
            return Err(ConfigError::WarningLeadExceedsTimeout {
                warning_lead_ms,
                timeout_ms,
            });
        }

        Ok(Self {
            timeout: Duration::from_millis(timeout_ms),
            warning_lead: Duration::from_millis(warning_lead_ms),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn warning_lead(&self) -> Duration {
        self.warning_lead
    }

    /// Idle time before the warning is shown.
    pub fn until_warning(&self) -> Duration {
        self.timeout - self.warning_lead
    }

    /// Countdown start value: whole seconds in the warning lead.
    pub fn countdown_seconds(&self) -> u32 {
        u32::try_from(self.warning_lead.as_secs()).unwrap_or(u32::MAX)
    }
}

impl Default for WatchdogTimings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(Self::DEFAULT_TIMEOUT_MS),
            warning_lead: Duration::from_millis(Self::DEFAULT_WARNING_LEAD_MS),
        }
    }
}

/// Render instruction for the host's warning surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningPrompt {
    /// Show (or update) the warning with the current countdown.
    Visible { seconds_remaining: u32 },
    /// Hide the warning.
    Hidden,
}

/// Read-only view of the watchdog for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WatchdogSnapshot {
    pub phase: Phase,

    /// Countdown value, present only while the warning is visible.
    pub seconds_remaining: Option<u32>,

    /// Timers suspended because the app is in the background.
    pub suspended: bool,

    /// The session has expired. Later starts are refused even after `stop`.
    pub terminated: bool,
}

/// Host application lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppState {
    #[default]
    Active,
    Inactive,
    Background,
}

impl AppState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Background => "background",
        }
    }

    /// Only `Active` counts as foreground; anything else suspends timers.
    pub fn is_foreground(self) -> bool {
        self == Self::Active
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "background" => Ok(Self::Background),
            other => Err(format!("Unknown app state: {other}")),
        }
    }
}
