//! Error taxonomy for the watchdog and its host collaborators.

use thiserror::Error;

/// Invalid timing parameters passed when starting a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Inactivity timeout must be greater than zero")]
    ZeroTimeout,

    #[error("Warning lead time must be greater than zero")]
    ZeroWarningLead,

    #[error("Warning lead time ({warning_lead_ms} ms) exceeds inactivity timeout ({timeout_ms} ms)")]
    WarningLeadExceedsTimeout { warning_lead_ms: u64, timeout_ms: u64 },
}

/// Failure while terminating an expired session.
///
/// Never propagated out of the watchdog; it is logged and the session is
/// considered expired regardless.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TerminationError {
    #[error("Sign-out request failed: {0}")]
    SignOut(String),

    #[error("Sign-out rejected with status {0}")]
    Rejected(u16),

    #[error("Failed to dispatch session termination: {0}")]
    Dispatch(String),
}
