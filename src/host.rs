//! Host collaborators the watchdog talks to.
//!
//! The watchdog renders warnings through a `WarningPresenter` and ends the
//! session through a `SessionTerminator`. The stock terminator signs out via
//! an `AuthClient` and then resets navigation to the entry route.

mod http;

use std::sync::Arc;

use async_trait::async_trait;
pub use http::HttpAuthClient;
use tracing::debug;
use tracing::error;
use tracing::info;

use crate::domain::WarningPrompt;
use crate::error::TerminationError;

/// Renders the inactivity warning.
pub trait WarningPresenter: Send {
    fn render(&mut self, prompt: WarningPrompt);
}

/// Presenter that draws nothing. For hosts that only read snapshots.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPresenter;

impl WarningPresenter for NoopPresenter {
    fn render(&mut self, _prompt: WarningPrompt) {}
}

/// Ends the current session: sign out, then return to the entry surface.
#[async_trait]
pub trait SessionTerminator: Send + Sync {
    async fn terminate(&self) -> Result<(), TerminationError>;
}

#[async_trait]
impl<T: SessionTerminator + ?Sized> SessionTerminator for Arc<T> {
    async fn terminate(&self) -> Result<(), TerminationError> {
        (**self).terminate().await
    }
}

/// Authentication provider seam.
#[async_trait]
pub trait AuthClient: Send + Sync {
    /// Sign the current user out.
    async fn sign_out(&self) -> Result<(), TerminationError>;
}

#[async_trait]
impl<A: AuthClient + ?Sized> AuthClient for Arc<A> {
    async fn sign_out(&self) -> Result<(), TerminationError> {
        (**self).sign_out().await
    }
}

/// Navigation seam.
pub trait Navigator: Send + Sync {
    /// Replace the navigation stack with a single route.
    fn reset_to(&self, route: &str);
}

impl<N: Navigator + ?Sized> Navigator for Arc<N> {
    fn reset_to(&self, route: &str) {
        (**self).reset_to(route);
    }
}

/// Auth client that only logs. Used in dry-run mode or without an endpoint.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalAuthClient {
    dry_run: bool,
}

impl LocalAuthClient {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

#[async_trait]
impl AuthClient for LocalAuthClient {
    async fn sign_out(&self) -> Result<(), TerminationError> {
        if self.dry_run {
            info!("[DRY RUN] Would sign out current session");
        } else {
            info!("Signed out local session");
        }
        Ok(())
    }
}

/// Signs out, then resets navigation to the entry route.
///
/// Navigation is only reset when sign-out succeeds.
pub struct SignOutAndReset<A, N> {
    auth: A,
    navigator: N,
    entry_route: String,
}

impl<A, N> SignOutAndReset<A, N>
where
    A: AuthClient,
    N: Navigator,
{
    pub fn new(auth: A, navigator: N, entry_route: impl Into<String>) -> Self {
        Self {
            auth,
            navigator,
            entry_route: entry_route.into(),
        }
    }
}

#[async_trait]
impl<A, N> SessionTerminator for SignOutAndReset<A, N>
where
    A: AuthClient,
    N: Navigator,
{
    async fn terminate(&self) -> Result<(), TerminationError> {
        if let Err(e) = self.auth.sign_out().await {
            error!("Failed to sign out automatically: {}", e);
            return Err(e);
        }

        debug!("Resetting navigation to '{}'", self.entry_route);
        self.navigator.reset_to(&self.entry_route);
        Ok(())
    }
}
