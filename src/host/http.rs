//! HTTP sign-out client.
//!
//! Posts a sign-out request to a configured endpoint, optionally carrying a
//! bearer token for the session being ended.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use super::AuthClient;
use crate::error::TerminationError;

/// Request body sent to the sign-out endpoint.
#[derive(Debug, Serialize)]
struct SignOutRequest<'a> {
    reason: &'a str,
}

/// Auth client that signs out over HTTP.
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpAuthClient {
    /// Build a client for `endpoint` with a per-request timeout.
    pub fn new(
        endpoint: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TerminationError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TerminationError::Dispatch(e.to_string()))?;

        Ok(Self::with_client(client, endpoint, token))
    }

    /// Use a preconfigured `reqwest` client.
    pub fn with_client(
        client: reqwest::Client,
        endpoint: impl Into<String>,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            token,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl AuthClient for HttpAuthClient {
    async fn sign_out(&self) -> Result<(), TerminationError> {
        debug!("Posting sign-out to {}", self.endpoint);

        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&SignOutRequest {
                reason: "inactivity",
            });
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TerminationError::SignOut(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TerminationError::Rejected(status.as_u16()));
        }

        info!("Signed out via {}", self.endpoint);
        Ok(())
    }
}
