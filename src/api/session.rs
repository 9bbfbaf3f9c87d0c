//! Session capability consumed by the brokerage clients.
//!
//! How a token is obtained (request-token exchange, browser login, TOTP) is
//! the provider's business; the clients only need the token string.

use std::time::Duration;

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use tracing::{info, warn};

use crate::error::{CopierError, CopierResult};

/// An authenticated session for one brokerage API.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Short label for logs ("kite", "xts-interactive", ...).
    fn name(&self) -> &str;

    async fn obtain_session(&self) -> CopierResult<SessionToken>;
}

/// Provider for a token issued out of band and passed in via configuration.
pub struct StaticSession {
    name: String,
    token: Option<String>,
}

impl StaticSession {
    pub fn new(name: impl Into<String>, token: Option<String>) -> Self {
        Self {
            name: name.into(),
            token,
        }
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    fn name(&self) -> &str {
        &self.name
    }

    async fn obtain_session(&self) -> CopierResult<SessionToken> {
        match self.token.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => Ok(SessionToken::new(t)),
            _ => Err(CopierError::NotConfigured(format!("no {} token", self.name))),
        }
    }
}

/// Obtain a session, retrying with exponential backoff for up to `max_elapsed`.
///
/// `NotConfigured` fails at once; any other provider error is retried.
pub async fn acquire_session(
    provider: &dyn SessionProvider,
    max_elapsed: Duration,
) -> CopierResult<SessionToken> {
    let policy = ExponentialBackoff {
        initial_interval: Duration::from_millis(500),
        max_elapsed_time: Some(max_elapsed),
        ..ExponentialBackoff::default()
    };

    let token = backoff::future::retry_notify(
        policy,
        || async {
            provider.obtain_session().await.map_err(|e| match e {
                CopierError::NotConfigured(_) => backoff::Error::permanent(e),
                e => backoff::Error::transient(e),
            })
        },
        |e: CopierError, wait: Duration| {
            warn!(provider = provider.name(), error = %e, retry_in = ?wait, "Session attempt failed");
        },
    )
    .await?;

    info!(provider = provider.name(), "Session established");
    Ok(token)
}
