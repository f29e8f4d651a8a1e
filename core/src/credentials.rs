//! Credential retrieval and session refresh.
//!
//! The `Fetcher` asks its `CredentialSource` for a credential before every
//! attempt and calls `refresh` after a 401. Sources decide where the value
//! comes from; the fetcher itself never caches one.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::http::{AuthScheme, HttpMethod, HttpRequest};
use crate::transport::{Transport, TransportError};
use crate::types::{AuthResult, AuthToken};

pub const REFRESH_PATH: &str = "/api/v1/auth/refresh";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RefreshError {
    #[error("credential source cannot refresh")]
    Unsupported,

    #[error("refresh rejected with HTTP {0}")]
    Rejected(u16),

    #[error("refresh failed: {0}")]
    Transport(#[from] TransportError),

    #[error("refresh response invalid: {0}")]
    InvalidResponse(String),
}

/// Supplies the credential attached to each attempt.
///
/// Must be safe to call concurrently from independent logical requests.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Credential for the next attempt. `None` sends the request
    /// unauthenticated.
    async fn credential(&self, scheme: AuthScheme) -> Option<String>;

    /// Replace `stale`, the credential a rejected attempt carried, with a
    /// new one. `cancel` belongs to the logical request waiting on the
    /// refresh.
    async fn refresh(
        &self,
        stale: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), RefreshError>;

    /// Called with the token of a freshly established session.
    fn remember(&self, _token: &AuthToken) {}

    /// Called when the session has been ended.
    fn forget(&self) {}
}

/// Never authenticates.
#[derive(Debug, Clone, Copy, Default)]
pub struct Anonymous;

#[async_trait]
impl CredentialSource for Anonymous {
    async fn credential(&self, _scheme: AuthScheme) -> Option<String> {
        None
    }

    async fn refresh(
        &self,
        _stale: Option<&str>,
        _cancel: Option<&CancellationToken>,
    ) -> Result<(), RefreshError> {
        Err(RefreshError::Unsupported)
    }
}

/// A fixed credential, e.g. a service token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialSource for StaticToken {
    async fn credential(&self, scheme: AuthScheme) -> Option<String> {
        match scheme {
            AuthScheme::None => None,
            AuthScheme::Bearer | AuthScheme::Service => Some(self.0.clone()),
        }
    }

    async fn refresh(
        &self,
        _stale: Option<&str>,
        _cancel: Option<&CancellationToken>,
    ) -> Result<(), RefreshError> {
        Ok(())
    }
}

/// Session-backed credentials.
///
/// Holds the bearer token of the current session. `refresh` calls the
/// refresh endpoint directly on the transport; the server identifies the
/// session by its refresh cookie, which lives in the transport's cookie
/// store.
///
/// Refreshes are single-flight. The server rotates the refresh cookie on
/// every call, so a second concurrent refresh would present a consumed
/// cookie. Callers queue on `refresh_lock`, and a caller whose stale token
/// was already replaced while it waited retries with the new token
/// instead of calling the server again.
pub struct SessionCredentials {
    refresh_url: String,
    transport: Arc<dyn Transport>,
    token: RwLock<Option<String>>,
    refresh_lock: Mutex<()>,
}

impl SessionCredentials {
    pub fn new(base_url: &str, transport: Arc<dyn Transport>) -> Self {
        Self {
            refresh_url: format!("{}{REFRESH_PATH}", base_url.trim_end_matches('/')),
            transport,
            token: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Drop the cached token, but only if it is still `stale`.
    fn discard(&self, stale: Option<&str>) {
        let mut token = self.token.write();
        if token.as_deref() == stale {
            *token = None;
        }
    }

    async fn rotate(&self, cancel: Option<&CancellationToken>) -> Result<(), RefreshError> {
        let mut request = HttpRequest::new(HttpMethod::Post, self.refresh_url.as_str())
            .with_auth(AuthScheme::None)
            .with_json_body("{}".to_string());
        if let Some(cancel) = cancel {
            request = request.with_cancel(cancel.clone());
        }

        let response = self.transport.send(request).await?;
        if response.status != 200 {
            warn!(status = response.status, "session refresh rejected");
            return Err(RefreshError::Rejected(response.status));
        }

        let result: AuthResult = serde_json::from_str(&response.body)
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;
        self.remember(&result.token);
        debug!(user = %result.user.id, "session refreshed");
        Ok(())
    }
}

#[async_trait]
impl CredentialSource for SessionCredentials {
    async fn credential(&self, scheme: AuthScheme) -> Option<String> {
        match scheme {
            AuthScheme::None => None,
            AuthScheme::Bearer | AuthScheme::Service => self.token(),
        }
    }

    async fn refresh(
        &self,
        stale: Option<&str>,
        cancel: Option<&CancellationToken>,
    ) -> Result<(), RefreshError> {
        let _guard = match cancel {
            Some(cancel) => tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Cancelled.into()),
                guard = self.refresh_lock.lock() => guard,
            },
            None => self.refresh_lock.lock().await,
        };

        let current = self.token();
        if current.is_some() && current.as_deref() != stale {
            debug!("session already refreshed by a concurrent request");
            return Ok(());
        }

        let result = self.rotate(cancel).await;
        if result.is_err() {
            self.discard(stale);
        }
        result
    }

    fn remember(&self, token: &AuthToken) {
        *self.token.write() = Some(token.token.clone());
    }

    fn forget(&self) {
        *self.token.write() = None;
    }
}
