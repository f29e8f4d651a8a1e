//! Authenticated request execution with transparent session refresh.
//!
//! # Design
//! `Fetcher::execute` resolves one logical request to exactly one
//! `HttpResponse` or one `TransportError`. A 401 triggers a credential
//! refresh and another attempt, bounded by `RetryState`: with the default
//! of two retries a request is sent at most three times. Attempts are
//! strictly sequential, so a refreshed credential is always in place before
//! the next attempt starts. Retry state lives on the stack of a single call
//! and is never shared between calls.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::credentials::CredentialSource;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{Transport, TransportError};

pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Body substituted when the server answers an error status with nothing.
pub const DEFAULT_ERROR_BODY: &str = r#"{"message":"Internal server error"}"#;

/// Attempt bookkeeping for one logical request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    max_retries: u32,
}

impl RetryState {
    pub fn new(max_retries: u32) -> Self {
        Self {
            attempt: 0,
            max_retries,
        }
    }

    /// Number of retries already taken.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.max_retries
    }

    fn advance(&mut self) {
        self.attempt += 1;
    }
}

#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
    max_retries: u32,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<dyn CredentialSource>) -> Self {
        Self {
            transport,
            credentials,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialSource> {
        &self.credentials
    }

    /// Send `request`, refreshing the session and retrying on 401.
    ///
    /// Every status the server answers with comes back as `Ok`. A 401 is
    /// returned as-is once retries are exhausted or the refresh fails.
    /// `Err` means no response was received on the current attempt, or the
    /// request was cancelled while its session was being refreshed.
    pub async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut retry = RetryState::new(self.max_retries);
        loop {
            let credential = self.credentials.credential(request.auth).await;
            let attempt = authorize(request, credential.as_deref());
            debug!(
                method = request.method.as_str(),
                path = %request.path,
                attempt = retry.attempt() + 1,
                authenticated = credential.is_some(),
                "sending request"
            );

            let response = self.transport.send(attempt).await?;
            if !(response.is_unauthorized() && retry.can_retry()) {
                return Ok(with_default_body(response));
            }

            retry.advance();
            let refreshed = self
                .credentials
                .refresh(credential.as_deref(), request.cancel.as_ref())
                .await;
            if let Err(err) = refreshed {
                if request.is_cancelled() {
                    return Err(TransportError::Cancelled);
                }
                warn!(path = %request.path, error = %err, "session refresh failed");
                return Ok(with_default_body(response));
            }
            info!(path = %request.path, retry = retry.attempt(), "session refreshed, retrying");
        }
    }
}

fn authorize(request: &HttpRequest, credential: Option<&str>) -> HttpRequest {
    let attempt = request.clone();
    match credential.and_then(|credential| request.auth.header(credential)) {
        Some((name, value)) => attempt.with_header(name, value),
        None => attempt,
    }
}

fn with_default_body(mut response: HttpResponse) -> HttpResponse {
    if !response.is_success() && response.body.trim().is_empty() {
        response.body = DEFAULT_ERROR_BODY.to_string();
    }
    response
}
