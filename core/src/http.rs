//! HTTP transport types shared by the fetcher, the transports and the
//! typed client.
//!
//! # Design
//! Requests and responses are plain data. The typed client builds an
//! `HttpRequest`, the `Fetcher` decorates it with a credential and hands it
//! to a `Transport`, and the resulting `HttpResponse` flows back to the
//! typed client for parsing. Only the transport touches the network.
//!
//! All fields use owned types (`String`, `Vec`) so a descriptor can be
//! cloned per attempt without lifetime concerns.

use tokio_util::sync::CancellationToken;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// How a credential is attached to an outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthScheme {
    /// Public endpoint; no credential is ever attached.
    None,
    /// `Authorization: Bearer <credential>`.
    #[default]
    Bearer,
    /// `x-service-token: <credential>`.
    Service,
}

impl AuthScheme {
    /// Header name and value carrying `credential` under this scheme.
    pub fn header(self, credential: &str) -> Option<(&'static str, String)> {
        match self {
            AuthScheme::None => None,
            AuthScheme::Bearer => Some(("authorization", format!("Bearer {credential}"))),
            AuthScheme::Service => Some(("x-service-token", credential.to_string())),
        }
    }
}

/// An HTTP request described as plain data.
///
/// Built by `ApiClient::build`. The `Fetcher` clones it for every attempt,
/// so the descriptor itself never changes once constructed.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub auth: AuthScheme,
    pub cancel: Option<CancellationToken>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: None,
            auth: AuthScheme::default(),
            cancel: None,
        }
    }

    /// Set `name` to `value`, replacing any existing header with the same
    /// name (compared case-insensitively).
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_json_body(mut self, body: String) -> Self {
        self.body = Some(body);
        self.with_header("content-type", "application/json")
    }

    pub fn with_auth(mut self, auth: AuthScheme) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}

/// An HTTP response described as plain data.
///
/// Returned for every status the server answers with, including 4xx and
/// 5xx. Only a missing response is reported as a `TransportError`.
///
/// `body` is text. Transports decode the payload as UTF-8 and replace
/// invalid sequences, so binary downloads do not survive the trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}
