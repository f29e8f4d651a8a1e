//! Error types for the kickstart API client, and the classification helpers
//! UI code branches on.
//!
//! # Design
//! A request either could not reach the server (`Transport`) or the server
//! answered with something other than the expected status (`HttpError`).
//! Those two are the only branch points callers need: connectivity message
//! versus "redirect to sign-in" on 401 versus the server's own message.
//! Field errors from either the server or local validation fan out to a
//! `FieldErrorSink`.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::transport::TransportError;
use crate::validate::FieldError;

pub const CONNECTIVITY_MESSAGE: &str =
    "We could not reach the server. Check your connection and try again.";
pub const GENERIC_MESSAGE: &str = "Something went wrong.";

/// Error payload the server sends with non-2xx statuses. Both fields are
/// optional; a body that is not JSON parses as the default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty", skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

/// Go encodes a nil slice as `null`.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<FieldError>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<FieldError>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ErrorBody {
    pub fn from_raw(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn summary(&self) -> &str {
        self.message.as_deref().unwrap_or("no message")
    }
}

/// Errors returned by `ApiClient` operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response reached the client.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with a status other than the operation's
    /// success status.
    #[error("HTTP {status}: {}", .body.summary())]
    HttpError { status: u16, body: ErrorBody },

    /// The request body failed local validation and was never sent.
    #[error("request has {} invalid field(s)", .0.len())]
    Validation(Vec<FieldError>),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The response body did not match the operation's response schema.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// Google sign-in was requested but no OAuth client id is configured.
    #[error("Google sign-in is not configured")]
    OAuthDisabled,
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::HttpError { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True only when the server could not be reached at all.
    pub fn is_transport_failure(&self) -> bool {
        matches!(self, ApiError::Transport(_))
    }

    /// True only for a server response with status exactly 401.
    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Banner text for this error: a fixed connectivity message for
    /// transport failures, the server's message when it sent one, and a
    /// generic fallback otherwise.
    pub fn message(&self) -> String {
        match self {
            ApiError::Transport(_) => CONNECTIVITY_MESSAGE.to_string(),
            ApiError::HttpError { body, .. } => body
                .message
                .as_deref()
                .filter(|message| !message.trim().is_empty())
                .unwrap_or(GENERIC_MESSAGE)
                .to_string(),
            ApiError::OAuthDisabled => "Google sign-in is not available.".to_string(),
            _ => GENERIC_MESSAGE.to_string(),
        }
    }

    pub fn field_errors(&self) -> &[FieldError] {
        match self {
            ApiError::HttpError { body, .. } => &body.errors,
            ApiError::Validation(errors) => errors,
            _ => &[],
        }
    }

    /// Copy every field error into `sink`, one slot per field.
    pub fn apply_field_errors<S: FieldErrorSink + ?Sized>(&self, sink: &mut S) {
        for field_error in self.field_errors() {
            sink.set_field_error(&field_error.field, &field_error.error);
        }
    }
}

/// Per-field error slots on a caller's form state.
pub trait FieldErrorSink {
    fn set_field_error(&mut self, field: &str, message: &str);
}

impl FieldErrorSink for BTreeMap<String, String> {
    fn set_field_error(&mut self, field: &str, message: &str) {
        self.insert(field.to_string(), message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_error(status: u16, body: &str) -> ApiError {
        ApiError::HttpError {
            status,
            body: ErrorBody::from_raw(body),
        }
    }

    #[test]
    fn unauthorized_only_for_401_responses() {
        assert!(http_error(401, "").is_unauthorized());
        assert!(!http_error(403, "").is_unauthorized());
        assert!(!http_error(500, "").is_unauthorized());
        assert!(!ApiError::Transport(TransportError::Timeout).is_unauthorized());
        assert!(!ApiError::Validation(Vec::new()).is_unauthorized());
    }

    #[test]
    fn transport_failure_only_for_missing_responses() {
        assert!(ApiError::Transport(TransportError::Connect("refused".into())).is_transport_failure());
        assert!(ApiError::Transport(TransportError::Cancelled).is_transport_failure());
        assert!(!http_error(401, "").is_transport_failure());
        assert!(!http_error(500, "").is_transport_failure());
        assert!(!ApiError::DeserializationError("x".into()).is_transport_failure());
    }

    #[test]
    fn null_errors_keep_the_server_message() {
        let err = http_error(
            400,
            r#"{"status":400,"message":"Email is already registered","success":false,"errors":null}"#,
        );
        assert_eq!(err.message(), "Email is already registered");
        assert!(err.field_errors().is_empty());
    }

    #[test]
    fn message_prefers_server_text() {
        assert_eq!(http_error(400, r#"{"message":"Bad credentials"}"#).message(), "Bad credentials");
        assert_eq!(http_error(400, r#"{"message":""}"#).message(), GENERIC_MESSAGE);
        assert_eq!(http_error(502, "<html>bad gateway</html>").message(), GENERIC_MESSAGE);
        assert_eq!(
            ApiError::Transport(TransportError::Timeout).message(),
            CONNECTIVITY_MESSAGE
        );
    }

    #[test]
    fn field_errors_fan_out_to_sink() {
        let err = http_error(
            400,
            r#"{"message":"Validation failed","errors":[{"field":"email","error":"Invalid email"},{"field":"password","error":"Too short"}]}"#,
        );
        let mut slots = BTreeMap::new();
        err.apply_field_errors(&mut slots);
        assert_eq!(slots.get("email").map(String::as_str), Some("Invalid email"));
        assert_eq!(slots.get("password").map(String::as_str), Some("Too short"));
    }

    #[test]
    fn transport_errors_carry_no_field_errors() {
        let mut slots = BTreeMap::new();
        ApiError::Transport(TransportError::Timeout).apply_field_errors(&mut slots);
        assert!(slots.is_empty());
    }
}
