//! API client core for the kickstart web application.
//!
//! # Overview
//! A typed client for the kickstart REST API. Every operation is described
//! once in the contract table (`contract`), built into a plain-data
//! `HttpRequest`, sent through the authenticated `Fetcher`, and parsed
//! back into a typed result or an `ApiError`.
//!
//! # Design
//! - `Fetcher` attaches the current credential to each attempt and, on a
//!   401, refreshes the session and retries, at most three attempts in all.
//!   Only a missing response surfaces as a transport failure.
//! - `ApiClient` keeps the build/parse split per operation so requests and
//!   responses can be checked without a network.
//! - `flows` holds the auth flows and the protected-route guard the UI
//!   drives, expressed as routes and form failures.
//! - DTOs are defined independently from the mock-server crate; integration
//!   tests catch schema drift.

pub mod client;
pub mod config;
pub mod contract;
pub mod credentials;
pub mod error;
pub mod fetcher;
pub mod flows;
pub mod http;
pub mod transport;
pub mod types;
pub mod validate;

pub use client::ApiClient;
pub use config::{ClientConfig, ConfigError, Environment};
pub use contract::{Contract, Endpoint, Schema, CONTRACTS};
pub use credentials::{Anonymous, CredentialSource, RefreshError, SessionCredentials, StaticToken};
pub use error::{ApiError, ErrorBody, FieldErrorSink};
pub use fetcher::{Fetcher, RetryState};
pub use http::{AuthScheme, HttpMethod, HttpRequest, HttpResponse};
pub use transport::{ReqwestTransport, Transport, TransportError};
pub use types::{
    AuthResult, AuthToken, EmptyBody, GoogleLoginRequest, HealthCheck, HealthReport, ListQuery,
    LoginRequest, OrderDirection, Paginated, RegisterRequest, StatusResponse, StoreUserRequest,
    UpdateUserRequest, User, VerifyEmailRequest,
};
pub use validate::{FieldError, Validate};
