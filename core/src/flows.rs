//! Auth flows as the UI drives them, without the UI.
//!
//! Each flow runs one API call and answers with where the user goes next
//! (`Route`) or what the form should show (`FormFailure`). The protected
//! route guard lives here too.

use std::collections::BTreeMap;

use tracing::debug;

use crate::client::ApiClient;
use crate::error::ApiError;
use crate::types::{GoogleLoginRequest, LoginRequest, RegisterRequest, User, VerifyEmailRequest};

pub const RESEND_REQUIRES_SIGN_IN: &str = "Sign in to resend a verification email.";

/// Client-side views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Home,
    Login,
    Register,
    VerifyEmail { email: Option<String> },
    Me,
    ForgotPassword,
    Health,
    NotFound,
}

impl Route {
    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Login => "/auth/login".to_string(),
            Route::Register => "/auth/register".to_string(),
            Route::VerifyEmail { email: None } => "/auth/verify-email".to_string(),
            Route::VerifyEmail { email: Some(email) } => {
                format!("/auth/verify-email?email={}", urlencoding::encode(email))
            }
            Route::Me => "/auth/me".to_string(),
            Route::ForgotPassword => "/auth/forgot-password".to_string(),
            Route::Health => "/health".to_string(),
            Route::NotFound => "/404".to_string(),
        }
    }

    /// Resolve a location (path plus optional query) to a view. Unknown
    /// paths resolve to `NotFound`.
    pub fn resolve(location: &str) -> Route {
        let (path, query) = location.split_once('?').unwrap_or((location, ""));
        match path.trim_end_matches('/') {
            "" => Route::Home,
            "/auth/login" => Route::Login,
            "/auth/register" => Route::Register,
            "/auth/verify-email" => Route::VerifyEmail {
                email: query_value(query, "email"),
            },
            "/auth/me" => Route::Me,
            "/auth/forgot-password" => Route::ForgotPassword,
            "/health" => Route::Health,
            _ => Route::NotFound,
        }
    }
}

fn query_value(query: &str, key: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .and_then(|(_, value)| urlencoding::decode(value).ok())
        .map(|value| value.into_owned())
}

/// What a form shows after a rejected submission: a banner message and
/// per-field messages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFailure {
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl From<&ApiError> for FormFailure {
    fn from(err: &ApiError) -> Self {
        let mut fields = BTreeMap::new();
        err.apply_field_errors(&mut fields);
        Self {
            message: err.message(),
            fields,
        }
    }
}

impl From<ApiError> for FormFailure {
    fn from(err: ApiError) -> Self {
        FormFailure::from(&err)
    }
}

/// Unverified accounts go to email verification first.
pub fn after_sign_in(user: &User) -> Route {
    if user.is_verified() {
        Route::Me
    } else {
        Route::VerifyEmail {
            email: Some(user.email.clone()),
        }
    }
}

pub async fn login(client: &ApiClient, input: &LoginRequest) -> Result<Route, FormFailure> {
    let result = client.login(input).await?;
    let next = after_sign_in(&result.user);
    debug!(user = %result.user.id, next = %next.path(), "signed in");
    Ok(next)
}

pub async fn register(client: &ApiClient, input: &RegisterRequest) -> Result<Route, FormFailure> {
    let result = client.register(input).await?;
    Ok(Route::VerifyEmail {
        email: Some(result.user.email),
    })
}

pub async fn google_login(client: &ApiClient, id_token: &str) -> Result<Route, FormFailure> {
    let input = GoogleLoginRequest {
        id_token: id_token.to_string(),
    };
    client.google_login(&input).await?;
    Ok(Route::Me)
}

pub async fn verify_email(client: &ApiClient, input: &VerifyEmailRequest) -> Result<Route, FormFailure> {
    client.verify_email(input).await?;
    Ok(Route::Me)
}

/// Returns the server's confirmation text.
pub async fn resend_verification(client: &ApiClient) -> Result<String, FormFailure> {
    match client.resend_verification().await {
        Ok(status) => Ok(status.message),
        Err(err) if err.is_unauthorized() => Err(FormFailure {
            message: RESEND_REQUIRES_SIGN_IN.to_string(),
            fields: BTreeMap::new(),
        }),
        Err(err) => Err(err.into()),
    }
}

pub async fn logout(client: &ApiClient) -> Result<Route, FormFailure> {
    client.logout().await?;
    Ok(Route::Login)
}

pub async fn logout_all(client: &ApiClient) -> Result<Route, FormFailure> {
    client.logout_all().await?;
    Ok(Route::Login)
}

/// Outcome of the protected-route guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Render the protected content for this user.
    Allow(User),
    /// Navigate away without rendering anything protected.
    Redirect(Route),
    /// Show this message instead of the content.
    Failed(String),
}

pub async fn require_auth(client: &ApiClient) -> Guard {
    match client.me().await {
        Ok(user) => Guard::Allow(user),
        Err(err) if err.is_unauthorized() => Guard::Redirect(Route::Login),
        Err(err) => Guard::Failed(err.message()),
    }
}
