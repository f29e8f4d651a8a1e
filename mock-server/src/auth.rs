use axum::{
    extract::{rejection::JsonRejection, FromRequestParts, State},
    http::{
        header::{AUTHORIZATION, COOKIE, SET_COOKIE},
        request::Parts,
        HeaderMap, StatusCode,
    },
    response::{AppendHeaders, IntoResponse},
    Json,
};
use chrono::{Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::AppError,
    model::{
        normalize_email, AuthResult, AuthToken, Checks, GoogleLoginRequest, LoginRequest,
        RegisterRequest, Session, StatusResponse, Store, User, UserRecord, VerifyEmailRequest,
    },
    AppState,
};

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
const ACCESS_TTL_MINUTES: i64 = 15;

/// The authenticated caller, resolved from a bearer token or the access
/// cookie.
pub struct CurrentUser {
    pub user: User,
    pub session: Session,
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)
            .or_else(|| cookie(&parts.headers, ACCESS_COOKIE))
            .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))?;

        let store = state.store.read().await;
        let session = *store
            .access_tokens
            .get(&token)
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))?;
        let user = store
            .active_user(session.user_id)
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))?;
        Ok(CurrentUser { user, session })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then(|| token.to_string())
}

pub fn cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}

fn session_cookies(access: &str, refresh: &str) -> AppendHeaders<[(axum::http::HeaderName, String); 2]> {
    AppendHeaders([
        (SET_COOKIE, format!("{ACCESS_COOKIE}={access}; Path=/; HttpOnly; SameSite=Lax")),
        (SET_COOKIE, format!("{REFRESH_COOKIE}={refresh}; Path=/; HttpOnly; SameSite=Lax")),
    ])
}

fn cleared_cookies() -> AppendHeaders<[(axum::http::HeaderName, String); 2]> {
    AppendHeaders([
        (SET_COOKIE, format!("{ACCESS_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")),
        (SET_COOKIE, format!("{REFRESH_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")),
    ])
}

/// Open a fresh session for `user_id` and build the response pieces.
fn sign_in(store: &mut Store, user_id: Uuid) -> Result<(AuthResult, String), AppError> {
    let session = Session {
        id: Uuid::new_v4(),
        user_id,
    };
    let (access, refresh) = store.issue_tokens(session);
    let result = auth_result(store, user_id, access)?;
    Ok((result, refresh))
}

fn auth_result(store: &Store, user_id: Uuid, access: String) -> Result<AuthResult, AppError> {
    let user = store
        .active_user(user_id)
        .cloned()
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))?;
    Ok(AuthResult {
        user,
        token: AuthToken {
            token: access,
            expires_at: Utc::now() + Duration::minutes(ACCESS_TTL_MINUTES),
        },
    })
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(input) = payload?;
    let mut checks = Checks::default();
    checks.email("email", &input.email);
    checks.length("username", &input.username, 3, 50);
    checks.length("password", &input.password, 8, 128);
    let errors = checks.into_errors();
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let email = normalize_email(&input.email);
    let mut store = state.store.write().await;
    if let Some(message) = store.conflict(Some(&email), Some(&input.username), None) {
        return Err(AppError::Conflict(message.to_string()));
    }

    let user = User::new(email, input.username);
    let user_id = user.id;
    store.users.insert(
        user_id,
        UserRecord {
            user,
            password: input.password,
        },
    );
    let code = store.issue_code(user_id);
    debug!(%user_id, %code, "issued verification code");

    let (result, refresh) = sign_in(&mut store, user_id)?;
    info!(%user_id, "registered user");
    Ok((
        StatusCode::CREATED,
        session_cookies(&result.token.token, &refresh),
        Json(result),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(input) = payload?;
    let mut checks = Checks::default();
    checks.required("identifier", &input.identifier);
    checks.required("password", &input.password);
    let errors = checks.into_errors();
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let mut store = state.store.write().await;
    let record = if input.identifier.contains('@') {
        store.find_by_email(&normalize_email(&input.identifier))
    } else {
        store.find_by_username(input.identifier.trim())
    };
    let user_id = record
        .filter(|r| r.user.deleted_at.is_none() && r.password == input.password)
        .map(|r| r.user.id)
        .ok_or_else(|| AppError::Unauthorized("Invalid credentials".to_string()))?;

    if let Some(record) = store.users.get_mut(&user_id) {
        record.user.last_login_at = Some(Utc::now());
    }
    let (result, refresh) = sign_in(&mut store, user_id)?;
    info!(%user_id, "user logged in");
    Ok((session_cookies(&result.token.token, &refresh), Json(result)))
}

/// Accepts `<subject>:<email>` in place of a real Google id token.
pub async fn google(
    State(state): State<AppState>,
    payload: Result<Json<GoogleLoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(input) = payload?;
    let (subject, email) = input
        .id_token
        .split_once(':')
        .filter(|(subject, email)| !subject.is_empty() && email.contains('@'))
        .ok_or_else(|| AppError::Unauthorized("Invalid Google token".to_string()))?;
    let email = normalize_email(email);

    let mut store = state.store.write().await;
    let existing = store
        .users
        .values()
        .find(|r| r.user.google_id.as_deref() == Some(subject) || r.user.email == email)
        .map(|r| r.user.id);

    let user_id = match existing {
        Some(id) => id,
        None => {
            let mut user = User::new(email.clone(), available_username(&store, &email));
            user.google_id = Some(subject.to_string());
            user.email_verified_at = Some(Utc::now());
            let id = user.id;
            store.users.insert(
                id,
                UserRecord {
                    user,
                    password: String::new(),
                },
            );
            id
        }
    };

    let record = store
        .users
        .get_mut(&user_id)
        .filter(|r| r.user.deleted_at.is_none())
        .ok_or_else(|| AppError::Unauthorized("Invalid Google token".to_string()))?;
    record.user.google_id = Some(subject.to_string());
    record.user.email_verified_at.get_or_insert_with(Utc::now);
    record.user.last_login_at = Some(Utc::now());

    let (result, refresh) = sign_in(&mut store, user_id)?;
    info!(%user_id, "user logged in with google");
    Ok((session_cookies(&result.token.token, &refresh), Json(result)))
}

fn available_username(store: &Store, email: &str) -> String {
    let base: String = email
        .split('@')
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    let base = if base.len() < 3 { format!("user{base}") } else { base };
    let mut candidate = base.clone();
    let mut suffix = 1;
    while store.find_by_username(&candidate).is_some() {
        suffix += 1;
        candidate = format!("{base}{suffix}");
    }
    candidate
}

pub async fn verify_email(
    State(state): State<AppState>,
    payload: Result<Json<VerifyEmailRequest>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let Json(input) = payload?;
    let mut checks = Checks::default();
    checks.email("email", &input.email);
    checks.required("code", &input.code);
    let errors = checks.into_errors();
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let mut store = state.store.write().await;
    let user_id = store
        .find_by_email(&normalize_email(&input.email))
        .map(|r| r.user.id)
        .filter(|id| store.verification_codes.get(id) == Some(&input.code))
        .ok_or_else(|| AppError::BadRequest("Invalid verification code".to_string()))?;

    store.verification_codes.remove(&user_id);
    let record = store
        .users
        .get_mut(&user_id)
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    let now = Utc::now();
    record.user.email_verified_at = Some(now);
    record.user.updated_at = now;
    info!(%user_id, "email verified");
    Ok(Json(record.user.clone()))
}

pub async fn resend_verification(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<Json<StatusResponse>, AppError> {
    if current.user.email_verified_at.is_some() {
        return Err(AppError::BadRequest("Email is already verified".to_string()));
    }
    let mut store = state.store.write().await;
    let code = store.issue_code(current.user.id);
    debug!(user_id = %current.user.id, %code, "reissued verification code");
    Ok(Json(StatusResponse::ok("Verification email sent")))
}

/// Rotates the token pair identified by the refresh cookie.
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let presented = cookie(&headers, REFRESH_COOKIE)
        .ok_or_else(|| AppError::Unauthorized("Refresh token missing".to_string()))?;

    let mut store = state.store.write().await;
    let session = store
        .refresh_tokens
        .remove(&presented)
        .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;
    store.revoke_session(session.id);
    let (access, refresh) = store.issue_tokens(session);
    let result = auth_result(&store, session.user_id, access)?;
    debug!(user_id = %session.user_id, "rotated session tokens");
    Ok((session_cookies(&result.token.token, &refresh), Json(result)))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    let mut store = state.store.write().await;
    let session = cookie(&headers, REFRESH_COOKIE)
        .and_then(|token| store.refresh_tokens.get(&token).copied())
        .or_else(|| {
            bearer_token(&headers)
                .or_else(|| cookie(&headers, ACCESS_COOKIE))
                .and_then(|token| store.access_tokens.get(&token).copied())
        });
    if let Some(session) = session {
        store.revoke_session(session.id);
        info!(user_id = %session.user_id, "session closed");
    }
    (cleared_cookies(), Json(StatusResponse::ok("Logged out successfully.")))
}

pub async fn logout_all(
    State(state): State<AppState>,
    current: CurrentUser,
) -> impl IntoResponse {
    state.store.write().await.revoke_user(current.user.id);
    info!(user_id = %current.user.id, "all sessions closed");
    (cleared_cookies(), Json(StatusResponse::ok("Logged out from all devices.")))
}

pub async fn me(current: CurrentUser) -> Json<User> {
    Json(current.user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn cookie_finds_named_pair() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("theme=dark; refresh_token=abc; access_token=xyz"));
        assert_eq!(cookie(&headers, REFRESH_COOKIE).as_deref(), Some("abc"));
        assert_eq!(cookie(&headers, ACCESS_COOKIE).as_deref(), Some("xyz"));
        assert_eq!(cookie(&headers, "missing"), None);
    }

    #[test]
    fn cleared_cookie_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("access_token="));
        assert_eq!(cookie(&headers, ACCESS_COOKIE), None);
    }

    #[test]
    fn bearer_requires_scheme_and_value() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("tok"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic tok"));
        assert_eq!(bearer_token(&headers), None);
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn generated_usernames_avoid_collisions() {
        let mut store = Store::default();
        let taken = User::new("jane@example.com".to_string(), "jane".to_string());
        store.users.insert(
            taken.id,
            UserRecord {
                user: taken,
                password: String::new(),
            },
        );
        assert_eq!(available_username(&store, "jane@other.org"), "jane2");
        assert_eq!(available_username(&store, "al@x.io"), "useral");
    }
}
