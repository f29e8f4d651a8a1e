use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_verified_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_login_at: Option<DateTime<Utc>>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(email: String, username: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email,
            username,
            google_id: None,
            email_verified_at: None,
            last_login_at: None,
            is_admin: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthResult {
    pub user: User,
    pub token: AuthToken,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct GoogleLoginRequest {
    pub id_token: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreUserRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub google_id: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ListParams {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub order_by: Option<String>,
    pub order_direction: Option<String>,
    pub preloads: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusResponse {
    pub status: u16,
    pub message: String,
    pub success: bool,
}

impl StatusResponse {
    pub fn ok(message: &str) -> Self {
        Self {
            status: 200,
            message: message.to_string(),
            success: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paginated<T> {
    pub status: u16,
    pub message: String,
    pub success: bool,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
    pub data: Vec<T>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    pub checks: BTreeMap<String, HealthCheck>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: String,
    pub response_time: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

/// Collects field errors for one request body.
#[derive(Default)]
pub struct Checks(Vec<FieldError>);

impl Checks {
    fn push(&mut self, field: &str, error: &str) {
        self.0.push(FieldError {
            field: field.to_string(),
            error: error.to_string(),
        });
    }

    pub fn required(&mut self, field: &str, value: &str) {
        if value.trim().is_empty() {
            self.push(field, &format!("{field} is required"));
        }
    }

    pub fn email(&mut self, field: &str, value: &str) {
        if !looks_like_email(value) {
            self.push(field, "must be a valid email");
        }
    }

    pub fn length(&mut self, field: &str, value: &str, min: usize, max: usize) {
        let len = value.chars().count();
        if len < min || len > max {
            self.push(field, &format!("must be between {min} and {max} characters"));
        }
    }

    pub fn into_errors(self) -> Vec<FieldError> {
        self.0
    }
}

fn looks_like_email(value: &str) -> bool {
    if value.chars().any(char::is_whitespace) {
        return false;
    }
    match value.split_once('@') {
        Some((local, domain)) => !local.is_empty() && !domain.contains('@') && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub struct UserRecord {
    pub user: User,
    pub password: String,
}

#[derive(Clone, Copy, Debug)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
}

/// In-memory backing store.
#[derive(Default)]
pub struct Store {
    pub users: HashMap<Uuid, UserRecord>,
    pub access_tokens: HashMap<String, Session>,
    pub refresh_tokens: HashMap<String, Session>,
    pub verification_codes: HashMap<Uuid, String>,
}

impl Store {
    pub fn find_by_email(&self, email: &str) -> Option<&UserRecord> {
        self.users.values().find(|r| r.user.email == email)
    }

    pub fn find_by_username(&self, username: &str) -> Option<&UserRecord> {
        self.users.values().find(|r| r.user.username == username)
    }

    /// Id of a record other than `except` already using `email` or
    /// `username`.
    pub fn conflict(&self, email: Option<&str>, username: Option<&str>, except: Option<Uuid>) -> Option<&'static str> {
        for record in self.users.values().filter(|r| Some(r.user.id) != except) {
            if email == Some(record.user.email.as_str()) {
                return Some("Email is already registered");
            }
            if username == Some(record.user.username.as_str()) {
                return Some("Username is already taken");
            }
        }
        None
    }

    pub fn active_user(&self, id: Uuid) -> Option<&User> {
        self.users
            .get(&id)
            .map(|r| &r.user)
            .filter(|u| u.deleted_at.is_none())
    }

    pub fn issue_code(&mut self, user_id: Uuid) -> String {
        let code = format!("{:06}", Uuid::new_v4().as_u128() % 1_000_000);
        self.verification_codes.insert(user_id, code.clone());
        code
    }

    /// Mint an access/refresh token pair for `session`.
    pub fn issue_tokens(&mut self, session: Session) -> (String, String) {
        let access = Uuid::new_v4().simple().to_string();
        let refresh = Uuid::new_v4().simple().to_string();
        self.access_tokens.insert(access.clone(), session);
        self.refresh_tokens.insert(refresh.clone(), session);
        (access, refresh)
    }

    pub fn revoke_session(&mut self, session_id: Uuid) {
        self.access_tokens.retain(|_, s| s.id != session_id);
        self.refresh_tokens.retain(|_, s| s.id != session_id);
    }

    pub fn revoke_user(&mut self, user_id: Uuid) {
        self.access_tokens.retain(|_, s| s.user_id != user_id);
        self.refresh_tokens.retain(|_, s| s.user_id != user_id);
    }
}
