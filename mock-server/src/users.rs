use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::CurrentUser,
    error::AppError,
    model::{
        normalize_email, Checks, ListParams, Paginated, StoreUserRequest, UpdateUserRequest, User,
        UserRecord,
    },
    AppState,
};

const DEFAULT_LIMIT: u64 = 10;
const MAX_LIMIT: u64 = 100;

fn user_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, AppError> {
    let Path(id) = path?;
    Ok(id)
}

fn not_found() -> AppError {
    AppError::NotFound("User not found".to_string())
}

pub async fn list(
    State(state): State<AppState>,
    _current: CurrentUser,
    query: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Paginated<User>>, AppError> {
    let Query(params) = query?;
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let offset = params.offset.unwrap_or(0);
    let descending = match params.order_direction.as_deref() {
        None | Some("asc") => false,
        Some("desc") => true,
        Some(other) => {
            return Err(AppError::BadRequest(format!("Unsupported order_direction: {other}")))
        }
    };

    let store = state.store.read().await;
    let mut users: Vec<User> = store
        .users
        .values()
        .map(|r| r.user.clone())
        .filter(|u| u.deleted_at.is_none())
        .collect();
    match params.order_by.as_deref() {
        None | Some("created_at") => users.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
        Some("email") => users.sort_by(|a, b| a.email.cmp(&b.email)),
        Some("username") => users.sort_by(|a, b| a.username.cmp(&b.username)),
        Some(other) => return Err(AppError::BadRequest(format!("Unsupported order_by: {other}"))),
    }
    if descending {
        users.reverse();
    }

    let total = users.len() as u64;
    let data = users
        .into_iter()
        .skip(offset as usize)
        .take(limit as usize)
        .collect();
    Ok(Json(Paginated {
        status: 200,
        message: "Users retrieved".to_string(),
        success: true,
        total,
        page: offset / limit + 1,
        limit,
        total_pages: total.div_ceil(limit),
        data,
    }))
}

pub async fn show(
    State(state): State<AppState>,
    _current: CurrentUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<User>, AppError> {
    let id = user_id(path)?;
    let store = state.store.read().await;
    store.active_user(id).cloned().map(Json).ok_or_else(not_found)
}

pub async fn store(
    State(state): State<AppState>,
    _current: CurrentUser,
    payload: Result<Json<StoreUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), AppError> {
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
    let mut user = User::new(email, input.username);
    user.google_id = input.google_id;
    store.users.insert(
        user.id,
        UserRecord {
            user: user.clone(),
            password: input.password,
        },
    );
    info!(user_id = %user.id, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn update(
    State(state): State<AppState>,
    _current: CurrentUser,
    path: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<User>, AppError> {
    let id = user_id(path)?;
    let Json(input) = payload?;
    let mut checks = Checks::default();
    if let Some(email) = &input.email {
        checks.email("email", email);
    }
    if let Some(username) = &input.username {
        checks.length("username", username, 3, 50);
    }
    if let Some(password) = &input.password {
        checks.length("password", password, 8, 128);
    }
    let errors = checks.into_errors();
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let email = input.email.as_deref().map(normalize_email);
    let mut store = state.store.write().await;
    if store.active_user(id).is_none() {
        return Err(not_found());
    }
    if let Some(message) = store.conflict(email.as_deref(), input.username.as_deref(), Some(id)) {
        return Err(AppError::Conflict(message.to_string()));
    }

    let record = store.users.get_mut(&id).ok_or_else(not_found)?;
    if let Some(email) = email {
        record.user.email = email;
    }
    if let Some(username) = input.username {
        record.user.username = username;
    }
    if let Some(password) = input.password {
        record.password = password;
    }
    record.user.updated_at = Utc::now();
    Ok(Json(record.user.clone()))
}

/// Soft delete; the record stays restorable.
pub async fn destroy(
    State(state): State<AppState>,
    _current: CurrentUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let id = user_id(path)?;
    let mut store = state.store.write().await;
    let record = store
        .users
        .get_mut(&id)
        .filter(|r| r.user.deleted_at.is_none())
        .ok_or_else(not_found)?;
    record.user.deleted_at = Some(Utc::now());
    store.revoke_user(id);
    info!(user_id = %id, "user soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn kill(
    State(state): State<AppState>,
    _current: CurrentUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, AppError> {
    let id = user_id(path)?;
    let mut store = state.store.write().await;
    store.users.remove(&id).ok_or_else(not_found)?;
    store.verification_codes.remove(&id);
    store.revoke_user(id);
    info!(user_id = %id, "user permanently deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn restore(
    State(state): State<AppState>,
    _current: CurrentUser,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<User>, AppError> {
    let id = user_id(path)?;
    let mut store = state.store.write().await;
    let record = store
        .users
        .get_mut(&id)
        .filter(|r| r.user.deleted_at.is_some())
        .ok_or_else(not_found)?;
    record.user.deleted_at = None;
    record.user.updated_at = Utc::now();
    info!(user_id = %id, "user restored");
    Ok(Json(record.user.clone()))
}
