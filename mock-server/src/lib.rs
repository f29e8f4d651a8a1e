//! In-memory stand-in for the go-kickstart HTTP API.
//!
//! Serves the same routes, envelopes and cookies as the real backend so the
//! client can be exercised end to end without a database.

use std::{collections::BTreeMap, sync::Arc, time::Instant};

use axum::{
    extract::State,
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::Utc;
use tokio::{net::TcpListener, sync::RwLock};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod error;
pub mod model;
pub mod users;

use model::{HealthCheck, HealthReport, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<Store>>,
    pub environment: String,
}

impl AppState {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            store: Arc::new(RwLock::new(Store::default())),
            environment: environment.into(),
        }
    }

    /// Drop every access token while keeping refresh tokens valid, as if the
    /// short-lived tokens had all expired.
    pub async fn expire_access_tokens(&self) {
        self.store.write().await.access_tokens.clear();
    }

    /// The pending verification code for `email`, if one was issued.
    pub async fn verification_code(&self, email: &str) -> Option<String> {
        let store = self.store.read().await;
        let record = store.find_by_email(&model::normalize_email(email))?;
        store.verification_codes.get(&record.user.id).cloned()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new("development")
    }
}

pub fn router(state: AppState) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/google", post(auth::google))
        .route("/verify-email", post(auth::verify_email))
        .route("/resend-verification", post(auth::resend_verification))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/logout-all", post(auth::logout_all))
        .route("/me", get(auth::me));

    Router::new()
        .route("/status", get(health))
        .nest("/api/v1/auth", auth_routes)
        .route("/api/v1/users", get(users::list).post(users::store))
        .route(
            "/api/v1/users/{id}",
            get(users::show).patch(users::update).delete(users::destroy),
        )
        .route("/api/v1/users/{id}/kill", delete(users::kill))
        .route("/api/v1/users/{id}/restore", patch(users::restore))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(listener: TcpListener, state: AppState) -> Result<(), std::io::Error> {
    axum::serve(listener, router(state)).await
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let started = Instant::now();
    let users = state.store.read().await.users.len();
    let elapsed = started.elapsed();
    tracing::trace!(users, "health check");

    let mut checks = BTreeMap::new();
    checks.insert(
        "store".to_string(),
        HealthCheck {
            status: "healthy".to_string(),
            response_time: Some(format!("{}µs", elapsed.as_micros())),
        },
    );
    Json(HealthReport {
        status: "healthy".to_string(),
        timestamp: Utc::now(),
        environment: state.environment.clone(),
        checks,
    })
}
