//! Typed client for the kickstart API.
//!
//! # Design
//! Mirrors the contract table: `build::<E>` turns an operation and its
//! inputs into an `HttpRequest`, `parse::<E>` turns an `HttpResponse` into
//! the operation's response type, and `call::<E>` runs the request through
//! the `Fetcher` in between. The named methods are thin wrappers that also
//! keep the credential source informed about session changes.

use std::sync::Arc;

use uuid::Uuid;

use crate::config::ClientConfig;
use crate::contract::{self, Endpoint};
use crate::credentials::{CredentialSource, SessionCredentials};
use crate::error::{ApiError, ErrorBody};
use crate::fetcher::Fetcher;
use crate::http::{HttpRequest, HttpResponse};
use crate::transport::{ReqwestTransport, Transport, TransportError};
use crate::types::{
    AuthResult, EmptyBody, GoogleLoginRequest, HealthReport, ListQuery, LoginRequest, Paginated,
    RegisterRequest, StatusResponse, StoreUserRequest, UpdateUserRequest, User,
    VerifyEmailRequest,
};
use crate::validate::Validate;

/// Client handle, created once at application start and passed to whatever
/// needs API access. Cloning shares the transport and the session.
#[derive(Clone)]
pub struct ApiClient {
    config: ClientConfig,
    base_url: String,
    fetcher: Fetcher,
}

impl ApiClient {
    /// Client whose credential is the token of the current session.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let credentials = Arc::new(SessionCredentials::new(&config.base_url(), transport.clone()));
        Self::with_credentials(config, transport, credentials)
    }

    pub fn with_credentials(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            base_url: config.base_url(),
            config,
            fetcher: Fetcher::new(transport, credentials),
        }
    }

    /// Session-backed client over a fresh `ReqwestTransport`.
    pub fn connect(config: ClientConfig) -> Result<Self, TransportError> {
        let transport = ReqwestTransport::with_timeout(config.timeout)?;
        Ok(Self::new(config, Arc::new(transport)))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn build<E: Endpoint>(
        &self,
        params: &[(&str, &str)],
        query: &[(String, String)],
        body: &E::Body,
    ) -> Result<HttpRequest, ApiError> {
        let contract = E::CONTRACT;
        let path = contract
            .render_path(params)
            .map_err(|e| ApiError::SerializationError(e.to_string()))?;

        let mut url = format!("{}{path}", self.base_url);
        if !query.is_empty() {
            url.push('?');
            url.push_str(&encode_query(query));
        }

        let request = HttpRequest::new(contract.method, url).with_auth(contract.security);
        if contract.body.is_none() {
            return Ok(request);
        }

        let errors = body.validate();
        if !errors.is_empty() {
            return Err(ApiError::Validation(errors));
        }
        let json = serde_json::to_string(body).map_err(|e| ApiError::SerializationError(e.to_string()))?;
        Ok(request.with_json_body(json))
    }

    pub fn parse<E: Endpoint>(&self, response: HttpResponse) -> Result<E::Response, ApiError> {
        check_status(&response, E::CONTRACT.success_status())?;
        let raw = if response.body.trim().is_empty() {
            "null"
        } else {
            response.body.as_str()
        };
        serde_json::from_str(raw).map_err(|e| ApiError::DeserializationError(e.to_string()))
    }

    /// Run an already built request, e.g. one carrying a cancellation token.
    pub async fn send<E: Endpoint>(&self, request: HttpRequest) -> Result<E::Response, ApiError> {
        let response = self.fetcher.execute(&request).await?;
        self.parse::<E>(response)
    }

    pub async fn call<E: Endpoint>(
        &self,
        params: &[(&str, &str)],
        query: &[(String, String)],
        body: &E::Body,
    ) -> Result<E::Response, ApiError> {
        let request = self.build::<E>(params, query, body)?;
        self.send::<E>(request).await
    }

    pub async fn health(&self) -> Result<HealthReport, ApiError> {
        self.call::<contract::GetHealth>(&[], &[], &()).await
    }

    pub async fn register(&self, input: &RegisterRequest) -> Result<AuthResult, ApiError> {
        let result = self.call::<contract::Register>(&[], &[], input).await?;
        self.remember(&result);
        Ok(result)
    }

    pub async fn login(&self, input: &LoginRequest) -> Result<AuthResult, ApiError> {
        let result = self.call::<contract::Login>(&[], &[], input).await?;
        self.remember(&result);
        Ok(result)
    }

    /// Exchange a Google ID token for a session. Refused locally when no
    /// OAuth client id is configured.
    pub async fn google_login(&self, input: &GoogleLoginRequest) -> Result<AuthResult, ApiError> {
        if !self.config.google_enabled() {
            return Err(ApiError::OAuthDisabled);
        }
        let result = self.call::<contract::GoogleLogin>(&[], &[], input).await?;
        self.remember(&result);
        Ok(result)
    }

    pub async fn verify_email(&self, input: &VerifyEmailRequest) -> Result<User, ApiError> {
        self.call::<contract::VerifyEmail>(&[], &[], input).await
    }

    pub async fn resend_verification(&self) -> Result<StatusResponse, ApiError> {
        self.call::<contract::ResendVerification>(&[], &[], &EmptyBody {}).await
    }

    pub async fn refresh(&self) -> Result<AuthResult, ApiError> {
        let result = self.call::<contract::Refresh>(&[], &[], &EmptyBody {}).await?;
        self.remember(&result);
        Ok(result)
    }

    pub async fn logout(&self) -> Result<StatusResponse, ApiError> {
        let status = self.call::<contract::Logout>(&[], &[], &EmptyBody {}).await?;
        self.fetcher.credentials().forget();
        Ok(status)
    }

    pub async fn logout_all(&self) -> Result<StatusResponse, ApiError> {
        let status = self.call::<contract::LogoutAll>(&[], &[], &EmptyBody {}).await?;
        self.fetcher.credentials().forget();
        Ok(status)
    }

    pub async fn me(&self) -> Result<User, ApiError> {
        self.call::<contract::Me>(&[], &[], &()).await
    }

    pub async fn list_users(&self, query: &ListQuery) -> Result<Paginated<User>, ApiError> {
        self.call::<contract::ListUsers>(&[], &query.to_pairs(), &()).await
    }

    pub async fn get_user(&self, id: Uuid, preloads: Option<&str>) -> Result<User, ApiError> {
        let id = id.to_string();
        let query: Vec<(String, String)> = preloads
            .map(|preloads| vec![("preloads".to_string(), preloads.to_string())])
            .unwrap_or_default();
        self.call::<contract::GetUser>(&[("id", id.as_str())], &query, &()).await
    }

    pub async fn store_user(&self, input: &StoreUserRequest) -> Result<User, ApiError> {
        self.call::<contract::StoreUser>(&[], &[], input).await
    }

    pub async fn update_user(&self, id: Uuid, input: &UpdateUserRequest) -> Result<User, ApiError> {
        let id = id.to_string();
        self.call::<contract::UpdateUser>(&[("id", id.as_str())], &[], input).await
    }

    /// Soft delete.
    pub async fn destroy_user(&self, id: Uuid) -> Result<(), ApiError> {
        let id = id.to_string();
        self.call::<contract::DestroyUser>(&[("id", id.as_str())], &[], &()).await
    }

    /// Permanent delete.
    pub async fn kill_user(&self, id: Uuid) -> Result<(), ApiError> {
        let id = id.to_string();
        self.call::<contract::KillUser>(&[("id", id.as_str())], &[], &()).await
    }

    pub async fn restore_user(&self, id: Uuid) -> Result<User, ApiError> {
        let id = id.to_string();
        self.call::<contract::RestoreUser>(&[("id", id.as_str())], &[], &()).await
    }

    fn remember(&self, result: &AuthResult) {
        self.fetcher.credentials().remember(&result.token);
    }
}

/// Map anything but the expected status to `ApiError::HttpError`.
fn check_status(response: &HttpResponse, expected: u16) -> Result<(), ApiError> {
    if response.status == expected {
        return Ok(());
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: ErrorBody::from_raw(&response.body),
    })
}

fn encode_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{DestroyUser, GetHealth, ListUsers, Login, Me, Register, RestoreUser, UpdateUser};
    use crate::credentials::Anonymous;
    use crate::http::{AuthScheme, HttpMethod};
    use crate::types::OrderDirection;
    use crate::validate::FieldError;

    struct Unreachable;

    #[async_trait::async_trait]
    impl Transport for Unreachable {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Connect("connection refused".into()))
        }
    }

    fn client() -> ApiClient {
        let config = ClientConfig::new("http://localhost:3001/").unwrap();
        ApiClient::with_credentials(config, Arc::new(Unreachable), Arc::new(Anonymous))
    }

    const USER_JSON: &str = r#"{"id":"00000000-0000-0000-0000-000000000001","email":"jane@example.com","username":"janedoe","isAdmin":false,"createdAt":"2024-01-01T00:00:00Z","updatedAt":"2024-01-01T00:00:00Z"}"#;

    #[test]
    fn build_login_produces_correct_request() {
        let input = LoginRequest {
            identifier: "jane@example.com".to_string(),
            password: "password123".to_string(),
        };
        let req = client().build::<Login>(&[], &[], &input).unwrap();
        assert_eq!(req.method, HttpMethod::Post);
        assert_eq!(req.path, "http://localhost:3001/api/v1/auth/login");
        assert_eq!(req.auth, AuthScheme::None);
        assert_eq!(req.header("content-type"), Some("application/json"));
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["identifier"], "jane@example.com");
        assert_eq!(body["password"], "password123");
    }

    #[test]
    fn build_me_has_no_body_and_requires_bearer() {
        let req = client().build::<Me>(&[], &[], &()).unwrap();
        assert_eq!(req.method, HttpMethod::Get);
        assert_eq!(req.path, "http://localhost:3001/api/v1/auth/me");
        assert_eq!(req.auth, AuthScheme::Bearer);
        assert!(req.body.is_none());
        assert!(req.headers.is_empty());
    }

    #[test]
    fn build_list_users_encodes_query() {
        let query = ListQuery {
            limit: Some(10),
            offset: Some(20),
            order_by: Some("created_at".to_string()),
            order_direction: Some(OrderDirection::Asc),
            preloads: Some("sessions,roles".to_string()),
        };
        let req = client().build::<ListUsers>(&[], &query.to_pairs(), &()).unwrap();
        assert_eq!(
            req.path,
            "http://localhost:3001/api/v1/users?limit=10&offset=20&order_by=created_at&order_direction=asc&preloads=sessions%2Croles"
        );
    }

    #[test]
    fn build_update_user_renders_id() {
        let id = Uuid::nil();
        let input = UpdateUserRequest {
            username: Some("renamed".to_string()),
            ..Default::default()
        };
        let req = client().build::<UpdateUser>(&[("id", id.to_string().as_str())], &[], &input).unwrap();
        assert_eq!(req.method, HttpMethod::Patch);
        assert_eq!(req.path, "http://localhost:3001/api/v1/users/00000000-0000-0000-0000-000000000000");
        let body: serde_json::Value = serde_json::from_str(req.body.as_deref().unwrap()).unwrap();
        assert_eq!(body, serde_json::json!({ "username": "renamed" }));
    }

    #[test]
    fn build_restore_sends_no_body() {
        let req = client()
            .build::<RestoreUser>(&[("id", "00000000-0000-0000-0000-000000000000")], &[], &())
            .unwrap();
        assert_eq!(req.method, HttpMethod::Patch);
        assert!(req.body.is_none());
    }

    #[test]
    fn build_rejects_invalid_body_before_sending() {
        let input = RegisterRequest {
            email: "jane@example.com".to_string(),
            username: "jd".to_string(),
            password: "password123".to_string(),
        };
        let err = client().build::<Register>(&[], &[], &input).unwrap_err();
        match err {
            ApiError::Validation(errors) => {
                assert_eq!(errors, vec![FieldError::new("username", "Username is too short")]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn build_without_required_param_fails() {
        let err = client().build::<DestroyUser>(&[], &[], &()).unwrap_err();
        assert!(matches!(err, ApiError::SerializationError(_)));
    }

    #[test]
    fn parse_me_success() {
        let user = client().parse::<Me>(HttpResponse::new(200, USER_JSON)).unwrap();
        assert_eq!(user.username, "janedoe");
    }

    #[test]
    fn parse_me_unauthorized() {
        let err = client()
            .parse::<Me>(HttpResponse::new(401, r#"{"status":401,"message":"Unauthorized","success":false}"#))
            .unwrap_err();
        assert!(err.is_unauthorized());
        assert_eq!(err.message(), "Unauthorized");
    }

    #[test]
    fn parse_register_wrong_status() {
        let err = client()
            .parse::<Register>(HttpResponse::new(500, r#"{"message":"Internal server error"}"#))
            .unwrap_err();
        assert!(matches!(err, ApiError::HttpError { status: 500, .. }));
    }

    #[test]
    fn parse_destroy_accepts_empty_204() {
        client().parse::<DestroyUser>(HttpResponse::new(204, "")).unwrap();
    }

    #[test]
    fn parse_health_bad_json() {
        let err = client().parse::<GetHealth>(HttpResponse::new(200, "not json")).unwrap_err();
        assert!(matches!(err, ApiError::DeserializationError(_)));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_failure() {
        let err = client().me().await.unwrap_err();
        assert!(err.is_transport_failure());
        assert!(!err.is_unauthorized());
    }

    #[tokio::test]
    async fn google_login_disabled_without_client_id() {
        let err = client()
            .google_login(&GoogleLoginRequest {
                id_token: "sub:jane@example.com".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::OAuthDisabled));
    }
}
