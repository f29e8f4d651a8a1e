//! The contract registry: one declarative table describing every API
//! operation.
//!
//! # Design
//! Each `Contract` entry names the path template, method, security scheme,
//! request schema and the schema for every status the operation can
//! answer with. `Schema::check` is the runtime validator for a body; the
//! `Endpoint` marker types bind each entry to the Rust types the typed
//! client serializes and deserializes, so the compiler checks what the
//! table only describes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::http::{AuthScheme, HttpMethod, HttpResponse};
use crate::types::{
    AuthResult, EmptyBody, GoogleLoginRequest, HealthReport, LoginRequest, Paginated,
    RegisterRequest, StatusResponse, StoreUserRequest, UpdateUserRequest, User,
    VerifyEmailRequest,
};
use crate::validate::{FieldError, Validate};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ContractError {
    #[error("missing path parameter `{0}`")]
    MissingParam(String),

    #[error("status {0} is not declared by the contract")]
    UndeclaredStatus(u16),

    #[error("body does not match schema: {0}")]
    Malformed(String),

    #[error("body failed validation on {} field(s)", .0.len())]
    Invalid(Vec<FieldError>),

    #[error("expected an empty body")]
    UnexpectedBody,
}

/// Shape of a request or response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    NoBody,
    Empty,
    Register,
    Login,
    GoogleLogin,
    VerifyEmail,
    StoreUser,
    UpdateUser,
    User,
    AuthResult,
    Status,
    UserPage,
    Health,
}

impl Schema {
    /// Check `body` against this schema: it must parse as the bound type
    /// and, for request schemas, pass field validation.
    pub fn check(self, body: &str) -> Result<(), ContractError> {
        match self {
            Schema::NoBody => {
                if body.trim().is_empty() {
                    Ok(())
                } else {
                    Err(ContractError::UnexpectedBody)
                }
            }
            Schema::Empty => validated::<EmptyBody>(body),
            Schema::Register => validated::<RegisterRequest>(body),
            Schema::Login => validated::<LoginRequest>(body),
            Schema::GoogleLogin => validated::<GoogleLoginRequest>(body),
            Schema::VerifyEmail => validated::<VerifyEmailRequest>(body),
            Schema::StoreUser => validated::<StoreUserRequest>(body),
            Schema::UpdateUser => validated::<UpdateUserRequest>(body),
            Schema::User => parsed::<User>(body),
            Schema::AuthResult => parsed::<AuthResult>(body),
            Schema::Status => parsed::<StatusResponse>(body),
            Schema::UserPage => parsed::<Paginated<User>>(body),
            Schema::Health => parsed::<HealthReport>(body),
        }
    }
}

fn parsed<T: DeserializeOwned>(body: &str) -> Result<(), ContractError> {
    serde_json::from_str::<T>(body)
        .map(|_| ())
        .map_err(|e| ContractError::Malformed(e.to_string()))
}

fn validated<T: DeserializeOwned + Validate>(body: &str) -> Result<(), ContractError> {
    let value: T = serde_json::from_str(body).map_err(|e| ContractError::Malformed(e.to_string()))?;
    let errors = value.validate();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ContractError::Invalid(errors))
    }
}

/// One API operation.
#[derive(Debug)]
pub struct Contract {
    pub domain: &'static str,
    pub name: &'static str,
    pub summary: &'static str,
    pub method: HttpMethod,
    /// Path template; `:name` segments are replaced by `render_path`.
    pub path: &'static str,
    pub security: AuthScheme,
    pub body: Option<Schema>,
    pub responses: &'static [(u16, Schema)],
}

impl Contract {
    /// The first 2xx status the operation declares.
    pub fn success_status(&self) -> u16 {
        self.responses
            .iter()
            .map(|(status, _)| *status)
            .find(|status| (200..300).contains(status))
            .unwrap_or(200)
    }

    pub fn schema_for(&self, status: u16) -> Option<Schema> {
        self.responses
            .iter()
            .find(|(declared, _)| *declared == status)
            .map(|(_, schema)| *schema)
    }

    /// Substitute `:name` placeholders with percent-encoded values.
    pub fn render_path(&self, params: &[(&str, &str)]) -> Result<String, ContractError> {
        let segments = self
            .path
            .split('/')
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => params
                    .iter()
                    .find(|(key, _)| *key == name)
                    .map(|(_, value)| urlencoding::encode(value).into_owned())
                    .ok_or_else(|| ContractError::MissingParam(name.to_string())),
                None => Ok(segment.to_string()),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(segments.join("/"))
    }

    /// Validate a response against the schema declared for its status.
    pub fn validate_response(&self, response: &HttpResponse) -> Result<(), ContractError> {
        let schema = self
            .schema_for(response.status)
            .ok_or(ContractError::UndeclaredStatus(response.status))?;
        schema.check(&response.body)
    }
}

/// Success entries followed by the failure statuses every operation shares.
macro_rules! responses {
    ($($status:literal => $schema:ident),* $(,)?) => {
        &[
            $(($status, Schema::$schema),)*
            (400, Schema::Status),
            (401, Schema::Status),
            (403, Schema::Status),
            (404, Schema::Status),
            (409, Schema::Status),
            (500, Schema::Status),
        ]
    };
}

pub const GET_HEALTH: Contract = Contract {
    domain: "Health",
    name: "getHealth",
    summary: "Get health status",
    method: HttpMethod::Get,
    path: "/status",
    security: AuthScheme::None,
    body: None,
    responses: &[(200, Schema::Health), (500, Schema::Status)],
};

pub const REGISTER: Contract = Contract {
    domain: "Auth",
    name: "register",
    summary: "Register a new user",
    method: HttpMethod::Post,
    path: "/api/v1/auth/register",
    security: AuthScheme::None,
    body: Some(Schema::Register),
    responses: responses![201 => AuthResult],
};

pub const LOGIN: Contract = Contract {
    domain: "Auth",
    name: "login",
    summary: "Login with email/username and password",
    method: HttpMethod::Post,
    path: "/api/v1/auth/login",
    security: AuthScheme::None,
    body: Some(Schema::Login),
    responses: responses![200 => AuthResult],
};

pub const GOOGLE_LOGIN: Contract = Contract {
    domain: "Auth",
    name: "googleLogin",
    summary: "Login or register using Google OAuth",
    method: HttpMethod::Post,
    path: "/api/v1/auth/google",
    security: AuthScheme::None,
    body: Some(Schema::GoogleLogin),
    responses: responses![200 => AuthResult],
};

pub const VERIFY_EMAIL: Contract = Contract {
    domain: "Auth",
    name: "verifyEmail",
    summary: "Verify user email using a verification code",
    method: HttpMethod::Post,
    path: "/api/v1/auth/verify-email",
    security: AuthScheme::None,
    body: Some(Schema::VerifyEmail),
    responses: responses![200 => User],
};

pub const RESEND_VERIFICATION: Contract = Contract {
    domain: "Auth",
    name: "resendVerification",
    summary: "Send a new email verification code",
    method: HttpMethod::Post,
    path: "/api/v1/auth/resend-verification",
    security: AuthScheme::Bearer,
    body: Some(Schema::Empty),
    responses: responses![200 => Status],
};

pub const REFRESH: Contract = Contract {
    domain: "Auth",
    name: "refresh",
    summary: "Rotate the session using the refresh cookie",
    method: HttpMethod::Post,
    path: "/api/v1/auth/refresh",
    security: AuthScheme::None,
    body: Some(Schema::Empty),
    responses: responses![200 => AuthResult],
};

pub const LOGOUT: Contract = Contract {
    domain: "Auth",
    name: "logout",
    summary: "End the current session",
    method: HttpMethod::Post,
    path: "/api/v1/auth/logout",
    security: AuthScheme::None,
    body: Some(Schema::Empty),
    responses: responses![200 => Status],
};

pub const LOGOUT_ALL: Contract = Contract {
    domain: "Auth",
    name: "logoutAll",
    summary: "End every session of the current user",
    method: HttpMethod::Post,
    path: "/api/v1/auth/logout-all",
    security: AuthScheme::Bearer,
    body: Some(Schema::Empty),
    responses: responses![200 => Status],
};

pub const ME: Contract = Contract {
    domain: "Auth",
    name: "me",
    summary: "Get the signed-in user",
    method: HttpMethod::Get,
    path: "/api/v1/auth/me",
    security: AuthScheme::Bearer,
    body: None,
    responses: responses![200 => User],
};

pub const LIST_USERS: Contract = Contract {
    domain: "Users",
    name: "getMany",
    summary: "Get Many Users",
    method: HttpMethod::Get,
    path: "/api/v1/users",
    security: AuthScheme::Bearer,
    body: None,
    responses: responses![200 => UserPage],
};

pub const GET_USER: Contract = Contract {
    domain: "Users",
    name: "getById",
    summary: "Get User by ID",
    method: HttpMethod::Get,
    path: "/api/v1/users/:id",
    security: AuthScheme::Bearer,
    body: None,
    responses: responses![200 => User],
};

pub const STORE_USER: Contract = Contract {
    domain: "Users",
    name: "store",
    summary: "Store User",
    method: HttpMethod::Post,
    path: "/api/v1/users",
    security: AuthScheme::Bearer,
    body: Some(Schema::StoreUser),
    responses: responses![201 => User],
};

pub const UPDATE_USER: Contract = Contract {
    domain: "Users",
    name: "update",
    summary: "Update User",
    method: HttpMethod::Patch,
    path: "/api/v1/users/:id",
    security: AuthScheme::Bearer,
    body: Some(Schema::UpdateUser),
    responses: responses![200 => User],
};

pub const DESTROY_USER: Contract = Contract {
    domain: "Users",
    name: "destroy",
    summary: "Destroy User",
    method: HttpMethod::Delete,
    path: "/api/v1/users/:id",
    security: AuthScheme::Bearer,
    body: None,
    responses: responses![204 => NoBody],
};

pub const KILL_USER: Contract = Contract {
    domain: "Users",
    name: "kill",
    summary: "Kill User",
    method: HttpMethod::Delete,
    path: "/api/v1/users/:id/kill",
    security: AuthScheme::Bearer,
    body: None,
    responses: responses![204 => NoBody],
};

pub const RESTORE_USER: Contract = Contract {
    domain: "Users",
    name: "restore",
    summary: "Restore User",
    method: HttpMethod::Patch,
    path: "/api/v1/users/:id/restore",
    security: AuthScheme::Bearer,
    body: None,
    responses: responses![200 => User],
};

pub static CONTRACTS: &[&Contract] = &[
    &GET_HEALTH,
    &REGISTER,
    &LOGIN,
    &GOOGLE_LOGIN,
    &VERIFY_EMAIL,
    &RESEND_VERIFICATION,
    &REFRESH,
    &LOGOUT,
    &LOGOUT_ALL,
    &ME,
    &LIST_USERS,
    &GET_USER,
    &STORE_USER,
    &UPDATE_USER,
    &DESTROY_USER,
    &KILL_USER,
    &RESTORE_USER,
];

pub fn lookup(domain: &str, name: &str) -> Option<&'static Contract> {
    CONTRACTS
        .iter()
        .copied()
        .find(|contract| contract.domain == domain && contract.name == name)
}

/// Binds a contract entry to the Rust types that cross the wire.
pub trait Endpoint {
    type Body: Serialize + Validate;
    type Response: DeserializeOwned;
    const CONTRACT: &'static Contract;
}

macro_rules! endpoints {
    ($($(#[$meta:meta])* $marker:ident => $contract:ident { body: $body:ty, response: $response:ty })*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy)]
            pub struct $marker;

            impl Endpoint for $marker {
                type Body = $body;
                type Response = $response;
                const CONTRACT: &'static Contract = &$contract;
            }
        )*
    };
}

endpoints! {
    GetHealth => GET_HEALTH { body: (), response: HealthReport }
    Register => REGISTER { body: RegisterRequest, response: AuthResult }
    Login => LOGIN { body: LoginRequest, response: AuthResult }
    GoogleLogin => GOOGLE_LOGIN { body: GoogleLoginRequest, response: AuthResult }
    VerifyEmail => VERIFY_EMAIL { body: VerifyEmailRequest, response: User }
    ResendVerification => RESEND_VERIFICATION { body: EmptyBody, response: StatusResponse }
    Refresh => REFRESH { body: EmptyBody, response: AuthResult }
    Logout => LOGOUT { body: EmptyBody, response: StatusResponse }
    LogoutAll => LOGOUT_ALL { body: EmptyBody, response: StatusResponse }
    Me => ME { body: (), response: User }
    ListUsers => LIST_USERS { body: (), response: Paginated<User> }
    GetUser => GET_USER { body: (), response: User }
    StoreUser => STORE_USER { body: StoreUserRequest, response: User }
    UpdateUser => UPDATE_USER { body: UpdateUserRequest, response: User }
    /// Soft delete; reversible with `RestoreUser`.
    DestroyUser => DESTROY_USER { body: (), response: () }
    /// Permanent delete.
    KillUser => KILL_USER { body: (), response: () }
    RestoreUser => RESTORE_USER { body: (), response: User }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn every_operation_is_unique_and_has_a_success_status() {
        let mut seen = HashSet::new();
        for contract in CONTRACTS {
            assert!(seen.insert((contract.domain, contract.name)), "{}.{} listed twice", contract.domain, contract.name);
            let success = contract.success_status();
            assert!((200..300).contains(&success), "{}.{}", contract.domain, contract.name);
            assert!(contract.schema_for(success).is_some());
        }
        assert_eq!(CONTRACTS.len(), 17);
    }

    #[test]
    fn lookup_finds_by_domain_and_name() {
        let contract = lookup("Auth", "login").unwrap();
        assert_eq!(contract.path, "/api/v1/auth/login");
        assert_eq!(contract.method, HttpMethod::Post);
        assert!(lookup("Auth", "nope").is_none());
        assert!(lookup("Users", "login").is_none());
    }

    #[test]
    fn endpoint_markers_point_at_their_entries() {
        assert_eq!(<Register as Endpoint>::CONTRACT.success_status(), 201);
        assert_eq!(<DestroyUser as Endpoint>::CONTRACT.success_status(), 204);
        assert_eq!(<Me as Endpoint>::CONTRACT.security, AuthScheme::Bearer);
        assert_eq!(<GetHealth as Endpoint>::CONTRACT.security, AuthScheme::None);
    }

    #[test]
    fn render_path_substitutes_and_encodes() {
        assert_eq!(
            RESTORE_USER.render_path(&[("id", "00000000-0000-0000-0000-000000000001")]).unwrap(),
            "/api/v1/users/00000000-0000-0000-0000-000000000001/restore"
        );
        assert_eq!(GET_USER.render_path(&[("id", "a b")]).unwrap(), "/api/v1/users/a%20b");
        assert_eq!(
            GET_USER.render_path(&[]).unwrap_err(),
            ContractError::MissingParam("id".to_string())
        );
        assert_eq!(LIST_USERS.render_path(&[]).unwrap(), "/api/v1/users");
    }

    #[test]
    fn request_schemas_apply_field_rules() {
        assert!(Schema::Login.check(r#"{"identifier":"jane","password":"secret"}"#).is_ok());
        let err = Schema::Register
            .check(r#"{"email":"bad","username":"janedoe","password":"password123"}"#)
            .unwrap_err();
        assert!(matches!(err, ContractError::Invalid(ref errors) if errors[0].field == "email"));
        assert!(matches!(Schema::Login.check("[]"), Err(ContractError::Malformed(_))));
    }

    #[test]
    fn responses_are_checked_against_their_status() {
        let ok = HttpResponse::new(200, r#"{"status":200,"message":"Logged out successfully.","success":true}"#);
        assert!(LOGOUT.validate_response(&ok).is_ok());

        let wrong_shape = HttpResponse::new(200, r#"{"unexpected":true}"#);
        assert!(matches!(LOGOUT.validate_response(&wrong_shape), Err(ContractError::Malformed(_))));

        let conflict = HttpResponse::new(
            409,
            r#"{"status":409,"message":"Email is already registered","success":false}"#,
        );
        assert!(REGISTER.validate_response(&conflict).is_ok());
        assert!(STORE_USER.validate_response(&conflict).is_ok());

        let undeclared = HttpResponse::new(418, "");
        assert_eq!(LOGOUT.validate_response(&undeclared), Err(ContractError::UndeclaredStatus(418)));

        assert!(DESTROY_USER.validate_response(&HttpResponse::new(204, "")).is_ok());
        assert_eq!(
            DESTROY_USER.validate_response(&HttpResponse::new(204, "{}")),
            Err(ContractError::UnexpectedBody)
        );
    }
}
