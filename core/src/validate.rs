//! Field-level validation rules applied to request bodies before they are
//! sent, and the `{field, error}` pair the server uses for the same purpose.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{
    EmptyBody, GoogleLoginRequest, LoginRequest, RegisterRequest, StoreUserRequest,
    UpdateUserRequest, VerifyEmailRequest,
};

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles"));

/// One rejected field and the message to show next to it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

impl FieldError {
    pub fn new(field: &str, error: &str) -> Self {
        Self {
            field: field.to_string(),
            error: error.to_string(),
        }
    }
}

/// A request body that can check itself. An empty result means valid.
pub trait Validate {
    fn validate(&self) -> Vec<FieldError>;
}

pub fn is_email(value: &str) -> bool {
    EMAIL.is_match(value)
}

#[derive(Default)]
struct Rules {
    errors: Vec<FieldError>,
}

impl Rules {
    fn required(&mut self, field: &str, value: &str, message: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    fn email(&mut self, field: &str, value: &str) -> &mut Self {
        if !is_email(value) {
            self.errors.push(FieldError::new(field, "Enter a valid email"));
        }
        self
    }

    fn length(&mut self, field: &str, value: &str, min: usize, max: usize, too_short: &str, too_long: &str) -> &mut Self {
        let len = value.chars().count();
        if len < min {
            self.errors.push(FieldError::new(field, too_short));
        } else if len > max {
            self.errors.push(FieldError::new(field, too_long));
        }
        self
    }

    fn username(&mut self, value: &str) -> &mut Self {
        self.length("username", value, 3, 50, "Username is too short", "Username is too long")
    }

    fn password(&mut self, value: &str) -> &mut Self {
        self.length(
            "password",
            value,
            8,
            128,
            "Password must be at least 8 characters",
            "Password is too long",
        )
    }

    fn finish(&mut self) -> Vec<FieldError> {
        std::mem::take(&mut self.errors)
    }
}

impl Validate for () {
    fn validate(&self) -> Vec<FieldError> {
        Vec::new()
    }
}

impl Validate for EmptyBody {
    fn validate(&self) -> Vec<FieldError> {
        Vec::new()
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> Vec<FieldError> {
        Rules::default()
            .required("identifier", &self.identifier, "Identifier is required")
            .required("password", &self.password, "Password is required")
            .finish()
    }
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Vec<FieldError> {
        Rules::default()
            .email("email", &self.email)
            .username(&self.username)
            .password(&self.password)
            .finish()
    }
}

impl Validate for GoogleLoginRequest {
    fn validate(&self) -> Vec<FieldError> {
        Rules::default()
            .required("idToken", &self.id_token, "Google credential is required")
            .finish()
    }
}

impl Validate for VerifyEmailRequest {
    fn validate(&self) -> Vec<FieldError> {
        Rules::default()
            .email("email", &self.email)
            .length("code", &self.code, 4, 10, "Code is too short", "Code is too long")
            .finish()
    }
}

impl Validate for StoreUserRequest {
    fn validate(&self) -> Vec<FieldError> {
        Rules::default()
            .email("email", &self.email)
            .username(&self.username)
            .password(&self.password)
            .finish()
    }
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> Vec<FieldError> {
        let mut rules = Rules::default();
        if let Some(email) = &self.email {
            rules.email("email", email);
        }
        if let Some(username) = &self.username {
            rules.username(username);
        }
        if let Some(password) = &self.password {
            rules.password(password);
        }
        rules.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_requires_both_fields() {
        let errors = LoginRequest {
            identifier: " ".to_string(),
            password: String::new(),
        }
        .validate();
        assert_eq!(
            errors,
            vec![
                FieldError::new("identifier", "Identifier is required"),
                FieldError::new("password", "Password is required"),
            ]
        );
    }

    #[test]
    fn register_checks_email_and_lengths() {
        let errors = RegisterRequest {
            email: "not-an-email".to_string(),
            username: "ab".to_string(),
            password: "short".to_string(),
        }
        .validate();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["email", "username", "password"]);
        assert_eq!(errors[2].error, "Password must be at least 8 characters");
    }

    #[test]
    fn valid_register_passes() {
        let errors = RegisterRequest {
            email: "jane@example.com".to_string(),
            username: "janedoe".to_string(),
            password: "password123".to_string(),
        }
        .validate();
        assert!(errors.is_empty());
    }

    #[test]
    fn verify_code_bounds() {
        let short = VerifyEmailRequest {
            email: "jane@example.com".to_string(),
            code: "123".to_string(),
        };
        assert_eq!(short.validate(), vec![FieldError::new("code", "Code is too short")]);

        let long = VerifyEmailRequest {
            email: "jane@example.com".to_string(),
            code: "12345678901".to_string(),
        };
        assert_eq!(long.validate(), vec![FieldError::new("code", "Code is too long")]);
    }

    #[test]
    fn update_only_checks_present_fields() {
        assert!(UpdateUserRequest::default().validate().is_empty());
        let errors = UpdateUserRequest {
            password: Some("x".to_string()),
            ..Default::default()
        }
        .validate();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "password");
    }

    #[test]
    fn email_pattern() {
        assert!(is_email("a@b.co"));
        assert!(!is_email("a@b"));
        assert!(!is_email("a b@c.io"));
    }
}
