//! Request and response payloads for the authentication endpoints.
//!
//! Requests carry `validator` rules that are checked before any store access.

use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 64, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,

    #[validate(email(message = "Email must be a valid address"))]
    pub email: String,
}

/// Login request payload
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// The two tokens minted by a successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutRequest {
    pub user_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ValidateTokenRequest {
    pub token: String,

    /// `access` or `refresh`.
    pub token_type: String,
}

/// Generic profile update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 64, message = "Username must not be empty"))]
    pub username: Option<String>,

    #[validate(length(min = 1, message = "Password must not be empty"))]
    pub password: Option<String>,
}

/// The authenticated caller, placed in request extensions by the bearer middleware.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    /// Role name as stored when the request was authenticated.
    pub role: String,
}

impl AuthenticatedUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_rules_reject_blank_fields_and_bad_email() {
        let request = RegisterRequest {
            username: String::new(),
            password: "pw1".into(),
            email: "not-an-email".into(),
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
        assert!(!fields.contains_key("password"));
    }

    #[test]
    fn update_rules_only_apply_to_present_fields() {
        assert!(UpdateProfileRequest::default().validate().is_ok());
        let request = UpdateProfileRequest {
            username: Some(String::new()),
            password: None,
        };
        assert!(request.validate().is_err());
    }
}
