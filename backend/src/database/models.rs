//! Rust structs that represent database table mappings.
//!
//! Column names follow `<table>_<field>[_pk|_fk]`. Every entity declares its
//! select, insert and update column sets independently; the `*_values`
//! methods return values in exactly the order of the matching column set.

use crate::database::statement::Value;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

pub const USERS_TABLE: &str = "users";

pub const USERS_ID: &str = "users_id_pk";
pub const USERS_USERNAME: &str = "users_username";
pub const USERS_PASSWORD_HASH: &str = "users_password_hash";
pub const USERS_EMAIL: &str = "users_email";
pub const USERS_ROLE_ID: &str = "users_roles_id_fk";
pub const USERS_ACCESS_TOKEN_SECRET: &str = "users_access_token_secret";
pub const USERS_REFRESH_TOKEN_SECRET: &str = "users_refresh_token_secret";
pub const USERS_ACCESS_TOKEN_JTI: &str = "users_access_token_jti";
pub const USERS_REFRESH_TOKEN_JTI: &str = "users_refresh_token_jti";
pub const USERS_AUTH_TIME: &str = "users_auth_time";
pub const USERS_CREATED_AT: &str = "users_created_at";
pub const USERS_UPDATED_AT: &str = "users_updated_at";

pub const ROLES_TABLE: &str = "roles";

pub const ROLES_ID: &str = "roles_id_pk";
pub const ROLES_CODE: &str = "roles_code";
pub const ROLES_NAME: &str = "roles_name";
pub const ROLES_DESCRIPTION: &str = "roles_descr";

/// A stored user row.
///
/// Secrets and the password hash are skipped on serialization so the struct
/// can be logged or returned without leaking them.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    #[sqlx(rename = "users_id_pk")]
    pub id: i64,
    #[sqlx(rename = "users_username")]
    pub username: String,
    #[serde(skip)]
    #[sqlx(rename = "users_password_hash")]
    pub password_hash: String,
    #[sqlx(rename = "users_email")]
    pub email: String,
    #[sqlx(rename = "users_roles_id_fk")]
    pub role_id: i64,
    #[serde(skip)]
    #[sqlx(rename = "users_access_token_secret")]
    pub access_token_secret: String,
    #[serde(skip)]
    #[sqlx(rename = "users_refresh_token_secret")]
    pub refresh_token_secret: String,
    #[serde(skip)]
    #[sqlx(rename = "users_access_token_jti")]
    pub access_token_jti: Option<String>,
    #[serde(skip)]
    #[sqlx(rename = "users_refresh_token_jti")]
    pub refresh_token_jti: Option<String>,
    #[sqlx(rename = "users_auth_time")]
    pub auth_time: Option<DateTime<Utc>>,
    #[sqlx(rename = "users_created_at")]
    pub created_at: DateTime<Utc>,
    #[sqlx(rename = "users_updated_at")]
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub const SELECT_COLUMNS: &'static [&'static str] = &[
        USERS_ID,
        USERS_USERNAME,
        USERS_PASSWORD_HASH,
        USERS_EMAIL,
        USERS_ROLE_ID,
        USERS_ACCESS_TOKEN_SECRET,
        USERS_REFRESH_TOKEN_SECRET,
        USERS_ACCESS_TOKEN_JTI,
        USERS_REFRESH_TOKEN_JTI,
        USERS_AUTH_TIME,
        USERS_CREATED_AT,
        USERS_UPDATED_AT,
    ];

    pub const INSERT_COLUMNS: &'static [&'static str] = &[
        USERS_USERNAME,
        USERS_PASSWORD_HASH,
        USERS_EMAIL,
        USERS_ROLE_ID,
        USERS_ACCESS_TOKEN_SECRET,
        USERS_REFRESH_TOKEN_SECRET,
        USERS_AUTH_TIME,
        USERS_CREATED_AT,
        USERS_UPDATED_AT,
    ];

    /// Generic profile update. Never touches session material.
    pub const UPDATE_COLUMNS: &'static [&'static str] =
        &[USERS_USERNAME, USERS_PASSWORD_HASH, USERS_UPDATED_AT];

    /// Logout and other session-only writes.
    pub const SESSION_COLUMNS: &'static [&'static str] = &[
        USERS_ACCESS_TOKEN_JTI,
        USERS_REFRESH_TOKEN_JTI,
        USERS_UPDATED_AT,
    ];

    /// A login writes the new session and its auth time in one statement.
    pub const LOGIN_COLUMNS: &'static [&'static str] = &[
        USERS_ACCESS_TOKEN_JTI,
        USERS_REFRESH_TOKEN_JTI,
        USERS_UPDATED_AT,
        USERS_AUTH_TIME,
    ];

    /// True while the user holds an active session.
    pub fn has_session(&self) -> bool {
        self.access_token_jti.is_some() || self.refresh_token_jti.is_some()
    }
}

/// Data for a user row that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: String,
    pub role_id: i64,
    pub access_token_secret: String,
    pub refresh_token_secret: String,
}

impl NewUser {
    pub fn insert_values(&self, now: DateTime<Utc>) -> Vec<Value> {
        vec![
            Value::Text(self.username.clone()),
            Value::Text(self.password_hash.clone()),
            Value::Text(self.email.clone()),
            Value::Int(self.role_id),
            Value::Text(self.access_token_secret.clone()),
            Value::Text(self.refresh_token_secret.clone()),
            Value::OptTime(None),
            Value::Time(now),
            Value::Time(now),
        ]
    }
}

/// Profile fields written by a generic update.
#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub username: String,
    pub password_hash: String,
}

impl UserUpdate {
    /// Carries over the current profile so only deliberately changed fields move.
    pub fn from_user(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
        }
    }

    pub fn update_values(&self, now: DateTime<Utc>) -> Vec<Value> {
        vec![
            Value::Text(self.username.clone()),
            Value::Text(self.password_hash.clone()),
            Value::Time(now),
        ]
    }
}

/// The single-slot session register of a user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionUpdate {
    pub access_token_jti: Option<String>,
    pub refresh_token_jti: Option<String>,
    /// Set on login so the auth time lands in the same write as the session.
    pub auth_time: Option<DateTime<Utc>>,
}

impl SessionUpdate {
    pub fn login(access_jti: String, refresh_jti: String, at: DateTime<Utc>) -> Self {
        Self {
            access_token_jti: Some(access_jti),
            refresh_token_jti: Some(refresh_jti),
            auth_time: Some(at),
        }
    }

    /// Clears both session identifiers.
    pub fn logout() -> Self {
        Self::default()
    }

    pub fn columns(&self) -> &'static [&'static str] {
        if self.auth_time.is_some() {
            User::LOGIN_COLUMNS
        } else {
            User::SESSION_COLUMNS
        }
    }

    pub fn session_values(&self, now: DateTime<Utc>) -> Vec<Value> {
        let mut values = vec![
            Value::OptText(self.access_token_jti.clone()),
            Value::OptText(self.refresh_token_jti.clone()),
            Value::Time(now),
        ];
        if let Some(auth_time) = self.auth_time {
            values.push(Value::Time(auth_time));
        }
        values
    }
}

/// Reference data describing what a user may do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Role {
    #[sqlx(rename = "roles_id_pk")]
    pub id: i64,
    #[sqlx(rename = "roles_code")]
    pub code: i64,
    #[sqlx(rename = "roles_name")]
    pub name: String,
    #[sqlx(rename = "roles_descr")]
    pub description: String,
}

impl Role {
    pub const SELECT_COLUMNS: &'static [&'static str] =
        &[ROLES_ID, ROLES_CODE, ROLES_NAME, ROLES_DESCRIPTION];

    pub const INSERT_COLUMNS: &'static [&'static str] =
        &[ROLES_CODE, ROLES_NAME, ROLES_DESCRIPTION];

    pub const UPDATE_COLUMNS: &'static [&'static str] = &[ROLES_NAME, ROLES_DESCRIPTION];
}

#[derive(Debug, Clone)]
pub struct NewRole {
    pub code: i64,
    pub name: String,
    pub description: String,
}

impl NewRole {
    pub fn insert_values(&self) -> Vec<Value> {
        vec![
            Value::Int(self.code),
            Value::Text(self.name.to_lowercase()),
            Value::Text(self.description.clone()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct RoleUpdate {
    pub name: String,
    pub description: String,
}

impl RoleUpdate {
    pub fn update_values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.name.to_lowercase()),
            Value::Text(self.description.clone()),
        ]
    }
}
