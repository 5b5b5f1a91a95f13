//! Core business logic for the authentication system.
//!
//! A user's session state lives entirely in its row: two optional session
//! identifiers and the auth time. Login overwrites the identifiers, logout
//! clears them, and validation compares a token's `jti` against them. No
//! other session state is kept anywhere.

use crate::auth::models::*;
use crate::database::Database;
use crate::database::models::{NewUser, SessionUpdate, User, UserUpdate};
use crate::errors::{ServiceError, ServiceResult, StoreError};
use crate::repositories::role_repository::RoleRepository;
use crate::repositories::user_repository::UserRepository;
use crate::utils::context::RequestContext;
use crate::utils::crypto::{generate_jti, generate_secret_key};
use crate::utils::jwt::{self, TokenKind, TokenValidator, ValidationError, VerifiedToken};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use validator::Validate;

/// Budget for one orchestrated operation, nested inside the caller's context.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// Role assigned at registration.
pub const DEFAULT_ROLE: &str = "user";

#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_ttl: chrono::Duration,
    pub refresh_ttl: chrono::Duration,
    pub bcrypt_cost: u32,
}

/// Authentication service for registration, sessions and token validation
pub struct AuthService<'a> {
    db: &'a Database,
    settings: &'a AuthSettings,
}

impl<'a> AuthService<'a> {
    pub fn new(db: &'a Database, settings: &'a AuthSettings) -> Self {
        Self { db, settings }
    }

    fn users(&self) -> UserRepository<'a> {
        UserRepository::new(self.db)
    }

    fn roles(&self) -> RoleRepository<'a> {
        RoleRepository::new(self.db)
    }

    /// Creates a user with the default role and no session.
    pub async fn register(
        &self,
        ctx: &RequestContext,
        request: RegisterRequest,
    ) -> ServiceResult<User> {
        request.validate()?;
        let ctx = ctx.with_timeout(OPERATION_TIMEOUT);
        debug!(username = %request.username, "Registering user");

        let users = self.users();
        if users
            .exists_by_username_or_email(&ctx, &request.username, &request.email)
            .await
            .map_err(|e| store_error("check user existence", e))?
        {
            return Err(ServiceError::already_exists("user", request.username));
        }

        let password_hash = hash_password(request.password, self.settings.bcrypt_cost).await?;
        let access_token_secret = new_secret()?;
        let refresh_token_secret = new_secret()?;

        let role_id = self
            .roles()
            .get_id_by_name(&ctx, DEFAULT_ROLE)
            .await
            .map_err(|e| store_error("resolve default role", e))?
            .ok_or_else(|| {
                error!(role = DEFAULT_ROLE, "Default role is missing");
                ServiceError::internal("default role is not configured")
            })?;

        let new_user = NewUser {
            username: request.username,
            password_hash,
            email: request.email,
            role_id,
            access_token_secret,
            refresh_token_secret,
        };

        let user = users.insert(&ctx, &new_user).await.map_err(|e| {
            if e.is_unique_violation() {
                ServiceError::already_exists("user", &new_user.username)
            } else {
                store_error("insert user", e)
            }
        })?;

        info!(user_id = user.id, "User registered");
        Ok(user)
    }

    /// Verifies credentials and opens a new session, replacing any previous one.
    pub async fn login(
        &self,
        ctx: &RequestContext,
        request: LoginRequest,
    ) -> ServiceResult<LoginResponse> {
        request.validate()?;
        let ctx = ctx.with_timeout(OPERATION_TIMEOUT);
        debug!(username = %request.username, "Login attempt");

        let users = self.users();
        let user = users
            .get_by_username(&ctx, &request.username)
            .await
            .map_err(|e| store_error("get user by username", e))?
            .ok_or_else(|| ServiceError::not_found("user", &request.username))?;

        if !verify_password(request.password, user.password_hash.clone()).await? {
            warn!(user_id = user.id, "Login rejected: invalid credentials");
            return Err(ServiceError::unauthenticated("invalid credentials"));
        }

        let role = self
            .roles()
            .get_by_id(&ctx, user.role_id)
            .await
            .map_err(|e| store_error("get role by id", e))?
            .ok_or_else(|| ServiceError::not_found("role", user.role_id))?;

        let access_jti = generate_jti();
        let refresh_jti = generate_jti();

        let access_token = jwt::issue(
            user.id,
            TokenKind::Access,
            &role.name,
            self.settings.access_ttl,
            &user.access_token_secret,
            &access_jti,
        )
        .map_err(token_error)?;
        let refresh_token = jwt::issue(
            user.id,
            TokenKind::Refresh,
            &role.name,
            self.settings.refresh_ttl,
            &user.refresh_token_secret,
            &refresh_jti,
        )
        .map_err(token_error)?;

        users
            .update_session(
                &ctx,
                user.id,
                &SessionUpdate::login(access_jti, refresh_jti, Utc::now()),
            )
            .await
            .map_err(|e| store_error("update user session", e))?;

        info!(user_id = user.id, role = %role.name, "User logged in");
        Ok(LoginResponse {
            access_token,
            refresh_token,
        })
    }

    /// Clears the user's session; every token issued so far stops validating.
    pub async fn logout(&self, ctx: &RequestContext, user_id: i64) -> ServiceResult<()> {
        let ctx = ctx.with_timeout(OPERATION_TIMEOUT);
        debug!(user_id, "Logging out user");

        let users = self.users();
        let user = users
            .get_by_id(&ctx, user_id)
            .await
            .map_err(|e| store_error("get user by id", e))?
            .ok_or_else(|| ServiceError::not_found("user", user_id))?;
        if !user.has_session() {
            debug!(user_id, "No active session to clear");
        }

        users
            .update_session(&ctx, user_id, &SessionUpdate::logout())
            .await
            .map_err(|e| store_error("clear user session", e))?;

        info!(user_id, "User logged out");
        Ok(())
    }

    /// Validates `token` as a `token_type` token and returns its subject.
    ///
    /// Every failure is reported as `Unauthenticated`; the reason is only logged.
    pub async fn validate_token(
        &self,
        ctx: &RequestContext,
        token: &str,
        token_type: &str,
    ) -> ServiceResult<i64> {
        let kind = token_type.parse::<TokenKind>().map_err(|e| {
            debug!(error = %e, "Token validation rejected");
            ServiceError::unauthenticated("invalid token")
        })?;
        let verified = self.verify(ctx, token, kind).await?;
        Ok(verified.user_id)
    }

    /// Resolves a bearer access token to the caller it belongs to.
    ///
    /// The role comes from the store, not from the token's informational
    /// `role` claim, so a role change applies to sessions already open.
    pub async fn authenticate(
        &self,
        ctx: &RequestContext,
        token: &str,
    ) -> ServiceResult<AuthenticatedUser> {
        let verified = self.verify(ctx, token, TokenKind::Access).await?;
        let ctx = ctx.with_timeout(OPERATION_TIMEOUT);

        let user = self
            .users()
            .get_by_id(&ctx, verified.user_id)
            .await
            .map_err(|e| store_error("get user by id", e))?
            .ok_or_else(|| ServiceError::unauthenticated("invalid token"))?;
        let role = self
            .roles()
            .get_by_id(&ctx, user.role_id)
            .await
            .map_err(|e| store_error("get role by id", e))?
            .ok_or_else(|| {
                error!(user_id = user.id, role_id = user.role_id, "User references a missing role");
                ServiceError::internal("user role is not configured")
            })?;

        if role.name != verified.role {
            debug!(
                user_id = user.id,
                claimed = %verified.role,
                current = %role.name,
                "Token role claim is stale"
            );
        }

        Ok(AuthenticatedUser {
            user_id: user.id,
            role: role.name,
        })
    }

    async fn verify(
        &self,
        ctx: &RequestContext,
        token: &str,
        kind: TokenKind,
    ) -> ServiceResult<VerifiedToken> {
        let ctx = ctx.with_timeout(OPERATION_TIMEOUT);
        let validator = TokenValidator::new(self.users());

        validator
            .validate(&ctx, token, kind)
            .await
            .map_err(|e| {
                match &e {
                    ValidationError::Resolver(source) => {
                        error!(kind = %kind, error = %source, "Token validation failed: store unavailable")
                    }
                    _ => debug!(kind = %kind, error = %e, "Token validation rejected"),
                }
                ServiceError::unauthenticated("invalid token")
            })
    }

    /// Generic profile update. Session identifiers are left as they are.
    pub async fn update_profile(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        request: UpdateProfileRequest,
    ) -> ServiceResult<User> {
        request.validate()?;
        let ctx = ctx.with_timeout(OPERATION_TIMEOUT);
        debug!(user_id, "Updating user profile");

        let users = self.users();
        let user = users
            .get_by_id(&ctx, user_id)
            .await
            .map_err(|e| store_error("get user by id", e))?
            .ok_or_else(|| ServiceError::not_found("user", user_id))?;

        let mut update = UserUpdate::from_user(&user);
        if let Some(username) = request.username {
            if username != user.username {
                let taken = users
                    .get_by_username(&ctx, &username)
                    .await
                    .map_err(|e| store_error("get user by username", e))?
                    .is_some();
                if taken {
                    return Err(ServiceError::already_exists("user", username));
                }
                update.username = username;
            }
        }
        if let Some(password) = request.password {
            update.password_hash = hash_password(password, self.settings.bcrypt_cost).await?;
        }

        let updated = users.update(&ctx, user_id, &update).await.map_err(|e| {
            if e.is_unique_violation() {
                ServiceError::already_exists("user", &update.username)
            } else {
                store_error("update user", e)
            }
        })?;

        info!(user_id, "User profile updated");
        Ok(updated)
    }

    /// Administrative delete.
    pub async fn delete_user(&self, ctx: &RequestContext, user_id: i64) -> ServiceResult<()> {
        let ctx = ctx.with_timeout(OPERATION_TIMEOUT);
        self.users()
            .delete(&ctx, user_id)
            .await
            .map_err(|e| store_error("delete user", e))?;
        info!(user_id, "User deleted");
        Ok(())
    }
}

/// Collapses a store failure into the service taxonomy, logging the detail.
fn store_error(operation: &'static str, error: StoreError) -> ServiceError {
    match error {
        StoreError::NotFound { entity, id } => ServiceError::not_found(entity, id),
        error => {
            error!(operation, error = %error, retryable = error.is_retryable(), "Store operation failed");
            ServiceError::internal(format!("{operation} failed"))
        }
    }
}

fn token_error(error: jwt::TokenError) -> ServiceError {
    error!(error = %error, "Failed to issue token");
    ServiceError::internal("failed to issue token")
}

fn new_secret() -> ServiceResult<String> {
    generate_secret_key().map_err(|e| {
        error!(error = %e, "Failed to generate secret key");
        ServiceError::internal("failed to generate secret key")
    })
}

async fn hash_password(password: String, cost: u32) -> ServiceResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| {
            error!(error = %e, "Password hashing task failed");
            ServiceError::internal("failed to hash password")
        })?
        .map_err(|e| {
            error!(error = %e, "Failed to hash password");
            ServiceError::internal("failed to hash password")
        })
}

async fn verify_password(password: String, hash: String) -> ServiceResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| {
            error!(error = %e, "Password verification task failed");
            ServiceError::internal("failed to verify password")
        })?
        .map_err(|e| {
            error!(error = %e, "Failed to verify password");
            ServiceError::internal("failed to verify password")
        })
}
