//! Database repository for user management operations.
//!
//! Provides CRUD operations for users plus the narrow session writes used by
//! login and logout. Every call runs under its own bounded context and on a
//! connection that just passed a health probe.

use crate::database::Database;
use crate::database::models::{
    NewUser, SessionUpdate, USERS_EMAIL, USERS_ID, USERS_TABLE, USERS_USERNAME, User,
    UserUpdate,
};
use crate::database::statement::{self, Value};
use crate::errors::{StoreError, StoreResult};
use crate::repositories::{QUERY_TIMEOUT, log_failure};
use crate::utils::context::RequestContext;
use crate::utils::jwt::{SecretResolver, SessionKey, TokenKind};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

/// Repository for user database operations.
pub struct UserRepository<'a> {
    /// Shared connection manager
    db: &'a Database,
}

impl<'a> UserRepository<'a> {
    /// Creates a new UserRepository instance.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Retrieves a user by id. `None` when no such row exists.
    pub async fn get_by_id(&self, ctx: &RequestContext, id: i64) -> StoreResult<Option<User>> {
        debug!(user_id = id, "Fetching user by ID");
        self.fetch_one_by("get user by id", ctx, USERS_ID, Value::Int(id), id)
            .await
    }

    /// Retrieves a user by username. `None` when no such row exists.
    pub async fn get_by_username(
        &self,
        ctx: &RequestContext,
        username: &str,
    ) -> StoreResult<Option<User>> {
        debug!(username, "Fetching user by username");
        self.fetch_one_by(
            "get user by username",
            ctx,
            USERS_USERNAME,
            Value::Text(username.to_owned()),
            username,
        )
        .await
    }

    /// Retrieves a user by email. `None` when no such row exists.
    pub async fn get_by_email(
        &self,
        ctx: &RequestContext,
        email: &str,
    ) -> StoreResult<Option<User>> {
        debug!(email, "Fetching user by email");
        self.fetch_one_by(
            "get user by email",
            ctx,
            USERS_EMAIL,
            Value::Text(email.to_owned()),
            email,
        )
        .await
    }

    async fn fetch_one_by(
        &self,
        operation: &'static str,
        ctx: &RequestContext,
        column: &'static str,
        value: Value,
        key: impl ToString,
    ) -> StoreResult<Option<User>> {
        let ctx = ctx.with_timeout(QUERY_TIMEOUT);
        let mut conn = self.db.acquire(&ctx).await?;

        let mut query = statement::select(USERS_TABLE, User::SELECT_COLUMNS)?;
        statement::where_eq(&mut query, column, value);

        let user = ctx
            .run(query.build_query_as::<User>().fetch_optional(&mut *conn))
            .await?
            .map_err(|error| log_failure(StoreError::query(operation, key, error)))?;

        if let Some(user) = &user {
            info!(user_id = user.id, "User fetched successfully");
        }
        Ok(user)
    }

    /// Whether any user already holds `username` or `email`.
    pub async fn exists_by_username_or_email(
        &self,
        ctx: &RequestContext,
        username: &str,
        email: &str,
    ) -> StoreResult<bool> {
        debug!(username, email, "Checking if user exists by username or email");
        let ctx = ctx.with_timeout(QUERY_TIMEOUT);
        let mut conn = self.db.acquire(&ctx).await?;

        let mut query = statement::count(USERS_TABLE);
        statement::where_any_eq(
            &mut query,
            vec![
                (USERS_USERNAME, Value::Text(username.to_owned())),
                (USERS_EMAIL, Value::Text(email.to_owned())),
            ],
        );

        let count: i64 = ctx
            .run(query.build_query_scalar::<i64>().fetch_one(&mut *conn))
            .await?
            .map_err(|error| {
                log_failure(StoreError::query(
                    "check user existence",
                    format!("{username}/{email}"),
                    error,
                ))
            })?;

        let exists = count > 0;
        if exists {
            info!(username, email, "User already exists");
        }
        Ok(exists)
    }

    /// Inserts a new user and returns the stored row.
    pub async fn insert(&self, ctx: &RequestContext, user: &NewUser) -> StoreResult<User> {
        debug!(username = %user.username, "Inserting user");
        let ctx = ctx.with_timeout(QUERY_TIMEOUT);
        let mut conn = self.db.acquire(&ctx).await?;

        let mut query =
            statement::insert(USERS_TABLE, User::INSERT_COLUMNS, user.insert_values(Utc::now()))?;
        statement::returning(&mut query, User::SELECT_COLUMNS);

        let stored = ctx
            .run(query.build_query_as::<User>().fetch_one(&mut *conn))
            .await?
            .map_err(|error| {
                log_failure(StoreError::query("insert user", &user.username, error))
            })?;

        info!(user_id = stored.id, "User inserted successfully");
        Ok(stored)
    }

    /// Generic profile update: username and password hash only.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: i64,
        update: &UserUpdate,
    ) -> StoreResult<User> {
        debug!(user_id = id, "Updating user");
        self.update_columns(
            "update user",
            ctx,
            id,
            User::UPDATE_COLUMNS,
            update.update_values(Utc::now()),
        )
        .await
    }

    /// Writes the session identifiers, and the auth time when logging in.
    ///
    /// Profile fields are outside this column set and are never rewritten.
    pub async fn update_session(
        &self,
        ctx: &RequestContext,
        id: i64,
        session: &SessionUpdate,
    ) -> StoreResult<User> {
        debug!(user_id = id, login = session.auth_time.is_some(), "Updating user session");
        self.update_columns(
            "update user session",
            ctx,
            id,
            session.columns(),
            session.session_values(Utc::now()),
        )
        .await
    }

    async fn update_columns(
        &self,
        operation: &'static str,
        ctx: &RequestContext,
        id: i64,
        columns: &[&str],
        values: Vec<Value>,
    ) -> StoreResult<User> {
        let ctx = ctx.with_timeout(QUERY_TIMEOUT);
        let mut conn = self.db.acquire(&ctx).await?;

        let mut query = statement::update(USERS_TABLE, columns, values)?;
        statement::where_eq(&mut query, USERS_ID, Value::Int(id));
        statement::returning(&mut query, User::SELECT_COLUMNS);

        let user = ctx
            .run(query.build_query_as::<User>().fetch_optional(&mut *conn))
            .await?
            .map_err(|error| log_failure(StoreError::query(operation, id, error)))?
            .ok_or_else(|| log_failure(StoreError::NotFound { entity: "user", id }))?;

        info!(user_id = id, operation, "User updated successfully");
        Ok(user)
    }

    /// Deletes a user. Reports not-found when no row was removed.
    pub async fn delete(&self, ctx: &RequestContext, id: i64) -> StoreResult<()> {
        debug!(user_id = id, "Deleting user");
        let ctx = ctx.with_timeout(QUERY_TIMEOUT);
        let mut conn = self.db.acquire(&ctx).await?;

        let mut query = statement::delete(USERS_TABLE);
        statement::where_eq(&mut query, USERS_ID, Value::Int(id));

        let result = ctx
            .run(query.build().execute(&mut *conn))
            .await?
            .map_err(|error| log_failure(StoreError::query("delete user", id, error)))?;

        if result.rows_affected() == 0 {
            return Err(log_failure(StoreError::NotFound { entity: "user", id }));
        }

        info!(user_id = id, "User deleted successfully");
        Ok(())
    }
}

#[async_trait]
impl SecretResolver for UserRepository<'_> {
    async fn resolve(
        &self,
        ctx: &RequestContext,
        user_id: i64,
        kind: TokenKind,
    ) -> StoreResult<Option<SessionKey>> {
        let key = self.get_by_id(ctx, user_id).await?.map(|user| match kind {
            TokenKind::Access => SessionKey {
                jti: user.access_token_jti,
                secret: user.access_token_secret,
            },
            TokenKind::Refresh => SessionKey {
                jti: user.refresh_token_jti,
                secret: user.refresh_token_secret,
            },
        });
        Ok(key)
    }
}
