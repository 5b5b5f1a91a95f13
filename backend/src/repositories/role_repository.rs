//! Database repository for role management operations.
//!
//! Roles are reference data: the auth flows only read them, while seed and
//! admin tooling may insert, rename or remove them. Names are stored and
//! matched in lowercase.

use crate::database::Database;
use crate::database::models::{
    NewRole, ROLES_CODE, ROLES_ID, ROLES_NAME, ROLES_TABLE, Role, RoleUpdate,
};
use crate::database::statement::{self, Value};
use crate::errors::{StoreError, StoreResult};
use crate::repositories::{QUERY_TIMEOUT, log_failure};
use crate::utils::context::RequestContext;
use tracing::{debug, info};

/// Repository for role database operations.
pub struct RoleRepository<'a> {
    db: &'a Database,
}

impl<'a> RoleRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Retrieves a role by its identifier.
    ///
    /// # Returns
    /// `Some(Role)` if found, `None` otherwise
    pub async fn get_by_id(&self, ctx: &RequestContext, id: i64) -> StoreResult<Option<Role>> {
        debug!(role_id = id, "Fetching role by ID");
        self.fetch_one_by("get role by id", ctx, ROLES_ID, Value::Int(id), id)
            .await
    }

    /// Retrieves a role by its (case-insensitive) name.
    pub async fn get_by_name(&self, ctx: &RequestContext, name: &str) -> StoreResult<Option<Role>> {
        let name = name.to_lowercase();
        debug!(name = %name, "Fetching role by name");
        self.fetch_one_by(
            "get role by name",
            ctx,
            ROLES_NAME,
            Value::Text(name.clone()),
            &name,
        )
        .await
    }

    /// Resolves a role name to its identifier.
    pub async fn get_id_by_name(&self, ctx: &RequestContext, name: &str) -> StoreResult<Option<i64>> {
        let name = name.to_lowercase();
        debug!(name = %name, "Fetching role ID by name");
        self.fetch_id_by("get role id by name", ctx, ROLES_NAME, Value::Text(name.clone()), &name)
            .await
    }

    /// Resolves a role code to its identifier.
    pub async fn get_id_by_code(&self, ctx: &RequestContext, code: i64) -> StoreResult<Option<i64>> {
        debug!(code, "Fetching role ID by code");
        self.fetch_id_by("get role id by code", ctx, ROLES_CODE, Value::Int(code), code)
            .await
    }

    /// Whether a role already holds this name or code.
    pub async fn exists_by_name_or_code(
        &self,
        ctx: &RequestContext,
        name: &str,
        code: i64,
    ) -> StoreResult<bool> {
        let name = name.to_lowercase();
        debug!(name = %name, code, "Checking if role exists by name or code");
        let ctx = ctx.with_timeout(QUERY_TIMEOUT);
        let mut conn = self.db.acquire(&ctx).await?;

        let mut query = statement::count(ROLES_TABLE);
        statement::where_any_eq(
            &mut query,
            vec![
                (ROLES_NAME, Value::Text(name.clone())),
                (ROLES_CODE, Value::Int(code)),
            ],
        );

        let count: i64 = ctx
            .run(query.build_query_scalar::<i64>().fetch_one(&mut *conn))
            .await?
            .map_err(|error| {
                log_failure(StoreError::query(
                    "check role existence",
                    format!("{name}/{code}"),
                    error,
                ))
            })?;

        Ok(count > 0)
    }

    async fn fetch_one_by(
        &self,
        operation: &'static str,
        ctx: &RequestContext,
        column: &'static str,
        value: Value,
        key: impl ToString,
    ) -> StoreResult<Option<Role>> {
        let ctx = ctx.with_timeout(QUERY_TIMEOUT);
        let mut conn = self.db.acquire(&ctx).await?;

        let mut query = statement::select(ROLES_TABLE, Role::SELECT_COLUMNS)?;
        statement::where_eq(&mut query, column, value);

        let role = ctx
            .run(query.build_query_as::<Role>().fetch_optional(&mut *conn))
            .await?
            .map_err(|error| log_failure(StoreError::query(operation, key, error)))?;

        if let Some(role) = &role {
            info!(role_id = role.id, "Role fetched successfully");
        }
        Ok(role)
    }

    async fn fetch_id_by(
        &self,
        operation: &'static str,
        ctx: &RequestContext,
        column: &'static str,
        value: Value,
        key: impl ToString,
    ) -> StoreResult<Option<i64>> {
        let ctx = ctx.with_timeout(QUERY_TIMEOUT);
        let mut conn = self.db.acquire(&ctx).await?;

        let mut query = statement::select(ROLES_TABLE, &[ROLES_ID])?;
        statement::where_eq(&mut query, column, value);

        let id = ctx
            .run(query.build_query_scalar::<i64>().fetch_optional(&mut *conn))
            .await?
            .map_err(|error| log_failure(StoreError::query(operation, key, error)))?;

        if let Some(id) = id {
            info!(role_id = id, "Role ID fetched successfully");
        }
        Ok(id)
    }

    pub async fn insert(&self, ctx: &RequestContext, role: &NewRole) -> StoreResult<Role> {
        debug!(code = role.code, name = %role.name, "Inserting role");
        let ctx = ctx.with_timeout(QUERY_TIMEOUT);
        let mut conn = self.db.acquire(&ctx).await?;

        let mut query = statement::insert(ROLES_TABLE, Role::INSERT_COLUMNS, role.insert_values())?;
        statement::returning(&mut query, Role::SELECT_COLUMNS);

        let stored = ctx
            .run(query.build_query_as::<Role>().fetch_one(&mut *conn))
            .await?
            .map_err(|error| log_failure(StoreError::query("insert role", &role.name, error)))?;

        info!(role_id = stored.id, "Role inserted successfully");
        Ok(stored)
    }

    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: i64,
        update: &RoleUpdate,
    ) -> StoreResult<Role> {
        debug!(role_id = id, "Updating role");
        let ctx = ctx.with_timeout(QUERY_TIMEOUT);
        let mut conn = self.db.acquire(&ctx).await?;

        let mut query =
            statement::update(ROLES_TABLE, Role::UPDATE_COLUMNS, update.update_values())?;
        statement::where_eq(&mut query, ROLES_ID, Value::Int(id));
        statement::returning(&mut query, Role::SELECT_COLUMNS);

        let role = ctx
            .run(query.build_query_as::<Role>().fetch_optional(&mut *conn))
            .await?
            .map_err(|error| log_failure(StoreError::query("update role", id, error)))?
            .ok_or_else(|| log_failure(StoreError::NotFound { entity: "role", id }))?;

        info!(role_id = id, "Role updated successfully");
        Ok(role)
    }

    /// Deletes a role. Fails with the engine's foreign-key code while users
    /// still reference it.
    pub async fn delete(&self, ctx: &RequestContext, id: i64) -> StoreResult<()> {
        debug!(role_id = id, "Deleting role");
        let ctx = ctx.with_timeout(QUERY_TIMEOUT);
        let mut conn = self.db.acquire(&ctx).await?;

        let mut query = statement::delete(ROLES_TABLE);
        statement::where_eq(&mut query, ROLES_ID, Value::Int(id));

        let result = ctx
            .run(query.build().execute(&mut *conn))
            .await?
            .map_err(|error| log_failure(StoreError::query("delete role", id, error)))?;

        if result.rows_affected() == 0 {
            return Err(log_failure(StoreError::NotFound { entity: "role", id }));
        }

        info!(role_id = id, "Role deleted successfully");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::NewUser;
    use crate::database::tests::test_database;
    use crate::repositories::user_repository::UserRepository;

    #[tokio::test]
    async fn seeded_roles_resolve_by_name_code_and_id() {
        let (db, _dir) = test_database().await;
        let repo = RoleRepository::new(&db);
        let ctx = RequestContext::background();

        let user_id = repo.get_id_by_name(&ctx, "USER").await.unwrap().unwrap();
        assert_eq!(repo.get_id_by_code(&ctx, 1).await.unwrap(), Some(user_id));

        let role = repo.get_by_id(&ctx, user_id).await.unwrap().unwrap();
        assert_eq!(role.name, "user");
        assert_eq!(role.code, 1);

        let admin = repo.get_by_name(&ctx, "Admin").await.unwrap().unwrap();
        assert_eq!(admin.code, 2);
    }

    #[tokio::test]
    async fn unknown_roles_are_absent() {
        let (db, _dir) = test_database().await;
        let repo = RoleRepository::new(&db);
        let ctx = RequestContext::background();

        assert!(repo.get_by_id(&ctx, 999).await.unwrap().is_none());
        assert!(repo.get_id_by_name(&ctx, "nobody").await.unwrap().is_none());
        assert!(repo.get_id_by_code(&ctx, 999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn existence_matches_name_or_code() {
        let (db, _dir) = test_database().await;
        let repo = RoleRepository::new(&db);
        let ctx = RequestContext::background();

        assert!(repo.exists_by_name_or_code(&ctx, "Admin", 99).await.unwrap());
        assert!(repo.exists_by_name_or_code(&ctx, "other", 1).await.unwrap());
        assert!(!repo.exists_by_name_or_code(&ctx, "other", 99).await.unwrap());
    }

    #[tokio::test]
    async fn insert_update_delete_round() {
        let (db, _dir) = test_database().await;
        let repo = RoleRepository::new(&db);
        let ctx = RequestContext::background();

        let role = repo
            .insert(
                &ctx,
                &NewRole {
                    code: 3,
                    name: "Auditor".into(),
                    description: "Read-only access".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(role.name, "auditor");

        let renamed = repo
            .update(
                &ctx,
                role.id,
                &RoleUpdate {
                    name: "Reviewer".into(),
                    description: "Reviews things".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "reviewer");
        assert_eq!(renamed.code, 3);

        repo.delete(&ctx, role.id).await.unwrap();
        let error = repo.delete(&ctx, role.id).await.expect_err("gone");
        assert!(matches!(error, StoreError::NotFound { entity: "role", .. }));
    }

    #[tokio::test]
    async fn duplicate_code_is_a_unique_violation() {
        let (db, _dir) = test_database().await;
        let repo = RoleRepository::new(&db);
        let ctx = RequestContext::background();

        let error = repo
            .insert(
                &ctx,
                &NewRole {
                    code: 1,
                    name: "shadow".into(),
                    description: String::new(),
                },
            )
            .await
            .expect_err("duplicate code");
        assert!(error.is_unique_violation(), "{error:?}");
    }

    #[tokio::test]
    async fn referenced_role_cannot_be_deleted() {
        let (db, _dir) = test_database().await;
        let repo = RoleRepository::new(&db);
        let ctx = RequestContext::background();
        let role_id = repo.get_id_by_name(&ctx, "user").await.unwrap().unwrap();

        UserRepository::new(&db)
            .insert(
                &ctx,
                &NewUser {
                    username: "alice".into(),
                    password_hash: "hash".into(),
                    email: "alice@x.com".into(),
                    role_id,
                    access_token_secret: "a".into(),
                    refresh_token_secret: "r".into(),
                },
            )
            .await
            .unwrap();

        let error = repo.delete(&ctx, role_id).await.expect_err("still referenced");
        assert!(error.code().is_some(), "{error:?}");
        assert!(!error.is_retryable());
    }
}
