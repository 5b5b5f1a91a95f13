//! Defines the HTTP routes specifically for authentication.
//!
//! The router expects `Extension<Database>` and `Extension<AuthSettings>`
//! layers to be added by the caller. Logout and the user routes need a
//! bearer access token.

use crate::auth::handlers::*;
use crate::auth::middleware::*;
use axum::{
    Router, middleware,
    routing::{delete, post, put},
};

/// Creates the authentication router with all auth-related routes
pub fn auth_router() -> Router {
    let authenticated = Router::new()
        .route("/logout", post(logout))
        .route(
            "/users/{id}",
            put(update_user).merge(delete(delete_user).route_layer(middleware::from_fn(require_admin))),
        )
        .route_layer(middleware::from_fn(require_access_token));

    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/validate", post(validate_token))
        .merge(authenticated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::service::AuthSettings;
    use crate::auth::service::tests::{assign_role, test_settings};
    use crate::database::Database;
    use crate::database::tests::test_database;
    use axum::Extension;
    use axum::body::Body;
    use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app(db: &Database, settings: AuthSettings) -> Router {
        Router::new()
            .nest("/auth", auth_router())
            .layer(Extension(db.clone()))
            .layer(Extension(settings))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Value,
        bearer: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn register(app: &Router, username: &str) -> i64 {
        let (status, body) = send(
            app,
            Method::POST,
            "/auth/register",
            json!({
                "username": username,
                "password": "pw1",
                "email": format!("{username}@x.com"),
            }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["data"]["id"].as_i64().unwrap()
    }

    async fn login(app: &Router, username: &str) -> (String, String) {
        let (status, body) = send(
            app,
            Method::POST,
            "/auth/login",
            json!({ "username": username, "password": "pw1" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        (
            body["data"]["access_token"].as_str().unwrap().to_string(),
            body["data"]["refresh_token"].as_str().unwrap().to_string(),
        )
    }

    #[tokio::test]
    async fn registration_and_login_status_codes() {
        let (db, _dir) = test_database().await;
        let app = app(&db, test_settings());

        let id = register(&app, "alice").await;
        assert!(id > 0);

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/register",
            json!({ "username": "alice", "password": "pw", "email": "new@x.com" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["error_type"], "already_exists");

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/register",
            json!({ "username": "carol", "password": "pw", "email": "nope" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["details"][0]["field"], "email");

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/login",
            json!({ "username": "alice", "password": "wrong" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/login",
            json!({ "username": "nobody", "password": "pw1" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn validate_then_logout_revokes_the_token() {
        let (db, _dir) = test_database().await;
        let app = app(&db, test_settings());
        let id = register(&app, "alice").await;
        let (access, refresh) = login(&app, "alice").await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/auth/validate",
            json!({ "token": access, "token_type": "access" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user_id"], id);

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/validate",
            json!({ "token": refresh, "token_type": "access" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/logout",
            json!({ "user_id": id }),
            Some(&access),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/validate",
            json!({ "token": access, "token_type": "access" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/logout",
            json!({ "user_id": id }),
            Some(&access),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn logout_needs_the_owner_or_an_admin() {
        let (db, _dir) = test_database().await;
        let app = app(&db, test_settings());
        let alice = register(&app, "alice").await;
        let root = register(&app, "root").await;
        register(&app, "bob").await;
        assign_role(&db, root, "admin").await;
        let (alice_token, _) = login(&app, "alice").await;
        let (bob_token, _) = login(&app, "bob").await;
        let (root_token, _) = login(&app, "root").await;
        let logout_alice = json!({ "user_id": alice });

        let (status, _) =
            send(&app, Method::POST, "/auth/logout", logout_alice.clone(), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/logout",
            logout_alice.clone(),
            Some(&bob_token),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/validate",
            json!({ "token": alice_token, "token_type": "access" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/logout",
            logout_alice,
            Some(&root_token),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/logout",
            json!({ "user_id": 999 }),
            Some(&root_token),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(
            &app,
            Method::POST,
            "/auth/validate",
            json!({ "token": alice_token, "token_type": "access" }),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_updates_need_the_owner_or_an_admin() {
        let (db, _dir) = test_database().await;
        let app = app(&db, test_settings());
        let alice = register(&app, "alice").await;
        register(&app, "bob").await;
        let (alice_token, _) = login(&app, "alice").await;
        let (bob_token, _) = login(&app, "bob").await;
        let uri = format!("/auth/users/{alice}");

        let (status, _) = send(&app, Method::PUT, &uri, json!({ "username": "x" }), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            Method::PUT,
            &uri,
            json!({ "username": "mallory" }),
            Some(&bob_token),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = send(
            &app,
            Method::PUT,
            &uri,
            json!({ "username": "alicia" }),
            Some(&alice_token),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["data"]["username"], "alicia");
        assert!(body["data"].get("password_hash").is_none());
        assert!(body["data"].get("access_token_secret").is_none());
    }

    #[tokio::test]
    async fn deleting_users_is_reserved_for_admins() {
        let (db, _dir) = test_database().await;
        let app = app(&db, test_settings());
        let admin = register(&app, "root").await;
        let bob = register(&app, "bob").await;

        assign_role(&db, admin, "admin").await;

        let (admin_token, _) = login(&app, "root").await;
        let (bob_token, _) = login(&app, "bob").await;
        let uri = format!("/auth/users/{bob}");

        let (status, _) = send(&app, Method::DELETE, &uri, json!({}), Some(&bob_token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&app, Method::DELETE, &uri, json!({}), Some(&admin_token)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::DELETE, &uri, json!({}), Some(&admin_token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn demoted_admins_lose_admin_routes_immediately() {
        let (db, _dir) = test_database().await;
        let app = app(&db, test_settings());
        let root = register(&app, "root").await;
        let bob = register(&app, "bob").await;
        assign_role(&db, root, "admin").await;
        let (root_token, _) = login(&app, "root").await;

        assign_role(&db, root, "user").await;

        let (status, body) = send(
            &app,
            Method::DELETE,
            &format!("/auth/users/{bob}"),
            json!({}),
            Some(&root_token),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{body}");
        assert_eq!(body["error"]["error_type"], "permission_denied");
    }
}
