//! Handler functions for authentication-related API endpoints.
//!
//! Handlers decode the request and hand off to [`AuthService`], which checks
//! the `validator` rules. Each request gets its own root [`RequestContext`].

use crate::api::common::{ApiError, ApiResponse, service_error_to_http};
use crate::auth::models::*;
use crate::auth::service::{AuthService, AuthSettings};
use crate::database::Database;
use crate::database::models::User;
use crate::errors::ServiceError;
use crate::utils::context::RequestContext;
use axum::{
    extract::{Extension, Json, Path},
    http::StatusCode,
    response::Json as ResponseJson,
};
use serde_json::{Value, json};

/// Acting on `user_id` is reserved for that user and for admins.
fn authorize_self_or_admin(
    caller: &AuthenticatedUser,
    user_id: i64,
    action: &str,
) -> Result<(), ApiError> {
    if caller.user_id == user_id || caller.is_admin() {
        return Ok(());
    }
    Err(service_error_to_http(ServiceError::permission_denied(
        format!("cannot {action} another user"),
    )))
}

/// Handle user registration request
#[axum::debug_handler]
pub async fn register(
    Extension(db): Extension<Database>,
    Extension(settings): Extension<AuthSettings>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, ResponseJson<ApiResponse<User>>), ApiError> {
    let user = AuthService::new(&db, &settings)
        .register(&RequestContext::background(), payload)
        .await
        .map_err(service_error_to_http)?;

    Ok((
        StatusCode::CREATED,
        ResponseJson(ApiResponse::success(user, "User registered successfully")),
    ))
}

/// Handle user login request
#[axum::debug_handler]
pub async fn login(
    Extension(db): Extension<Database>,
    Extension(settings): Extension<AuthSettings>,
    Json(payload): Json<LoginRequest>,
) -> Result<ResponseJson<ApiResponse<LoginResponse>>, ApiError> {
    match AuthService::new(&db, &settings)
        .login(&RequestContext::background(), payload)
        .await
    {
        Ok(response) => Ok(ResponseJson(ApiResponse::success(
            response,
            "Login successful",
        ))),
        Err(error) => Err(service_error_to_http(error)),
    }
}

/// Handle logout request: clears the user's session server-side.
/// Allowed for the user themselves or an admin.
#[axum::debug_handler]
pub async fn logout(
    Extension(db): Extension<Database>,
    Extension(settings): Extension<AuthSettings>,
    Extension(caller): Extension<AuthenticatedUser>,
    Json(payload): Json<LogoutRequest>,
) -> Result<ResponseJson<ApiResponse<Value>>, ApiError> {
    authorize_self_or_admin(&caller, payload.user_id, "log out")?;
    AuthService::new(&db, &settings)
        .logout(&RequestContext::background(), payload.user_id)
        .await
        .map_err(service_error_to_http)?;

    Ok(ResponseJson(ApiResponse::success(
        json!({}),
        "Logged out successfully",
    )))
}

/// Handle token validation request
#[axum::debug_handler]
pub async fn validate_token(
    Extension(db): Extension<Database>,
    Extension(settings): Extension<AuthSettings>,
    Json(payload): Json<ValidateTokenRequest>,
) -> Result<ResponseJson<ApiResponse<Value>>, ApiError> {
    let user_id = AuthService::new(&db, &settings)
        .validate_token(
            &RequestContext::background(),
            &payload.token,
            &payload.token_type,
        )
        .await
        .map_err(service_error_to_http)?;

    Ok(ResponseJson(ApiResponse::success(
        json!({ "user_id": user_id }),
        "Token is valid",
    )))
}

/// Update a user's profile. Allowed for the user themselves or an admin.
#[axum::debug_handler]
pub async fn update_user(
    Extension(db): Extension<Database>,
    Extension(settings): Extension<AuthSettings>,
    Extension(caller): Extension<AuthenticatedUser>,
    Path(user_id): Path<i64>,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<ResponseJson<ApiResponse<User>>, ApiError> {
    authorize_self_or_admin(&caller, user_id, "update")?;

    let user = AuthService::new(&db, &settings)
        .update_profile(&RequestContext::background(), user_id, payload)
        .await
        .map_err(service_error_to_http)?;

    Ok(ResponseJson(ApiResponse::success(
        user,
        "User updated successfully",
    )))
}

/// Administrative delete; the admin check runs in middleware
#[axum::debug_handler]
pub async fn delete_user(
    Extension(db): Extension<Database>,
    Extension(settings): Extension<AuthSettings>,
    Path(user_id): Path<i64>,
) -> Result<ResponseJson<ApiResponse<Value>>, ApiError> {
    AuthService::new(&db, &settings)
        .delete_user(&RequestContext::background(), user_id)
        .await
        .map_err(service_error_to_http)?;

    Ok(ResponseJson(ApiResponse::success(
        json!({}),
        "User deleted successfully",
    )))
}
