//! Middleware for protecting authenticated routes and handling authorization.
//!
//! [`require_access_token`] validates the bearer token against the caller's
//! stored session and places an [`AuthenticatedUser`] in the request
//! extensions. [`require_admin`] must run inside it.

use crate::api::common::{ApiError, service_error_to_http};
use crate::auth::models::AuthenticatedUser;
use crate::auth::service::{AuthService, AuthSettings};
use crate::database::Database;
use crate::errors::ServiceError;
use crate::utils::context::RequestContext;
use axum::{
    extract::{Extension, Request},
    http::{HeaderMap, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Access-token authentication middleware
pub async fn require_access_token(
    Extension(db): Extension<Database>,
    Extension(settings): Extension<AuthSettings>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers()).ok_or_else(|| {
        service_error_to_http(ServiceError::unauthenticated("missing bearer token"))
    })?;

    let caller = AuthService::new(&db, &settings)
        .authenticate(&RequestContext::background(), token)
        .await
        .map_err(service_error_to_http)?;

    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}

/// Admin role authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let is_admin = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(AuthenticatedUser::is_admin)
        .ok_or_else(|| service_error_to_http(ServiceError::unauthenticated("not authenticated")))?;

    if !is_admin {
        return Err(service_error_to_http(ServiceError::permission_denied(
            "admin role required",
        )));
    }

    Ok(next.run(request).await)
}
