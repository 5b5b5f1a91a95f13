//! Main entry point for the auth service.
//!
//! Startup order: tracing, configuration, database (fatal on failure),
//! migrations, then the Axum server until SIGINT or SIGTERM. The pool is
//! closed after the server has drained.

use anyhow::{Context, Result};
use auth_service::api::common::ApiResponse;
use auth_service::auth;
use auth_service::config::Config;
use auth_service::database::Database;
use auth_service::utils::context::RequestContext;
use axum::{Extension, Router, response::Json, routing::get};
use tracing::info;
use tracing_subscriber::fmt::init;

#[tokio::main]
async fn main() -> Result<()> {
    init();

    let config = Config::from_env().context("failed to load configuration")?;
    let auth_settings = config.auth_settings()?;

    let db = Database::connect(&config.database_settings(), &RequestContext::background())
        .await
        .context("failed to connect to database")?;
    db.migrate().await?;

    let app = Router::new()
        .route("/", get(root_handler))
        .nest("/auth", auth::routes::auth_router())
        .layer(Extension(db.clone()))
        .layer(Extension(auth_settings));

    let listener = tokio::net::TcpListener::bind(config.server_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server_addr))?;

    info!(addr = %config.server_addr, "Starting auth service");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    db.close().await;
    info!("Auth service stopped");
    Ok(())
}

async fn root_handler() -> Json<ApiResponse<serde_json::Value>> {
    Json(ApiResponse::success(
        serde_json::json!({
            "service": "auth-service",
            "version": env!("CARGO_PKG_VERSION")
        }),
        "Auth service is running",
    ))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %error, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::error!(error = %error, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
