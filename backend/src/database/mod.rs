//! Module for database connection setup and common utilities.
//!
//! [`Database`] owns the connection pool. It establishes the pool with
//! exponential backoff, hands out only connections that answered a liveness
//! probe, and keeps a background sweep recycling connections that went stale.

use crate::errors::{AcquireError, ConnectError};
use crate::utils::context::{ContextError, RequestContext};
use anyhow::{Context, Result};
use async_trait::async_trait;
use retry::{RetryDecision, RetryPolicy};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Connection, Sqlite, SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, error, info, warn};

pub mod models;
pub mod retry;
pub mod statement;

/// Attempts made by [`Database::acquire`] before giving up.
pub const ACQUIRE_ATTEMPTS: u32 = 3;

/// Bounds on pool resources.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub min_connections: u32,
    pub max_lifetime: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
    pub health_check_period: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 20,
            min_connections: 2,
            max_lifetime: Duration::from_secs(30 * 60),
            idle_timeout: Duration::from_secs(5 * 60),
            acquire_timeout: Duration::from_secs(3),
            health_check_period: Duration::from_secs(60),
        }
    }
}

/// Liveness check a pooled connection must pass before it is handed out.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn check(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error>;
}

/// Round-trips a ping to the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct Ping;

#[async_trait]
impl HealthCheck for Ping {
    async fn check(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        conn.ping().await
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool: PoolSettings,
    pub retry: RetryPolicy,
    /// Overall budget for establishing the pool, across all attempts.
    pub connect_timeout: Duration,
}

impl DatabaseSettings {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            pool: PoolSettings::default(),
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Shared handle to the connection pool. Cheap to clone.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    sweep: Arc<SweepHandle>,
}

/// Stops the health sweep once the last `Database` clone goes away.
struct SweepHandle {
    token: CancellationToken,
    _guard: DropGuard,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("size", &self.pool.size())
            .field("idle", &self.pool.num_idle())
            .finish()
    }
}

impl Database {
    /// Establishes the pool, retrying with exponential backoff.
    ///
    /// Each attempt opens the pool and probes one connection. The whole
    /// sequence is bounded by `settings.connect_timeout` and by `ctx`.
    pub async fn connect(
        settings: &DatabaseSettings,
        ctx: &RequestContext,
    ) -> Result<Self, ConnectError> {
        let options =
            SqliteConnectOptions::from_str(&settings.url).map_err(ConnectError::InvalidUrl)?;
        let ctx = ctx.with_timeout(settings.connect_timeout);
        let policy = settings.retry;

        let mut attempt = 0;
        loop {
            let error = match ctx.run(Self::open(&options, &settings.pool)).await {
                Ok(Ok(pool)) => {
                    info!(
                        url = %settings.url,
                        attempt = attempt + 1,
                        max_conns = settings.pool.max_connections,
                        "Successfully connected to database"
                    );
                    return Ok(Self::from_pool(pool, settings.pool.health_check_period));
                }
                Ok(Err(error)) => error,
                Err(ContextError::DeadlineExceeded) => {
                    error!(attempts = attempt + 1, "Database connection timeout");
                    return Err(ConnectError::Timeout {
                        attempts: attempt + 1,
                        last_error: None,
                    });
                }
                Err(ContextError::Cancelled) => return Err(ConnectError::Cancelled),
            };

            warn!(
                attempt = attempt + 1,
                max_attempts = policy.max_attempts,
                error = %error,
                "Failed to connect to database"
            );

            match policy.decide(attempt, ctx.remaining()) {
                RetryDecision::Retry(delay) => match ctx.sleep(delay).await {
                    Ok(()) => attempt += 1,
                    Err(ContextError::Cancelled) => return Err(ConnectError::Cancelled),
                    Err(ContextError::DeadlineExceeded) => {
                        error!(attempts = attempt + 1, "Database connection timeout");
                        return Err(ConnectError::Timeout {
                            attempts: attempt + 1,
                            last_error: Some(error),
                        });
                    }
                },
                RetryDecision::DeadlineExceeded => {
                    error!(attempts = attempt + 1, "Database connection timeout");
                    return Err(ConnectError::Timeout {
                        attempts: attempt + 1,
                        last_error: Some(error),
                    });
                }
                RetryDecision::Exhausted => {
                    error!(
                        max_attempts = policy.max_attempts,
                        error = %error,
                        "Failed to connect to database after retries"
                    );
                    return Err(ConnectError::Exhausted {
                        attempts: attempt + 1,
                        source: error,
                    });
                }
            }
        }
    }

    /// Opens a pool and checks that a connection answers a ping.
    async fn open(
        options: &SqliteConnectOptions,
        settings: &PoolSettings,
    ) -> Result<SqlitePool, sqlx::Error> {
        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .max_lifetime(settings.max_lifetime)
            .idle_timeout(settings.idle_timeout)
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(options.clone())
            .await?;

        let liveness = async {
            let mut conn = pool.acquire().await?;
            conn.ping().await
        };
        if let Err(error) = liveness.await {
            pool.close().await;
            return Err(error);
        }
        Ok(pool)
    }

    fn from_pool(pool: SqlitePool, health_check_period: Duration) -> Self {
        let token = CancellationToken::new();
        tokio::spawn(health_sweep(
            pool.clone(),
            health_check_period,
            token.clone(),
        ));

        Database {
            pool,
            sweep: Arc::new(SweepHandle {
                _guard: token.clone().drop_guard(),
                token,
            }),
        }
    }

    /// Hands out a connection that just answered a liveness probe.
    ///
    /// Up to [`ACQUIRE_ATTEMPTS`] acquisitions are made. An unhealthy
    /// connection goes back to the pool and is never returned. The returned
    /// connection releases itself to the pool when dropped.
    pub async fn acquire(&self, ctx: &RequestContext) -> Result<PoolConnection<Sqlite>, AcquireError> {
        self.acquire_checked(ctx, &Ping).await
    }

    /// [`Database::acquire`] with the liveness check supplied by the caller.
    pub async fn acquire_checked<H>(
        &self,
        ctx: &RequestContext,
        health: &H,
    ) -> Result<PoolConnection<Sqlite>, AcquireError>
    where
        H: HealthCheck + ?Sized,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;

            let mut conn = match ctx.run(self.pool.acquire()).await? {
                Ok(conn) => conn,
                Err(error) => {
                    warn!(
                        attempt,
                        max_attempts = ACQUIRE_ATTEMPTS,
                        error = %error,
                        "Failed to acquire connection"
                    );
                    if attempt >= ACQUIRE_ATTEMPTS {
                        return Err(AcquireError::Exhausted {
                            attempts: attempt,
                            source: error,
                        });
                    }
                    continue;
                }
            };

            match ctx.run(health.check(&mut *conn)).await? {
                Ok(()) => {
                    debug!(attempt, "Acquired healthy connection");
                    return Ok(conn);
                }
                Err(error) => {
                    warn!(
                        attempt,
                        max_attempts = ACQUIRE_ATTEMPTS,
                        error = %error,
                        "Connection is not healthy"
                    );
                    drop(conn);
                    if attempt >= ACQUIRE_ATTEMPTS {
                        return Err(AcquireError::Unhealthy {
                            attempts: attempt,
                            source: error,
                        });
                    }
                }
            }
        }
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to apply database migrations")?;
        info!("Database migrations applied");
        Ok(())
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    /// Stops the health sweep and closes the connection pool.
    pub async fn close(&self) {
        self.sweep.token.cancel();
        self.pool.close().await;
        info!("Database connection pool closed");
    }
}

/// Periodically pings one pooled connection, closing it if it fails so the
/// pool opens a fresh one.
async fn health_sweep(pool: SqlitePool, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    // The first tick completes immediately; the pool was just probed.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }
        if pool.is_closed() {
            break;
        }

        if let Some(conn) = pool.try_acquire() {
            recycle_if_unhealthy(conn, &Ping).await;
        }
    }
    debug!("Health sweep stopped");
}

/// Closes `conn` instead of returning it to the pool when it fails `health`.
/// Returns whether it was closed.
async fn recycle_if_unhealthy<H>(mut conn: PoolConnection<Sqlite>, health: &H) -> bool
where
    H: HealthCheck + ?Sized,
{
    let Err(error) = health.check(&mut *conn).await else {
        return false;
    };

    warn!(error = %error, "Health sweep found a broken connection");
    if let Err(error) = conn.detach().close().await {
        debug!(error = %error, "Closing broken connection failed");
    }
    true
}
