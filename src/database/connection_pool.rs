//! Connection Pool Policy and Engines
//!
//! Two engine flavors exist per process. The pooled engine serves every
//! request-scoped session; its sizing is fixed and not negotiable at call
//! time. The administrative engine holds a single connection for one-shot
//! maintenance (migrations, schema recreation) and shares no state with the
//! pooled engine.

use crate::config::DbConfig;
use crate::error::DbError;
use serde::Serialize;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{ConnectOptions, PgPool, Postgres, Row};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Connections kept warm in the pooled engine.
pub const BASE_POOL_SIZE: u32 = 5;
/// Extra connections the pooled engine may open under load.
pub const MAX_OVERFLOW: u32 = 10;
/// How long a caller waits for a connection before `PoolExhausted`.
pub const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
/// Connections older than this are closed and replaced.
pub const RECYCLE_AFTER: Duration = Duration::from_secs(30 * 60);
/// Overflow connections idle for longer than this are closed.
pub const OVERFLOW_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Which engine a handle belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Request path, shared by all sessions.
    Pooled,
    /// Maintenance path, single connection.
    Administrative,
}

/// Pool sizing and health policy for an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolPolicy {
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
    /// Round-trip every connection before handing it out.
    pub test_before_acquire: bool,
    pub kind: EngineKind,
}

impl PoolPolicy {
    /// Policy for the request-path engine.
    ///
    /// - 5 base connections, 10 overflow (15 total)
    /// - 30s borrow timeout
    /// - recycle after 30 minutes
    /// - pre-ping on every borrow
    pub fn pooled() -> Self {
        Self {
            min_connections: BASE_POOL_SIZE,
            max_connections: BASE_POOL_SIZE + MAX_OVERFLOW,
            acquire_timeout: ACQUIRE_TIMEOUT,
            idle_timeout: OVERFLOW_IDLE_TIMEOUT,
            max_lifetime: RECYCLE_AFTER,
            test_before_acquire: true,
            kind: EngineKind::Pooled,
        }
    }

    /// Policy for the maintenance engine: one connection, nothing kept warm.
    pub fn administrative() -> Self {
        Self {
            min_connections: 0,
            max_connections: 1,
            acquire_timeout: ACQUIRE_TIMEOUT,
            idle_timeout: OVERFLOW_IDLE_TIMEOUT,
            max_lifetime: RECYCLE_AFTER,
            test_before_acquire: true,
            kind: EngineKind::Administrative,
        }
    }

    /// Number of connections allowed beyond the base pool.
    pub fn overflow(&self) -> u32 {
        self.max_connections.saturating_sub(self.min_connections)
    }

    fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout)
            .idle_timeout(self.idle_timeout)
            .max_lifetime(self.max_lifetime)
            .test_before_acquire(self.test_before_acquire)
    }
}

/// A pooled handle to the store plus the policy it was built with.
#[derive(Debug)]
pub struct Engine {
    pool: PgPool,
    policy: PoolPolicy,
    target: String,
}

impl Engine {
    /// Build an engine without opening any connection; the first borrow
    /// connects.
    pub fn connect_lazy(config: &DbConfig, policy: PoolPolicy) -> Self {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .application_name(match policy.kind {
                EngineKind::Pooled => "shared-models",
                EngineKind::Administrative => "shared-models-admin",
            });
        if !config.echo_statements {
            options = options.disable_statement_logging();
        }

        info!(
            kind = ?policy.kind,
            url = %config.redacted_url(),
            min_connections = policy.min_connections,
            max_connections = policy.max_connections,
            acquire_timeout_secs = policy.acquire_timeout.as_secs(),
            max_lifetime_secs = policy.max_lifetime.as_secs(),
            pre_ping = policy.test_before_acquire,
            "Creating database engine"
        );

        let pool = policy.pool_options().connect_lazy_with(options);
        Self {
            pool,
            policy,
            target: config.target(),
        }
    }

    /// Wrap a pool that was built elsewhere (tests, embedding applications).
    pub fn from_pool(pool: PgPool, kind: EngineKind) -> Self {
        let policy = PoolPolicy {
            min_connections: pool.options().get_min_connections(),
            max_connections: pool.options().get_max_connections(),
            acquire_timeout: pool.options().get_acquire_timeout(),
            idle_timeout: pool.options().get_idle_timeout().unwrap_or(OVERFLOW_IDLE_TIMEOUT),
            max_lifetime: pool.options().get_max_lifetime().unwrap_or(RECYCLE_AFTER),
            test_before_acquire: pool.options().get_test_before_acquire(),
            kind,
        };
        Self {
            pool,
            policy,
            target: "external pool".to_string(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn policy(&self) -> &PoolPolicy {
        &self.policy
    }

    pub fn kind(&self) -> EngineKind {
        self.policy.kind
    }

    /// `database@host:port` this engine talks to.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Borrow one connection, mapping timeouts to `PoolExhausted`.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, DbError> {
        let started = Instant::now();
        let conn = self.pool.acquire().await.map_err(|e| {
            DbError::from_acquire(e, self.policy.acquire_timeout, &self.target)
        })?;
        debug!(
            kind = ?self.policy.kind,
            waited_ms = started.elapsed().as_millis() as u64,
            "Borrowed database connection"
        );
        Ok(conn)
    }

    /// Current pool statistics.
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            kind: self.policy.kind,
            size: self.pool.size(),
            num_idle: self.pool.num_idle() as u32,
            is_closed: self.pool.is_closed(),
            min_connections: self.policy.min_connections,
            max_connections: self.policy.max_connections,
        }
    }

    /// Lightweight round trip through the pool.
    pub async fn health_check(&self) -> Result<bool, DbError> {
        let mut conn = self.acquire().await?;
        let row = sqlx::query("SELECT 1 AS health")
            .fetch_one(&mut *conn)
            .await?;
        let health: i32 = row.get("health");
        Ok(health == 1)
    }

    /// Close every connection; further borrows fail.
    pub async fn close(&self) {
        info!(kind = ?self.policy.kind, target = %self.target, "Closing database engine");
        self.pool.close().await;
    }
}

/// Pool statistics for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct PoolMetrics {
    pub kind: EngineKind,
    pub size: u32,
    pub num_idle: u32,
    pub is_closed: bool,
    pub min_connections: u32,
    pub max_connections: u32,
}

impl PoolMetrics {
    /// Connections currently lent out.
    pub fn in_use(&self) -> u32 {
        self.size.saturating_sub(self.num_idle)
    }

    /// Connections open beyond the base pool.
    pub fn overflow_in_use(&self) -> u32 {
        self.size.saturating_sub(self.min_connections)
    }

    /// Borrowed connections as a percentage of the hard limit.
    pub fn utilization_percentage(&self) -> f64 {
        if self.max_connections == 0 {
            0.0
        } else {
            (self.in_use() as f64 / self.max_connections as f64) * 100.0
        }
    }

    pub fn is_under_stress(&self) -> bool {
        self.utilization_percentage() > 80.0
    }
}
