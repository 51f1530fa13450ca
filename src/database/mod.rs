//! # Database Lifecycle
//!
//! Connection, session and schema lifecycle for the meeting store.
//!
//! ## Overview
//!
//! [`Database`] is the single entry point consumers hold. Nothing happens
//! when it is built; every piece is constructed on first use and cached:
//!
//! 1. **Configuration** is validated once ([`DbConfig`]). A failure is
//!    returned to the caller and not cached, so a later call re-validates.
//! 2. **Pooled engine** ([`Engine`]) serves every request session. Exactly one
//!    is created per `Database`, even under concurrent first access.
//! 3. **Administrative engine** holds a single connection for migrations and
//!    schema recreation and shares nothing with the pooled engine.
//!
//! ## Key Components
//!
//! - [`connection_pool`] - pool policy and engines
//! - [`session`] - transaction-scoped units of work
//! - [`provisioning`] - schema initializer and recreator
//! - [`migrations`] - revision chain and revision table
//! - [`snapshot`] - catalog introspection
//! - [`error_codes`] - SQLSTATE classification
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use shared_models::database::Database;
//! use shared_models::error::DbError;
//!
//! # async fn example() -> Result<(), DbError> {
//! let db = Database::from_env();
//! db.init_schema().await?;
//!
//! let mut session = db.session().await?;
//! sqlx::query("UPDATE meetings SET status = 'completed' WHERE id = $1")
//!     .bind(42)
//!     .execute(session.conn().await?)
//!     .await?;
//! session.commit().await?;
//! session.release().await?;
//! # Ok(())
//! # }
//! ```

pub mod connection_pool;
pub mod error_codes;
pub mod migrations;
pub mod provisioning;
pub mod session;
pub mod snapshot;

pub use connection_pool::{Engine, EngineKind, PoolMetrics, PoolPolicy};
pub use error_codes::PgErrorCode;
pub use migrations::{
    LedgerStatus, MigrationLedger, MigrationStep, RevisionInfo, SqlMigration, INITIAL_SCHEMA,
};
pub use provisioning::RecreateIntent;
pub use session::{Session, SessionRegistry};
pub use snapshot::SchemaSnapshot;

use crate::config::DbConfig;
use crate::error::DbError;
use crate::logging::log_error;
use crate::schema::SCHEMA;
use futures::future::BoxFuture;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{info, warn};

type Lookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Lazily built connection, session and schema lifecycle.
///
/// Share it behind an `Arc`; every method takes `&self`.
pub struct Database {
    lookup: Option<Lookup>,
    config: OnceCell<DbConfig>,
    engine: OnceCell<Arc<Engine>>,
    admin: OnceCell<Arc<Engine>>,
    sessions: Arc<SessionRegistry>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("config", &self.config.get())
            .field("engine_built", &self.engine.initialized())
            .field("admin_built", &self.admin.initialized())
            .field("active_sessions", &self.sessions.active())
            .finish()
    }
}

impl Database {
    /// Read connection parameters from the process environment on first use.
    pub fn from_env() -> Self {
        Self::with_lookup(None)
    }

    /// Read connection parameters through `lookup` on first use.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self::with_lookup(Some(Arc::new(lookup)))
    }

    /// Wrap a single pool built elsewhere, typically a per-test pool.
    ///
    /// Unlike every other constructor, the pooled and administrative engines
    /// share `pool` here, so administrative work competes with sessions for
    /// its connections. Use [`Database::from_pools`] to keep them apart.
    /// Configuration is only read if [`Database::config`] is called.
    pub fn from_pool(pool: PgPool) -> Self {
        Self::from_pools(pool.clone(), pool)
    }

    /// Wrap separately built pooled and administrative pools.
    pub fn from_pools(pooled: PgPool, admin: PgPool) -> Self {
        let db = Self::from_env();
        let _ = db
            .engine
            .set(Arc::new(Engine::from_pool(pooled, EngineKind::Pooled)));
        let _ = db
            .admin
            .set(Arc::new(Engine::from_pool(admin, EngineKind::Administrative)));
        db
    }

    fn with_lookup(lookup: Option<Lookup>) -> Self {
        Self {
            lookup,
            config: OnceCell::new(),
            engine: OnceCell::new(),
            admin: OnceCell::new(),
            sessions: Arc::new(SessionRegistry::new()),
        }
    }

    /// Validated connection parameters. Validation runs once; later calls
    /// return the cached value.
    pub async fn config(&self) -> Result<&DbConfig, DbError> {
        self.config
            .get_or_try_init(|| async {
                let result = match &self.lookup {
                    Some(lookup) => DbConfig::from_lookup(|name| (**lookup)(name)),
                    None => DbConfig::from_env(),
                };
                match result {
                    Ok(config) => {
                        info!(url = %config.redacted_url(), "Database configuration validated");
                        Ok(config)
                    }
                    Err(err) => {
                        log_error("config", "validate", &err.to_string(), None);
                        Err(DbError::from(err))
                    }
                }
            })
            .await
    }

    /// The pooled engine, built on first call. Every caller gets the same
    /// instance.
    pub async fn engine(&self) -> Result<&Arc<Engine>, DbError> {
        self.engine
            .get_or_try_init(|| async {
                let config = self.config().await?;
                Ok::<_, DbError>(Arc::new(Engine::connect_lazy(config, PoolPolicy::pooled())))
            })
            .await
    }

    /// The single-connection maintenance engine, built on first call.
    pub async fn admin_engine(&self) -> Result<&Arc<Engine>, DbError> {
        self.admin
            .get_or_try_init(|| async {
                let config = self.config().await?;
                Ok::<_, DbError>(Arc::new(Engine::connect_lazy(
                    config,
                    PoolPolicy::administrative(),
                )))
            })
            .await
    }

    /// A new session on the pooled engine. The caller owns it for one unit
    /// of work and must [`Session::release`] it (dropping also rolls back).
    pub async fn session(&self) -> Result<Session, DbError> {
        let engine = Arc::clone(self.engine().await?);
        Ok(Session::open(engine, Arc::clone(&self.sessions)))
    }

    /// Run `work` on a fresh session and release it afterwards, whatever
    /// `work` returned. Nothing is committed unless `work` commits.
    ///
    /// ```rust,no_run
    /// # use shared_models::database::Database;
    /// # async fn example(db: &Database) -> Result<(), shared_models::error::DbError> {
    /// let count: i64 = db
    ///     .scoped(|session| {
    ///         Box::pin(async move {
    ///             let n = sqlx::query_scalar("SELECT count(*) FROM users")
    ///                 .fetch_one(session.conn().await?)
    ///                 .await?;
    ///             Ok(n)
    ///         })
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn scoped<T, F>(&self, work: F) -> Result<T, DbError>
    where
        F: for<'s> FnOnce(&'s mut Session) -> BoxFuture<'s, Result<T, DbError>>,
    {
        let mut session = self.session().await?;
        let session_id = session.id();
        let outcome = work(&mut session).await;
        let released = session.release().await;

        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err),
            (Err(err), Ok(())) => Err(err),
            (Err(err), Err(release_err)) => {
                warn!(
                    session_id = %session_id,
                    error = %release_err,
                    "Session release failed after unit of work error"
                );
                Err(err)
            }
        }
    }

    /// Sessions handed out and not yet released.
    pub fn active_sessions(&self) -> usize {
        self.sessions.active()
    }

    /// Create whatever part of the schema is missing. Safe to repeat.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        provisioning::init_schema(self.engine().await?, &SCHEMA).await
    }

    /// Drop and rebuild the whole schema over the administrative engine.
    /// **All data is lost.**
    pub async fn recreate_schema(&self, intent: &RecreateIntent) -> Result<(), DbError> {
        let admin = self.admin_engine().await?;
        provisioning::recreate_schema(admin, &SCHEMA, intent, self.sessions.active()).await
    }

    /// Where the database stands relative to the shipped revision chain.
    pub async fn migration_status(&self) -> Result<LedgerStatus, DbError> {
        let ledger = MigrationLedger::standard()?;
        ledger.status(self.admin_engine().await?).await
    }

    /// Apply revisions up to `target` (`None` = head).
    pub async fn upgrade(&self, target: Option<&str>) -> Result<Vec<&'static str>, DbError> {
        let ledger = MigrationLedger::standard()?;
        ledger.upgrade(self.admin_engine().await?, target).await
    }

    /// Undo revisions down to `target` (`None` = base).
    pub async fn downgrade(&self, target: Option<&str>) -> Result<Vec<&'static str>, DbError> {
        let ledger = MigrationLedger::standard()?;
        ledger.downgrade(self.admin_engine().await?, target).await
    }

    /// Record `revision` without running it.
    pub async fn stamp(&self, revision: Option<&str>) -> Result<(), DbError> {
        let ledger = MigrationLedger::standard()?;
        ledger.stamp(self.admin_engine().await?, revision).await
    }

    /// Catalog view of the live schema.
    pub async fn snapshot(&self) -> Result<SchemaSnapshot, DbError> {
        let mut conn = self.engine().await?.acquire().await?;
        Ok(SchemaSnapshot::capture(&mut conn).await?)
    }

    /// Lightweight round trip on the pooled engine.
    pub async fn health_check(&self) -> Result<bool, DbError> {
        self.engine().await?.health_check().await
    }

    /// Close both engines if they were built. Idempotent.
    pub async fn close(&self) {
        let open = self.sessions.active();
        if open > 0 {
            warn!(active_sessions = open, "Closing database with sessions still open");
        }
        if let Some(engine) = self.engine.get() {
            engine.close().await;
        }
        if let Some(admin) = self.admin.get() {
            admin.close().await;
        }
    }
}
