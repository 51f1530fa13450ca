//! # Sessions
//!
//! A [`Session`] is one logical unit of work against the pooled engine. It is
//! never shared between concurrent tasks (it is `Send` but not `Clone`, and
//! every operation takes `&mut self`).
//!
//! ## Transaction scope
//!
//! - The first call to [`Session::conn`] borrows a connection and opens a
//!   transaction.
//! - [`Session::commit`] makes the work durable and hands the connection back
//!   to the pool. The next `conn()` opens a fresh transaction.
//! - Nothing is committed implicitly. [`Session::release`], an early return,
//!   a panic, or dropping the future that owns the session all roll back
//!   whatever is still open.
//!
//! Rows read through a session are plain owned values, so they stay usable
//! after a commit without a refresh round trip. Callers that need fresh state
//! query again.

use crate::database::connection_pool::Engine;
use crate::database::error_codes::PgErrorCode;
use crate::error::{DbError, SessionError};
use dashmap::DashMap;
use sqlx::{PgConnection, Postgres, Transaction};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Sessions currently open against an engine.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    open: DashMap<Uuid, Instant>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions not yet released.
    pub fn active(&self) -> usize {
        self.open.len()
    }

    /// Age of the oldest open session.
    pub fn oldest_age(&self) -> Option<Duration> {
        self.open
            .iter()
            .map(|entry| entry.value().elapsed())
            .max()
    }

    fn register(&self, id: Uuid) {
        self.open.insert(id, Instant::now());
    }

    fn unregister(&self, id: &Uuid) -> Option<Duration> {
        self.open.remove(id).map(|(_, opened)| opened.elapsed())
    }
}

/// A transaction-scoped unit of work bound to the pooled engine.
pub struct Session {
    id: Uuid,
    engine: Arc<Engine>,
    registry: Arc<SessionRegistry>,
    tx: Option<Transaction<'static, Postgres>>,
    commits: u32,
    released: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("in_transaction", &self.tx.is_some())
            .field("commits", &self.commits)
            .field("released", &self.released)
            .finish()
    }
}

impl Session {
    pub(crate) fn open(engine: Arc<Engine>, registry: Arc<SessionRegistry>) -> Self {
        let id = Uuid::new_v4();
        registry.register(id);
        debug!(session_id = %id, "Session opened");
        Self {
            id,
            engine,
            registry,
            tx: None,
            commits: 0,
            released: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether a transaction is currently open.
    pub fn in_transaction(&self) -> bool {
        self.tx.is_some()
    }

    /// Number of successful commits made through this session.
    pub fn commits(&self) -> u32 {
        self.commits
    }

    /// The connection of the current transaction, beginning one if needed.
    ///
    /// Use it as a sqlx executor: `sqlx::query(..).execute(session.conn().await?)`.
    pub async fn conn(&mut self) -> Result<&mut PgConnection, DbError> {
        let tx = match self.tx.take() {
            Some(tx) => tx,
            None => {
                let tx = self.engine.pool().begin().await.map_err(|e| {
                    DbError::from_acquire(
                        e,
                        self.engine.policy().acquire_timeout,
                        self.engine.target(),
                    )
                })?;
                debug!(session_id = %self.id, "Transaction started");
                tx
            }
        };
        Ok(&mut **self.tx.insert(tx))
    }

    /// Commit the open transaction, if any.
    ///
    /// A transaction in which a statement already failed is rolled back and
    /// reported as [`SessionError::Aborted`]; the server would otherwise turn
    /// the `COMMIT` into a silent rollback.
    pub async fn commit(&mut self) -> Result<(), DbError> {
        let Some(mut tx) = self.tx.take() else {
            return Ok(());
        };

        if let Err(err) = sqlx::query("SELECT 1").execute(&mut *tx).await {
            let aborted = err
                .as_database_error()
                .and_then(|db_err| db_err.code())
                .is_some_and(|code| PgErrorCode::is_in_failed_transaction(&code));
            if let Err(rollback_err) = tx.rollback().await {
                warn!(session_id = %self.id, error = %rollback_err, "Rollback of failed transaction failed");
            }
            if aborted {
                warn!(
                    session_id = %self.id,
                    "Commit refused: an earlier statement failed, transaction rolled back"
                );
                return Err(SessionError::Aborted {
                    session_id: self.id,
                }
                .into());
            }
            return Err(SessionError::from(err).into());
        }

        tx.commit().await.map_err(SessionError::from)?;
        self.commits += 1;
        debug!(session_id = %self.id, commits = self.commits, "Transaction committed");
        Ok(())
    }

    /// Discard the open transaction, if any.
    pub async fn rollback(&mut self) -> Result<(), DbError> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await.map_err(SessionError::from)?;
            debug!(session_id = %self.id, "Transaction rolled back");
        }
        Ok(())
    }

    /// End the session, rolling back anything not committed.
    ///
    /// The session is unregistered even when the rollback itself fails.
    pub async fn release(mut self) -> Result<(), DbError> {
        let rolled_back = self.tx.is_some();
        let result = self.rollback().await;
        self.finish(rolled_back);
        result
    }

    fn finish(&mut self, rolled_back: bool) {
        if self.released {
            return;
        }
        self.released = true;
        let held = self.registry.unregister(&self.id);
        debug!(
            session_id = %self.id,
            rolled_back,
            commits = self.commits,
            held_ms = held.map(|d| d.as_millis() as u64),
            "Session released"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // The driver queues a ROLLBACK for a dropped transaction before the
        // connection goes back to the pool.
        let rolled_back = self.tx.take().is_some();
        if rolled_back {
            warn!(
                session_id = %self.id,
                "Session dropped with an open transaction; uncommitted work rolled back"
            );
        }
        self.finish(rolled_back);
    }
}
