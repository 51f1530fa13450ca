//! # Migration Ledger
//!
//! Schema evolution as an ordered chain of revisions. Each step names itself
//! and its predecessor; the step with no predecessor is the root. The chain is
//! validated when the ledger is built, so a branch, a duplicate id, or a
//! dangling predecessor is caught before anything touches the database.
//!
//! ## Revision Table
//!
//! The database records its position in `schema_revision`, which holds at
//! most one row. No row means "base" (nothing applied).
//!
//! ## Concurrency Control
//!
//! Every step runs in its own transaction together with the revision update,
//! behind a PostgreSQL advisory transaction lock:
//!
//! ```sql
//! SELECT pg_advisory_xact_lock(<ledger key>)
//! ```
//!
//! The current revision is re-read after the lock is taken, so two processes
//! upgrading at once apply each step exactly once.

mod initial_schema;

pub use initial_schema::INITIAL_SCHEMA;

use crate::database::connection_pool::Engine;
use crate::error::{DbError, Direction, MigrationError};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Executor, PgConnection, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Table recording the applied head.
pub const REVISION_TABLE: &str = "schema_revision";

const LEDGER_LOCK_KEY: i64 = 7_305_126_448_001;

/// One forward/backward schema transformation.
#[async_trait]
pub trait MigrationStep: Send + Sync {
    /// Identifier of this revision.
    fn revision(&self) -> &'static str;

    /// Identifier of the revision this one builds on; `None` for the root.
    fn down_revision(&self) -> Option<&'static str>;

    fn description(&self) -> &'static str;

    /// Whether [`MigrationStep::downgrade`] can undo this step.
    fn is_reversible(&self) -> bool {
        true
    }

    async fn upgrade(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error>;

    async fn downgrade(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error>;
}

/// A step whose forward and reverse directions are SQL scripts.
#[derive(Debug, Clone, Copy)]
pub struct SqlMigration {
    pub revision: &'static str,
    pub down_revision: Option<&'static str>,
    pub description: &'static str,
    pub up: &'static str,
    pub down: Option<&'static str>,
}

#[async_trait]
impl MigrationStep for SqlMigration {
    fn revision(&self) -> &'static str {
        self.revision
    }

    fn down_revision(&self) -> Option<&'static str> {
        self.down_revision
    }

    fn description(&self) -> &'static str {
        self.description
    }

    fn is_reversible(&self) -> bool {
        self.down.is_some()
    }

    async fn upgrade(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        conn.execute(sqlx::raw_sql(self.up)).await?;
        Ok(())
    }

    async fn downgrade(&self, conn: &mut PgConnection) -> Result<(), sqlx::Error> {
        if let Some(down) = self.down {
            conn.execute(sqlx::raw_sql(down)).await?;
        }
        Ok(())
    }
}

/// Listing entry for `history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionInfo {
    pub revision: &'static str,
    pub down_revision: Option<&'static str>,
    pub description: &'static str,
    pub reversible: bool,
}

/// Where a database stands relative to the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerStatus {
    pub current: Option<String>,
    pub head: Option<&'static str>,
    pub pending: Vec<&'static str>,
}

impl LedgerStatus {
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }
}

/// The ordered chain of revisions, root first.
pub struct MigrationLedger {
    steps: Vec<Arc<dyn MigrationStep>>,
}

impl std::fmt::Debug for MigrationLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationLedger")
            .field("revisions", &self.revisions())
            .finish()
    }
}

impl MigrationLedger {
    /// Order and validate a set of steps into a single linear chain.
    pub fn new(steps: Vec<Arc<dyn MigrationStep>>) -> Result<Self, MigrationError> {
        let broken = |reason: String| MigrationError::BrokenChain { reason };

        let mut by_revision: HashMap<&'static str, Arc<dyn MigrationStep>> = HashMap::new();
        for step in &steps {
            if by_revision
                .insert(step.revision(), Arc::clone(step))
                .is_some()
            {
                return Err(broken(format!("revision {} declared twice", step.revision())));
            }
        }

        let mut child_of: HashMap<Option<&'static str>, &'static str> = HashMap::new();
        for step in &steps {
            if let Some(parent) = step.down_revision() {
                if !by_revision.contains_key(parent) {
                    return Err(broken(format!(
                        "{} revises unknown revision {parent}",
                        step.revision()
                    )));
                }
            }
            if let Some(sibling) = child_of.insert(step.down_revision(), step.revision()) {
                let parent = step.down_revision().unwrap_or("base");
                return Err(broken(format!(
                    "{parent} has two successors: {sibling} and {}",
                    step.revision()
                )));
            }
        }

        if steps.is_empty() {
            return Ok(Self { steps });
        }
        if !child_of.contains_key(&None) {
            return Err(broken("no root revision".to_string()));
        }

        let mut ordered = Vec::with_capacity(steps.len());
        let mut cursor = None;
        while let Some(next) = child_of.get(&cursor) {
            if let Some(step) = by_revision.get(next) {
                ordered.push(Arc::clone(step));
            }
            cursor = Some(*next);
            if ordered.len() > steps.len() {
                break;
            }
        }
        if ordered.len() != steps.len() {
            return Err(broken(
                "revisions unreachable from the root (cycle in chain)".to_string(),
            ));
        }

        Ok(Self { steps: ordered })
    }

    /// The chain shipped with this crate.
    pub fn standard() -> Result<Self, MigrationError> {
        Self::new(vec![Arc::new(INITIAL_SCHEMA)])
    }

    pub fn head(&self) -> Option<&'static str> {
        self.steps.last().map(|s| s.revision())
    }

    pub fn revisions(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.revision()).collect()
    }

    pub fn history(&self) -> Vec<RevisionInfo> {
        self.steps
            .iter()
            .map(|s| RevisionInfo {
                revision: s.revision(),
                down_revision: s.down_revision(),
                description: s.description(),
                reversible: s.is_reversible(),
            })
            .collect()
    }

    /// Position of a revision in the chain; `None` input means base.
    fn position(&self, revision: Option<&str>) -> Result<Option<usize>, MigrationError> {
        match revision {
            None => Ok(None),
            Some(rev) => self
                .steps
                .iter()
                .position(|s| s.revision() == rev)
                .map(Some)
                .ok_or_else(|| MigrationError::UnknownRevision {
                    revision: rev.to_string(),
                }),
        }
    }

    /// Steps to run, in order, to move from `current` up to `target`.
    pub fn upgrade_plan(
        &self,
        current: Option<&str>,
        target: Option<&str>,
    ) -> Result<Vec<&'static str>, MigrationError> {
        let from = self.position(current)?.map_or(0, |i| i + 1);
        let to = match target {
            Some(_) => self.position(target)?.map_or(0, |i| i + 1),
            None => self.steps.len(),
        };
        Ok(self
            .steps
            .get(from..to.max(from))
            .unwrap_or_default()
            .iter()
            .map(|s| s.revision())
            .collect())
    }

    /// Steps to undo, newest first, to move from `current` down to `target`
    /// (`None` = base).
    pub fn downgrade_plan(
        &self,
        current: Option<&str>,
        target: Option<&str>,
    ) -> Result<Vec<&'static str>, MigrationError> {
        let from = self.position(current)?.map_or(0, |i| i + 1);
        let to = self.position(target)?.map_or(0, |i| i + 1);
        Ok(self
            .steps
            .get(to.min(from)..from)
            .unwrap_or_default()
            .iter()
            .rev()
            .map(|s| s.revision())
            .collect())
    }

    fn step(&self, revision: &str) -> Result<&Arc<dyn MigrationStep>, MigrationError> {
        self.steps
            .iter()
            .find(|s| s.revision() == revision)
            .ok_or_else(|| MigrationError::UnknownRevision {
                revision: revision.to_string(),
            })
    }

    /// Revision currently recorded in the database.
    pub async fn current(&self, engine: &Engine) -> Result<Option<String>, DbError> {
        let mut conn = engine.acquire().await?;
        ensure_revision_table(&mut conn).await?;
        Ok(read_revision(&mut conn).await?)
    }

    pub async fn status(&self, engine: &Engine) -> Result<LedgerStatus, DbError> {
        let current = self.current(engine).await?;
        let pending = self.upgrade_plan(current.as_deref(), None)?;
        Ok(LedgerStatus {
            current,
            head: self.head(),
            pending,
        })
    }

    /// Apply every step between the recorded revision and `target`
    /// (`None` = head). Returns the revisions applied.
    pub async fn upgrade(
        &self,
        engine: &Engine,
        target: Option<&str>,
    ) -> Result<Vec<&'static str>, DbError> {
        let current = self.current(engine).await?;
        let plan = self.upgrade_plan(current.as_deref(), target)?;
        if plan.is_empty() {
            info!(current = ?current, "Schema already at requested revision");
            return Ok(plan);
        }

        let mut applied = Vec::with_capacity(plan.len());
        for revision in plan {
            let step = self.step(revision)?;
            if self.apply(engine, step.as_ref(), Direction::Upgrade).await? {
                applied.push(revision);
            }
        }
        Ok(applied)
    }

    /// Undo steps down to `target` (`None` = base). Returns the revisions
    /// undone, newest first.
    pub async fn downgrade(
        &self,
        engine: &Engine,
        target: Option<&str>,
    ) -> Result<Vec<&'static str>, DbError> {
        let current = self.current(engine).await?;
        let plan = self.downgrade_plan(current.as_deref(), target)?;

        for revision in &plan {
            let step = self.step(revision)?;
            if !step.is_reversible() {
                return Err(MigrationError::Irreversible {
                    revision: revision.to_string(),
                    direction: Direction::Downgrade,
                }
                .into());
            }
        }

        let mut reverted = Vec::with_capacity(plan.len());
        for revision in plan {
            let step = self.step(revision)?;
            if self.apply(engine, step.as_ref(), Direction::Downgrade).await? {
                reverted.push(revision);
            }
        }
        Ok(reverted)
    }

    /// Record `revision` as applied without running anything.
    pub async fn stamp(&self, engine: &Engine, revision: Option<&str>) -> Result<(), DbError> {
        let revision = match revision {
            Some(rev) => Some(self.step(rev)?.revision()),
            None => None,
        };
        let mut conn = engine.acquire().await?;
        ensure_revision_table(&mut conn).await?;
        write_revision(&mut conn, revision)
            .await
            .map_err(MigrationError::RevisionTable)?;
        warn!(revision = ?revision, "Schema revision stamped without running migrations");
        Ok(())
    }

    /// Run one step in its own transaction. Returns `false` when another
    /// process already moved the database past it.
    async fn apply(
        &self,
        engine: &Engine,
        step: &dyn MigrationStep,
        direction: Direction,
    ) -> Result<bool, DbError> {
        let revision = step.revision();
        let failed = |source: sqlx::Error| MigrationError::Failed {
            revision: revision.to_string(),
            direction,
            source,
        };

        let (expected, resulting) = match direction {
            Direction::Upgrade => (step.down_revision(), Some(revision)),
            Direction::Downgrade => (Some(revision), step.down_revision()),
        };

        let mut conn = engine.acquire().await?;
        let mut tx = sqlx::Connection::begin(&mut *conn).await.map_err(failed)?;

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(LEDGER_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(failed)?;

        let current = read_revision(&mut tx).await?;
        if current.as_deref() == resulting {
            info!(%revision, %direction, "Step already applied by another process");
            return Ok(false);
        }
        if current.as_deref() != expected {
            return Err(MigrationError::BrokenChain {
                reason: format!(
                    "cannot {direction} {revision}: database is at {}, expected {}",
                    current.as_deref().unwrap_or("base"),
                    expected.unwrap_or("base")
                ),
            }
            .into());
        }

        info!(%revision, %direction, description = step.description(), "Running migration step");
        let result = match direction {
            Direction::Upgrade => step.upgrade(&mut tx).await,
            Direction::Downgrade => step.downgrade(&mut tx).await,
        };
        result.map_err(failed)?;

        write_revision(&mut tx, resulting).await.map_err(failed)?;
        tx.commit().await.map_err(failed)?;

        info!(%revision, %direction, now_at = resulting.unwrap_or("base"), "Migration step complete");
        Ok(true)
    }
}

async fn ensure_revision_table(conn: &mut PgConnection) -> Result<(), MigrationError> {
    sqlx::raw_sql(
        r#"
        CREATE TABLE IF NOT EXISTS schema_revision (
            revision VARCHAR(64) NOT NULL PRIMARY KEY,
            applied_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT now()
        )
    "#,
    )
    .execute(conn)
    .await
    .map_err(MigrationError::RevisionTable)?;
    Ok(())
}

async fn read_revision(conn: &mut PgConnection) -> Result<Option<String>, MigrationError> {
    let row = sqlx::query("SELECT revision FROM schema_revision LIMIT 1")
        .fetch_optional(conn)
        .await
        .map_err(MigrationError::RevisionTable)?;
    Ok(row.map(|r| r.get::<String, _>("revision")))
}

async fn write_revision(conn: &mut PgConnection, revision: Option<&str>) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM schema_revision")
        .execute(&mut *conn)
        .await?;
    if let Some(revision) = revision {
        sqlx::query("INSERT INTO schema_revision (revision) VALUES ($1)")
            .bind(revision)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}
