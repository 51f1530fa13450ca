//! # Schema Provisioning
//!
//! Two administrative operations over the shared metadata model:
//!
//! - [`init_schema`] creates whatever part of the model is missing. Safe to
//!   run any number of times.
//! - [`recreate_schema`] drops the whole `public` namespace with everything
//!   in it and rebuilds the model from nothing. **Irreversible.** It only
//!   runs when handed a [`RecreateIntent`] naming the database it is
//!   connected to.
//!
//! Both run inside a single transaction (PostgreSQL DDL is transactional),
//! so a failure part-way leaves the database as it was.

use crate::database::connection_pool::Engine;
use crate::error::{DbError, Phase, SchemaOperationError};
use crate::logging::{log_error, log_schema_operation};
use crate::schema::{SchemaModel, SCHEMA_NAMESPACE};
use sqlx::{Connection, PgConnection};
use std::time::Instant;
use tracing::{info, warn};

const SCHEMA_INIT_LOCK_KEY: i64 = 7_305_126_448_002;

/// Explicit operator intent to destroy and rebuild a database's schema.
///
/// Constructed only from the name of the database the operator means to
/// wipe; [`recreate_schema`] refuses to run when the connected database has
/// a different name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecreateIntent {
    database: String,
}

impl RecreateIntent {
    pub fn confirm(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

/// Create every missing table, constraint and index of `model`.
pub async fn init_schema(engine: &Engine, model: &SchemaModel) -> Result<(), DbError> {
    let target = engine.target().to_string();
    let started = Instant::now();
    info!(target = %target, tables = model.tables.len(), "Initializing database tables");

    let mut conn = engine.acquire().await?;
    let result = apply_in_transaction(&mut conn, model).await;

    match result {
        Ok(()) => {
            log_schema_operation("init_schema", &target, "success", started.elapsed(), None);
            info!(target = %target, "Database tables checked/created successfully");
            Ok(())
        }
        Err(source) => {
            log_error(
                "provisioning",
                "init_schema",
                &source.to_string(),
                Some(&target),
            );
            Err(SchemaOperationError::Failed {
                phase: Phase::ApplySchema,
                target,
                source,
            }
            .into())
        }
    }
}

async fn apply_in_transaction(conn: &mut PgConnection, model: &SchemaModel) -> Result<(), sqlx::Error> {
    let mut tx = conn.begin().await?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SCHEMA_INIT_LOCK_KEY)
        .execute(&mut *tx)
        .await?;
    for statement in model.create_statements(true) {
        sqlx::query(&statement).execute(&mut *tx).await?;
    }
    tx.commit().await
}

/// Drop the `public` namespace with everything in it, then rebuild `model`.
///
/// Logs a warning before starting, after the drop, and on completion.
/// `active_sessions` is how many request sessions are open elsewhere; they
/// may fail against the missing schema until the rebuild commits.
pub async fn recreate_schema(
    engine: &Engine,
    model: &SchemaModel,
    intent: &RecreateIntent,
    active_sessions: usize,
) -> Result<(), DbError> {
    let target = engine.target().to_string();
    let started = Instant::now();

    let mut conn = engine.acquire().await?;
    let actual: String = sqlx::query_scalar("SELECT current_database()")
        .fetch_one(&mut *conn)
        .await
        .map_err(|source| SchemaOperationError::Failed {
            phase: Phase::Validate,
            target: target.clone(),
            source,
        })?;
    if actual != intent.database() {
        let err = SchemaOperationError::ConfirmationMismatch {
            confirmed: intent.database().to_string(),
            actual,
        };
        log_error("provisioning", "recreate_schema", &err.to_string(), Some(&target));
        return Err(err.into());
    }

    warn!(
        target = %target,
        namespace = SCHEMA_NAMESPACE,
        active_sessions,
        "!!! DANGEROUS OPERATION: dropping and recreating all tables. ALL DATA WILL BE LOST !!!"
    );
    if active_sessions > 0 {
        warn!(
            active_sessions,
            "Sessions are open against this database and may fail until the rebuild commits"
        );
    }

    match rebuild_in_transaction(&mut conn, model, &target).await {
        Ok(()) => {
            log_schema_operation("recreate_schema", &target, "success", started.elapsed(), None);
            warn!(target = %target, "!!! DANGEROUS OPERATION COMPLETE: schema recreated empty !!!");
            Ok(())
        }
        Err((phase, source)) => {
            log_error(
                "provisioning",
                "recreate_schema",
                &source.to_string(),
                Some(&format!("{target} during {phase}")),
            );
            Err(SchemaOperationError::Failed {
                phase,
                target,
                source,
            }
            .into())
        }
    }
}

async fn rebuild_in_transaction(
    conn: &mut PgConnection,
    model: &SchemaModel,
    target: &str,
) -> Result<(), (Phase, sqlx::Error)> {
    let drop_phase = |e| (Phase::DropSchema, e);
    let apply_phase = |e| (Phase::ApplySchema, e);

    let mut tx = conn.begin().await.map_err(drop_phase)?;

    warn!(target = %target, "Dropping {SCHEMA_NAMESPACE} schema with CASCADE...");
    sqlx::raw_sql("DROP SCHEMA public CASCADE")
        .execute(&mut *tx)
        .await
        .map_err(drop_phase)?;
    warn!(target = %target, "{SCHEMA_NAMESPACE} schema dropped");

    sqlx::raw_sql("CREATE SCHEMA public; GRANT USAGE ON SCHEMA public TO PUBLIC;")
        .execute(&mut *tx)
        .await
        .map_err(apply_phase)?;
    info!(target = %target, "{SCHEMA_NAMESPACE} schema recreated, rebuilding tables");

    for statement in model.create_statements(false) {
        sqlx::query(&statement)
            .execute(&mut *tx)
            .await
            .map_err(apply_phase)?;
    }

    tx.commit().await.map_err(apply_phase)
}
