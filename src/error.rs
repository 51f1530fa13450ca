//! # Error Types
//!
//! Structured error taxonomy for the database lifecycle layer. Every failure
//! that leaves this crate carries the phase it happened in, so operators can
//! tell a validation problem from a connection problem from a failed schema
//! change without reading driver output.

use crate::database::connection_pool::ACQUIRE_TIMEOUT;
use crate::database::error_codes::PgErrorCode;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The lifecycle phase an operation failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Validate,
    Connect,
    ApplySchema,
    DropSchema,
    Migrate,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Validate => "validate",
            Phase::Connect => "connect",
            Phase::ApplySchema => "apply-schema",
            Phase::DropSchema => "drop-schema",
            Phase::Migrate => "migrate",
        };
        f.write_str(name)
    }
}

/// Missing or malformed connection parameters. Always raised before any
/// connection attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Missing required database environment variables: {}", .missing.join(", "))]
    Missing { missing: Vec<&'static str> },

    #[error("Invalid database environment variable {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

impl ConfigurationError {
    /// Names of the parameters that were absent or empty.
    pub fn missing(&self) -> &[&'static str] {
        match self {
            ConfigurationError::Missing { missing } => missing,
            ConfigurationError::InvalidParameter { .. } => &[],
        }
    }
}

/// Failure of the schema initializer or recreator.
#[derive(Debug, Error)]
pub enum SchemaOperationError {
    #[error("Schema operation failed during {phase} on {target}: {source}")]
    Failed {
        phase: Phase,
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Refusing to recreate schema: confirmation names '{confirmed}' but connected database is '{actual}'")]
    ConfirmationMismatch { confirmed: String, actual: String },
}

impl SchemaOperationError {
    pub fn phase(&self) -> Phase {
        match self {
            SchemaOperationError::Failed { phase, .. } => *phase,
            SchemaOperationError::ConfirmationMismatch { .. } => Phase::Validate,
        }
    }
}

/// Failure during a unit of work. The owning session is rolled back when it
/// is released or dropped.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Unique constraint violated ({constraint}): {message}")]
    UniqueViolation { constraint: String, message: String },

    #[error("Foreign key constraint violated ({constraint}): {message}")]
    ForeignKeyViolation { constraint: String, message: String },

    #[error("Not-null constraint violated: {message}")]
    NotNullViolation { message: String },

    #[error("Session {session_id}: transaction aborted by an earlier failed statement; nothing was committed")]
    Aborted { session_id: uuid::Uuid },

    #[error("Database error in session: {0}")]
    Database(#[source] sqlx::Error),
}

impl SessionError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, SessionError::UniqueViolation { .. })
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self, SessionError::ForeignKeyViolation { .. })
    }

    /// The statement hit a table or namespace that does not exist, as seen
    /// by sessions running while the schema is being recreated.
    pub fn is_schema_unavailable(&self) -> bool {
        match self {
            SessionError::Database(err) => err
                .as_database_error()
                .and_then(|db_err| db_err.code())
                .is_some_and(|code| PgErrorCode::is_missing_schema_object(&code)),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for SessionError {
    fn from(err: sqlx::Error) -> Self {
        let Some(db_err) = err.as_database_error() else {
            return SessionError::Database(err);
        };
        let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
        let constraint = db_err.constraint().unwrap_or("unknown").to_string();
        let message = db_err.message().to_string();

        if PgErrorCode::is_unique_violation(&code) {
            SessionError::UniqueViolation {
                constraint,
                message,
            }
        } else if PgErrorCode::is_foreign_key_violation(&code) {
            SessionError::ForeignKeyViolation {
                constraint,
                message,
            }
        } else if PgErrorCode::is_not_null_violation(&code) {
            SessionError::NotNullViolation { message }
        } else {
            SessionError::Database(err)
        }
    }
}

/// Direction a migration step was running in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Upgrade,
    Downgrade,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upgrade => f.write_str("upgrade"),
            Direction::Downgrade => f.write_str("downgrade"),
        }
    }
}

/// Failure of the migration ledger.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Broken revision chain: {reason}")]
    BrokenChain { reason: String },

    #[error("Unknown revision: {revision}")]
    UnknownRevision { revision: String },

    #[error("Revision {revision} has no {direction} step")]
    Irreversible {
        revision: String,
        direction: Direction,
    },

    #[error("Migration {direction} of revision {revision} failed during migrate: {source}")]
    Failed {
        revision: String,
        direction: Direction,
        #[source]
        source: sqlx::Error,
    },

    #[error("Could not read revision table: {0}")]
    RevisionTable(#[source] sqlx::Error),
}

/// Top-level error for every public operation of this crate.
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("Connection pool exhausted: no connection became available within {timeout_ms}ms")]
    PoolExhausted { timeout_ms: u64 },

    #[error("Could not reach database {target} during connect: {source}")]
    Connect {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error(transparent)]
    Schema(#[from] SchemaOperationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Migration(#[from] MigrationError),
}

impl DbError {
    /// Map a driver error raised while borrowing a connection.
    pub(crate) fn from_acquire(err: sqlx::Error, timeout: Duration, target: &str) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted {
                timeout_ms: timeout.as_millis() as u64,
            },
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
                DbError::Connect {
                    target: target.to_string(),
                    source: err,
                }
            }
            other => DbError::Session(SessionError::from(other)),
        }
    }

    /// The phase the error belongs to, when it has one.
    pub fn phase(&self) -> Option<Phase> {
        match self {
            DbError::Configuration(_) => Some(Phase::Validate),
            DbError::PoolExhausted { .. } | DbError::Connect { .. } => Some(Phase::Connect),
            DbError::Schema(err) => Some(err.phase()),
            DbError::Migration(_) => Some(Phase::Migrate),
            DbError::Session(_) => None,
        }
    }

    /// Whether the caller's own retry policy may reasonably try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::PoolExhausted { .. })
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted {
                timeout_ms: ACQUIRE_TIMEOUT.as_millis() as u64,
            },
            other => DbError::Session(SessionError::from(other)),
        }
    }
}

pub type DbResult<T> = std::result::Result<T, DbError>;
