#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Shared Models
//!
//! Connection, session and schema lifecycle for the meeting store shared by
//! the bot manager, transcription collector and API gateway.
//!
//! ## Overview
//!
//! Services hold one [`Database`] and ask it for sessions. Everything behind it
//! is built lazily on first use: configuration is validated once from the
//! environment, one pooled engine is created per process, and a separate
//! single-connection engine serves maintenance work.
//!
//! ## Key Features
//!
//! - **Bounded pooling**: 5 warm connections, 10 overflow, 30s borrow timeout,
//!   30 minute recycling and a pre-ping on every borrow
//! - **Scoped sessions**: one transaction per unit of work, never committed
//!   implicitly, always rolled back when released or dropped
//! - **Idempotent provisioning**: create whatever part of the schema is missing
//! - **Gated recreation**: drop and rebuild the schema only with an explicit
//!   intent naming the database
//! - **Revision chain**: ordered, reversible migrations recorded in the store
//!
//! ## Module Organization
//!
//! - [`config`] - Environment validation and connection strings
//! - [`database`] - Engines, sessions, provisioning and migrations
//! - [`schema`] - Table, constraint and index definitions
//! - [`models`] - Row types for the five tables
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use shared_models::database::Database;
//! use shared_models::models::{NewUser, User};
//!
//! # async fn example() -> Result<(), shared_models::DbError> {
//! let db = Database::from_env();
//! db.init_schema().await?;
//!
//! let mut session = db.session().await?;
//! let user = User::create(session.conn().await?, NewUser::with_email("ada@example.com")).await?;
//! session.commit().await?;
//! session.release().await?;
//!
//! println!("created user {}", user.id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Database tests use SQLx native testing with a fresh database per test:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! DATABASE_URL=postgres://... cargo test    # All tests
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod models;
pub mod schema;

pub use config::DbConfig;
pub use database::{Database, Engine, RecreateIntent, Session};
pub use error::{
    ConfigurationError, DbError, DbResult, MigrationError, Phase, SchemaOperationError,
    SessionError,
};
pub use schema::SCHEMA;
