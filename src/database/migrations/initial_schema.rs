//! Revision `0001_initial_schema`: creates every table of the meeting store.

use super::SqlMigration;

pub const INITIAL_SCHEMA: SqlMigration = SqlMigration {
    revision: "0001_initial_schema",
    down_revision: None,
    description: "Initial schema: users, api tokens, meetings, transcriptions, meeting sessions",
    up: include_str!("../../../migrations/0001_initial_schema.up.sql"),
    down: Some(include_str!("../../../migrations/0001_initial_schema.down.sql")),
};
