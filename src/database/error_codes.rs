//! PostgreSQL Error Codes
//!
//! SQLSTATE codes this crate classifies when turning driver errors into
//! [`SessionError`](crate::error::SessionError) variants.
//!
//! ## SQLSTATE Format
//!
//! - 5-character codes
//! - First 2 characters: error class
//! - Last 3 characters: specific condition
//!
//! Full list: <https://www.postgresql.org/docs/current/errcodes-appendix.html>

/// PostgreSQL SQLSTATE error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PgErrorCode;

impl PgErrorCode {
    // =========================================================================
    // Class 23: Integrity Constraint Violation
    // =========================================================================

    /// Unique violation (duplicate key) - Code 23505
    ///
    /// Raised for a second user with the same email, a second api token with
    /// the same value, or a repeated `(meeting_id, session_uid)` pair.
    pub const UNIQUE_VIOLATION: &'static str = "23505";

    /// Foreign key violation - Code 23503
    ///
    /// Raised when a token, meeting, transcription or meeting session points
    /// at a parent row that does not exist.
    pub const FOREIGN_KEY_VIOLATION: &'static str = "23503";

    /// Not null violation - Code 23502
    pub const NOT_NULL_VIOLATION: &'static str = "23502";

    // =========================================================================
    // Class 25: Invalid Transaction State
    // =========================================================================

    /// In failed SQL transaction - Code 25P02
    ///
    /// Every statement after a failed one is rejected with this code until
    /// the transaction ends.
    pub const IN_FAILED_SQL_TRANSACTION: &'static str = "25P02";

    // =========================================================================
    // Class 3F: Invalid Schema Name
    // =========================================================================

    /// Invalid schema name - Code 3F000
    ///
    /// What pooled sessions see while the schema namespace is being rebuilt.
    pub const INVALID_SCHEMA_NAME: &'static str = "3F000";

    // =========================================================================
    // Class 42: Syntax Error or Access Rule Violation
    // =========================================================================

    /// Undefined table - Code 42P01
    pub const UNDEFINED_TABLE: &'static str = "42P01";

    #[inline]
    pub fn is_unique_violation(code: &str) -> bool {
        code == Self::UNIQUE_VIOLATION
    }

    #[inline]
    pub fn is_foreign_key_violation(code: &str) -> bool {
        code == Self::FOREIGN_KEY_VIOLATION
    }

    #[inline]
    pub fn is_not_null_violation(code: &str) -> bool {
        code == Self::NOT_NULL_VIOLATION
    }

    #[inline]
    pub fn is_in_failed_transaction(code: &str) -> bool {
        code == Self::IN_FAILED_SQL_TRANSACTION
    }

    /// Check if the error code is any integrity constraint violation (Class 23)
    #[inline]
    pub fn is_integrity_constraint_violation(code: &str) -> bool {
        code.starts_with("23")
    }

    /// Errors expected from sessions that raced a schema recreate.
    #[inline]
    pub fn is_missing_schema_object(code: &str) -> bool {
        code == Self::UNDEFINED_TABLE || code == Self::INVALID_SCHEMA_NAME
    }
}
