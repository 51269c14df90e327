// crates/tillhouse-store-sqlite/src/error.rs
// ============================================================================
// Module: SQLite Store Errors
// Description: Typed storage error taxonomy and driver error classification.
// Purpose: Keep every inspection of driver error text in one function.
// Dependencies: rusqlite, thiserror
// ============================================================================

//! ## Overview
//! Callers branch on [`StoreError`] variants rather than on driver messages.
//! [`classify_sqlite_error`] is the single boundary that turns a
//! `rusqlite::Error` into that taxonomy; extended result codes are preferred
//! and message text is only consulted for DDL errors, which `SQLite` reports
//! with the generic `SQLITE_ERROR` code.

// ============================================================================
// SECTION: Imports
// ============================================================================

use rusqlite::ErrorCode;
use rusqlite::ffi;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Storage errors surfaced by connections, the factory, and the registry.
///
/// # Invariants
/// - `DuplicateColumn` and `DuplicateTable` are recovered inside the migrator
///   and never returned from `open` or `ensure_initialized`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Database file expected but absent.
    #[error("database not found: {0}")]
    NotFound(String),
    /// Database file already present where a new one was requested.
    #[error("database already exists: {0}")]
    AlreadyExists(String),
    /// Column already present (idempotent migration outcome).
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),
    /// Table already present (idempotent migration outcome).
    #[error("duplicate table: {0}")]
    DuplicateTable(String),
    /// Uniqueness constraint broken.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    /// Database busy or locked by another connection; retryable.
    #[error("database busy: {0}")]
    Busy(String),
    /// Operation issued on a closed handle.
    #[error("database handle closed")]
    Closed,
    /// Stored data or input does not match expectations.
    #[error("invalid store data: {0}")]
    Invalid(String),
    /// Filesystem failure.
    #[error("store io error: {0}")]
    Io(String),
    /// Any other driver failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    /// Returns true for the idempotent schema outcomes the migrator swallows.
    #[must_use]
    pub const fn is_schema_duplicate(&self) -> bool {
        matches!(self, Self::DuplicateColumn(_) | Self::DuplicateTable(_))
    }

    /// Returns true for transient contention errors a caller may retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Busy(_))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Maps a driver error onto [`StoreError`].
#[must_use]
pub fn classify_sqlite_error(error: &rusqlite::Error) -> StoreError {
    match error {
        rusqlite::Error::SqliteFailure(failure, message) => {
            let text = message.clone().unwrap_or_else(|| error.to_string());
            match failure.code {
                ErrorCode::ConstraintViolation
                    if matches!(
                        failure.extended_code,
                        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                    ) =>
                {
                    StoreError::UniqueViolation(text)
                }
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => StoreError::Busy(text),
                ErrorCode::CannotOpen => StoreError::Io(text),
                _ => classify_message(text),
            }
        }
        other => StoreError::Storage(other.to_string()),
    }
}

/// Classifies DDL failures that only carry a message.
fn classify_message(text: String) -> StoreError {
    let lower = text.to_ascii_lowercase();
    if lower.contains("duplicate column name") {
        StoreError::DuplicateColumn(text)
    } else if lower.contains("already exists") {
        StoreError::DuplicateTable(text)
    } else {
        StoreError::Storage(text)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions are permitted.")]

    use rusqlite::Connection;

    use super::StoreError;
    use super::classify_sqlite_error;

    fn scratch() -> Connection {
        let connection = Connection::open_in_memory().unwrap();
        connection
            .execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT UNIQUE);")
            .unwrap();
        connection
    }

    #[test]
    fn duplicate_column_is_classified() {
        let connection = scratch();
        let err = connection.execute_batch("ALTER TABLE t ADD COLUMN name TEXT;").unwrap_err();
        assert!(matches!(classify_sqlite_error(&err), StoreError::DuplicateColumn(_)));
    }

    #[test]
    fn duplicate_table_is_classified() {
        let connection = scratch();
        let err = connection.execute_batch("CREATE TABLE t (id INTEGER);").unwrap_err();
        assert!(matches!(classify_sqlite_error(&err), StoreError::DuplicateTable(_)));
    }

    #[test]
    fn unique_and_primary_key_violations_are_classified() {
        let connection = scratch();
        connection.execute("INSERT INTO t (id, name) VALUES (1, 'a')", []).unwrap();
        let unique = connection.execute("INSERT INTO t (id, name) VALUES (2, 'a')", []).unwrap_err();
        assert!(matches!(classify_sqlite_error(&unique), StoreError::UniqueViolation(_)));
        let primary = connection.execute("INSERT INTO t (id, name) VALUES (1, 'b')", []).unwrap_err();
        assert!(matches!(classify_sqlite_error(&primary), StoreError::UniqueViolation(_)));
    }

    #[test]
    fn other_failures_fall_through_to_storage() {
        let connection = scratch();
        let err = connection.execute_batch("SELECT * FROM missing_table;").unwrap_err();
        let classified = classify_sqlite_error(&err);
        assert!(matches!(classified, StoreError::Storage(_)));
        assert!(!classified.is_schema_duplicate());
        assert!(!classified.is_transient());
    }
}
