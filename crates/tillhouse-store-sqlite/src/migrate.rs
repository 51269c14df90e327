// crates/tillhouse-store-sqlite/src/migrate.rs
// ============================================================================
// Module: Schema Migrator
// Description: Additive, idempotent schema evolution for existing databases.
// Purpose: Upgrade tenant and master files in place without touching data.
// Dependencies: rusqlite, serde, tillhouse-core
// ============================================================================

//! ## Overview
//! [`migrate`] first inspects the catalog read-only. When nothing is missing
//! it returns an empty [`MigrationReport`] without taking a write lock, so a
//! repeated run is a true no-op. Otherwise it takes an immediate transaction,
//! re-inspects under the lock, creates missing tables, adds missing columns,
//! creates missing indexes, and stamps `PRAGMA user_version`.
//!
//! Duplicate table and duplicate column failures are treated as success, so
//! two processes racing on the same file converge on the same schema.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashSet;
use std::sync::Mutex;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use serde::Serialize;
use tillhouse_core::TenantCode;

use crate::error::StoreError;
use crate::error::classify_sqlite_error;
use crate::schema::SchemaPlan;

// ============================================================================
// SECTION: Report
// ============================================================================

/// Structural changes applied by one migration run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// Tables created by this run.
    pub tables_created: Vec<String>,
    /// Columns added by this run, as `table.column`.
    pub columns_added: Vec<String>,
    /// Indexes created by this run.
    pub indexes_created: Vec<String>,
    /// Schema version stamped after the run.
    pub schema_version: i64,
}

impl MigrationReport {
    /// Returns true when the run changed no structure.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables_created.is_empty()
            && self.columns_added.is_empty()
            && self.indexes_created.is_empty()
    }
}

/// Receives migration reports for files that actually changed.
pub trait MigrationObserver: Send + Sync {
    /// Called after a tenant file was upgraded.
    fn migrated(&self, tenant_code: &TenantCode, report: &MigrationReport);
}

// ============================================================================
// SECTION: Memo
// ============================================================================

/// Per-process record of tenant codes already migrated.
///
/// # Invariants
/// - Only skips redundant work; an empty memo yields identical results.
#[derive(Debug, Default)]
pub struct MigrationMemo {
    /// Codes migrated by this process.
    migrated: Mutex<HashSet<TenantCode>>,
}

impl MigrationMemo {
    /// Creates an empty memo.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when `code` was migrated by this process.
    #[must_use]
    pub fn contains(&self, code: &TenantCode) -> bool {
        self.migrated.lock().is_ok_and(|set| set.contains(code))
    }

    /// Records `code` as migrated.
    pub fn insert(&self, code: &TenantCode) {
        if let Ok(mut set) = self.migrated.lock() {
            set.insert(code.clone());
        }
    }

    /// Forgets `code` (file created or removed).
    pub fn evict(&self, code: &TenantCode) {
        if let Ok(mut set) = self.migrated.lock() {
            set.remove(code);
        }
    }
}

// ============================================================================
// SECTION: Migration
// ============================================================================

/// Brings `connection` up to `plan`, adding only what is missing.
///
/// # Errors
///
/// Returns [`StoreError::Invalid`] when the file carries a newer schema
/// version than `plan`, or any non-duplicate driver failure.
pub fn migrate(connection: &mut Connection, plan: &SchemaPlan) -> Result<MigrationReport, StoreError> {
    let version = schema_version(connection)?;
    if version > plan.version {
        return Err(StoreError::Invalid(format!(
            "{} schema version {version} is newer than supported version {}",
            plan.label, plan.version
        )));
    }
    if version == plan.version && !has_pending_work(connection, plan)? {
        return Ok(MigrationReport {
            schema_version: version,
            ..MigrationReport::default()
        });
    }
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| classify_sqlite_error(&err))?;
    let report = apply_plan(&tx, plan)?;
    tx.commit().map_err(|err| classify_sqlite_error(&err))?;
    Ok(report)
}

/// Applies every missing element of `plan` on an open transaction.
pub(crate) fn apply_plan(
    connection: &Connection,
    plan: &SchemaPlan,
) -> Result<MigrationReport, StoreError> {
    let mut report = MigrationReport {
        schema_version: plan.version,
        ..MigrationReport::default()
    };
    for table in plan.tables {
        if table_exists(connection, table.name)? {
            continue;
        }
        if tolerate_duplicate(execute_ddl(connection, table.ddl))? {
            report.tables_created.push(table.name.to_string());
        }
    }
    for column in plan.columns {
        if column_exists(connection, column.table, column.column)? {
            continue;
        }
        let ddl = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            column.table, column.column, column.definition
        );
        if tolerate_duplicate(execute_ddl(connection, &ddl))? {
            report.columns_added.push(format!("{}.{}", column.table, column.column));
        }
    }
    for index in plan.indexes {
        if index_exists(connection, index.name)? {
            continue;
        }
        execute_ddl(connection, index.ddl)?;
        report.indexes_created.push(index.name.to_string());
    }
    execute_ddl(connection, &format!("PRAGMA user_version = {}", plan.version))?;
    Ok(report)
}

/// Inserts the plan's seed rows.
pub(crate) fn apply_seeds(connection: &Connection, plan: &SchemaPlan) -> Result<(), StoreError> {
    for seed in plan.seeds {
        execute_ddl(connection, seed)?;
    }
    Ok(())
}

/// Reads `PRAGMA user_version`.
///
/// # Errors
///
/// Returns the classified driver error.
pub fn schema_version(connection: &Connection) -> Result<i64, StoreError> {
    connection
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|err| classify_sqlite_error(&err))
}

/// Returns true when `table` exists.
///
/// # Errors
///
/// Returns the classified driver error.
pub fn table_exists(connection: &Connection, table: &str) -> Result<bool, StoreError> {
    catalog_entry_exists(connection, "table", table)
}

/// Returns true when `table` has a column named `column`.
///
/// # Errors
///
/// Returns the classified driver error.
pub fn column_exists(connection: &Connection, table: &str, column: &str) -> Result<bool, StoreError> {
    connection
        .query_row(
            "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
            [table, column],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(|err| classify_sqlite_error(&err))
}

/// Returns true when index `name` exists.
fn index_exists(connection: &Connection, name: &str) -> Result<bool, StoreError> {
    catalog_entry_exists(connection, "index", name)
}

/// Looks up one `sqlite_master` entry.
fn catalog_entry_exists(connection: &Connection, kind: &str, name: &str) -> Result<bool, StoreError> {
    connection
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2",
            [kind, name],
            |_| Ok(()),
        )
        .optional()
        .map(|found| found.is_some())
        .map_err(|err| classify_sqlite_error(&err))
}

/// Returns true when any table, column, or index from `plan` is missing.
fn has_pending_work(connection: &Connection, plan: &SchemaPlan) -> Result<bool, StoreError> {
    for table in plan.tables {
        if !table_exists(connection, table.name)? {
            return Ok(true);
        }
    }
    for column in plan.columns {
        if !column_exists(connection, column.table, column.column)? {
            return Ok(true);
        }
    }
    for index in plan.indexes {
        if !index_exists(connection, index.name)? {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Executes one DDL statement.
fn execute_ddl(connection: &Connection, ddl: &str) -> Result<(), StoreError> {
    connection.execute_batch(ddl).map_err(|err| classify_sqlite_error(&err))
}

/// Maps duplicate schema outcomes to `Ok(false)`; `Ok(true)` means applied.
fn tolerate_duplicate(result: Result<(), StoreError>) -> Result<bool, StoreError> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.is_schema_duplicate() => Ok(false),
        Err(err) => Err(err),
    }
}
