// crates/tillhouse-store-sqlite/src/connection.rs
// ============================================================================
// Module: SQLite Connection Primitive
// Description: Async query/get/run/close over one physical SQLite handle.
// Purpose: One contract for the master registry and every tenant database.
// Dependencies: async-trait, base64, rusqlite, serde, serde_json, tokio
// ============================================================================

//! ## Overview
//! [`SqliteConnection`] owns a single `rusqlite::Connection` and runs every
//! statement on the tokio blocking pool. Rows come back as JSON objects keyed
//! by column name so thin route handlers can return them directly.
//!
//! A handle is released exactly once: by [`DatabaseHandle::close`], or by
//! `Drop` when the owning future is cancelled first. [`HandleGauge`] counts the
//! handles currently open so leaks are observable.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::TryLockError;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::Transaction;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use rusqlite::types::ValueRef;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Number;
use serde_json::Value;

use crate::error::StoreError;
use crate::error::classify_sqlite_error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default busy timeout (ms).
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One result row keyed by column name.
pub type Row = Map<String, Value>;

/// Outcome of a mutating statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    /// Rowid of the most recent successful insert on this handle.
    pub inserted_id: i64,
    /// Rows changed by the statement.
    pub affected: usize,
}

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl JournalMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Pragmas applied to every handle the store opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SqliteOptions {
    /// Busy timeout in milliseconds.
    pub busy_timeout_ms: u64,
    /// Journal mode.
    pub journal_mode: JournalMode,
    /// Synchronous mode.
    pub sync_mode: SyncMode,
}

impl Default for SqliteOptions {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: JournalMode::default(),
            sync_mode: SyncMode::default(),
        }
    }
}

/// Shared counter of currently open handles.
#[derive(Debug, Clone, Default)]
pub struct HandleGauge(Arc<AtomicUsize>);

impl HandleGauge {
    /// Creates a gauge at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of handles currently open.
    #[must_use]
    pub fn open_handles(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    /// Records a newly opened handle.
    fn acquire(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }

    /// Records a released handle.
    fn release(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Four-operation database contract shared by master and tenant handles.
#[async_trait]
pub trait DatabaseHandle: Send + Sync {
    /// Runs a read statement and returns every row.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError>;

    /// Runs a read statement and returns the first row, if any.
    async fn get(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, StoreError>;

    /// Runs a mutating statement.
    async fn run(&self, sql: &str, params: &[Value]) -> Result<RunOutcome, StoreError>;

    /// Releases the handle. Idempotent and infallible.
    async fn close(&self);
}

// ============================================================================
// SECTION: Connection
// ============================================================================

/// Slot holding the physical handle until it is released.
struct HandleSlot {
    /// Physical connection; `None` once released.
    connection: Mutex<Option<Connection>>,
    /// Gauge tracking open handles.
    gauge: HandleGauge,
}

impl HandleSlot {
    /// Takes the connection out of the slot, updating the gauge once.
    fn take(&self) -> Option<Connection> {
        let mut guard = self.connection.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let taken = guard.take();
        if taken.is_some() {
            self.gauge.release();
        }
        taken
    }
}

impl Drop for HandleSlot {
    fn drop(&mut self) {
        drop(self.take());
    }
}

/// Async handle over one `SQLite` database file.
///
/// # Invariants
/// - Statements on one handle execute in issue order.
/// - The gauge is decremented exactly once per handle.
pub struct SqliteConnection {
    /// Shared slot; blocking tasks hold a clone while they run.
    slot: Arc<HandleSlot>,
    /// Database file path.
    path: PathBuf,
}

impl SqliteConnection {
    /// Wraps an open connection and records it on the gauge.
    pub(crate) fn from_raw(connection: Connection, path: PathBuf, gauge: &HandleGauge) -> Self {
        gauge.acquire();
        Self {
            slot: Arc::new(HandleSlot {
                connection: Mutex::new(Some(connection)),
                gauge: gauge.clone(),
            }),
            path,
        }
    }

    /// Returns the database file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true once the handle has been released.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self.slot.connection.try_lock() {
            Ok(guard) => guard.is_none(),
            Err(TryLockError::WouldBlock) => false,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().is_none(),
        }
    }

    /// Runs `f` inside one transaction, committing only when it returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] from `f`, from the driver, or
    /// [`StoreError::Closed`] when the handle was released.
    pub async fn transaction<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        self.with_connection(move |connection| {
            let tx = connection.transaction().map_err(|err| classify_sqlite_error(&err))?;
            let value = f(&tx)?;
            tx.commit().map_err(|err| classify_sqlite_error(&err))?;
            Ok(value)
        })
        .await
    }

    /// Runs `f` against the physical connection on the blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let slot = Arc::clone(&self.slot);
        tokio::task::spawn_blocking(move || {
            let mut guard = slot
                .connection
                .lock()
                .map_err(|_| StoreError::Storage("sqlite handle mutex poisoned".to_string()))?;
            let connection = guard.as_mut().ok_or(StoreError::Closed)?;
            f(connection)
        })
        .await
        .map_err(|err| StoreError::Storage(format!("sqlite blocking task failed: {err}")))?
    }
}

#[async_trait]
impl DatabaseHandle for SqliteConnection {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        let sql = sql.to_string();
        let params = bind_params(params);
        self.with_connection(move |connection| select_rows(connection, &sql, &params, None)).await
    }

    async fn get(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, StoreError> {
        let sql = sql.to_string();
        let params = bind_params(params);
        self.with_connection(move |connection| {
            Ok(select_rows(connection, &sql, &params, Some(1))?.into_iter().next())
        })
        .await
    }

    async fn run(&self, sql: &str, params: &[Value]) -> Result<RunOutcome, StoreError> {
        let sql = sql.to_string();
        let params = bind_params(params);
        self.with_connection(move |connection| execute_bound(connection, &sql, &params)).await
    }

    async fn close(&self) {
        let slot = Arc::clone(&self.slot);
        let _ = tokio::task::spawn_blocking(move || drop(slot.take())).await;
    }
}

// ============================================================================
// SECTION: Synchronous Helpers
// ============================================================================

/// Runs a read statement on a borrowed connection or transaction.
///
/// # Errors
///
/// Returns the classified driver error.
pub fn query_all(
    connection: &Connection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Row>, StoreError> {
    select_rows(connection, sql, &bind_params(params), None)
}

/// Runs a read statement and returns its first row.
///
/// # Errors
///
/// Returns the classified driver error.
pub fn query_one(
    connection: &Connection,
    sql: &str,
    params: &[Value],
) -> Result<Option<Row>, StoreError> {
    Ok(select_rows(connection, sql, &bind_params(params), Some(1))?.into_iter().next())
}

/// Runs a mutating statement on a borrowed connection or transaction.
///
/// # Errors
///
/// Returns the classified driver error.
pub fn execute(
    connection: &Connection,
    sql: &str,
    params: &[Value],
) -> Result<RunOutcome, StoreError> {
    execute_bound(connection, sql, &bind_params(params))
}

/// Opens a physical handle and applies the configured pragmas.
pub(crate) fn open_raw(
    path: &Path,
    options: &SqliteOptions,
    create: bool,
) -> Result<Connection, StoreError> {
    let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    if create {
        flags |= OpenFlags::SQLITE_OPEN_CREATE;
    }
    let connection =
        Connection::open_with_flags(path, flags).map_err(|err| classify_sqlite_error(&err))?;
    apply_pragmas(&connection, options)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(connection: &Connection, options: &SqliteOptions) -> Result<(), StoreError> {
    connection
        .busy_timeout(Duration::from_millis(options.busy_timeout_ms))
        .map_err(|err| classify_sqlite_error(&err))?;
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| classify_sqlite_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", options.journal_mode.pragma_value()))
        .map_err(|err| classify_sqlite_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", options.sync_mode.pragma_value()))
        .map_err(|err| classify_sqlite_error(&err))?;
    Ok(())
}

/// Executes a prepared read and maps rows to JSON objects.
fn select_rows(
    connection: &Connection,
    sql: &str,
    params: &[SqlValue],
    limit: Option<usize>,
) -> Result<Vec<Row>, StoreError> {
    let mut statement = connection.prepare_cached(sql).map_err(|err| classify_sqlite_error(&err))?;
    let columns: Vec<String> =
        statement.column_names().into_iter().map(ToString::to_string).collect();
    let mut rows =
        statement.query(params_from_iter(params.iter())).map_err(|err| classify_sqlite_error(&err))?;
    let mut output = Vec::new();
    while let Some(row) = rows.next().map_err(|err| classify_sqlite_error(&err))? {
        let mut mapped = Row::new();
        for (index, name) in columns.iter().enumerate() {
            let value = row.get_ref(index).map_err(|err| classify_sqlite_error(&err))?;
            mapped.insert(name.clone(), column_to_json(value));
        }
        output.push(mapped);
        if limit.is_some_and(|limit| output.len() >= limit) {
            break;
        }
    }
    Ok(output)
}

/// Executes a prepared mutation.
fn execute_bound(
    connection: &Connection,
    sql: &str,
    params: &[SqlValue],
) -> Result<RunOutcome, StoreError> {
    let mut statement = connection.prepare_cached(sql).map_err(|err| classify_sqlite_error(&err))?;
    let affected =
        statement.execute(params_from_iter(params.iter())).map_err(|err| classify_sqlite_error(&err))?;
    Ok(RunOutcome {
        inserted_id: connection.last_insert_rowid(),
        affected,
    })
}

/// Converts JSON parameters into driver values.
fn bind_params(params: &[Value]) -> Vec<SqlValue> {
    params.iter().map(json_to_sql).collect()
}

/// Converts one JSON value into a driver value.
fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Integer(i64::from(*flag)),
        Value::Number(number) => number.as_i64().map_or_else(
            || number.as_f64().map_or(SqlValue::Null, SqlValue::Real),
            SqlValue::Integer,
        ),
        Value::String(text) => SqlValue::Text(text.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// Converts one column value into JSON.
fn column_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(number) => Value::Number(Number::from(number)),
        ValueRef::Real(number) => Number::from_f64(number).map_or(Value::Null, Value::Number),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(STANDARD.encode(bytes)),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions are permitted.")]

    use std::sync::Arc;
    use std::time::Duration;
    use std::time::Instant;

    use serde_json::json;
    use tempfile::TempDir;

    use super::DatabaseHandle;
    use super::HandleGauge;
    use super::SqliteConnection;
    use super::SqliteOptions;
    use super::open_raw;
    use crate::error::StoreError;

    fn scratch(temp: &TempDir, gauge: &HandleGauge) -> SqliteConnection {
        let path = temp.path().join("scratch.db");
        let connection = open_raw(&path, &SqliteOptions::default(), true).unwrap();
        SqliteConnection::from_raw(connection, path, gauge)
    }

    #[tokio::test]
    async fn query_get_run_round_trip_json_values() {
        let temp = TempDir::new().unwrap();
        let gauge = HandleGauge::new();
        let db = scratch(&temp, &gauge);
        db.run("CREATE TABLE items (id INTEGER PRIMARY KEY, name TEXT, price REAL, raw BLOB)", &[])
            .await
            .unwrap();
        let outcome = db
            .run(
                "INSERT INTO items (name, price, raw) VALUES (?1, ?2, ?3)",
                &[json!("tea"), json!(2.5), json!(null)],
            )
            .await
            .unwrap();
        assert_eq!(outcome.inserted_id, 1);
        assert_eq!(outcome.affected, 1);
        db.run("UPDATE items SET raw = x'0102' WHERE id = 1", &[]).await.unwrap();

        let row = db.get("SELECT * FROM items WHERE id = ?1", &[json!(1)]).await.unwrap().unwrap();
        assert_eq!(row["name"], json!("tea"));
        assert_eq!(row["price"], json!(2.5));
        assert_eq!(row["raw"], json!("AQI="));
        assert!(db.get("SELECT * FROM items WHERE id = 99", &[]).await.unwrap().is_none());
        assert_eq!(db.query("SELECT id FROM items", &[]).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn booleans_bind_as_integers() {
        let temp = TempDir::new().unwrap();
        let gauge = HandleGauge::new();
        let db = scratch(&temp, &gauge);
        db.run("CREATE TABLE flags (on_off INTEGER)", &[]).await.unwrap();
        db.run("INSERT INTO flags (on_off) VALUES (?1)", &[json!(true)]).await.unwrap();
        let row = db.get("SELECT on_off FROM flags", &[]).await.unwrap().unwrap();
        assert_eq!(row["on_off"], json!(1));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_updates_gauge() {
        let temp = TempDir::new().unwrap();
        let gauge = HandleGauge::new();
        let db = scratch(&temp, &gauge);
        assert_eq!(gauge.open_handles(), 1);
        db.close().await;
        db.close().await;
        assert!(db.is_closed());
        assert_eq!(gauge.open_handles(), 0);
        assert_eq!(db.query("SELECT 1", &[]).await.unwrap_err(), StoreError::Closed);
    }

    #[tokio::test]
    async fn drop_releases_an_unclosed_handle() {
        let temp = TempDir::new().unwrap();
        let gauge = HandleGauge::new();
        let db = scratch(&temp, &gauge);
        assert_eq!(gauge.open_handles(), 1);
        drop(db);
        assert_eq!(gauge.open_handles(), 0);
    }

    #[tokio::test]
    async fn failed_transaction_rolls_back() {
        let temp = TempDir::new().unwrap();
        let gauge = HandleGauge::new();
        let db = scratch(&temp, &gauge);
        db.run("CREATE TABLE ledger (amount INTEGER NOT NULL)", &[]).await.unwrap();
        let result: Result<(), StoreError> = db
            .transaction(|tx| {
                super::execute(tx, "INSERT INTO ledger (amount) VALUES (?1)", &[json!(10)])?;
                super::execute(tx, "INSERT INTO ledger (amount) VALUES (NULL)", &[])?;
                Ok(())
            })
            .await;
        assert!(result.is_err());
        assert!(db.query("SELECT * FROM ledger", &[]).await.unwrap().is_empty());
    }

    #[test]
    fn open_without_create_refuses_missing_file() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("missing.db");
        assert!(open_raw(&missing, &SqliteOptions::default(), false).is_err());
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn close_does_not_stall_the_runtime_behind_a_running_statement() {
        let temp = TempDir::new().unwrap();
        let gauge = HandleGauge::new();
        let db = Arc::new(scratch(&temp, &gauge));
        let started = Instant::now();

        let busy = Arc::clone(&db);
        let statement = tokio::spawn(async move {
            busy.transaction(|_| {
                std::thread::sleep(Duration::from_millis(400));
                Ok(())
            })
            .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!db.is_closed());

        let closing = Arc::clone(&db);
        let close = tokio::spawn(async move { closing.close().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_millis(300));

        statement.await.unwrap().unwrap();
        close.await.unwrap();
        assert!(db.is_closed());
        assert_eq!(gauge.open_handles(), 0);
    }
}
