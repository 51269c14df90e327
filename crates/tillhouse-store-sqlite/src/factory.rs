// crates/tillhouse-store-sqlite/src/factory.rs
// ============================================================================
// Module: Tenant Database Factory
// Description: Path resolution, creation, and migrated opening of tenant files.
// Purpose: Own every physical tenant database file under one injected root.
// Dependencies: rand, rusqlite, tillhouse-core, tokio
// ============================================================================

//! ## Overview
//! Every tenant code maps to exactly one file, `<data_dir>/tenants/<code>.db`.
//! [`TenantDatabaseFactory::create`] builds a new file in a single
//! transaction under a staging name and links it into place only after the
//! commit, so a half-built file is never visible at the tenant path. [`TenantDatabaseFactory::open`] never
//! creates a file: it returns [`StoreError::NotFound`] for unknown codes and
//! runs the migrator before handing out a connection.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use rusqlite::Transaction;
use tillhouse_core::TenantCode;

use crate::connection::HandleGauge;
use crate::connection::SqliteConnection;
use crate::connection::SqliteOptions;
use crate::connection::open_raw;
use crate::error::StoreError;
use crate::error::classify_sqlite_error;
use crate::migrate::MigrationMemo;
use crate::migrate::MigrationObserver;
use crate::migrate::MigrationReport;
use crate::migrate::apply_plan;
use crate::migrate::apply_seeds;
use crate::migrate::migrate;
use crate::schema::TENANT_SCHEMA;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Subdirectory of the data root holding tenant files.
pub const TENANTS_DIR: &str = "tenants";
/// Tenant database file extension.
pub const TENANT_DB_EXTENSION: &str = "db";
/// `SQLite` sidecar suffixes removed together with a database file.
const SIDECAR_SUFFIXES: [&str; 3] = ["-wal", "-shm", "-journal"];
/// Marker between the tenant file name and the nonce of a staging file.
const STAGING_MARKER: &str = ".creating-";

// ============================================================================
// SECTION: Path Function
// ============================================================================

/// Returns the tenant database path for `code` under `data_dir` (no I/O).
#[must_use]
pub fn tenant_db_path(data_dir: &Path, code: &TenantCode) -> PathBuf {
    data_dir.join(TENANTS_DIR).join(format!("{code}.{TENANT_DB_EXTENSION}"))
}

// ============================================================================
// SECTION: Factory
// ============================================================================

/// Creates and opens tenant database files.
#[derive(Clone)]
pub struct TenantDatabaseFactory {
    /// Injected data root.
    data_dir: PathBuf,
    /// Pragmas for every handle.
    options: SqliteOptions,
    /// Open-handle gauge shared with every connection.
    gauge: HandleGauge,
    /// Optional migration memo.
    memo: Option<Arc<MigrationMemo>>,
    /// Optional receiver for non-empty migration reports.
    observer: Option<Arc<dyn MigrationObserver>>,
}

impl TenantDatabaseFactory {
    /// Creates a factory rooted at `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, options: SqliteOptions, gauge: HandleGauge) -> Self {
        Self {
            data_dir: data_dir.into(),
            options,
            gauge,
            memo: None,
            observer: None,
        }
    }

    /// Enables the per-process migration memo.
    #[must_use]
    pub fn with_memo(mut self, memo: Arc<MigrationMemo>) -> Self {
        self.memo = Some(memo);
        self
    }

    /// Registers a receiver for migration reports.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn MigrationObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Returns the data root.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Returns the open-handle gauge.
    #[must_use]
    pub const fn gauge(&self) -> &HandleGauge {
        &self.gauge
    }

    /// Returns the path for `code` (pure).
    #[must_use]
    pub fn tenant_db_path(&self, code: &TenantCode) -> PathBuf {
        tenant_db_path(&self.data_dir, code)
    }

    /// Returns true when a file exists for `code`.
    #[must_use]
    pub fn exists(&self, code: &TenantCode) -> bool {
        self.tenant_db_path(code).is_file()
    }

    /// Creates a new tenant file with the full schema and default settings.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] when the file is present, or the
    /// failure that aborted creation (nothing is left at the tenant path).
    pub async fn create(&self, code: &TenantCode) -> Result<PathBuf, StoreError> {
        self.create_with(code, |_| Ok(())).await
    }

    /// Creates a new tenant file and runs `seed` inside the same transaction.
    ///
    /// # Errors
    ///
    /// Same as [`Self::create`]; a failing `seed` aborts creation.
    pub async fn create_with<F>(&self, code: &TenantCode, seed: F) -> Result<PathBuf, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<(), StoreError> + Send + 'static,
    {
        let path = self.tenant_db_path(code);
        let options = self.options;
        if let Some(memo) = &self.memo {
            memo.evict(code);
        }
        let task_path = path.clone();
        tokio::task::spawn_blocking(move || create_file(&task_path, &options, seed))
            .await
            .map_err(|err| StoreError::Storage(format!("tenant create task failed: {err}")))??;
        Ok(path)
    }

    /// Opens an existing tenant file and migrates it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no file exists for `code`, or the
    /// open/migration failure.
    pub async fn open(&self, code: &TenantCode) -> Result<SqliteConnection, StoreError> {
        let path = self.tenant_db_path(code);
        let options = self.options;
        let skip_migration = self.memo.as_ref().is_some_and(|memo| memo.contains(code));
        let task_path = path.clone();
        let (connection, report) = tokio::task::spawn_blocking(move || {
            if !task_path.is_file() {
                return Err(StoreError::NotFound(task_path.display().to_string()));
            }
            let mut connection = open_raw(&task_path, &options, false)?;
            let report =
                if skip_migration { None } else { Some(migrate(&mut connection, &TENANT_SCHEMA)?) };
            Ok((connection, report))
        })
        .await
        .map_err(|err| StoreError::Storage(format!("tenant open task failed: {err}")))??;
        if let Some(report) = report {
            self.after_migration(code, &report);
        }
        Ok(SqliteConnection::from_raw(connection, path, &self.gauge))
    }

    /// Deletes the file for `code` and its sidecars.
    ///
    /// Returns true when a database file existed. A missing file is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when removal fails.
    pub async fn remove(&self, code: &TenantCode) -> Result<bool, StoreError> {
        if let Some(memo) = &self.memo {
            memo.evict(code);
        }
        let path = self.tenant_db_path(code);
        tokio::task::spawn_blocking(move || remove_database_files(&path))
            .await
            .map_err(|err| StoreError::Storage(format!("tenant remove task failed: {err}")))?
    }

    /// Lists tenant codes that have a file on disk, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the tenants directory cannot be read.
    pub fn list_codes(&self) -> Result<Vec<TenantCode>, StoreError> {
        let dir = self.data_dir.join(TENANTS_DIR);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };
        let mut codes = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(TENANT_DB_EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            if let Ok(code) = TenantCode::parse(stem) {
                codes.push(code);
            }
        }
        codes.sort();
        Ok(codes)
    }

    /// Opens every tenant file once, migrating each.
    ///
    /// # Errors
    ///
    /// Returns the first listing failure. Per-file failures are reported in
    /// the result instead of aborting the sweep.
    pub async fn migrate_all(
        &self,
    ) -> Result<Vec<(TenantCode, Result<MigrationReport, StoreError>)>, StoreError> {
        let mut results = Vec::new();
        for code in self.list_codes()? {
            let path = self.tenant_db_path(&code);
            let options = self.options;
            let outcome = tokio::task::spawn_blocking(move || {
                let mut connection = open_raw(&path, &options, false)?;
                migrate(&mut connection, &TENANT_SCHEMA)
            })
            .await
            .map_err(|err| StoreError::Storage(format!("tenant migrate task failed: {err}")))
            .and_then(|result| result);
            if let Ok(report) = &outcome {
                self.after_migration(&code, report);
            }
            results.push((code, outcome));
        }
        Ok(results)
    }

    /// Records a completed migration in the memo and notifies the observer.
    fn after_migration(&self, code: &TenantCode, report: &MigrationReport) {
        if let Some(memo) = &self.memo {
            memo.insert(code);
        }
        if !report.is_empty()
            && let Some(observer) = &self.observer
        {
            observer.migrated(code, report);
        }
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds a new database file in a staging file and publishes it atomically.
///
/// The tenant path only ever names a committed database: the schema is built
/// under `<code>.db.creating-<nonce>` and hard-linked into place, which fails
/// when another file already holds the name.
fn create_file<F>(path: &Path, options: &SqliteOptions, seed: F) -> Result<(), StoreError>
where
    F: FnOnce(&Transaction<'_>) -> Result<(), StoreError>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    if path.exists() {
        return Err(StoreError::AlreadyExists(path.display().to_string()));
    }
    let staging = staging_path(path);
    let result = build_schema(&staging, options, seed).and_then(|()| publish(&staging, path));
    let _ = remove_database_files(&staging);
    result
}

/// Returns a unique staging path next to `path`.
fn staging_path(path: &Path) -> PathBuf {
    let mut staging = path.as_os_str().to_os_string();
    staging.push(format!("{STAGING_MARKER}{:016x}", rand::random::<u64>()));
    PathBuf::from(staging)
}

/// Links a committed staging file to its final name.
fn publish(staging: &Path, path: &Path) -> Result<(), StoreError> {
    match fs::hard_link(staging, path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
            Err(StoreError::AlreadyExists(path.display().to_string()))
        }
        Err(err) => Err(err.into()),
    }
}

/// Issues all DDL, seeds, and the caller's seed closure in one transaction.
fn build_schema<F>(path: &Path, options: &SqliteOptions, seed: F) -> Result<(), StoreError>
where
    F: FnOnce(&Transaction<'_>) -> Result<(), StoreError>,
{
    let mut connection = open_raw(path, options, true)?;
    // The staging file must be self-contained once closed; the configured
    // journal mode applies again on every later open.
    connection
        .execute_batch("PRAGMA journal_mode = DELETE;")
        .map_err(|err| classify_sqlite_error(&err))?;
    let tx = connection.transaction().map_err(|err| classify_sqlite_error(&err))?;
    apply_plan(&tx, &TENANT_SCHEMA)?;
    apply_seeds(&tx, &TENANT_SCHEMA)?;
    seed(&tx)?;
    tx.commit().map_err(|err| classify_sqlite_error(&err))?;
    connection.close().map_err(|(_, err)| classify_sqlite_error(&err))
}

/// Removes a database file and its sidecars; returns true if the file existed.
fn remove_database_files(path: &Path) -> Result<bool, StoreError> {
    let existed = remove_if_present(path)?;
    for suffix in SIDECAR_SUFFIXES {
        let mut sidecar = path.as_os_str().to_os_string();
        sidecar.push(suffix);
        remove_if_present(Path::new(&sidecar))?;
    }
    Ok(existed)
}

/// Removes one file, treating absence as success.
fn remove_if_present(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use proptest::prelude::*;
    use tillhouse_core::TenantCode;

    use super::tenant_db_path;

    #[test]
    fn path_is_under_tenants_directory() {
        let code = TenantCode::from_parts("Bob's Diner", 1_700_000_000_000);
        let path = tenant_db_path(Path::new("/data"), &code);
        assert_eq!(path, Path::new("/data/tenants/bob_s_diner_1700000000000.db"));
    }

    proptest! {
        #[test]
        fn path_never_escapes_tenants_directory(name in ".{0,60}", ts in 0i64 .. 10_000_000_000_000) {
            let code = TenantCode::from_parts(&name, ts);
            let root = Path::new("/srv/tillhouse");
            let tenants_dir = root.join("tenants");
            let path = tenant_db_path(root, &code);
            prop_assert_eq!(path.parent(), Some(tenants_dir.as_path()));
            prop_assert_eq!(path.clone(), tenant_db_path(root, &code));
        }
    }
}
