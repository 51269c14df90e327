// crates/tillhouse-store-sqlite/src/master.rs
// ============================================================================
// Module: Master Registry
// Description: Process-wide connection to the cross-tenant master database.
// Purpose: Track tenant metadata and platform accounts behind one handle.
// Dependencies: async-trait, serde, serde_json, tillhouse-core, tokio
// ============================================================================

//! ## Overview
//! [`MasterRegistry`] is constructed once and shared by reference. Its first
//! use runs [`MasterRegistry::ensure_initialized`], which opens `master.db`
//! and migrates it; concurrent callers wait on the same initialization and a
//! failed attempt is retried by the next caller. The registry implements
//! [`DatabaseHandle`] so platform routes use the same contract as tenant
//! routes, and its `close` is a no-op.
//!
//! Status transitions are conditional updates (`WHERE status = ...`), so a
//! caller learns from the affected row count whether the row was in the
//! expected state at the moment of the write.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tillhouse_core::Role;
use tillhouse_core::TenantCode;
use tillhouse_core::TenantRecord;
use tillhouse_core::TenantStatus;
use tillhouse_core::unix_millis;
use tokio::sync::OnceCell;

use crate::connection::DatabaseHandle;
use crate::connection::HandleGauge;
use crate::connection::Row;
use crate::connection::RunOutcome;
use crate::connection::SqliteConnection;
use crate::connection::SqliteOptions;
use crate::connection::open_raw;
use crate::error::StoreError;
use crate::migrate::MigrationReport;
use crate::migrate::migrate;
use crate::schema::MASTER_SCHEMA;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Master database file name under the data root.
pub const MASTER_DB_FILE: &str = "master.db";

/// Column list shared by every tenant select.
const TENANT_COLUMNS: &str = "id, tenant_code, business_name, owner_name, owner_email, owner_phone, \
     username, password_hash, status, activated_at, valid_until, created_by_role, created_by, \
     created_at, updated_at";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Values for a new tenant registry row.
#[derive(Debug, Clone)]
pub struct TenantInsert {
    /// Tenant code.
    pub tenant_code: TenantCode,
    /// Business name.
    pub business_name: String,
    /// Owner display name.
    pub owner_name: String,
    /// Owner email.
    pub owner_email: String,
    /// Owner phone.
    pub owner_phone: Option<String>,
    /// Owner login username.
    pub username: String,
    /// Argon2 PHC hash.
    pub password_hash: String,
    /// Initial status.
    pub status: TenantStatus,
    /// Creator role.
    pub created_by_role: Option<Role>,
    /// Creator subject.
    pub created_by: Option<String>,
}

/// Super-admin account row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SuperAdminRecord {
    /// Row identifier.
    pub id: i64,
    /// Login username.
    pub username: String,
    /// Email address.
    pub email: String,
    /// Argon2 PHC hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Creation time (unix ms).
    pub created_at: i64,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Long-lived handle to the master database.
pub struct MasterRegistry {
    /// Master database path.
    path: PathBuf,
    /// Pragmas for the handle.
    options: SqliteOptions,
    /// Lazily initialized connection.
    connection: OnceCell<SqliteConnection>,
    /// Gauge for the master handle (kept apart from tenant handles).
    gauge: HandleGauge,
    /// Number of initialization attempts that ran.
    initializations: AtomicUsize,
}

impl MasterRegistry {
    /// Creates a registry for `<data_dir>/master.db`. No I/O happens here.
    #[must_use]
    pub fn new(data_dir: &Path, options: SqliteOptions) -> Self {
        Self {
            path: data_dir.join(MASTER_DB_FILE),
            options,
            connection: OnceCell::new(),
            gauge: HandleGauge::new(),
            initializations: AtomicUsize::new(0),
        }
    }

    /// Returns the master database path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns how many initialization attempts have run.
    #[must_use]
    pub fn initializations(&self) -> usize {
        self.initializations.load(Ordering::Acquire)
    }

    /// Opens and migrates the master database once per process.
    ///
    /// # Errors
    ///
    /// Returns the open or migration failure; the next call retries.
    pub async fn ensure_initialized(&self) -> Result<(), StoreError> {
        self.handle().await.map(|_| ())
    }

    /// Returns the initialized connection.
    async fn handle(&self) -> Result<&SqliteConnection, StoreError> {
        self.connection.get_or_try_init(|| self.initialize()).await
    }

    /// Runs one initialization attempt.
    async fn initialize(&self) -> Result<SqliteConnection, StoreError> {
        self.initializations.fetch_add(1, Ordering::AcqRel);
        let path = self.path.clone();
        let options = self.options;
        let (connection, _report): (_, MigrationReport) = tokio::task::spawn_blocking(move || {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut connection = open_raw(&path, &options, true)?;
            let report = migrate(&mut connection, &MASTER_SCHEMA)?;
            Ok::<_, StoreError>((connection, report))
        })
        .await
        .map_err(|err| StoreError::Storage(format!("master init task failed: {err}")))??;
        Ok(SqliteConnection::from_raw(connection, self.path.clone(), &self.gauge))
    }

    // ------------------------------------------------------------------------
    // Tenants
    // ------------------------------------------------------------------------

    /// Inserts a tenant row and returns it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] for a duplicate code, username,
    /// or email.
    pub async fn insert_tenant(&self, tenant: &TenantInsert) -> Result<TenantRecord, StoreError> {
        let now = unix_millis();
        let activated_at = (tenant.status == TenantStatus::Active).then_some(now);
        self.run(
            "INSERT INTO tenants (tenant_code, business_name, owner_name, owner_email, owner_phone, \
             username, password_hash, status, created_by_role, created_by, created_at, updated_at, \
             activated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11, ?12)",
            &[
                json!(tenant.tenant_code.as_str()),
                json!(tenant.business_name),
                json!(tenant.owner_name),
                json!(tenant.owner_email),
                json!(tenant.owner_phone),
                json!(tenant.username),
                json!(tenant.password_hash),
                json!(tenant.status.as_str()),
                json!(tenant.created_by_role.map(Role::as_str)),
                json!(tenant.created_by),
                json!(now),
                json!(activated_at),
            ],
        )
        .await?;
        self.tenant_by_code(&tenant.tenant_code)
            .await?
            .ok_or_else(|| StoreError::Storage("inserted tenant row not readable".to_string()))
    }

    /// Looks up a tenant by code.
    ///
    /// # Errors
    ///
    /// Returns the storage failure or [`StoreError::Invalid`] for a malformed row.
    pub async fn tenant_by_code(&self, code: &TenantCode) -> Result<Option<TenantRecord>, StoreError> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE tenant_code = ?1");
        self.get(&sql, &[json!(code.as_str())]).await?.as_ref().map(tenant_from_row).transpose()
    }

    /// Looks up a tenant by owner username.
    ///
    /// # Errors
    ///
    /// Returns the storage failure or [`StoreError::Invalid`] for a malformed row.
    pub async fn tenant_by_username(&self, username: &str) -> Result<Option<TenantRecord>, StoreError> {
        let sql = format!("SELECT {TENANT_COLUMNS} FROM tenants WHERE username = ?1");
        self.get(&sql, &[json!(username)]).await?.as_ref().map(tenant_from_row).transpose()
    }

    /// Lists tenants, newest first, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns the storage failure or [`StoreError::Invalid`] for a malformed row.
    pub async fn list_tenants(
        &self,
        status: Option<TenantStatus>,
    ) -> Result<Vec<TenantRecord>, StoreError> {
        let rows = match status {
            Some(status) => {
                let sql = format!(
                    "SELECT {TENANT_COLUMNS} FROM tenants WHERE status = ?1 \
                     ORDER BY created_at DESC, id DESC"
                );
                self.query(&sql, &[json!(status.as_str())]).await?
            }
            None => {
                let sql =
                    format!("SELECT {TENANT_COLUMNS} FROM tenants ORDER BY created_at DESC, id DESC");
                self.query(&sql, &[]).await?
            }
        };
        rows.iter().map(tenant_from_row).collect()
    }

    /// Sets a tenant's status; when `expected` is given the row must be in it.
    ///
    /// Stamps `activated_at` the first time a tenant becomes active. Returns
    /// the number of rows changed (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns the storage failure.
    pub async fn update_tenant_status(
        &self,
        code: &TenantCode,
        expected: Option<TenantStatus>,
        status: TenantStatus,
    ) -> Result<usize, StoreError> {
        let outcome = self
            .run(
                "UPDATE tenants SET status = ?2, updated_at = ?3, \
                 activated_at = COALESCE(activated_at, CASE WHEN ?2 = 'active' THEN ?3 END) \
                 WHERE tenant_code = ?1 AND (?4 IS NULL OR status = ?4)",
                &[
                    json!(code.as_str()),
                    json!(status.as_str()),
                    json!(unix_millis()),
                    json!(expected.map(TenantStatus::as_str)),
                ],
            )
            .await?;
        Ok(outcome.affected)
    }

    /// Replaces the owner username and password hash.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] when the username is taken.
    pub async fn update_tenant_credentials(
        &self,
        code: &TenantCode,
        username: &str,
        password_hash: &str,
    ) -> Result<usize, StoreError> {
        let outcome = self
            .run(
                "UPDATE tenants SET username = ?2, password_hash = ?3, updated_at = ?4 \
                 WHERE tenant_code = ?1",
                &[json!(code.as_str()), json!(username), json!(password_hash), json!(unix_millis())],
            )
            .await?;
        Ok(outcome.affected)
    }

    /// Sets or clears the validity expiry.
    ///
    /// # Errors
    ///
    /// Returns the storage failure.
    pub async fn set_tenant_validity(
        &self,
        code: &TenantCode,
        valid_until: Option<i64>,
    ) -> Result<usize, StoreError> {
        let outcome = self
            .run(
                "UPDATE tenants SET valid_until = ?2, updated_at = ?3 WHERE tenant_code = ?1",
                &[json!(code.as_str()), json!(valid_until), json!(unix_millis())],
            )
            .await?;
        Ok(outcome.affected)
    }

    /// Deletes a tenant row; when `expected` is given the row must be in it.
    ///
    /// # Errors
    ///
    /// Returns the storage failure.
    pub async fn delete_tenant(
        &self,
        code: &TenantCode,
        expected: Option<TenantStatus>,
    ) -> Result<usize, StoreError> {
        let outcome = self
            .run(
                "DELETE FROM tenants WHERE tenant_code = ?1 AND (?2 IS NULL OR status = ?2)",
                &[json!(code.as_str()), json!(expected.map(TenantStatus::as_str))],
            )
            .await?;
        Ok(outcome.affected)
    }

    // ------------------------------------------------------------------------
    // Super Admins
    // ------------------------------------------------------------------------

    /// Inserts a super-admin account and returns its row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::UniqueViolation`] for a duplicate username or email.
    pub async fn insert_super_admin(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<i64, StoreError> {
        let outcome = self
            .run(
                "INSERT INTO super_admins (username, email, password_hash, created_at) \
                 VALUES (?1, ?2, ?3, ?4)",
                &[json!(username), json!(email), json!(password_hash), json!(unix_millis())],
            )
            .await?;
        Ok(outcome.inserted_id)
    }

    /// Looks up a super-admin by username.
    ///
    /// # Errors
    ///
    /// Returns the storage failure or [`StoreError::Invalid`] for a malformed row.
    pub async fn super_admin_by_username(
        &self,
        username: &str,
    ) -> Result<Option<SuperAdminRecord>, StoreError> {
        let row = self
            .get(
                "SELECT id, username, email, password_hash, created_at FROM super_admins \
                 WHERE username = ?1",
                &[json!(username)],
            )
            .await?;
        row.map(|row| {
            Ok(SuperAdminRecord {
                id: int(&row, "id")?,
                username: text(&row, "username")?,
                email: text(&row, "email")?,
                password_hash: text(&row, "password_hash")?,
                created_at: int(&row, "created_at")?,
            })
        })
        .transpose()
    }

    /// Counts super-admin accounts.
    ///
    /// # Errors
    ///
    /// Returns the storage failure.
    pub async fn count_super_admins(&self) -> Result<i64, StoreError> {
        let row = self
            .get("SELECT COUNT(*) AS total FROM super_admins", &[])
            .await?
            .ok_or_else(|| StoreError::Storage("count returned no row".to_string()))?;
        int(&row, "total")
    }
}

#[async_trait]
impl DatabaseHandle for MasterRegistry {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, StoreError> {
        self.handle().await?.query(sql, params).await
    }

    async fn get(&self, sql: &str, params: &[Value]) -> Result<Option<Row>, StoreError> {
        self.handle().await?.get(sql, params).await
    }

    async fn run(&self, sql: &str, params: &[Value]) -> Result<RunOutcome, StoreError> {
        self.handle().await?.run(sql, params).await
    }

    async fn close(&self) {}
}

// ============================================================================
// SECTION: Row Mapping
// ============================================================================

/// Maps a `tenants` row.
fn tenant_from_row(row: &Row) -> Result<TenantRecord, StoreError> {
    let tenant_code = TenantCode::parse(text(row, "tenant_code")?)
        .map_err(|err| StoreError::Invalid(format!("stored tenant code: {err}")))?;
    let status = text(row, "status")?.parse::<TenantStatus>().map_err(StoreError::Invalid)?;
    let created_by_role = opt_text(row, "created_by_role")?
        .map(|role| role.parse::<Role>().map_err(StoreError::Invalid))
        .transpose()?;
    Ok(TenantRecord {
        id: int(row, "id")?,
        tenant_code,
        business_name: text(row, "business_name")?,
        owner_name: text(row, "owner_name")?,
        owner_email: text(row, "owner_email")?,
        owner_phone: opt_text(row, "owner_phone")?,
        username: text(row, "username")?,
        password_hash: text(row, "password_hash")?,
        status,
        activated_at: opt_int(row, "activated_at")?,
        valid_until: opt_int(row, "valid_until")?,
        created_by_role,
        created_by: opt_text(row, "created_by")?,
        created_at: int(row, "created_at")?,
        updated_at: int(row, "updated_at")?,
    })
}

/// Reads a required text column.
fn text(row: &Row, column: &str) -> Result<String, StoreError> {
    opt_text(row, column)?.ok_or_else(|| StoreError::Invalid(format!("column {column} is null")))
}

/// Reads a nullable text column.
fn opt_text(row: &Row, column: &str) -> Result<Option<String>, StoreError> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(value)) => Ok(Some(value.clone())),
        Some(_) => Err(StoreError::Invalid(format!("column {column} is not text"))),
    }
}

/// Reads a required integer column.
fn int(row: &Row, column: &str) -> Result<i64, StoreError> {
    opt_int(row, column)?.ok_or_else(|| StoreError::Invalid(format!("column {column} is null")))
}

/// Reads a nullable integer column.
fn opt_int(row: &Row, column: &str) -> Result<Option<i64>, StoreError> {
    match row.get(column) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(value)) => value
            .as_i64()
            .map(Some)
            .ok_or_else(|| StoreError::Invalid(format!("column {column} is not an integer"))),
        Some(_) => Err(StoreError::Invalid(format!("column {column} is not an integer"))),
    }
}
