// crates/tillhouse-store-sqlite/src/lib.rs
// ============================================================================
// Module: Tillhouse SQLite Store
// Description: Per-tenant SQLite files, schema migration, and the master registry.
// Purpose: The storage core shared by tenancy workflows and the HTTP surface.
// Dependencies: rusqlite, tokio, serde_json, tillhouse-core
// ============================================================================

//! ## Overview
//! This crate owns every physical database the backend touches:
//!
//! - [`SqliteConnection`] is the query/get/run/close primitive.
//! - [`TenantDatabaseFactory`] maps tenant codes to files, creates them, and
//!   opens them through the [`migrate`] routine.
//! - [`MasterRegistry`] is the lazily initialized, process-wide master handle.
//!
//! Driver errors are classified once into [`StoreError`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod connection;
pub mod error;
pub mod factory;
pub mod master;
pub mod migrate;
pub mod schema;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use connection::DEFAULT_BUSY_TIMEOUT_MS;
pub use connection::DatabaseHandle;
pub use connection::HandleGauge;
pub use connection::JournalMode;
pub use connection::Row;
pub use connection::RunOutcome;
pub use connection::SqliteConnection;
pub use connection::SqliteOptions;
pub use connection::SyncMode;
pub use connection::execute;
pub use connection::query_all;
pub use connection::query_one;
pub use error::StoreError;
pub use error::classify_sqlite_error;
pub use factory::TENANTS_DIR;
pub use factory::TenantDatabaseFactory;
pub use factory::tenant_db_path;
pub use master::MASTER_DB_FILE;
pub use master::MasterRegistry;
pub use master::SuperAdminRecord;
pub use master::TenantInsert;
pub use migrate::MigrationMemo;
pub use migrate::MigrationObserver;
pub use migrate::MigrationReport;
pub use migrate::migrate;
pub use rusqlite::Transaction;
pub use schema::MASTER_SCHEMA;
pub use schema::MASTER_SCHEMA_VERSION;
pub use schema::SchemaPlan;
pub use schema::TENANT_SCHEMA;
pub use schema::TENANT_SCHEMA_VERSION;
