// crates/tillhouse-store-sqlite/tests/master_registry.rs
// ============================================================================
// Module: Master Registry Tests
// Description: Initialization, tenant rows, and super-admin accounts.
// Purpose: Ensure the master registry initializes once and enforces uniqueness.
// Dependencies: tillhouse-store-sqlite, tillhouse-core, rusqlite, serde_json, tempfile, tokio
// ============================================================================

//! ## Overview
//! Exercises the master registry against a temporary data root, including
//! concurrent initialization and upgrade of a legacy master file.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use rusqlite::Connection;
use serde_json::json;
use tempfile::TempDir;
use tillhouse_core::Role;
use tillhouse_core::TenantCode;
use tillhouse_core::TenantStatus;
use tillhouse_store_sqlite::DatabaseHandle;
use tillhouse_store_sqlite::MASTER_DB_FILE;
use tillhouse_store_sqlite::MasterRegistry;
use tillhouse_store_sqlite::SqliteOptions;
use tillhouse_store_sqlite::StoreError;
use tillhouse_store_sqlite::TenantInsert;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn registry(temp: &TempDir) -> MasterRegistry {
    MasterRegistry::new(temp.path(), SqliteOptions::default())
}

fn insert(code: &str, username: &str, email: &str, status: TenantStatus) -> TenantInsert {
    TenantInsert {
        tenant_code: TenantCode::parse(code).unwrap(),
        business_name: format!("{code} business"),
        owner_name: "Owner".to_string(),
        owner_email: email.to_string(),
        owner_phone: None,
        username: username.to_string(),
        password_hash: "$argon2id$placeholder".to_string(),
        status,
        created_by_role: Some(Role::SuperAdmin),
        created_by: Some("root".to_string()),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[tokio::test]
async fn concurrent_initialization_runs_once() {
    let temp = TempDir::new().unwrap();
    let registry = Arc::new(registry(&temp));
    let mut tasks = Vec::new();
    for _ in 0 .. 16 {
        let registry = Arc::clone(&registry);
        tasks.push(tokio::spawn(async move { registry.ensure_initialized().await }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(registry.initializations(), 1);
    assert!(temp.path().join(MASTER_DB_FILE).is_file());
    registry.ensure_initialized().await.unwrap();
    assert_eq!(registry.initializations(), 1);
}

#[tokio::test]
async fn first_query_initializes_lazily() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&temp);
    let row = registry.get("SELECT COUNT(*) AS total FROM tenants", &[]).await.unwrap().unwrap();
    assert_eq!(row["total"], json!(0));
    registry.close().await;
    assert_eq!(registry.count_super_admins().await.unwrap(), 0);
}

#[tokio::test]
async fn failed_initialization_is_retried() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("data");
    std::fs::write(&blocker, b"not a directory").unwrap();
    let registry = MasterRegistry::new(&blocker, SqliteOptions::default());
    assert!(registry.ensure_initialized().await.is_err());
    std::fs::remove_file(&blocker).unwrap();
    registry.ensure_initialized().await.unwrap();
    assert_eq!(registry.initializations(), 2);
}

#[tokio::test]
async fn legacy_master_file_gains_validity_columns() {
    let temp = TempDir::new().unwrap();
    let connection = Connection::open(temp.path().join(MASTER_DB_FILE)).unwrap();
    connection
        .execute_batch(
            "CREATE TABLE tenants (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                tenant_code TEXT NOT NULL UNIQUE,
                business_name TEXT NOT NULL,
                owner_name TEXT NOT NULL,
                owner_email TEXT NOT NULL UNIQUE,
                owner_phone TEXT,
                username TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                created_by_role TEXT,
                created_by TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            INSERT INTO tenants (tenant_code, business_name, owner_name, owner_email, username,
                password_hash, status, created_at, updated_at)
            VALUES ('old_1', 'Old Shop', 'Owner', 'old@x.com', 'old', 'hash', 'active', 1, 1);",
        )
        .unwrap();
    drop(connection);

    let registry = registry(&temp);
    let record = registry.tenant_by_code(&TenantCode::parse("old_1").unwrap()).await.unwrap().unwrap();
    assert_eq!(record.business_name, "Old Shop");
    assert_eq!(record.status, TenantStatus::Active);
    assert_eq!(record.valid_until, None);
    assert_eq!(record.activated_at, None);
}

#[tokio::test]
async fn tenant_rows_round_trip_and_enforce_uniqueness() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&temp);
    let record = registry
        .insert_tenant(&insert("shop_1", "alice", "alice@x.com", TenantStatus::Pending))
        .await
        .unwrap();
    assert_eq!(record.status, TenantStatus::Pending);
    assert_eq!(record.created_by_role, Some(Role::SuperAdmin));

    let duplicate_username = registry
        .insert_tenant(&insert("shop_2", "alice", "other@x.com", TenantStatus::Pending))
        .await
        .unwrap_err();
    assert!(matches!(duplicate_username, StoreError::UniqueViolation(_)));
    let duplicate_email = registry
        .insert_tenant(&insert("shop_3", "carol", "alice@x.com", TenantStatus::Pending))
        .await
        .unwrap_err();
    assert!(matches!(duplicate_email, StoreError::UniqueViolation(_)));

    let by_username = registry.tenant_by_username("alice").await.unwrap().unwrap();
    assert_eq!(by_username.tenant_code, record.tenant_code);
    assert_eq!(registry.list_tenants(None).await.unwrap().len(), 1);
    assert!(registry.list_tenants(Some(TenantStatus::Active)).await.unwrap().is_empty());
}

#[tokio::test]
async fn conditional_updates_report_state_mismatch() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&temp);
    let record = registry
        .insert_tenant(&insert("shop_4", "dave", "dave@x.com", TenantStatus::Pending))
        .await
        .unwrap();
    let code = record.tenant_code;

    let changed = registry
        .update_tenant_status(&code, Some(TenantStatus::Pending), TenantStatus::Inactive)
        .await
        .unwrap();
    assert_eq!(changed, 1);
    let again = registry
        .update_tenant_status(&code, Some(TenantStatus::Pending), TenantStatus::Inactive)
        .await
        .unwrap();
    assert_eq!(again, 0);
    assert_eq!(registry.delete_tenant(&code, Some(TenantStatus::Pending)).await.unwrap(), 0);

    registry.update_tenant_status(&code, None, TenantStatus::Active).await.unwrap();
    let active = registry.tenant_by_code(&code).await.unwrap().unwrap();
    assert!(active.activated_at.is_some());
    registry.update_tenant_status(&code, None, TenantStatus::Inactive).await.unwrap();
    registry.update_tenant_status(&code, None, TenantStatus::Active).await.unwrap();
    let reactivated = registry.tenant_by_code(&code).await.unwrap().unwrap();
    assert_eq!(reactivated.activated_at, active.activated_at);

    assert_eq!(registry.set_tenant_validity(&code, Some(42)).await.unwrap(), 1);
    assert_eq!(registry.update_tenant_credentials(&code, "dave2", "h2").await.unwrap(), 1);
    let updated = registry.tenant_by_code(&code).await.unwrap().unwrap();
    assert_eq!(updated.valid_until, Some(42));
    assert_eq!(updated.username, "dave2");
    assert!(updated.is_expired_at(43));

    assert_eq!(registry.delete_tenant(&code, None).await.unwrap(), 1);
    assert!(registry.tenant_by_code(&code).await.unwrap().is_none());
}

#[tokio::test]
async fn super_admin_accounts_are_unique() {
    let temp = TempDir::new().unwrap();
    let registry = registry(&temp);
    registry.insert_super_admin("root", "root@x.com", "hash").await.unwrap();
    let err = registry.insert_super_admin("root", "r2@x.com", "hash").await.unwrap_err();
    assert!(matches!(err, StoreError::UniqueViolation(_)));
    assert_eq!(registry.count_super_admins().await.unwrap(), 1);
    let admin = registry.super_admin_by_username("root").await.unwrap().unwrap();
    assert_eq!(admin.email, "root@x.com");
    assert!(registry.super_admin_by_username("nobody").await.unwrap().is_none());
}
