// crates/tillhouse-server/tests/http.rs
// ============================================================================
// Module: HTTP Surface Tests
// Description: Router-level tests for scoping, admin routes, and tenant data.
// Purpose: Exercise middleware and handlers without binding sockets.
// Dependencies: tillhouse-server, axum, tower, tempfile, tokio
// ============================================================================

//! ## Overview
//! Requests are driven through the assembled router with `oneshot`. A fixture
//! provisions one active tenant (Bob's Diner) and one pending request, and
//! maps bearer tokens to platform and tenant principals.

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
use std::sync::Mutex;

use axum::Router;
use axum::body::Body;
use axum::body::to_bytes;
use axum::http::Request;
use axum::http::StatusCode;
use axum::http::header::AUTHORIZATION;
use axum::http::header::CONTENT_TYPE;
use serde_json::Value;
use serde_json::json;
use tempfile::TempDir;
use tillhouse_core::NewTenant;
use tillhouse_core::Principal;
use tillhouse_core::Role;
use tillhouse_core::TenantCode;
use tillhouse_core::TenantStatus;
use tillhouse_server::AppState;
use tillhouse_server::BearerTokenPrincipals;
use tillhouse_server::build_app;
use tillhouse_store_sqlite::DatabaseHandle;
use tillhouse_store_sqlite::HandleGauge;
use tillhouse_store_sqlite::MasterRegistry;
use tillhouse_store_sqlite::SqliteOptions;
use tillhouse_store_sqlite::TenantDatabaseFactory;
use tillhouse_tenancy::AuditSink;
use tillhouse_tenancy::LifecycleAuditEvent;
use tillhouse_tenancy::RequestAuditEvent;
use tillhouse_tenancy::TenantLifecycle;
use tower::ServiceExt;

// ============================================================================
// SECTION: Fixture
// ============================================================================

const SUPER_TOKEN: &str = "super-admin-token-0001";
const ADMIN_TOKEN: &str = "admin-token-0000000001";
const OWNER_TOKEN: &str = "owner-token-0000000001";
const CASHIER_TOKEN: &str = "cashier-token-00000001";
const PENDING_TOKEN: &str = "pending-owner-token-01";
const UNBOUND_TOKEN: &str = "unbound-manager-token1";

#[derive(Default)]
struct RequestLog(Mutex<Vec<(u16, Option<Role>)>>);

impl AuditSink for RequestLog {
    fn record_lifecycle(&self, _event: &LifecycleAuditEvent) {}

    fn record_request(&self, event: &RequestAuditEvent) {
        self.0.lock().unwrap().push((event.status, event.role));
    }
}

struct Fixture {
    _temp: TempDir,
    app: Router,
    state: AppState,
    log: Arc<RequestLog>,
    active: TenantCode,
    pending: TenantCode,
}

fn new_tenant(business: &str, username: &str, email: &str) -> NewTenant {
    NewTenant {
        business_name: business.to_string(),
        owner_name: "Owner".to_string(),
        owner_email: email.to_string(),
        owner_phone: None,
        username: username.to_string(),
        password: "bob123".to_string(),
    }
}

async fn fixture_with_limit(max_body_bytes: usize) -> Fixture {
    let temp = TempDir::new().unwrap();
    let registry = Arc::new(MasterRegistry::new(temp.path(), SqliteOptions::default()));
    let factory =
        TenantDatabaseFactory::new(temp.path(), SqliteOptions::default(), HandleGauge::new());
    let log = Arc::new(RequestLog::default());
    let lifecycle = Arc::new(TenantLifecycle::new(registry, factory, log.clone()));
    let root = Principal::platform("root", Role::SuperAdmin);
    let ops = Principal::platform("ops", Role::Admin);

    let active = lifecycle
        .provision(new_tenant("Bob's Diner", "bob", "bob@x.com"), &root)
        .await
        .unwrap()
        .tenant_code;
    lifecycle.set_status(&active, TenantStatus::Active, &root).await.unwrap();
    let pending = lifecycle
        .provision(new_tenant("Corner Cafe", "carol", "carol@x.com"), &ops)
        .await
        .unwrap()
        .tenant_code;

    let resolver = BearerTokenPrincipals::new([
        (SUPER_TOKEN.to_string(), root),
        (ADMIN_TOKEN.to_string(), ops),
        (OWNER_TOKEN.to_string(), Principal::tenant("bob", Role::Owner, active.clone())),
        (CASHIER_TOKEN.to_string(), Principal::tenant("cash", Role::Cashier, active.clone())),
        (PENDING_TOKEN.to_string(), Principal::tenant("carol", Role::Owner, pending.clone())),
        (
            UNBOUND_TOKEN.to_string(),
            Principal {
                subject: "drifter".to_string(),
                role: Role::Manager,
                tenant_code: None,
            },
        ),
    ]);
    let state = AppState::new(lifecycle, Arc::new(resolver));
    let app = build_app(state.clone(), max_body_bytes);
    Fixture {
        _temp: temp,
        app,
        state,
        log,
        active,
        pending,
    }
}

async fn fixture() -> Fixture {
    fixture_with_limit(64 * 1024).await
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

/// Seeds one supplier, two products, and a draft order with two lines.
async fn seed_purchasing(fixture: &Fixture) {
    let db = fixture.state.factory().open(&fixture.active).await.unwrap();
    let statements = [
        "INSERT INTO suppliers (name) VALUES ('Acme Foods')",
        "INSERT INTO products (name, price, stock_quantity, track_stock) VALUES ('Flour', 3, 5, 1)",
        "INSERT INTO products (name, price, stock_quantity, track_stock) VALUES ('Crate', 0, 0, 0)",
        "INSERT INTO purchase_orders (supplier_id, order_number) VALUES (1, 'PO-1')",
        "INSERT INTO purchase_order_items \
         (purchase_order_id, product_id, quantity, unit_cost, total, unit, conversion_factor) \
         VALUES (1, 1, 2, 12, 24, 'box', 6)",
        "INSERT INTO purchase_order_items \
         (purchase_order_id, product_id, quantity, unit_cost, total, unit, conversion_factor) \
         VALUES (1, 2, 1, 10, 10, 'pcs', 1)",
    ];
    for sql in statements {
        db.run(sql, &[]).await.unwrap();
    }
    db.close().await;
}

async fn tenant_value(fixture: &Fixture, sql: &str) -> Value {
    let db = fixture.state.factory().open(&fixture.active).await.unwrap();
    let row = db.get(sql, &[]).await.unwrap().unwrap();
    db.close().await;
    row.get("v").cloned().unwrap()
}

// ============================================================================
// SECTION: Scoping
// ============================================================================

#[tokio::test]
async fn health_checks_the_master_registry() {
    let fixture = fixture().await;
    let (status, body) = send(&fixture.app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "status": "ok" }));
}

#[tokio::test]
async fn missing_or_unknown_tokens_are_unauthorized() {
    let fixture = fixture().await;
    let (status, body) = send(&fixture.app, "GET", "/api/settings", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authentication required");
    let (status, _) = send(&fixture.app, "GET", "/api/settings", Some("nope"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pending_tenant_has_no_database_to_open() {
    let fixture = fixture().await;
    let (status, body) = send(&fixture.app, "GET", "/api/settings", Some(PENDING_TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "tenant not found");
    assert!(!fixture.state.factory().exists(&fixture.pending));
}

#[tokio::test]
async fn tenant_role_without_code_is_forbidden() {
    let fixture = fixture().await;
    let (status, body) = send(&fixture.app, "GET", "/api/settings", Some(UNBOUND_TOKEN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "tenant code required");
}

#[tokio::test]
async fn platform_and_tenant_routes_do_not_cross() {
    let fixture = fixture().await;
    let (status, _) = send(&fixture.app, "GET", "/api/settings", Some(SUPER_TOKEN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&fixture.app, "GET", "/api/admin/tenants", Some(OWNER_TOKEN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(fixture.state.factory().gauge().open_handles(), 0);
}

#[tokio::test]
async fn handles_are_released_after_concurrent_failures() {
    let fixture = fixture().await;
    let mut tasks = tokio::task::JoinSet::new();
    for index in 0 .. 24 {
        let app = fixture.app.clone();
        tasks.spawn(async move {
            let (method, uri, token, body) = match index % 3 {
                0 => ("POST", "/api/purchase-orders/999/confirm", OWNER_TOKEN, None),
                1 => ("PUT", "/api/settings/currency", CASHIER_TOKEN, Some(json!({ "value": "EUR" }))),
                _ => ("GET", "/api/settings", OWNER_TOKEN, None),
            };
            send(&app, method, uri, Some(token), body).await.0
        });
    }
    let mut statuses = Vec::new();
    while let Some(status) = tasks.join_next().await {
        statuses.push(status.unwrap());
    }
    assert_eq!(statuses.iter().filter(|status| **status == StatusCode::NOT_FOUND).count(), 8);
    assert_eq!(statuses.iter().filter(|status| **status == StatusCode::FORBIDDEN).count(), 8);
    assert_eq!(statuses.iter().filter(|status| **status == StatusCode::OK).count(), 8);
    assert_eq!(fixture.state.factory().gauge().open_handles(), 0);
}

#[tokio::test]
async fn every_request_is_audited_with_its_caller() {
    let fixture = fixture().await;
    send(&fixture.app, "GET", "/api/settings", None, None).await;
    send(&fixture.app, "GET", "/api/settings", Some(CASHIER_TOKEN), None).await;
    send(&fixture.app, "GET", "/api/settings", Some(PENDING_TOKEN), None).await;
    let log = fixture.log.0.lock().unwrap().clone();
    assert_eq!(log, vec![(401, None), (200, Some(Role::Cashier)), (404, Some(Role::Owner))]);
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let fixture = fixture_with_limit(512).await;
    let payload = json!({
        "business_name": "x".repeat(1024),
        "owner_name": "O",
        "owner_email": "o@x.com",
        "username": "big",
        "password": "pw",
    });
    let (status, _) = send(&fixture.app, "POST", "/api/admin/tenants", Some(SUPER_TOKEN), Some(payload)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

// ============================================================================
// SECTION: Owner Login
// ============================================================================

#[tokio::test]
async fn owner_login_returns_a_tenant_principal() {
    let fixture = fixture().await;
    let login = |username: &str, password: &str| json!({ "username": username, "password": password });
    let (status, body) =
        send(&fixture.app, "POST", "/api/auth/owner-login", None, Some(login("bob", "bob123"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "owner");
    assert_eq!(body["tenant_code"], fixture.active.as_str());

    let (status, _) =
        send(&fixture.app, "POST", "/api/auth/owner-login", None, Some(login("bob", "wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) =
        send(&fixture.app, "POST", "/api/auth/owner-login", None, Some(login("carol", "bob123"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "tenant is not active");
}

// ============================================================================
// SECTION: Administration
// ============================================================================

#[tokio::test]
async fn admin_request_then_super_admin_approval() {
    let fixture = fixture().await;
    let request = json!({
        "business_name": "Sunset Grill",
        "owner_name": "Sam",
        "owner_email": "sam@x.com",
        "username": "sam",
        "password": "grill-pass",
    });
    let (status, created) =
        send(&fixture.app, "POST", "/api/admin/tenants", Some(ADMIN_TOKEN), Some(request.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["status"], "pending");
    assert_eq!(created["has_database"], false);
    assert!(created.get("password_hash").is_none());
    let code = created["tenant_code"].as_str().unwrap().to_string();

    let (status, _) =
        send(&fixture.app, "POST", "/api/admin/tenants", Some(ADMIN_TOKEN), Some(request)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let approve = format!("/api/admin/tenants/{code}/approve");
    let (status, _) = send(&fixture.app, "POST", &approve, Some(ADMIN_TOKEN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, approved) = send(&fixture.app, "POST", &approve, Some(SUPER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "inactive");
    assert_eq!(approved["has_database"], true);
    let (status, body) = send(&fixture.app, "POST", &approve, Some(SUPER_TOKEN), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "tenant is not pending approval");

    let (status, listed) =
        send(&fixture.app, "GET", "/api/admin/tenants?status=pending", Some(ADMIN_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> =
        listed.as_array().unwrap().iter().filter_map(|t| t["tenant_code"].as_str()).collect();
    assert_eq!(codes, vec![fixture.pending.as_str()]);
}

#[tokio::test]
async fn reject_and_delete_are_super_admin_only() {
    let fixture = fixture().await;
    let reject = format!("/api/admin/tenants/{}/reject", fixture.pending);
    let (status, _) = send(&fixture.app, "POST", &reject, Some(ADMIN_TOKEN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&fixture.app, "POST", &reject, Some(SUPER_TOKEN), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&fixture.app, "POST", &reject, Some(SUPER_TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let tenant = format!("/api/admin/tenants/{}", fixture.active);
    let (status, _) = send(&fixture.app, "DELETE", &tenant, Some(ADMIN_TOKEN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, outcome) = send(&fixture.app, "DELETE", &tenant, Some(SUPER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome, json!({ "file_removed": true, "registry_removed": true }));
    let (status, _) = send(&fixture.app, "GET", &tenant, Some(SUPER_TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&fixture.app, "GET", "/api/settings", Some(OWNER_TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn credentials_status_and_validity_updates() {
    let fixture = fixture().await;
    let base = format!("/api/admin/tenants/{}", fixture.active);
    let (status, outcome) = send(
        &fixture.app,
        "PUT",
        &format!("{base}/credentials"),
        Some(ADMIN_TOKEN),
        Some(json!({ "username": "bobby", "password": "new-pass" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome, json!({ "registry_updated": true, "tenant_file": { "result": "updated" } }));

    let login = json!({ "username": "bobby", "password": "new-pass" });
    let (status, _) = send(&fixture.app, "POST", "/api/auth/owner-login", None, Some(login)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, view) = send(
        &fixture.app,
        "PUT",
        &format!("{base}/status"),
        Some(ADMIN_TOKEN),
        Some(json!({ "status": "inactive" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["status"], "inactive");
    let (status, body) = send(
        &fixture.app,
        "PUT",
        &format!("/api/admin/tenants/{}/status", fixture.pending),
        Some(ADMIN_TOKEN),
        Some(json!({ "status": "active" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "tenant is pending approval");

    let (status, view) = send(
        &fixture.app,
        "PUT",
        &format!("{base}/validity"),
        Some(SUPER_TOKEN),
        Some(json!({ "valid_until": 4_102_444_800_000_i64 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(view["valid_until"], 4_102_444_800_000_i64);
}

#[tokio::test]
async fn malformed_tenant_codes_are_not_found() {
    let fixture = fixture().await;
    let (status, _) =
        send(&fixture.app, "GET", "/api/admin/tenants/Bad..Code", Some(SUPER_TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ============================================================================
// SECTION: Tenant Data
// ============================================================================

#[tokio::test]
async fn settings_are_read_by_all_roles_and_written_by_managers() {
    let fixture = fixture().await;
    let (status, settings) = send(&fixture.app, "GET", "/api/settings", Some(CASHIER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(settings["restaurant_name"], "Bob's Diner");
    assert_eq!(settings["currency"], "USD");

    let body = json!({ "value": "EUR" });
    let (status, _) =
        send(&fixture.app, "PUT", "/api/settings/currency", Some(CASHIER_TOKEN), Some(body.clone())).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) =
        send(&fixture.app, "PUT", "/api/settings/currency", Some(OWNER_TOKEN), Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) =
        send(&fixture.app, "PUT", "/api/settings/bad-key", Some(OWNER_TOKEN), Some(body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, settings) = send(&fixture.app, "GET", "/api/settings", Some(OWNER_TOKEN), None).await;
    assert_eq!(settings["currency"], "EUR");
}

#[tokio::test]
async fn purchase_order_confirm_receive_and_pay() {
    let fixture = fixture().await;
    seed_purchasing(&fixture).await;
    let order = "/api/purchase-orders/1";

    let (status, _) =
        send(&fixture.app, "POST", &format!("{order}/confirm"), Some(CASHIER_TOKEN), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) =
        send(&fixture.app, "POST", &format!("{order}/receive"), Some(OWNER_TOKEN), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, confirmed) =
        send(&fixture.app, "POST", &format!("{order}/confirm"), Some(OWNER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["status"], "confirmed");
    assert_eq!(confirmed["total"], json!(34.0));
    assert!(confirmed["confirmed_at"].is_string());
    assert_eq!(tenant_value(&fixture, "SELECT balance AS v FROM suppliers WHERE id = 1").await, json!(34.0));
    let (status, _) =
        send(&fixture.app, "POST", &format!("{order}/confirm"), Some(OWNER_TOKEN), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, received) =
        send(&fixture.app, "POST", &format!("{order}/receive"), Some(OWNER_TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(received["status"], "received");
    assert_eq!(
        tenant_value(&fixture, "SELECT stock_quantity AS v FROM products WHERE id = 1").await,
        json!(17.0)
    );
    assert_eq!(
        tenant_value(&fixture, "SELECT purchase_rate AS v FROM products WHERE id = 1").await,
        json!(2.0)
    );
    assert_eq!(
        tenant_value(&fixture, "SELECT stock_quantity AS v FROM products WHERE id = 2").await,
        json!(0.0)
    );

    let pay = format!("{order}/pay");
    let (status, _) =
        send(&fixture.app, "POST", &pay, Some(OWNER_TOKEN), Some(json!({ "amount": 50.0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, paid) =
        send(&fixture.app, "POST", &pay, Some(OWNER_TOKEN), Some(json!({ "amount": 20.0 }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["paid_amount"], json!(20.0));
    assert_eq!(tenant_value(&fixture, "SELECT balance AS v FROM suppliers WHERE id = 1").await, json!(14.0));
    assert_eq!(
        tenant_value(&fixture, "SELECT COUNT(*) AS v FROM supplier_ledger").await,
        json!(2)
    );

    let (status, _) =
        send(&fixture.app, "POST", "/api/purchase-orders/999/confirm", Some(OWNER_TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn failed_confirmation_rolls_back_every_write() {
    let fixture = fixture().await;
    let db = fixture.state.factory().open(&fixture.active).await.unwrap();
    db.run("PRAGMA foreign_keys = OFF", &[]).await.unwrap();
    db.run("INSERT INTO purchase_orders (supplier_id, order_number) VALUES (42, 'PO-ORPHAN')", &[])
        .await
        .unwrap();
    db.run(
        "INSERT INTO products (name, price, stock_quantity) VALUES ('Oil', 4, 0)",
        &[],
    )
    .await
    .unwrap();
    db.run(
        "INSERT INTO purchase_order_items \
         (purchase_order_id, product_id, quantity, unit_cost, total) VALUES (1, 1, 1, 8, 8)",
        &[],
    )
    .await
    .unwrap();
    db.close().await;

    let (status, _) =
        send(&fixture.app, "POST", "/api/purchase-orders/1/confirm", Some(OWNER_TOKEN), None).await;
    assert!(!status.is_success());
    assert_eq!(
        tenant_value(&fixture, "SELECT status AS v FROM purchase_orders WHERE id = 1").await,
        json!("draft")
    );
    assert_eq!(
        tenant_value(&fixture, "SELECT COUNT(*) AS v FROM supplier_ledger").await,
        json!(0)
    );
    assert_eq!(fixture.state.factory().gauge().open_handles(), 0);
}
