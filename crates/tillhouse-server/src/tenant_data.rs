// crates/tillhouse-server/src/tenant_data.rs
// ============================================================================
// Module: Tenant Data Routes
// Description: Settings and purchasing endpoints over the request's tenant handle.
// Purpose: Consume the per-request tenant connection; multi-table writes are atomic.
// Dependencies: axum, serde, serde_json, tillhouse-store-sqlite
// ============================================================================

//! ## Overview
//! These handlers only ever see the tenant connection attached by the scope
//! middleware. Purchase-order transitions touch the order, the supplier
//! ledger, the supplier balance, and product stock, so each runs inside one
//! transaction that either applies fully or not at all. Confirming, paying,
//! and receiving are all restricted to owners and managers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Extension;
use axum::Json;
use axum::extract::Path;
use serde::Deserialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tillhouse_store_sqlite::DatabaseHandle;
use tillhouse_store_sqlite::Row;
use tillhouse_store_sqlite::SqliteConnection;
use tillhouse_store_sqlite::StoreError;
use tillhouse_store_sqlite::Transaction;
use tillhouse_store_sqlite::execute;
use tillhouse_store_sqlite::query_all;
use tillhouse_store_sqlite::query_one;

use crate::error::ApiError;
use crate::scope::ANY_TENANT_ROLE;
use crate::scope::RequestScope;
use crate::scope::TENANT_MANAGERS;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum settings key length.
const MAX_SETTING_KEY_LENGTH: usize = 64;

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// Settings update body.
#[derive(Debug, Deserialize)]
pub struct SettingValue {
    /// New value.
    pub value: String,
}

/// Supplier payment body.
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    /// Amount paid to the supplier.
    pub amount: f64,
}

/// Result of a purchase-order transition inside its transaction.
enum Transition {
    /// All writes applied.
    Applied,
    /// No order with that id.
    Missing,
    /// Order is in a status the transition does not accept.
    WrongStatus(String),
    /// Input rejected after reading the order.
    Rejected(String),
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// `GET /api/settings`
pub async fn get_settings(
    Extension(scope): Extension<RequestScope>,
) -> Result<Json<Map<String, Value>>, ApiError> {
    let connection = scope.require_tenant(ANY_TENANT_ROLE)?;
    let rows = connection.query("SELECT key, value FROM settings ORDER BY key", &[]).await?;
    let settings = rows
        .into_iter()
        .filter_map(|mut row| {
            let key = row.remove("key")?.as_str()?.to_string();
            Some((key, row.remove("value").unwrap_or(Value::Null)))
        })
        .collect();
    Ok(Json(settings))
}

/// `PUT /api/settings/{key}`
pub async fn put_setting(
    Extension(scope): Extension<RequestScope>,
    Path(key): Path<String>,
    Json(body): Json<SettingValue>,
) -> Result<Json<Value>, ApiError> {
    let connection = scope.require_tenant(TENANT_MANAGERS)?;
    if key.is_empty()
        || key.len() > MAX_SETTING_KEY_LENGTH
        || !key.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(ApiError::BadRequest("invalid settings key".to_string()));
    }
    connection
        .run(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
            &[json!(key), json!(body.value)],
        )
        .await?;
    Ok(Json(json!({ "key": key, "value": body.value })))
}

// ============================================================================
// SECTION: Purchase Orders
// ============================================================================

/// `POST /api/purchase-orders/{id}/confirm`
pub async fn confirm_purchase_order(
    Extension(scope): Extension<RequestScope>,
    Path(id): Path<i64>,
) -> Result<Json<Row>, ApiError> {
    let connection = scope.require_tenant(TENANT_MANAGERS)?;
    let outcome = connection.transaction(move |tx| confirm_in(tx, id)).await?;
    finish(connection, id, outcome).await
}

/// `POST /api/purchase-orders/{id}/receive`
pub async fn receive_purchase_order(
    Extension(scope): Extension<RequestScope>,
    Path(id): Path<i64>,
) -> Result<Json<Row>, ApiError> {
    let connection = scope.require_tenant(TENANT_MANAGERS)?;
    let outcome = connection.transaction(move |tx| receive_in(tx, id)).await?;
    finish(connection, id, outcome).await
}

/// `POST /api/purchase-orders/{id}/pay`
pub async fn pay_purchase_order(
    Extension(scope): Extension<RequestScope>,
    Path(id): Path<i64>,
    Json(body): Json<PaymentRequest>,
) -> Result<Json<Row>, ApiError> {
    let connection = scope.require_tenant(TENANT_MANAGERS)?;
    let amount = body.amount;
    let outcome = connection.transaction(move |tx| pay_in(tx, id, amount)).await?;
    finish(connection, id, outcome).await
}

/// Draft -> confirmed: totals the items and books the purchase on the supplier.
fn confirm_in(tx: &Transaction<'_>, id: i64) -> Result<Transition, StoreError> {
    let Some(order) = load_order(tx, id)? else {
        return Ok(Transition::Missing);
    };
    let status = text(&order, "status");
    if status != "draft" {
        return Ok(Transition::WrongStatus(status));
    }
    let total = query_one(
        tx,
        "SELECT COALESCE(SUM(total), 0) AS total FROM purchase_order_items WHERE purchase_order_id = ?1",
        &[json!(id)],
    )?
    .map_or(0.0, |row| number(&row, "total"));
    let supplier_id = order.get("supplier_id").cloned().unwrap_or(Value::Null);
    execute(
        tx,
        "UPDATE purchase_orders SET status = 'confirmed', total = ?2, \
         confirmed_at = CURRENT_TIMESTAMP WHERE id = ?1",
        &[json!(id), json!(total)],
    )?;
    execute(
        tx,
        "INSERT INTO supplier_ledger (supplier_id, entry_type, amount, reference) \
         VALUES (?1, 'purchase', ?2, ?3)",
        &[supplier_id.clone(), json!(total), json!(text(&order, "order_number"))],
    )?;
    execute(
        tx,
        "UPDATE suppliers SET balance = balance + ?2 WHERE id = ?1",
        &[supplier_id, json!(total)],
    )?;
    Ok(Transition::Applied)
}

/// Confirmed -> received: adds stock in base units and refreshes purchase rates.
fn receive_in(tx: &Transaction<'_>, id: i64) -> Result<Transition, StoreError> {
    let Some(order) = load_order(tx, id)? else {
        return Ok(Transition::Missing);
    };
    let status = text(&order, "status");
    if status != "confirmed" {
        return Ok(Transition::WrongStatus(status));
    }
    let items = query_all(
        tx,
        "SELECT product_id, quantity, unit_cost, conversion_factor \
         FROM purchase_order_items WHERE purchase_order_id = ?1",
        &[json!(id)],
    )?;
    for item in items {
        let factor = number(&item, "conversion_factor");
        let factor = if factor > 0.0 { factor } else { 1.0 };
        let base_quantity = number(&item, "quantity") * factor;
        let base_cost = number(&item, "unit_cost") / factor;
        execute(
            tx,
            "UPDATE products SET \
             stock_quantity = CASE WHEN track_stock = 1 THEN stock_quantity + ?2 ELSE stock_quantity END, \
             purchase_rate = ?3, updated_at = CURRENT_TIMESTAMP WHERE id = ?1",
            &[
                item.get("product_id").cloned().unwrap_or(Value::Null),
                json!(base_quantity),
                json!(base_cost),
            ],
        )?;
    }
    execute(
        tx,
        "UPDATE purchase_orders SET status = 'received', received_at = CURRENT_TIMESTAMP \
         WHERE id = ?1",
        &[json!(id)],
    )?;
    Ok(Transition::Applied)
}

/// Records a supplier payment against a confirmed or received order.
fn pay_in(tx: &Transaction<'_>, id: i64, amount: f64) -> Result<Transition, StoreError> {
    let Some(order) = load_order(tx, id)? else {
        return Ok(Transition::Missing);
    };
    let status = text(&order, "status");
    if status != "confirmed" && status != "received" {
        return Ok(Transition::WrongStatus(status));
    }
    let outstanding = number(&order, "total") - number(&order, "paid_amount");
    if !amount.is_finite() || amount <= 0.0 || amount > outstanding {
        return Ok(Transition::Rejected(format!(
            "payment must be positive and at most the outstanding {outstanding}"
        )));
    }
    let supplier_id = order.get("supplier_id").cloned().unwrap_or(Value::Null);
    execute(
        tx,
        "UPDATE purchase_orders SET paid_amount = paid_amount + ?2 WHERE id = ?1",
        &[json!(id), json!(amount)],
    )?;
    execute(
        tx,
        "INSERT INTO supplier_ledger (supplier_id, entry_type, amount, reference) \
         VALUES (?1, 'payment', ?2, ?3)",
        &[supplier_id.clone(), json!(amount), json!(text(&order, "order_number"))],
    )?;
    execute(
        tx,
        "UPDATE suppliers SET balance = balance - ?2 WHERE id = ?1",
        &[supplier_id, json!(amount)],
    )?;
    Ok(Transition::Applied)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Loads one purchase order row.
fn load_order(tx: &Transaction<'_>, id: i64) -> Result<Option<Row>, StoreError> {
    query_one(
        tx,
        "SELECT id, supplier_id, order_number, status, total, paid_amount \
         FROM purchase_orders WHERE id = ?1",
        &[json!(id)],
    )
}

/// Maps a transition outcome to a response, returning the updated order.
async fn finish(
    connection: &SqliteConnection,
    id: i64,
    outcome: Transition,
) -> Result<Json<Row>, ApiError> {
    match outcome {
        Transition::Applied => connection
            .get("SELECT * FROM purchase_orders WHERE id = ?1", &[json!(id)])
            .await?
            .map(Json)
            .ok_or_else(|| ApiError::NotFound("purchase order not found".to_string())),
        Transition::Missing => Err(ApiError::NotFound("purchase order not found".to_string())),
        Transition::WrongStatus(status) => {
            Err(ApiError::Conflict(format!("purchase order is {status}")))
        }
        Transition::Rejected(detail) => Err(ApiError::BadRequest(detail)),
    }
}

/// Reads a text column, empty when absent.
fn text(row: &Row, column: &str) -> String {
    row.get(column).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Reads a numeric column, zero when absent.
fn number(row: &Row, column: &str) -> f64 {
    row.get(column).and_then(Value::as_f64).unwrap_or_default()
}
