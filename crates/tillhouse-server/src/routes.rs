// crates/tillhouse-server/src/routes.rs
// ============================================================================
// Module: Router
// Description: Route table and middleware stack for the HTTP surface.
// Purpose: Assemble health, login, admin, and tenant data routes.
// Dependencies: axum, serde, serde_json, tillhouse-store-sqlite, tillhouse-tenancy
// ============================================================================

//! ## Overview
//! Only `/api` routes that need a caller run behind [`tenant_scope`]; the
//! health probe and owner login are open. [`audit_requests`] wraps the whole
//! router so rejected requests are audited too.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Extension;
use axum::Json;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::extract::State;
use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use axum::routing::put;
use serde::Deserialize;
use serde_json::Value;
use serde_json::json;
use tillhouse_core::Principal;
use tillhouse_store_sqlite::DatabaseHandle;
use tillhouse_tenancy::TenancyError;

use crate::admin;
use crate::error::ApiError;
use crate::scope::audit_requests;
use crate::scope::tenant_scope;
use crate::state::AppState;
use crate::tenant_data;

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the application router.
pub fn build_app(state: AppState, max_body_bytes: usize) -> Router {
    let scoped = Router::new()
        .route("/api/admin/tenants", get(admin::list_tenants).post(admin::create_tenant))
        .route("/api/admin/tenants/{code}", get(admin::get_tenant).delete(admin::delete_tenant))
        .route("/api/admin/tenants/{code}/approve", post(admin::approve_tenant))
        .route("/api/admin/tenants/{code}/reject", post(admin::reject_tenant))
        .route("/api/admin/tenants/{code}/credentials", put(admin::rotate_credentials))
        .route("/api/admin/tenants/{code}/status", put(admin::set_status))
        .route("/api/admin/tenants/{code}/validity", put(admin::set_validity))
        .route("/api/settings", get(tenant_data::get_settings))
        .route("/api/settings/{key}", put(tenant_data::put_setting))
        .route("/api/purchase-orders/{id}/confirm", post(tenant_data::confirm_purchase_order))
        .route("/api/purchase-orders/{id}/receive", post(tenant_data::receive_purchase_order))
        .route("/api/purchase-orders/{id}/pay", post(tenant_data::pay_purchase_order))
        .route_layer(middleware::from_fn_with_state(state.clone(), tenant_scope));
    Router::new()
        .route("/health", get(health))
        .route("/api/auth/owner-login", post(owner_login))
        .merge(scoped)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(middleware::from_fn_with_state(state.clone(), audit_requests))
        .with_state(state)
}

// ============================================================================
// SECTION: Open Handlers
// ============================================================================

/// Owner login body.
#[derive(Deserialize)]
pub struct LoginRequest {
    /// Owner username.
    pub username: String,
    /// Owner password.
    pub password: String,
}

/// `GET /health`: readiness of the master registry.
async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state.registry().get("SELECT 1 AS ok", &[]).await?;
    Ok(Json(json!({ "status": "ok" })))
}

/// `POST /api/auth/owner-login`
async fn owner_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<(Extension<Principal>, Json<Principal>), ApiError> {
    let principal = state
        .lifecycle()
        .verify_owner_login(&request.username, &request.password)
        .await
        .map_err(|err| match err {
            TenancyError::InvalidState { .. } => {
                ApiError::Forbidden("tenant is not active".to_string())
            }
            other => ApiError::from(other),
        })?;
    Ok((Extension(principal.clone()), Json(principal)))
}
