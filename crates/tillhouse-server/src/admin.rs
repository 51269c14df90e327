// crates/tillhouse-server/src/admin.rs
// ============================================================================
// Module: Tenant Administration Routes
// Description: Platform-facing tenant management endpoints.
// Purpose: Expose the lifecycle operations to super-admins and admins.
// Dependencies: axum, serde, tillhouse-core, tillhouse-tenancy
// ============================================================================

//! ## Overview
//! Every handler requires a platform principal. Provisioning dispatches on
//! the caller's role (super-admins provision immediately, admins file a
//! pending request). Approval, rejection, and deletion are reserved to
//! super-admins.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::Extension;
use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use tillhouse_core::NewTenant;
use tillhouse_core::Principal;
use tillhouse_core::Role;
use tillhouse_core::TenantCode;
use tillhouse_core::TenantRecord;
use tillhouse_core::TenantStatus;
use tillhouse_tenancy::DeleteOutcome;
use tillhouse_tenancy::RotationOutcome;

use crate::error::ApiError;
use crate::scope::RequestScope;
use crate::state::AppState;

// ============================================================================
// SECTION: Payloads
// ============================================================================

/// Query parameters for the tenant listing.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Optional status filter.
    #[serde(default)]
    pub status: Option<TenantStatus>,
}

/// Tenant view returned to clients; never includes the password hash.
#[derive(Debug, Serialize)]
pub struct TenantView {
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
    /// Lifecycle status.
    pub status: TenantStatus,
    /// Role that created the row.
    pub created_by_role: Option<Role>,
    /// First activation time (unix ms).
    pub activated_at: Option<i64>,
    /// Validity expiry (unix ms).
    pub valid_until: Option<i64>,
    /// Creation time (unix ms).
    pub created_at: i64,
    /// Whether a tenant file exists on disk.
    pub has_database: bool,
}

impl TenantView {
    /// Builds the view for a record.
    fn from_record(record: TenantRecord, has_database: bool) -> Self {
        Self {
            tenant_code: record.tenant_code,
            business_name: record.business_name,
            owner_name: record.owner_name,
            owner_email: record.owner_email,
            owner_phone: record.owner_phone,
            username: record.username,
            status: record.status,
            created_by_role: record.created_by_role,
            activated_at: record.activated_at,
            valid_until: record.valid_until,
            created_at: record.created_at,
            has_database,
        }
    }
}

/// Credential rotation request.
#[derive(Deserialize)]
pub struct CredentialsRequest {
    /// New owner username.
    pub username: String,
    /// New owner password.
    pub password: String,
}

/// Status toggle request.
#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    /// Target status (`active` or `inactive`).
    pub status: TenantStatus,
}

/// Validity change request.
#[derive(Debug, Deserialize)]
pub struct ValidityRequest {
    /// Expiry (unix ms); `null` clears it.
    pub valid_until: Option<i64>,
}

// ============================================================================
// SECTION: Handlers
// ============================================================================

/// `GET /api/admin/tenants`
pub async fn list_tenants(
    State(state): State<AppState>,
    Extension(scope): Extension<RequestScope>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<TenantView>>, ApiError> {
    scope.require_platform()?;
    let records = state.lifecycle().list(query.status).await?;
    let views = records
        .into_iter()
        .map(|record| {
            let has_database = state.factory().exists(&record.tenant_code);
            TenantView::from_record(record, has_database)
        })
        .collect();
    Ok(Json(views))
}

/// `POST /api/admin/tenants`
pub async fn create_tenant(
    State(state): State<AppState>,
    Extension(scope): Extension<RequestScope>,
    Json(request): Json<NewTenant>,
) -> Result<(StatusCode, Json<TenantView>), ApiError> {
    let actor = scope.require_platform()?;
    let record = state.lifecycle().provision(request, actor).await?;
    let has_database = state.factory().exists(&record.tenant_code);
    Ok((StatusCode::CREATED, Json(TenantView::from_record(record, has_database))))
}

/// `GET /api/admin/tenants/{code}`
pub async fn get_tenant(
    State(state): State<AppState>,
    Extension(scope): Extension<RequestScope>,
    Path(code): Path<String>,
) -> Result<Json<TenantView>, ApiError> {
    scope.require_platform()?;
    let code = parse_code(&code)?;
    let record = state.lifecycle().get(&code).await?;
    let has_database = state.factory().exists(&code);
    Ok(Json(TenantView::from_record(record, has_database)))
}

/// `POST /api/admin/tenants/{code}/approve`
pub async fn approve_tenant(
    State(state): State<AppState>,
    Extension(scope): Extension<RequestScope>,
    Path(code): Path<String>,
) -> Result<Json<TenantView>, ApiError> {
    let actor = require_super_admin(&scope)?;
    let code = parse_code(&code)?;
    let record = state.lifecycle().approve(&code, actor).await?;
    Ok(Json(TenantView::from_record(record, true)))
}

/// `POST /api/admin/tenants/{code}/reject`
pub async fn reject_tenant(
    State(state): State<AppState>,
    Extension(scope): Extension<RequestScope>,
    Path(code): Path<String>,
) -> Result<StatusCode, ApiError> {
    let actor = require_super_admin(&scope)?;
    let code = parse_code(&code)?;
    state.lifecycle().reject(&code, actor).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `PUT /api/admin/tenants/{code}/credentials`
pub async fn rotate_credentials(
    State(state): State<AppState>,
    Extension(scope): Extension<RequestScope>,
    Path(code): Path<String>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<RotationOutcome>, ApiError> {
    let actor = scope.require_platform()?;
    let code = parse_code(&code)?;
    let outcome = state
        .lifecycle()
        .rotate_owner_credentials(&code, &request.username, &request.password, actor)
        .await?;
    Ok(Json(outcome))
}

/// `PUT /api/admin/tenants/{code}/status`
pub async fn set_status(
    State(state): State<AppState>,
    Extension(scope): Extension<RequestScope>,
    Path(code): Path<String>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<TenantView>, ApiError> {
    let actor = scope.require_platform()?;
    let code = parse_code(&code)?;
    let record = state.lifecycle().set_status(&code, request.status, actor).await?;
    let has_database = state.factory().exists(&code);
    Ok(Json(TenantView::from_record(record, has_database)))
}

/// `PUT /api/admin/tenants/{code}/validity`
pub async fn set_validity(
    State(state): State<AppState>,
    Extension(scope): Extension<RequestScope>,
    Path(code): Path<String>,
    Json(request): Json<ValidityRequest>,
) -> Result<Json<TenantView>, ApiError> {
    let actor = scope.require_platform()?;
    let code = parse_code(&code)?;
    let record = state.lifecycle().set_validity(&code, request.valid_until, actor).await?;
    let has_database = state.factory().exists(&code);
    Ok(Json(TenantView::from_record(record, has_database)))
}

/// `DELETE /api/admin/tenants/{code}`
pub async fn delete_tenant(
    State(state): State<AppState>,
    Extension(scope): Extension<RequestScope>,
    Path(code): Path<String>,
) -> Result<Json<DeleteOutcome>, ApiError> {
    let actor = require_super_admin(&scope)?;
    let code = parse_code(&code)?;
    let outcome = state.lifecycle().delete(&code, actor).await?;
    Ok(Json(outcome))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a path segment into a tenant code; invalid codes cannot exist.
fn parse_code(value: &str) -> Result<TenantCode, ApiError> {
    TenantCode::parse(value).map_err(|_| ApiError::NotFound("tenant not found".to_string()))
}

/// Requires a super-admin caller.
fn require_super_admin(scope: &RequestScope) -> Result<&Principal, ApiError> {
    let actor = scope.require_platform()?;
    if actor.role != Role::SuperAdmin {
        return Err(ApiError::Forbidden("super_admin role required".to_string()));
    }
    Ok(actor)
}
