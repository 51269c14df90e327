// crates/tillhouse-server/src/scope.rs
// ============================================================================
// Module: Request Scope
// Description: Per-request principal and database resolution middleware.
// Purpose: Bind each request to the master registry or one tenant handle.
// Dependencies: axum, tillhouse-core, tillhouse-store-sqlite, tillhouse-tenancy
// ============================================================================

//! ## Overview
//! [`tenant_scope`] resolves the caller, then attaches a [`RequestScope`] to
//! the request. Platform principals are routed to the master registry and
//! never touch a tenant file. Tenant principals get a freshly opened (and
//! migrated) handle to their own file.
//!
//! The tenant handle is closed exactly once: explicitly after the handler has
//! produced its response (success or error), or by `Drop` when the request
//! future is cancelled before that point, for example on client disconnect.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::extract::State;
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::response::Response;
use tillhouse_core::Principal;
use tillhouse_core::Role;
use tillhouse_store_sqlite::DatabaseHandle;
use tillhouse_store_sqlite::MasterRegistry;
use tillhouse_store_sqlite::SqliteConnection;
use tillhouse_tenancy::RequestAuditEvent;
use tillhouse_tenancy::RequestAuditEventParams;
use tillhouse_tenancy::TenancyError;

use crate::error::ApiError;
use crate::state::AppState;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Tenant handle owned by one request.
///
/// Clones share the handle; the physical connection is released by
/// [`ScopedHandle::close`] or when the last clone is dropped.
#[derive(Clone)]
pub struct ScopedHandle {
    /// Shared tenant connection.
    connection: Arc<SqliteConnection>,
}

impl ScopedHandle {
    /// Wraps a freshly opened tenant connection.
    #[must_use]
    pub fn new(connection: SqliteConnection) -> Self {
        Self {
            connection: Arc::new(connection),
        }
    }

    /// Returns the tenant connection.
    #[must_use]
    pub fn connection(&self) -> &SqliteConnection {
        &self.connection
    }

    /// Releases the handle. Idempotent.
    pub async fn close(&self) {
        self.connection.close().await;
    }
}

/// Database bound to a request.
#[derive(Clone)]
pub enum RequestDatabase {
    /// Platform principals use the master registry.
    Master(Arc<MasterRegistry>),
    /// Tenant principals use their own tenant file.
    Tenant(ScopedHandle),
}

impl RequestDatabase {
    /// Returns the four-operation handle for this request.
    #[must_use]
    pub fn handle(&self) -> &dyn DatabaseHandle {
        match self {
            Self::Master(registry) => &**registry,
            Self::Tenant(scoped) => scoped.connection(),
        }
    }

    /// Returns the tenant connection, if any.
    #[must_use]
    pub fn tenant(&self) -> Option<&SqliteConnection> {
        match self {
            Self::Master(_) => None,
            Self::Tenant(scoped) => Some(scoped.connection()),
        }
    }

    /// Closes a tenant handle; the master registry stays open.
    async fn release(&self) {
        if let Self::Tenant(scoped) = self {
            scoped.close().await;
        }
    }
}

/// Request extension carrying the caller and their database.
#[derive(Clone)]
pub struct RequestScope {
    /// Authenticated caller.
    pub principal: Principal,
    /// Database bound to the caller.
    pub database: RequestDatabase,
}

impl RequestScope {
    /// Fails with 403 unless the caller is a platform principal.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Forbidden`] for tenant principals.
    pub fn require_platform(&self) -> Result<&Principal, ApiError> {
        match self.database {
            RequestDatabase::Master(_) => Ok(&self.principal),
            RequestDatabase::Tenant(_) => {
                Err(ApiError::Forbidden("platform role required".to_string()))
            }
        }
    }

    /// Returns the tenant connection when the caller holds one of `roles`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Forbidden`] for platform principals or other roles.
    pub fn require_tenant(&self, roles: &[Role]) -> Result<&SqliteConnection, ApiError> {
        let connection = self
            .database
            .tenant()
            .ok_or_else(|| ApiError::Forbidden("tenant role required".to_string()))?;
        if !roles.contains(&self.principal.role) {
            return Err(ApiError::Forbidden(format!(
                "role {} may not perform this action",
                self.principal.role
            )));
        }
        Ok(connection)
    }
}

/// Tenant roles allowed to read tenant data.
pub const ANY_TENANT_ROLE: &[Role] = &[Role::Owner, Role::Manager, Role::Cashier];
/// Tenant roles allowed to change settings and purchasing.
pub const TENANT_MANAGERS: &[Role] = &[Role::Owner, Role::Manager];

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves the database for a principal.
///
/// # Errors
///
/// Returns [`TenancyError::TenantRequired`] for tenant roles without a code,
/// or the open failure (`NotFound` for a pending or deleted tenant).
pub async fn resolve_database(
    state: &AppState,
    principal: &Principal,
) -> Result<RequestDatabase, TenancyError> {
    if principal.role.is_platform() {
        return Ok(RequestDatabase::Master(Arc::clone(state.registry())));
    }
    let code = principal.tenant_code.as_ref().ok_or(TenancyError::TenantRequired)?;
    let connection = state.factory().open(code).await?;
    Ok(RequestDatabase::Tenant(ScopedHandle::new(connection)))
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Attaches a [`RequestScope`] and closes the tenant handle after the response.
pub async fn tenant_scope(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let authorization = request.headers().get(AUTHORIZATION).and_then(|value| value.to_str().ok());
    let principal = match state.resolver().resolve(authorization) {
        Ok(principal) => principal,
        Err(err) => return ApiError::from(err).into_response(),
    };
    let database = match resolve_database(&state, &principal).await {
        Ok(database) => database,
        Err(err) => {
            let mut response = ApiError::from(err).into_response();
            response.extensions_mut().insert(principal);
            return response;
        }
    };
    request.extensions_mut().insert(RequestScope {
        principal: principal.clone(),
        database: database.clone(),
    });
    let mut response = next.run(request).await;
    database.release().await;
    response.extensions_mut().insert(principal);
    response
}

/// Emits one request audit event per response.
pub async fn audit_requests(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    state.audit().record_request(&RequestAuditEvent::new(RequestAuditEventParams {
        method,
        path,
        status: response.status().as_u16(),
        principal: response.extensions().get::<Principal>().cloned(),
        latency_ms,
    }));
    response
}
