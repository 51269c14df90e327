// crates/tillhouse-server/src/lib.rs
// ============================================================================
// Module: Tillhouse Server
// Description: HTTP surface over tenant lifecycle and per-request tenant handles.
// Purpose: Resolve callers, scope their database, and route admin and tenant APIs.
// Dependencies: axum, tokio, tillhouse-config, tillhouse-store-sqlite, tillhouse-tenancy
// ============================================================================

//! ## Overview
//! Each `/api` request is authenticated by a [`PrincipalResolver`], bound to
//! the master registry or its own tenant file by [`tenant_scope`], and audited
//! by [`audit_requests`]. Handlers stay thin: lifecycle work is delegated to
//! [`tillhouse_tenancy::TenantLifecycle`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod admin;
pub mod auth;
pub mod error;
pub mod routes;
pub mod scope;
pub mod server;
pub mod state;
pub mod tenant_data;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use auth::AuthError;
pub use auth::BearerTokenPrincipals;
pub use auth::PrincipalResolver;
pub use error::ApiError;
pub use routes::build_app;
pub use scope::RequestDatabase;
pub use scope::RequestScope;
pub use scope::ScopedHandle;
pub use scope::audit_requests;
pub use scope::resolve_database;
pub use scope::tenant_scope;
pub use server::ServerError;
pub use server::TillhouseServer;
pub use server::audit_sink_from_config;
pub use server::bootstrap_from_config;
pub use server::build_lifecycle;
pub use state::AppState;
