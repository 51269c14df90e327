// crates/tillhouse-server/src/state.rs
// ============================================================================
// Module: Server State
// Description: Shared collaborators handed to every request.
// Purpose: Inject the registry, factory, resolver, and audit sink explicitly.
// Dependencies: tillhouse-store-sqlite, tillhouse-tenancy
// ============================================================================

//! ## Overview
//! Shared collaborators handed to every request: the registry, factory,
//! resolver, and audit sink, injected explicitly.

use std::sync::Arc;

use tillhouse_store_sqlite::MasterRegistry;
use tillhouse_store_sqlite::TenantDatabaseFactory;
use tillhouse_tenancy::AuditSink;
use tillhouse_tenancy::TenantLifecycle;

use crate::auth::PrincipalResolver;

/// Shared server state; cheap to clone.
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle service (owns the registry and factory).
    lifecycle: Arc<TenantLifecycle>,
    /// Principal resolver.
    resolver: Arc<dyn PrincipalResolver>,
}

impl AppState {
    /// Creates the state from its collaborators.
    #[must_use]
    pub fn new(lifecycle: Arc<TenantLifecycle>, resolver: Arc<dyn PrincipalResolver>) -> Self {
        Self {
            lifecycle,
            resolver,
        }
    }

    /// Returns the lifecycle service.
    #[must_use]
    pub fn lifecycle(&self) -> &TenantLifecycle {
        &self.lifecycle
    }

    /// Returns the master registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<MasterRegistry> {
        self.lifecycle.registry()
    }

    /// Returns the tenant database factory.
    #[must_use]
    pub fn factory(&self) -> &TenantDatabaseFactory {
        self.lifecycle.factory()
    }

    /// Returns the principal resolver.
    #[must_use]
    pub fn resolver(&self) -> &dyn PrincipalResolver {
        self.resolver.as_ref()
    }

    /// Returns the audit sink.
    #[must_use]
    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        self.lifecycle.audit()
    }
}
