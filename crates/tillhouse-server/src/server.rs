// crates/tillhouse-server/src/server.rs
// ============================================================================
// Module: Tillhouse Server
// Description: Wiring from configuration to a running HTTP listener.
// Purpose: Build the registry, factory, lifecycle, and resolver, then serve.
// Dependencies: axum, tokio, tillhouse-config, tillhouse-store-sqlite, tillhouse-tenancy
// ============================================================================

//! ## Overview
//! [`TillhouseServer::from_config`] validates the configuration, initializes
//! the master registry, seeds the bootstrap super-admin when configured, and
//! prepares the router. [`build_lifecycle`] is shared with the CLI so both
//! entry points construct storage the same way.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tillhouse_config::AuditConfig;
use tillhouse_config::AuditSinkKind;
use tillhouse_config::TillhouseConfig;
use tillhouse_store_sqlite::HandleGauge;
use tillhouse_store_sqlite::MasterRegistry;
use tillhouse_store_sqlite::MigrationMemo;
use tillhouse_store_sqlite::TenantDatabaseFactory;
use tillhouse_tenancy::AuditSink;
use tillhouse_tenancy::FileAuditSink;
use tillhouse_tenancy::MigrationAudit;
use tillhouse_tenancy::NoopAuditSink;
use tillhouse_tenancy::StderrAuditSink;
use tillhouse_tenancy::TenantLifecycle;

use crate::auth::BearerTokenPrincipals;
use crate::routes::build_app;
use crate::state::AppState;

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP server instance.
pub struct TillhouseServer {
    /// Listener address.
    addr: SocketAddr,
    /// Request body limit.
    max_body_bytes: usize,
    /// Shared request state.
    state: AppState,
}

impl TillhouseServer {
    /// Builds a server from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] when validation, registry initialization, or
    /// bootstrap fails.
    pub async fn from_config(config: &TillhouseConfig) -> Result<Self, ServerError> {
        config.validate().map_err(|err| ServerError::Config(err.to_string()))?;
        let addr = config.server.bind_addr().map_err(|err| ServerError::Config(err.to_string()))?;
        let lifecycle = Arc::new(build_lifecycle(config)?);
        lifecycle
            .registry()
            .ensure_initialized()
            .await
            .map_err(|err| ServerError::Init(err.to_string()))?;
        bootstrap_from_config(&lifecycle, config).await?;
        let resolver = Arc::new(BearerTokenPrincipals::from_config(&config.auth));
        Ok(Self {
            addr,
            max_body_bytes: config.server.max_body_bytes,
            state: AppState::new(lifecycle, resolver),
        })
    }

    /// Returns the shared request state.
    #[must_use]
    pub const fn state(&self) -> &AppState {
        &self.state
    }

    /// Returns the application router.
    #[must_use]
    pub fn router(&self) -> Router {
        build_app(self.state.clone(), self.max_body_bytes)
    }

    /// Serves requests until interrupted.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Transport`] when binding or serving fails.
    pub async fn serve(self) -> Result<(), ServerError> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|_| ServerError::Transport("http bind failed".to_string()))?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|_| ServerError::Transport("http server failed".to_string()))
    }
}

/// Resolves once the process receives ctrl-c.
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

// ============================================================================
// SECTION: Construction
// ============================================================================

/// Builds the lifecycle service (registry, factory, audit) from configuration.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the audit sink cannot be opened.
pub fn build_lifecycle(config: &TillhouseConfig) -> Result<TenantLifecycle, ServerError> {
    let audit = audit_sink_from_config(&config.audit)?;
    let options = config.storage.sqlite_options();
    let data_dir = config.storage.data_dir.as_path();
    let registry = Arc::new(MasterRegistry::new(data_dir, options));
    let mut factory = TenantDatabaseFactory::new(data_dir, options, HandleGauge::new())
        .with_observer(Arc::new(MigrationAudit::new(Arc::clone(&audit))));
    if config.storage.migration_memo {
        factory = factory.with_memo(Arc::new(MigrationMemo::new()));
    }
    Ok(TenantLifecycle::new(registry, factory, audit))
}

/// Builds the configured audit sink.
///
/// # Errors
///
/// Returns [`ServerError::Init`] when the file sink cannot be opened.
pub fn audit_sink_from_config(config: &AuditConfig) -> Result<Arc<dyn AuditSink>, ServerError> {
    match config.sink {
        AuditSinkKind::Stderr => Ok(Arc::new(StderrAuditSink)),
        AuditSinkKind::None => Ok(Arc::new(NoopAuditSink)),
        AuditSinkKind::File => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| ServerError::Config("audit.path is required".to_string()))?;
            let sink = FileAuditSink::new(Path::new(path))
                .map_err(|err| ServerError::Init(format!("audit log open failed: {err}")))?;
            Ok(Arc::new(sink))
        }
    }
}

/// Seeds the configured bootstrap super-admin. Returns true when created.
///
/// # Errors
///
/// Returns [`ServerError::Config`] when the password variable is unset and
/// [`ServerError::Init`] when seeding fails.
pub async fn bootstrap_from_config(
    lifecycle: &TenantLifecycle,
    config: &TillhouseConfig,
) -> Result<bool, ServerError> {
    let Some(bootstrap) = &config.bootstrap else {
        return Ok(false);
    };
    let password = bootstrap.password().map_err(|err| ServerError::Config(err.to_string()))?;
    lifecycle
        .bootstrap_super_admin(&bootstrap.username, &bootstrap.email, &password)
        .await
        .map_err(|err| ServerError::Init(err.to_string()))
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Configuration errors.
    #[error("config error: {0}")]
    Config(String),
    /// Initialization errors.
    #[error("init error: {0}")]
    Init(String),
    /// Transport errors.
    #[error("transport error: {0}")]
    Transport(String),
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use tempfile::TempDir;
    use tillhouse_config::AuditConfig;
    use tillhouse_config::AuditSinkKind;

    use super::ServerError;
    use super::audit_sink_from_config;

    #[test]
    fn file_sink_without_path_is_a_config_error() {
        let config = AuditConfig {
            sink: AuditSinkKind::File,
            path: None,
        };
        assert!(matches!(audit_sink_from_config(&config), Err(ServerError::Config(_))));
    }

    #[test]
    fn file_sink_opens_in_append_mode() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("audit.jsonl");
        let config = AuditConfig {
            sink: AuditSinkKind::File,
            path: Some(path.to_string_lossy().into_owned()),
        };
        assert!(audit_sink_from_config(&config).is_ok());
        assert!(path.is_file());
    }

    #[test]
    fn file_sink_in_missing_directory_fails_init() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("missing").join("audit.jsonl");
        let config = AuditConfig {
            sink: AuditSinkKind::File,
            path: Some(path.to_string_lossy().into_owned()),
        };
        assert!(matches!(audit_sink_from_config(&config), Err(ServerError::Init(_))));
    }
}
