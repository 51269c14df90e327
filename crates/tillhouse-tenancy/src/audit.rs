// crates/tillhouse-tenancy/src/audit.rs
// ============================================================================
// Module: Tenancy Audit Logging
// Description: Structured audit events for lifecycle, migration, and requests.
// Purpose: Emit JSON-line audit records without hard logging dependencies.
// Dependencies: serde, serde_json, tillhouse-core, tillhouse-store-sqlite
// ============================================================================

//! ## Overview
//! Every lifecycle action, every tenant file upgrade, and every HTTP request
//! produces one event. Sinks write them as JSON lines to stderr or to an
//! append-only file; write failures are ignored so auditing never fails the
//! operation being audited. Events never carry passwords or hashes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use serde::Serialize;
use tillhouse_core::Principal;
use tillhouse_core::Role;
use tillhouse_core::TenantCode;
use tillhouse_core::unix_millis;
use tillhouse_store_sqlite::MigrationObserver;
use tillhouse_store_sqlite::MigrationReport;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Lifecycle action label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    /// Immediate provisioning.
    Provision,
    /// Deferred tenant request.
    Request,
    /// Approval of a pending tenant.
    Approve,
    /// Rejection of a pending tenant.
    Reject,
    /// Owner credential rotation.
    RotateCredentials,
    /// Status toggle.
    SetStatus,
    /// Validity change.
    SetValidity,
    /// Tenant deletion.
    Delete,
    /// Owner login attempt.
    Login,
    /// Super-admin bootstrap.
    Bootstrap,
}

/// Lifecycle audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Action performed.
    pub action: LifecycleAction,
    /// Tenant code when known.
    pub tenant_code: Option<TenantCode>,
    /// Acting subject when known.
    pub actor: Option<String>,
    /// Acting role when known.
    pub actor_role: Option<Role>,
    /// `ok` or an error kind label.
    pub outcome: &'static str,
    /// Optional detail.
    pub detail: Option<String>,
}

impl LifecycleAuditEvent {
    /// Creates an event with a consistent timestamp.
    #[must_use]
    pub fn new(
        action: LifecycleAction,
        tenant_code: Option<&TenantCode>,
        actor: Option<&Principal>,
        outcome: &'static str,
        detail: Option<String>,
    ) -> Self {
        Self {
            event: "tenant_lifecycle",
            timestamp_ms: unix_millis(),
            action,
            tenant_code: tenant_code.cloned(),
            actor: actor.map(|principal| principal.subject.clone()),
            actor_role: actor.map(|principal| principal.role),
            outcome,
            detail,
        }
    }
}

/// Schema migration audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct MigrationAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// Upgraded tenant.
    pub tenant_code: TenantCode,
    /// Tables created.
    pub tables_created: Vec<String>,
    /// Columns added.
    pub columns_added: Vec<String>,
    /// Version stamped.
    pub schema_version: i64,
}

impl MigrationAuditEvent {
    /// Creates an event from a migration report.
    #[must_use]
    pub fn new(tenant_code: &TenantCode, report: &MigrationReport) -> Self {
        Self {
            event: "schema_migration",
            timestamp_ms: unix_millis(),
            tenant_code: tenant_code.clone(),
            tables_created: report.tables_created.clone(),
            columns_added: report.columns_added.clone(),
            schema_version: report.schema_version,
        }
    }
}

/// HTTP request audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct RequestAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: i64,
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Response status code.
    pub status: u16,
    /// Caller subject when resolved.
    pub subject: Option<String>,
    /// Caller role when resolved.
    pub role: Option<Role>,
    /// Tenant code when tenant-scoped.
    pub tenant_code: Option<TenantCode>,
    /// Handling latency in milliseconds.
    pub latency_ms: u64,
}

/// Inputs required to construct a request audit event.
pub struct RequestAuditEventParams {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Response status code.
    pub status: u16,
    /// Resolved principal, if any.
    pub principal: Option<Principal>,
    /// Handling latency in milliseconds.
    pub latency_ms: u64,
}

impl RequestAuditEvent {
    /// Creates an event with a consistent timestamp.
    #[must_use]
    pub fn new(params: RequestAuditEventParams) -> Self {
        let (subject, role, tenant_code) = match params.principal {
            Some(principal) => (Some(principal.subject), Some(principal.role), principal.tenant_code),
            None => (None, None, None),
        };
        Self {
            event: "request",
            timestamp_ms: unix_millis(),
            method: params.method,
            path: params.path,
            status: params.status,
            subject,
            role,
            tenant_code,
            latency_ms: params.latency_ms,
        }
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for tenancy events.
pub trait AuditSink: Send + Sync {
    /// Record a lifecycle event.
    fn record_lifecycle(&self, event: &LifecycleAuditEvent);

    /// Record a schema migration event.
    fn record_migration(&self, _event: &MigrationAuditEvent) {}

    /// Record a request event.
    fn record_request(&self, _event: &RequestAuditEvent) {}
}

/// Audit sink that logs JSON lines to stderr.
pub struct StderrAuditSink;

impl StderrAuditSink {
    /// Writes one serialized event.
    fn emit(event: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

impl AuditSink for StderrAuditSink {
    fn record_lifecycle(&self, event: &LifecycleAuditEvent) {
        Self::emit(event);
    }

    fn record_migration(&self, event: &MigrationAuditEvent) {
        Self::emit(event);
    }

    fn record_request(&self, event: &RequestAuditEvent) {
        Self::emit(event);
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Appends one serialized event and flushes.
    fn emit(&self, event: &impl Serialize) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

impl AuditSink for FileAuditSink {
    fn record_lifecycle(&self, event: &LifecycleAuditEvent) {
        self.emit(event);
    }

    fn record_migration(&self, event: &MigrationAuditEvent) {
        self.emit(event);
    }

    fn record_request(&self, event: &RequestAuditEvent) {
        self.emit(event);
    }
}

/// No-op audit sink.
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record_lifecycle(&self, _event: &LifecycleAuditEvent) {}
}

// ============================================================================
// SECTION: Migration Bridge
// ============================================================================

/// Forwards tenant file upgrades from the factory to an audit sink.
pub struct MigrationAudit {
    /// Destination sink.
    sink: Arc<dyn AuditSink>,
}

impl MigrationAudit {
    /// Wraps `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }
}

impl MigrationObserver for MigrationAudit {
    fn migrated(&self, tenant_code: &TenantCode, report: &MigrationReport) {
        self.sink.record_migration(&MigrationAuditEvent::new(tenant_code, report));
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, reason = "Test-only assertions are permitted.")]

    use tempfile::TempDir;
    use tillhouse_core::Principal;
    use tillhouse_core::Role;
    use tillhouse_core::TenantCode;

    use super::AuditSink;
    use super::FileAuditSink;
    use super::LifecycleAction;
    use super::LifecycleAuditEvent;
    use super::RequestAuditEvent;
    use super::RequestAuditEventParams;

    #[test]
    fn file_sink_appends_json_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("audit.log");
        let sink = FileAuditSink::new(&path).unwrap();
        let actor = Principal::platform("root", Role::SuperAdmin);
        let code = TenantCode::parse("cafe_1").unwrap();
        sink.record_lifecycle(&LifecycleAuditEvent::new(
            LifecycleAction::Provision,
            Some(&code),
            Some(&actor),
            "ok",
            None,
        ));
        sink.record_request(&RequestAuditEvent::new(RequestAuditEventParams {
            method: "GET".to_string(),
            path: "/health".to_string(),
            status: 200,
            principal: None,
            latency_ms: 1,
        }));
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> =
            contents.lines().map(|line| serde_json::from_str(line).unwrap()).collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "tenant_lifecycle");
        assert_eq!(lines[0]["action"], "provision");
        assert_eq!(lines[0]["actor_role"], "super_admin");
        assert_eq!(lines[0]["tenant_code"], "cafe_1");
        assert_eq!(lines[1]["event"], "request");
        assert_eq!(lines[1]["status"], 200);
    }
}
