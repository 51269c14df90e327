// crates/tillhouse-tenancy/src/lib.rs
// ============================================================================
// Module: Tillhouse Tenancy
// Description: Tenant lifecycle workflows over the master registry and tenant files.
// Purpose: Provision, approve, reject, rotate, and delete tenants consistently.
// Dependencies: argon2, rand, serde, tillhouse-core, tillhouse-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! [`TenantLifecycle`] is the only component that writes to both the master
//! registry and tenant files. Its errors use [`TenancyError`], and every
//! action is reported to an [`AuditSink`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod credentials;
pub mod error;
pub mod lifecycle;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditSink;
pub use audit::FileAuditSink;
pub use audit::LifecycleAction;
pub use audit::LifecycleAuditEvent;
pub use audit::MigrationAudit;
pub use audit::MigrationAuditEvent;
pub use audit::NoopAuditSink;
pub use audit::RequestAuditEvent;
pub use audit::RequestAuditEventParams;
pub use audit::StderrAuditSink;
pub use credentials::hash_password;
pub use credentials::verify_password;
pub use error::TenancyError;
pub use lifecycle::BUSINESS_NAME_SETTING;
pub use lifecycle::DeleteOutcome;
pub use lifecycle::OrphanReport;
pub use lifecycle::OwnerSeed;
pub use lifecycle::OwnerSeeder;
pub use lifecycle::RotationOutcome;
pub use lifecycle::TenantFileUpdate;
pub use lifecycle::TenantLifecycle;
pub use lifecycle::TenantSeeder;
