// crates/tillhouse-core/src/lib.rs
// ============================================================================
// Module: Tillhouse Core
// Description: Shared identifiers and records for the multi-tenant POS backend.
// Purpose: Single source of truth for tenant codes, statuses, and principals.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! `tillhouse-core` holds the types every other Tillhouse crate agrees on:
//! the path-safe [`TenantCode`], the registry-side [`TenantRecord`], and the
//! caller [`Principal`]. It performs no I/O.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod identifiers;
pub mod principal;
pub mod tenant;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::IdentifierError;
pub use identifiers::MAX_TENANT_CODE_LENGTH;
pub use identifiers::TenantCode;
pub use principal::Principal;
pub use principal::Role;
pub use principal::TENANT_ADMIN_ROLE;
pub use tenant::NewTenant;
pub use tenant::TenantRecord;
pub use tenant::TenantStatus;
pub use time::unix_millis;
