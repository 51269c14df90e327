// crates/tillhouse-tenancy/src/error.rs
// ============================================================================
// Module: Tenancy Errors
// Description: Error taxonomy for tenant lifecycle workflows.
// Purpose: Give callers the distinguishable failure cases and a generic rest.
// Dependencies: thiserror, tillhouse-core, tillhouse-store-sqlite
// ============================================================================

//! ## Overview
//! [`TenancyError`] is what lifecycle operations return. Storage failures are
//! lifted from [`StoreError`] so that `NotFound`, `AlreadyExists`, and
//! `UniqueViolation` stay distinguishable; everything else is wrapped.
//! [`TenancyError::user_message`] is the rendering callers show to end users.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use tillhouse_core::TenantCode;
use tillhouse_core::TenantStatus;
use tillhouse_store_sqlite::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Message shown for a missing tenant.
pub const MSG_TENANT_NOT_FOUND: &str = "tenant not found";
/// Message shown when a tenant already exists.
pub const MSG_TENANT_EXISTS: &str = "tenant already exists";
/// Message shown when a lifecycle action needs a pending tenant.
pub const MSG_NOT_PENDING: &str = "tenant is not pending approval";
/// Message shown when a lifecycle action needs a provisioned tenant.
pub const MSG_STILL_PENDING: &str = "tenant is pending approval";
/// Message shown for a uniqueness conflict.
pub const MSG_DUPLICATE_IDENTITY: &str = "username or email already exists";
/// Message shown for every other failure.
pub const MSG_INTERNAL: &str = "internal server error";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Tenant lifecycle errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TenancyError {
    /// Tenant row or file missing.
    #[error("tenant not found: {0}")]
    NotFound(String),
    /// Tenant row or file already present.
    #[error("tenant already exists: {0}")]
    AlreadyExists(String),
    /// Operation not valid for the tenant's current status.
    #[error("tenant {code} is {status}; operation not allowed")]
    InvalidState {
        /// Tenant code.
        code: TenantCode,
        /// Status found on the registry row.
        status: TenantStatus,
    },
    /// Username, email, or code already taken.
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
    /// Tenant-scoped principal without a tenant code.
    #[error("tenant code required for this principal")]
    TenantRequired,
    /// Login failed.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Tenant validity window has passed.
    #[error("tenant validity expired: {0}")]
    Expired(TenantCode),
    /// Input rejected.
    #[error("invalid input: {0}")]
    Invalid(String),
    /// Password hashing failed.
    #[error("credential error: {0}")]
    Credential(String),
    /// Any other storage failure.
    #[error(transparent)]
    Storage(StoreError),
}

impl TenancyError {
    /// Returns the user-facing message for this error.
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::NotFound(_) => MSG_TENANT_NOT_FOUND,
            Self::AlreadyExists(_) => MSG_TENANT_EXISTS,
            Self::InvalidState {
                status: TenantStatus::Pending,
                ..
            } => MSG_STILL_PENDING,
            Self::InvalidState { .. } => MSG_NOT_PENDING,
            Self::UniqueViolation(_) => MSG_DUPLICATE_IDENTITY,
            Self::TenantRequired => "tenant code required",
            Self::InvalidCredentials => "invalid username or password",
            Self::Expired(_) => "tenant subscription expired",
            Self::Invalid(_) => "invalid request",
            Self::Credential(_) | Self::Storage(_) => MSG_INTERNAL,
        }
    }

    /// Returns a stable label for audit events.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::AlreadyExists(_) => "already_exists",
            Self::InvalidState { .. } => "invalid_state",
            Self::UniqueViolation(_) => "unique_violation",
            Self::TenantRequired => "tenant_required",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Expired(_) => "expired",
            Self::Invalid(_) => "invalid",
            Self::Credential(_) => "credential",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<StoreError> for TenancyError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(detail) => Self::NotFound(detail),
            StoreError::AlreadyExists(detail) => Self::AlreadyExists(detail),
            StoreError::UniqueViolation(detail) => Self::UniqueViolation(detail),
            other => Self::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use tillhouse_core::TenantCode;
    use tillhouse_core::TenantStatus;
    use tillhouse_store_sqlite::StoreError;

    use super::TenancyError;

    #[test]
    fn distinguishable_cases_render_their_messages() {
        let cases = [
            (TenancyError::NotFound("x".into()), "tenant not found"),
            (TenancyError::AlreadyExists("x".into()), "tenant already exists"),
            (
                TenancyError::InvalidState {
                    code: TenantCode::parse("a_1").unwrap(),
                    status: TenantStatus::Active,
                },
                "tenant is not pending approval",
            ),
            (
                TenancyError::InvalidState {
                    code: TenantCode::parse("a_1").unwrap(),
                    status: TenantStatus::Pending,
                },
                "tenant is pending approval",
            ),
            (TenancyError::UniqueViolation("x".into()), "username or email already exists"),
            (TenancyError::Storage(StoreError::Busy("x".into())), "internal server error"),
        ];
        for (error, message) in cases {
            assert_eq!(error.user_message(), message);
        }
    }

    #[test]
    fn store_errors_keep_their_category() {
        assert!(matches!(
            TenancyError::from(StoreError::NotFound("f".into())),
            TenancyError::NotFound(_)
        ));
        assert!(matches!(
            TenancyError::from(StoreError::UniqueViolation("u".into())),
            TenancyError::UniqueViolation(_)
        ));
        assert!(matches!(TenancyError::from(StoreError::Closed), TenancyError::Storage(_)));
    }
}
