// crates/tillhouse-core/src/principal.rs
// ============================================================================
// Module: Tillhouse Principals
// Description: Authenticated caller identity and role model.
// Purpose: Decide whether a caller is routed to the master registry or a tenant file.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Platform roles (`super_admin`, `admin`) operate on the master registry and
//! never carry a tenant code. Tenant roles (`owner`, `manager`, `cashier`) are
//! always bound to exactly one tenant database.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::TenantCode;

/// Role value stored on the seeded owner row inside a tenant database.
pub const TENANT_ADMIN_ROLE: &str = "admin";

/// Caller role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Platform super-administrator; provisions tenants immediately.
    SuperAdmin,
    /// Platform administrator; tenant requests need approval.
    Admin,
    /// Tenant owner (the tenant database `admin` user).
    Owner,
    /// Tenant manager.
    Manager,
    /// Tenant cashier.
    Cashier,
}

impl Role {
    /// Returns the stored label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::Owner => "owner",
            Self::Manager => "manager",
            Self::Cashier => "cashier",
        }
    }

    /// Returns true for platform roles routed to the master registry.
    #[must_use]
    pub const fn is_platform(self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "super_admin" => Ok(Self::SuperAdmin),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            "manager" => Ok(Self::Manager),
            "cashier" => Ok(Self::Cashier),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Stable subject identifier (username or token subject).
    pub subject: String,
    /// Caller role.
    pub role: Role,
    /// Tenant binding for tenant roles.
    pub tenant_code: Option<TenantCode>,
}

impl Principal {
    /// Builds a platform principal.
    #[must_use]
    pub fn platform(subject: impl Into<String>, role: Role) -> Self {
        Self {
            subject: subject.into(),
            role,
            tenant_code: None,
        }
    }

    /// Builds a tenant principal.
    #[must_use]
    pub fn tenant(subject: impl Into<String>, role: Role, tenant_code: TenantCode) -> Self {
        Self {
            subject: subject.into(),
            role,
            tenant_code: Some(tenant_code),
        }
    }

    /// Returns true when the principal is routed to the master registry.
    #[must_use]
    pub const fn is_platform(&self) -> bool {
        self.role.is_platform()
    }
}
