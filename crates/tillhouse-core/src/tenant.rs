// crates/tillhouse-core/src/tenant.rs
// ============================================================================
// Module: Tillhouse Tenant Records
// Description: Registry-side tenant record, lifecycle status, and provisioning input.
// Purpose: Shared tenant model for the registry, lifecycle, and HTTP layers.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A tenant record lives in the master registry. Its status decides whether a
//! physical tenant database must exist: `pending` rows have no file yet, every
//! other status implies one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::identifiers::TenantCode;
use crate::principal::Role;

// ============================================================================
// SECTION: Status
// ============================================================================

/// Tenant lifecycle status stored on the registry row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantStatus {
    /// Requested by an admin; awaiting approval, no database file yet.
    Pending,
    /// Database provisioned; not (or no longer) enabled for use.
    Inactive,
    /// Database provisioned and enabled.
    Active,
}

impl TenantStatus {
    /// Returns the stored label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Inactive => "inactive",
            Self::Active => "active",
        }
    }

    /// Returns true when a tenant database file must exist for this status.
    #[must_use]
    pub const fn has_database(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "inactive" => Ok(Self::Inactive),
            "active" => Ok(Self::Active),
            other => Err(format!("unknown tenant status: {other}")),
        }
    }
}

// ============================================================================
// SECTION: Records
// ============================================================================

/// Tenant row as stored in the master registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantRecord {
    /// Registry row identifier.
    pub id: i64,
    /// Tenant code (immutable).
    pub tenant_code: TenantCode,
    /// Business (restaurant/shop) name.
    pub business_name: String,
    /// Owner display name.
    pub owner_name: String,
    /// Owner email address.
    pub owner_email: String,
    /// Owner phone number.
    pub owner_phone: Option<String>,
    /// Owner login username.
    pub username: String,
    /// Argon2 PHC hash of the owner password.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Lifecycle status.
    pub status: TenantStatus,
    /// First activation time (unix ms).
    pub activated_at: Option<i64>,
    /// Validity expiry (unix ms); `None` means no expiry.
    pub valid_until: Option<i64>,
    /// Role of the platform account that created the row.
    pub created_by_role: Option<Role>,
    /// Subject of the platform account that created the row.
    pub created_by: Option<String>,
    /// Creation time (unix ms).
    pub created_at: i64,
    /// Last update time (unix ms).
    pub updated_at: i64,
}

impl TenantRecord {
    /// Returns true when the validity window has passed at `now_ms`.
    #[must_use]
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.valid_until.is_some_and(|until| until <= now_ms)
    }
}

/// Provisioning input submitted by a platform account.
#[derive(Clone, Deserialize)]
pub struct NewTenant {
    /// Business (restaurant/shop) name.
    pub business_name: String,
    /// Owner display name.
    pub owner_name: String,
    /// Owner email address.
    pub owner_email: String,
    /// Owner phone number.
    #[serde(default)]
    pub owner_phone: Option<String>,
    /// Owner login username.
    pub username: String,
    /// Owner plaintext password; hashed before it reaches storage.
    pub password: String,
}

impl fmt::Debug for NewTenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewTenant")
            .field("business_name", &self.business_name)
            .field("owner_name", &self.owner_name)
            .field("owner_email", &self.owner_email)
            .field("owner_phone", &self.owner_phone)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
