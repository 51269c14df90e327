// crates/tillhouse-tenancy/src/lifecycle.rs
// ============================================================================
// Module: Tenant Lifecycle
// Description: Provisioning, approval, rejection, credential rotation, deletion.
// Purpose: Keep the master registry and tenant files consistent across steps.
// Dependencies: serde, serde_json, tillhouse-core, tillhouse-store-sqlite, tokio
// ============================================================================

//! ## Overview
//! [`TenantLifecycle`] orchestrates the [`MasterRegistry`] and the
//! [`TenantDatabaseFactory`]. There is no transaction spanning the registry
//! and a tenant file, so every workflow orders its writes so that a failure
//! leaves a state that a retry or an operator can reconcile:
//!
//! - provisioning writes the registry row, then creates the file; a failed
//!   create deletes the row again;
//! - approval creates the file, then flips the row out of `pending`; a file
//!   left by an interrupted approval is adopted when it carries the row's
//!   owner credentials and rebuilt otherwise;
//! - credential rotation writes the registry first and reports the tenant
//!   file outcome separately in [`RotationOutcome`];
//! - deletion removes the file first, then the row, so an interrupted delete
//!   leaves a row whose open fails with `NotFound` and can be deleted again.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tillhouse_core::NewTenant;
use tillhouse_core::Principal;
use tillhouse_core::Role;
use tillhouse_core::TENANT_ADMIN_ROLE;
use tillhouse_core::TenantCode;
use tillhouse_core::TenantRecord;
use tillhouse_core::TenantStatus;
use tillhouse_core::unix_millis;
use tillhouse_store_sqlite::DatabaseHandle;
use tillhouse_store_sqlite::MasterRegistry;
use tillhouse_store_sqlite::StoreError;
use tillhouse_store_sqlite::TenantDatabaseFactory;
use tillhouse_store_sqlite::TenantInsert;
use tillhouse_store_sqlite::Transaction;
use tillhouse_store_sqlite::execute;

use crate::audit::AuditSink;
use crate::audit::LifecycleAction;
use crate::audit::LifecycleAuditEvent;
use crate::credentials::hash_password;
use crate::credentials::verify_password;
use crate::error::TenancyError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Settings key holding the business name inside a tenant file.
pub const BUSINESS_NAME_SETTING: &str = "restaurant_name";

// ============================================================================
// SECTION: Seeding
// ============================================================================

/// Owner data written into a freshly created tenant file.
#[derive(Clone)]
pub struct OwnerSeed {
    /// Owner login username.
    pub username: String,
    /// Argon2 PHC hash mirrored from the registry.
    pub password_hash: String,
    /// Owner display name.
    pub full_name: String,
    /// Business name stored as a setting.
    pub business_name: String,
}

/// Writes the initial rows of a new tenant file inside its create transaction.
pub trait TenantSeeder: Send + Sync {
    /// Inserts seed rows; an error aborts creation.
    ///
    /// # Errors
    ///
    /// Returns the storage failure that should abort creation.
    fn seed(&self, tx: &Transaction<'_>, owner: &OwnerSeed) -> Result<(), StoreError>;
}

/// Seeds one `admin` user and the business-name setting.
pub struct OwnerSeeder;

impl TenantSeeder for OwnerSeeder {
    fn seed(&self, tx: &Transaction<'_>, owner: &OwnerSeed) -> Result<(), StoreError> {
        execute(
            tx,
            "INSERT INTO users (username, password_hash, full_name, role) VALUES (?1, ?2, ?3, ?4)",
            &[
                json!(owner.username),
                json!(owner.password_hash),
                json!(owner.full_name),
                json!(TENANT_ADMIN_ROLE),
            ],
        )?;
        execute(
            tx,
            "INSERT INTO settings (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            &[json!(BUSINESS_NAME_SETTING), json!(owner.business_name)],
        )?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Outcomes
// ============================================================================

/// Result of the tenant-file side of a credential rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "detail", rename_all = "snake_case")]
pub enum TenantFileUpdate {
    /// Mirrored admin row updated.
    Updated,
    /// Tenant has no file yet (pending); nothing to update.
    NoFile,
    /// File exists but no admin row matched the old username.
    RowMissing,
    /// File update failed; registry and file now disagree.
    Failed(String),
}

/// Outcome of a credential rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RotationOutcome {
    /// Registry row updated.
    pub registry_updated: bool,
    /// Tenant file result.
    pub tenant_file: TenantFileUpdate,
}

impl RotationOutcome {
    /// Returns true when both sides agree on the new credentials.
    #[must_use]
    pub const fn is_consistent(&self) -> bool {
        self.registry_updated
            && matches!(self.tenant_file, TenantFileUpdate::Updated | TenantFileUpdate::NoFile)
    }
}

/// Outcome of a tenant deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    /// A tenant file existed and was removed.
    pub file_removed: bool,
    /// A registry row existed and was removed.
    pub registry_removed: bool,
}

/// Registry/file mismatches found on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanReport {
    /// Tenant files with no registry row (safe to remove).
    pub files_without_registry: Vec<TenantCode>,
    /// Non-pending registry rows with no tenant file.
    pub registry_without_file: Vec<TenantCode>,
    /// Pending registry rows that already have a file (interrupted approval;
    /// approving again completes it).
    pub pending_with_file: Vec<TenantCode>,
}

impl OrphanReport {
    /// Returns true when registry and disk agree.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.files_without_registry.is_empty()
            && self.registry_without_file.is_empty()
            && self.pending_with_file.is_empty()
    }
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

/// Tenant lifecycle workflows.
pub struct TenantLifecycle {
    /// Master registry.
    registry: Arc<MasterRegistry>,
    /// Tenant file factory.
    factory: TenantDatabaseFactory,
    /// Audit sink.
    audit: Arc<dyn AuditSink>,
    /// Seeder for new tenant files.
    seeder: Arc<dyn TenantSeeder>,
}

impl TenantLifecycle {
    /// Creates the lifecycle service with the default owner seeder.
    #[must_use]
    pub fn new(
        registry: Arc<MasterRegistry>,
        factory: TenantDatabaseFactory,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            registry,
            factory,
            audit,
            seeder: Arc::new(OwnerSeeder),
        }
    }

    /// Replaces the seeder used for new tenant files.
    #[must_use]
    pub fn with_seeder(mut self, seeder: Arc<dyn TenantSeeder>) -> Self {
        self.seeder = seeder;
        self
    }

    /// Returns the master registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<MasterRegistry> {
        &self.registry
    }

    /// Returns the tenant file factory.
    #[must_use]
    pub const fn factory(&self) -> &TenantDatabaseFactory {
        &self.factory
    }

    /// Returns the audit sink.
    #[must_use]
    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }

    // ------------------------------------------------------------------------
    // Provisioning
    // ------------------------------------------------------------------------

    /// Provisions a tenant according to the actor's role.
    ///
    /// Super-admins provision immediately; admins file a pending request.
    ///
    /// # Errors
    ///
    /// Returns [`TenancyError::Invalid`] for tenant-scoped actors, or the
    /// failure of the selected workflow.
    pub async fn provision(
        &self,
        request: NewTenant,
        actor: &Principal,
    ) -> Result<TenantRecord, TenancyError> {
        match actor.role {
            Role::SuperAdmin => self.provision_immediate(request, actor).await,
            Role::Admin => self.request_tenant(request, actor).await,
            other => Err(TenancyError::Invalid(format!("role {other} cannot provision tenants"))),
        }
    }

    /// Creates the registry row and the seeded tenant file in one workflow.
    ///
    /// # Errors
    ///
    /// Returns [`TenancyError::UniqueViolation`] for a taken username or
    /// email, or the creation failure after the registry row was rolled back.
    pub async fn provision_immediate(
        &self,
        request: NewTenant,
        actor: &Principal,
    ) -> Result<TenantRecord, TenancyError> {
        let result = self.provision_immediate_inner(request, actor).await;
        let code = result.as_ref().ok().map(|record| &record.tenant_code);
        self.record(LifecycleAction::Provision, code, Some(actor), &result, None);
        result
    }

    /// Provisioning body; audit happens in the caller.
    async fn provision_immediate_inner(
        &self,
        request: NewTenant,
        actor: &Principal,
    ) -> Result<TenantRecord, TenancyError> {
        validate_request(&request)?;
        let password_hash = hash_blocking(request.password.clone()).await?;
        let insert = tenant_insert(&request, password_hash.clone(), TenantStatus::Inactive, actor);
        let record = self.registry.insert_tenant(&insert).await?;
        let seed = OwnerSeed {
            username: record.username.clone(),
            password_hash,
            full_name: record.owner_name.clone(),
            business_name: record.business_name.clone(),
        };
        if let Err(err) = self.create_seeded(&record.tenant_code, seed).await {
            if let Err(rollback) = self.registry.delete_tenant(&record.tenant_code, None).await {
                self.audit.record_lifecycle(&LifecycleAuditEvent::new(
                    LifecycleAction::Provision,
                    Some(&record.tenant_code),
                    Some(actor),
                    "rollback_failed",
                    Some(rollback.to_string()),
                ));
            }
            return Err(err);
        }
        Ok(record)
    }

    /// Files a pending tenant request; no tenant file is created.
    ///
    /// # Errors
    ///
    /// Returns [`TenancyError::UniqueViolation`] for a taken username or email.
    pub async fn request_tenant(
        &self,
        request: NewTenant,
        actor: &Principal,
    ) -> Result<TenantRecord, TenancyError> {
        let result = async {
            validate_request(&request)?;
            let password_hash = hash_blocking(request.password.clone()).await?;
            let insert = tenant_insert(&request, password_hash, TenantStatus::Pending, actor);
            Ok::<_, TenancyError>(self.registry.insert_tenant(&insert).await?)
        }
        .await;
        let code = result.as_ref().ok().map(|record| &record.tenant_code);
        self.record(LifecycleAction::Request, code, Some(actor), &result, None);
        result
    }

    /// Approves a pending tenant: creates its seeded file, then leaves `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`TenancyError::NotFound`] for an unknown code,
    /// [`TenancyError::InvalidState`] when the row is not pending, or the
    /// creation failure (the row stays pending).
    pub async fn approve(
        &self,
        code: &TenantCode,
        actor: &Principal,
    ) -> Result<TenantRecord, TenancyError> {
        let result = self.approve_inner(code).await;
        self.record(LifecycleAction::Approve, Some(code), Some(actor), &result, None);
        result
    }

    /// Approval body; audit happens in the caller.
    async fn approve_inner(&self, code: &TenantCode) -> Result<TenantRecord, TenancyError> {
        let record = self.require(code).await?;
        if record.status != TenantStatus::Pending {
            return Err(invalid_state(&record));
        }
        let seed = OwnerSeed {
            username: record.username.clone(),
            password_hash: record.password_hash.clone(),
            full_name: record.owner_name.clone(),
            business_name: record.business_name.clone(),
        };
        match self.create_seeded(code, seed.clone()).await {
            Ok(()) => {}
            Err(TenancyError::AlreadyExists(_)) => self.adopt_or_rebuild(code, seed).await?,
            Err(err) => return Err(err),
        }
        let changed = self
            .registry
            .update_tenant_status(code, Some(TenantStatus::Pending), TenantStatus::Inactive)
            .await;
        match changed {
            Ok(1) => self.require(code).await,
            Ok(_) => match self.registry.tenant_by_code(code).await? {
                Some(current) => Err(invalid_state(&current)),
                None => {
                    self.factory.remove(code).await?;
                    Err(TenancyError::NotFound(code.to_string()))
                }
            },
            Err(err) => {
                self.factory.remove(code).await?;
                Err(err.into())
            }
        }
    }

    /// Reconciles a file found at the path of a still-pending tenant.
    ///
    /// A file seeded with the row's owner credentials is the product of an
    /// interrupted approval and is kept; any other file is rebuilt.
    async fn adopt_or_rebuild(
        &self,
        code: &TenantCode,
        seed: OwnerSeed,
    ) -> Result<(), TenancyError> {
        let current = self.require(code).await?;
        if current.status != TenantStatus::Pending {
            return Err(invalid_state(&current));
        }
        match self.file_matches_seed(code, &seed).await {
            Ok(true) => return Ok(()),
            Ok(false) | Err(TenancyError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
        self.factory.remove(code).await?;
        self.create_seeded(code, seed).await
    }

    /// Returns true when the tenant file holds the seeded owner row.
    async fn file_matches_seed(
        &self,
        code: &TenantCode,
        seed: &OwnerSeed,
    ) -> Result<bool, TenancyError> {
        let db = self.factory.open(code).await?;
        let row = db
            .get(
                "SELECT password_hash FROM users WHERE username = ?1 AND role = ?2",
                &[json!(seed.username), json!(TENANT_ADMIN_ROLE)],
            )
            .await;
        db.close().await;
        let stored = row?.and_then(|row| {
            row.get("password_hash").and_then(|v| v.as_str()).map(ToString::to_string)
        });
        Ok(stored.is_some_and(|hash| hash == seed.password_hash))
    }

    /// Rejects a pending tenant by deleting its registry row.
    ///
    /// # Errors
    ///
    /// Returns [`TenancyError::NotFound`] for an unknown code or
    /// [`TenancyError::InvalidState`] when the row is not pending.
    pub async fn reject(&self, code: &TenantCode, actor: &Principal) -> Result<(), TenancyError> {
        let result = async {
            let record = self.require(code).await?;
            if record.status != TenantStatus::Pending {
                return Err(invalid_state(&record));
            }
            if self.registry.delete_tenant(code, Some(TenantStatus::Pending)).await? == 0 {
                let current = self.require(code).await?;
                return Err(invalid_state(&current));
            }
            Ok::<_, TenancyError>(())
        }
        .await;
        self.record(LifecycleAction::Reject, Some(code), Some(actor), &result, None);
        result
    }

    // ------------------------------------------------------------------------
    // Credentials
    // ------------------------------------------------------------------------

    /// Rotates the owner username and password on the registry and the file.
    ///
    /// The registry is written first. The tenant file result is reported in
    /// [`RotationOutcome::tenant_file`] and never turned into an error.
    ///
    /// # Errors
    ///
    /// Returns [`TenancyError::NotFound`] for an unknown code or
    /// [`TenancyError::UniqueViolation`] when the username is taken; in both
    /// cases nothing was written.
    pub async fn rotate_owner_credentials(
        &self,
        code: &TenantCode,
        new_username: &str,
        new_password: &str,
        actor: &Principal,
    ) -> Result<RotationOutcome, TenancyError> {
        let result = self.rotate_inner(code, new_username, new_password).await;
        let detail = result
            .as_ref()
            .ok()
            .and_then(|outcome| serde_json::to_string(&outcome.tenant_file).ok());
        self.record(LifecycleAction::RotateCredentials, Some(code), Some(actor), &result, detail);
        result
    }

    /// Rotation body; audit happens in the caller.
    async fn rotate_inner(
        &self,
        code: &TenantCode,
        new_username: &str,
        new_password: &str,
    ) -> Result<RotationOutcome, TenancyError> {
        let new_username = new_username.trim();
        if new_username.is_empty() {
            return Err(TenancyError::Invalid("username must not be empty".to_string()));
        }
        let record = self.require(code).await?;
        let password_hash = hash_blocking(new_password.to_string()).await?;
        let updated =
            self.registry.update_tenant_credentials(code, new_username, &password_hash).await?;
        if updated == 0 {
            return Err(TenancyError::NotFound(code.to_string()));
        }
        let tenant_file = if self.factory.exists(code) {
            self.mirror_credentials(code, &record.username, new_username, &password_hash).await
        } else {
            TenantFileUpdate::NoFile
        };
        Ok(RotationOutcome {
            registry_updated: true,
            tenant_file,
        })
    }

    /// Updates the mirrored admin row inside the tenant file.
    async fn mirror_credentials(
        &self,
        code: &TenantCode,
        old_username: &str,
        new_username: &str,
        password_hash: &str,
    ) -> TenantFileUpdate {
        let db = match self.factory.open(code).await {
            Ok(db) => db,
            Err(StoreError::NotFound(_)) => return TenantFileUpdate::NoFile,
            Err(err) => return TenantFileUpdate::Failed(err.to_string()),
        };
        let outcome = db
            .run(
                "UPDATE users SET username = ?1, password_hash = ?2 WHERE username = ?3 AND role = ?4",
                &[
                    json!(new_username),
                    json!(password_hash),
                    json!(old_username),
                    json!(TENANT_ADMIN_ROLE),
                ],
            )
            .await;
        db.close().await;
        match outcome {
            Ok(run) if run.affected > 0 => TenantFileUpdate::Updated,
            Ok(_) => TenantFileUpdate::RowMissing,
            Err(err) => TenantFileUpdate::Failed(err.to_string()),
        }
    }

    /// Verifies an owner login against the registry and the tenant file.
    ///
    /// # Errors
    ///
    /// Returns [`TenancyError::InvalidCredentials`] for unknown users or wrong
    /// passwords, [`TenancyError::InvalidState`] when the tenant is not
    /// active, and [`TenancyError::Expired`] past the validity window.
    pub async fn verify_owner_login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Principal, TenancyError> {
        let result = self.login_inner(username, password).await;
        let code = result.as_ref().ok().and_then(|principal| principal.tenant_code.as_ref());
        self.record(LifecycleAction::Login, code, None, &result, Some(username.to_string()));
        result
    }

    /// Login body; audit happens in the caller.
    async fn login_inner(&self, username: &str, password: &str) -> Result<Principal, TenancyError> {
        let record = self
            .registry
            .tenant_by_username(username)
            .await?
            .ok_or(TenancyError::InvalidCredentials)?;
        if record.status != TenantStatus::Active {
            return Err(invalid_state(&record));
        }
        if record.is_expired_at(unix_millis()) {
            return Err(TenancyError::Expired(record.tenant_code));
        }
        let db = self.factory.open(&record.tenant_code).await?;
        let row = db
            .get(
                "SELECT password_hash FROM users WHERE username = ?1 AND role = ?2 AND is_active = 1",
                &[json!(username), json!(TENANT_ADMIN_ROLE)],
            )
            .await;
        db.close().await;
        let hash = row?
            .and_then(|row| row.get("password_hash").and_then(|v| v.as_str()).map(ToString::to_string))
            .ok_or(TenancyError::InvalidCredentials)?;
        if !verify_blocking(password.to_string(), hash).await? {
            return Err(TenancyError::InvalidCredentials);
        }
        Ok(Principal::tenant(username, Role::Owner, record.tenant_code))
    }

    // ------------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------------

    /// Toggles a provisioned tenant between `active` and `inactive`.
    ///
    /// # Errors
    ///
    /// Returns [`TenancyError::Invalid`] for a `pending` target,
    /// [`TenancyError::NotFound`] for an unknown code, and
    /// [`TenancyError::InvalidState`] for a pending tenant.
    pub async fn set_status(
        &self,
        code: &TenantCode,
        status: TenantStatus,
        actor: &Principal,
    ) -> Result<TenantRecord, TenancyError> {
        let result = async {
            if status == TenantStatus::Pending {
                return Err(TenancyError::Invalid("status must be active or inactive".to_string()));
            }
            let record = self.require(code).await?;
            if record.status == TenantStatus::Pending {
                return Err(invalid_state(&record));
            }
            if self.registry.update_tenant_status(code, Some(record.status), status).await? == 0 {
                let current = self.require(code).await?;
                return Err(invalid_state(&current));
            }
            self.require(code).await
        }
        .await;
        let detail = Some(status.to_string());
        self.record(LifecycleAction::SetStatus, Some(code), Some(actor), &result, detail);
        result
    }

    /// Sets or clears a tenant's validity expiry (unix ms).
    ///
    /// # Errors
    ///
    /// Returns [`TenancyError::NotFound`] for an unknown code.
    pub async fn set_validity(
        &self,
        code: &TenantCode,
        valid_until: Option<i64>,
        actor: &Principal,
    ) -> Result<TenantRecord, TenancyError> {
        let result = async {
            if self.registry.set_tenant_validity(code, valid_until).await? == 0 {
                return Err(TenancyError::NotFound(code.to_string()));
            }
            self.require(code).await
        }
        .await;
        let detail = valid_until.map(|until| until.to_string());
        self.record(LifecycleAction::SetValidity, Some(code), Some(actor), &result, detail);
        result
    }

    /// Deletes a tenant: file first, then registry row.
    ///
    /// # Errors
    ///
    /// Returns [`TenancyError::NotFound`] when neither a row nor a file exists.
    pub async fn delete(
        &self,
        code: &TenantCode,
        actor: &Principal,
    ) -> Result<DeleteOutcome, TenancyError> {
        let result = async {
            let file_removed = self.factory.remove(code).await?;
            let registry_removed = self.registry.delete_tenant(code, None).await? > 0;
            if !file_removed && !registry_removed {
                return Err(TenancyError::NotFound(code.to_string()));
            }
            Ok::<_, TenancyError>(DeleteOutcome {
                file_removed,
                registry_removed,
            })
        }
        .await;
        self.record(LifecycleAction::Delete, Some(code), Some(actor), &result, None);
        result
    }

    /// Returns one tenant.
    ///
    /// # Errors
    ///
    /// Returns [`TenancyError::NotFound`] for an unknown code.
    pub async fn get(&self, code: &TenantCode) -> Result<TenantRecord, TenancyError> {
        self.require(code).await
    }

    /// Lists tenants, newest first.
    ///
    /// # Errors
    ///
    /// Returns the storage failure.
    pub async fn list(&self, status: Option<TenantStatus>) -> Result<Vec<TenantRecord>, TenancyError> {
        Ok(self.registry.list_tenants(status).await?)
    }

    /// Compares tenant files on disk with registry rows.
    ///
    /// # Errors
    ///
    /// Returns the listing or storage failure.
    pub async fn find_orphans(&self) -> Result<OrphanReport, TenancyError> {
        let on_disk: BTreeSet<TenantCode> = self.factory.list_codes()?.into_iter().collect();
        let records = self.registry.list_tenants(None).await?;
        let registered: BTreeSet<TenantCode> =
            records.iter().map(|record| record.tenant_code.clone()).collect();
        let files_without_registry = on_disk.difference(&registered).cloned().collect();
        let registry_without_file = records
            .iter()
            .filter(|record| record.status.has_database() && !on_disk.contains(&record.tenant_code))
            .map(|record| record.tenant_code.clone())
            .collect();
        let pending_with_file = records
            .into_iter()
            .filter(|record| !record.status.has_database() && on_disk.contains(&record.tenant_code))
            .map(|record| record.tenant_code)
            .collect();
        Ok(OrphanReport {
            files_without_registry,
            registry_without_file,
            pending_with_file,
        })
    }

    /// Creates the first super-admin account; no-op when one exists.
    ///
    /// Returns true when an account was created.
    ///
    /// # Errors
    ///
    /// Returns the hashing or storage failure.
    pub async fn bootstrap_super_admin(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<bool, TenancyError> {
        let result = async {
            if self.registry.count_super_admins().await? > 0 {
                return Ok::<bool, TenancyError>(false);
            }
            let password_hash = hash_blocking(password.to_string()).await?;
            match self.registry.insert_super_admin(username, email, &password_hash).await {
                Ok(_) => Ok(true),
                Err(StoreError::UniqueViolation(_)) => Ok(false),
                Err(err) => Err(err.into()),
            }
        }
        .await;
        self.record(LifecycleAction::Bootstrap, None, None, &result, Some(username.to_string()));
        result
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Loads a registry row or fails with `NotFound`.
    async fn require(&self, code: &TenantCode) -> Result<TenantRecord, TenancyError> {
        self.registry
            .tenant_by_code(code)
            .await?
            .ok_or_else(|| TenancyError::NotFound(code.to_string()))
    }

    /// Creates a tenant file seeded with the owner's rows.
    async fn create_seeded(&self, code: &TenantCode, seed: OwnerSeed) -> Result<(), TenancyError> {
        let seeder = Arc::clone(&self.seeder);
        self.factory.create_with(code, move |tx| seeder.seed(tx, &seed)).await?;
        Ok(())
    }

    /// Emits one lifecycle audit event for `result`.
    fn record<T>(
        &self,
        action: LifecycleAction,
        code: Option<&TenantCode>,
        actor: Option<&Principal>,
        result: &Result<T, TenancyError>,
        detail: Option<String>,
    ) {
        let (outcome, detail) = match result {
            Ok(_) => ("ok", detail),
            Err(err) => (err.kind(), Some(err.to_string())),
        };
        self.audit.record_lifecycle(&LifecycleAuditEvent::new(action, code, actor, outcome, detail));
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Rejects provisioning input with missing fields.
fn validate_request(request: &NewTenant) -> Result<(), TenancyError> {
    let required = [
        ("business_name", &request.business_name),
        ("owner_name", &request.owner_name),
        ("owner_email", &request.owner_email),
        ("username", &request.username),
        ("password", &request.password),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(TenancyError::Invalid(format!("{field} must not be empty")));
        }
    }
    if !request.owner_email.contains('@') {
        return Err(TenancyError::Invalid("owner_email must be an email address".to_string()));
    }
    Ok(())
}

/// Builds the registry insert for a request.
fn tenant_insert(
    request: &NewTenant,
    password_hash: String,
    status: TenantStatus,
    actor: &Principal,
) -> TenantInsert {
    TenantInsert {
        tenant_code: TenantCode::generate(&request.business_name),
        business_name: request.business_name.trim().to_string(),
        owner_name: request.owner_name.trim().to_string(),
        owner_email: request.owner_email.trim().to_string(),
        owner_phone: request.owner_phone.clone(),
        username: request.username.trim().to_string(),
        password_hash,
        status,
        created_by_role: Some(actor.role),
        created_by: Some(actor.subject.clone()),
    }
}

/// Builds the `InvalidState` error for a row.
fn invalid_state(record: &TenantRecord) -> TenancyError {
    TenancyError::InvalidState {
        code: record.tenant_code.clone(),
        status: record.status,
    }
}

/// Hashes a password on the blocking pool.
async fn hash_blocking(password: String) -> Result<String, TenancyError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|err| TenancyError::Credential(format!("hashing task failed: {err}")))?
}

/// Verifies a password on the blocking pool.
async fn verify_blocking(password: String, hash: String) -> Result<bool, TenancyError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|err| TenancyError::Credential(format!("verification task failed: {err}")))?
}
