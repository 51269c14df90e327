// crates/tillhouse-config/src/config.rs
// ============================================================================
// Module: Tillhouse Configuration
// Description: Configuration loading and validation for Tillhouse.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: serde, tillhouse-core, tillhouse-store-sqlite, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! The data root may be overridden with `TILLHOUSE_DATA_DIR` so that the same
//! file can be reused across deployments. Missing or inconsistent
//! configuration fails closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use tillhouse_core::Role;
use tillhouse_core::TenantCode;
use tillhouse_store_sqlite::DEFAULT_BUSY_TIMEOUT_MS;
use tillhouse_store_sqlite::JournalMode;
use tillhouse_store_sqlite::SqliteOptions;
use tillhouse_store_sqlite::SyncMode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "tillhouse.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "TILLHOUSE_CONFIG";
/// Environment variable used to override `storage.data_dir`.
pub const DATA_DIR_ENV_VAR: &str = "TILLHOUSE_DATA_DIR";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum number of bearer tokens.
pub(crate) const MAX_AUTH_TOKENS: usize = 64;
/// Minimum length of a bearer token.
pub(crate) const MIN_AUTH_TOKEN_LENGTH: usize = 16;
/// Maximum length of a bearer token.
pub(crate) const MAX_AUTH_TOKEN_LENGTH: usize = 256;
/// Maximum length of a token subject.
pub(crate) const MAX_AUTH_SUBJECT_LENGTH: usize = 128;
/// Maximum busy timeout in milliseconds.
pub(crate) const MAX_BUSY_TIMEOUT_MS: u64 = 60_000;
/// Default HTTP bind address.
pub(crate) const DEFAULT_BIND: &str = "127.0.0.1:8080";
/// Maximum accepted request body size in bytes.
pub(crate) const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Tillhouse configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TillhouseConfig {
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Audit sink configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Bearer token configuration.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Optional first super-admin account.
    #[serde(default)]
    pub bootstrap: Option<BootstrapConfig>,
}

impl TillhouseConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.apply_data_dir_override(env::var(DATA_DIR_ENV_VAR).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses and validates configuration text without consulting the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        if content.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Replaces `storage.data_dir` when an override is present and non-empty.
    pub fn apply_data_dir_override(&mut self, value: Option<String>) {
        if let Some(value) = value.filter(|value| !value.trim().is_empty()) {
            self.storage.data_dir = PathBuf::from(value.trim());
        }
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.validate()?;
        self.auth.validate()?;
        self.server.validate(!self.auth.tokens.is_empty())?;
        self.audit.validate()?;
        if let Some(bootstrap) = &self.bootstrap {
            bootstrap.validate()?;
        }
        Ok(())
    }
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Data root holding `master.db` and `tenants/`.
    #[serde(default)]
    pub data_dir: PathBuf,
    /// Busy timeout applied to every handle.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// Journal mode applied to every handle.
    #[serde(default)]
    pub journal_mode: JournalMode,
    /// Synchronous mode applied to every handle.
    #[serde(default)]
    pub sync_mode: SyncMode,
    /// Skip re-running the migrator for tenants already migrated by this process.
    #[serde(default = "default_migration_memo")]
    pub migration_memo: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::new(),
            busy_timeout_ms: default_busy_timeout_ms(),
            journal_mode: JournalMode::default(),
            sync_mode: SyncMode::default(),
            migration_memo: default_migration_memo(),
        }
    }
}

impl StorageConfig {
    /// Returns the pragmas for every opened handle.
    #[must_use]
    pub const fn sqlite_options(&self) -> SqliteOptions {
        SqliteOptions {
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
        }
    }

    /// Validates storage settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let data_dir = self.data_dir.to_string_lossy();
        validate_path_string("storage.data_dir", &data_dir)?;
        if self.busy_timeout_ms > MAX_BUSY_TIMEOUT_MS {
            return Err(ConfigError::Invalid(format!(
                "storage.busy_timeout_ms must be at most {MAX_BUSY_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// Returns the parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address does not parse.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("invalid bind address".to_string()))
    }

    /// Validates server settings.
    fn validate(&self, has_tokens: bool) -> Result<(), ConfigError> {
        if self.max_body_bytes == 0 {
            return Err(ConfigError::Invalid(
                "max_body_bytes must be greater than zero".to_string(),
            ));
        }
        if self.max_body_bytes > MAX_BODY_BYTES {
            return Err(ConfigError::Invalid("max_body_bytes exceeds limit".to_string()));
        }
        let addr = self.bind_addr()?;
        if !addr.ip().is_loopback() && !has_tokens {
            return Err(ConfigError::Invalid(
                "non-loopback bind disallowed without auth tokens".to_string(),
            ));
        }
        Ok(())
    }
}

/// Audit sink selection.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to `audit.path`.
    File,
    /// Audit disabled.
    None,
}

/// Audit configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditConfig {
    /// Sink kind.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Log file path (required for the file sink).
    #[serde(default)]
    pub path: Option<String>,
}

impl AuditConfig {
    /// Validates audit settings.
    fn validate(&self) -> Result<(), ConfigError> {
        match (self.sink, self.path.as_deref()) {
            (AuditSinkKind::File, Some(path)) => validate_path_string("audit.path", path),
            (AuditSinkKind::File, None) => {
                Err(ConfigError::Invalid("audit.path is required for the file sink".to_string()))
            }
            _ => Ok(()),
        }
    }
}

/// Bearer token configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Accepted tokens.
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
}

impl AuthConfig {
    /// Validates token entries.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.len() > MAX_AUTH_TOKENS {
            return Err(ConfigError::Invalid("too many auth tokens".to_string()));
        }
        let mut seen = BTreeSet::new();
        for token in &self.tokens {
            token.validate()?;
            if !seen.insert(token.token.as_str()) {
                return Err(ConfigError::Invalid("auth tokens must be unique".to_string()));
            }
        }
        Ok(())
    }
}

/// One bearer token bound to a principal.
#[derive(Clone, Deserialize)]
pub struct TokenConfig {
    /// Secret bearer token.
    pub token: String,
    /// Principal subject.
    pub subject: String,
    /// Principal role.
    pub role: Role,
    /// Tenant code for tenant roles.
    #[serde(default)]
    pub tenant_code: Option<TenantCode>,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("token", &"<redacted>")
            .field("subject", &self.subject)
            .field("role", &self.role)
            .field("tenant_code", &self.tenant_code)
            .finish()
    }
}

impl TokenConfig {
    /// Validates a single token entry.
    fn validate(&self) -> Result<(), ConfigError> {
        let length = self.token.len();
        if !(MIN_AUTH_TOKEN_LENGTH..=MAX_AUTH_TOKEN_LENGTH).contains(&length) {
            return Err(ConfigError::Invalid(format!(
                "auth token length must be between {MIN_AUTH_TOKEN_LENGTH} and \
                 {MAX_AUTH_TOKEN_LENGTH}"
            )));
        }
        if self.token.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid("auth token must not contain whitespace".to_string()));
        }
        let subject = self.subject.trim();
        if subject.is_empty() || subject.len() > MAX_AUTH_SUBJECT_LENGTH {
            return Err(ConfigError::Invalid("auth token subject is invalid".to_string()));
        }
        match (self.role.is_platform(), &self.tenant_code) {
            (true, Some(_)) => Err(ConfigError::Invalid(format!(
                "platform role {} must not set tenant_code",
                self.role
            ))),
            (false, None) => Err(ConfigError::Invalid(format!(
                "tenant role {} requires tenant_code",
                self.role
            ))),
            _ => Ok(()),
        }
    }
}

/// First super-admin account created on startup when none exists.
#[derive(Debug, Clone, Deserialize)]
pub struct BootstrapConfig {
    /// Super-admin username.
    pub username: String,
    /// Super-admin email.
    pub email: String,
    /// Environment variable carrying the password.
    pub password_env: String,
}

impl BootstrapConfig {
    /// Reads the password from the configured environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the variable is unset or empty.
    pub fn password(&self) -> Result<String, ConfigError> {
        match env::var(&self.password_env) {
            Ok(value) if !value.is_empty() => Ok(value),
            _ => Err(ConfigError::Invalid(format!(
                "bootstrap password variable {} is not set",
                self.password_env
            ))),
        }
    }

    /// Validates bootstrap settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.username.trim().is_empty() {
            return Err(ConfigError::Invalid("bootstrap.username must be non-empty".to_string()));
        }
        if !self.email.contains('@') {
            return Err(ConfigError::Invalid("bootstrap.email must be an email address".to_string()));
        }
        if self.password_env.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "bootstrap.password_env must be non-empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Default busy timeout.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Default memo setting.
const fn default_migration_memo() -> bool {
    true
}

/// Default bind address.
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

/// Default max body size (1 MiB).
const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use std::path::PathBuf;

    use super::TillhouseConfig;

    #[test]
    fn data_dir_override_replaces_configured_root() {
        let mut config =
            TillhouseConfig::from_toml_str("[storage]\ndata_dir = \"/srv/a\"\n").unwrap();
        config.apply_data_dir_override(Some("  /srv/b ".to_string()));
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/b"));
        config.apply_data_dir_override(Some("   ".to_string()));
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/b"));
        config.apply_data_dir_override(None);
        assert_eq!(config.storage.data_dir, PathBuf::from("/srv/b"));
    }

    #[test]
    fn storage_maps_to_sqlite_options() {
        let config = TillhouseConfig::from_toml_str(
            "[storage]\ndata_dir = \"d\"\nbusy_timeout_ms = 250\njournal_mode = \"delete\"\n",
        )
        .unwrap();
        let options = config.storage.sqlite_options();
        assert_eq!(options.busy_timeout_ms, 250);
        assert_eq!(options.journal_mode, tillhouse_store_sqlite::JournalMode::Delete);
        assert!(config.storage.migration_memo);
    }
}
