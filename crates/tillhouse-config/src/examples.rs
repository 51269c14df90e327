// crates/tillhouse-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic starting point for operators and tooling.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The example is static and must always pass validation; the CLI prints it
//! for `config example`.

/// Returns a canonical example `tillhouse.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[storage]
data_dir = "/var/lib/tillhouse"
busy_timeout_ms = 5000
journal_mode = "wal"
sync_mode = "full"
migration_memo = true

[server]
bind = "127.0.0.1:8080"
max_body_bytes = 1048576

[audit]
sink = "file"
path = "/var/log/tillhouse/audit.jsonl"

[[auth.tokens]]
token = "replace-with-a-long-random-platform-token"
subject = "platform-root"
role = "super_admin"

[[auth.tokens]]
token = "replace-with-a-long-random-owner-token"
subject = "bob"
role = "owner"
tenant_code = "bob_s_diner_1700000000000"

[bootstrap]
username = "root"
email = "root@example.com"
password_env = "TILLHOUSE_BOOTSTRAP_PASSWORD"
"#,
    )
}
