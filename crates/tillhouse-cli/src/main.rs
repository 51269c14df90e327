// crates/tillhouse-cli/src/main.rs
// ============================================================================
// Module: Tillhouse CLI Entry Point
// Description: Command dispatcher for serving and operating tenant storage.
// Purpose: Run the HTTP server and perform tenant lifecycle tasks offline.
// Dependencies: clap, serde_json, thiserror, tillhouse-config, tillhouse-server, tokio
// ============================================================================

//! ## Overview
//! Every command loads the same TOML configuration as the server and builds
//! storage through [`tillhouse_server::build_lifecycle`], so offline tasks
//! see exactly the registry and tenant files the server would. Lifecycle
//! commands act as a local platform operator (`super_admin` by default).
//! Passwords are read from environment variables, never from arguments.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use serde::Serialize;
use thiserror::Error;
use tillhouse_config::TillhouseConfig;
use tillhouse_config::config_toml_example;
use tillhouse_core::NewTenant;
use tillhouse_core::Principal;
use tillhouse_core::Role;
use tillhouse_core::TenantCode;
use tillhouse_core::TenantRecord;
use tillhouse_core::TenantStatus;
use tillhouse_server::TillhouseServer;
use tillhouse_server::bootstrap_from_config;
use tillhouse_server::build_lifecycle;
use tillhouse_store_sqlite::MigrationReport;
use tillhouse_store_sqlite::tenant_db_path;
use tillhouse_tenancy::DeleteOutcome;
use tillhouse_tenancy::OrphanReport;
use tillhouse_tenancy::TenantLifecycle;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Subject recorded on lifecycle audit events issued from the CLI.
const CLI_SUBJECT: &str = "cli";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "tillhouse", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (defaults to tillhouse.toml or `TILLHOUSE_CONFIG`).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server.
    Serve,
    /// Tenant lifecycle operations.
    Tenant {
        /// Selected tenant subcommand.
        #[command(subcommand)]
        command: TenantCommand,
    },
    /// Open every tenant file once, bringing its schema up to date.
    Migrate,
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Tenant subcommands.
#[derive(Subcommand, Debug)]
enum TenantCommand {
    /// Provision a tenant (immediately, or as a pending request with `--as admin`).
    Provision(ProvisionCommand),
    /// List tenants.
    List(ListCommand),
    /// Approve a pending tenant and create its database.
    Approve(CodeArg),
    /// Reject a pending tenant.
    Reject(CodeArg),
    /// Activate or deactivate a provisioned tenant.
    SetStatus(SetStatusCommand),
    /// Delete a tenant's database file and registry row.
    Delete(CodeArg),
    /// Print the database path for a tenant code.
    Path(CodeArg),
    /// Report tenant files and registry rows that do not match.
    Orphans,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration file.
    Check,
    /// Print an example configuration.
    Example,
}

/// Platform role the CLI acts as.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ActorArg {
    /// Provision immediately.
    SuperAdmin,
    /// File a pending request.
    Admin,
}

impl ActorArg {
    /// Returns the CLI principal for this role.
    fn principal(self) -> Principal {
        let role = match self {
            Self::SuperAdmin => Role::SuperAdmin,
            Self::Admin => Role::Admin,
        };
        Principal::platform(CLI_SUBJECT, role)
    }
}

/// Arguments for `tenant provision`.
#[derive(Args, Debug)]
struct ProvisionCommand {
    /// Business name.
    #[arg(long, value_name = "NAME")]
    business_name: String,
    /// Owner display name.
    #[arg(long, value_name = "NAME")]
    owner_name: String,
    /// Owner email address.
    #[arg(long, value_name = "EMAIL")]
    owner_email: String,
    /// Owner phone number.
    #[arg(long, value_name = "PHONE")]
    owner_phone: Option<String>,
    /// Owner login username.
    #[arg(long, value_name = "USERNAME")]
    username: String,
    /// Environment variable holding the owner password.
    #[arg(long, value_name = "VAR", default_value = "TILLHOUSE_OWNER_PASSWORD")]
    password_env: String,
    /// Platform role to act as.
    #[arg(long = "as", value_enum, default_value_t = ActorArg::SuperAdmin)]
    actor: ActorArg,
}

/// Arguments for `tenant list`.
#[derive(Args, Debug)]
struct ListCommand {
    /// Only list tenants in this status.
    #[arg(long, value_name = "STATUS")]
    status: Option<TenantStatus>,
}

/// Arguments for `tenant set-status`.
#[derive(Args, Debug)]
struct SetStatusCommand {
    /// Tenant code.
    code: String,
    /// Target status (`active` or `inactive`).
    #[arg(long, value_name = "STATUS")]
    status: TenantStatus,
}

/// Single tenant code argument.
#[derive(Args, Debug)]
struct CodeArg {
    /// Tenant code.
    code: String,
}

/// Result line for one tenant file in `migrate`.
#[derive(Debug, Serialize)]
struct MigrateLine {
    /// Tenant code.
    tenant_code: TenantCode,
    /// Report when the migration succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<MigrationReport>,
    /// Failure message otherwise.
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Config {
            command: ConfigCommand::Example,
        } => {
            write_stdout_line(config_toml_example().trim_end())?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config {
            command: ConfigCommand::Check,
        } => {
            load_config(cli.config)?;
            write_stdout_line("config ok")?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Serve => command_serve(&load_config(cli.config)?).await,
        Commands::Migrate => command_migrate(&load_config(cli.config)?).await,
        Commands::Tenant {
            command,
        } => command_tenant(&load_config(cli.config)?, command).await,
    }
}

/// Loads and validates configuration.
fn load_config(path: Option<PathBuf>) -> CliResult<TillhouseConfig> {
    TillhouseConfig::load(path.as_deref())
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

// ============================================================================
// SECTION: Serve Command
// ============================================================================

/// Executes the `serve` command.
async fn command_serve(config: &TillhouseConfig) -> CliResult<ExitCode> {
    let server = TillhouseServer::from_config(config)
        .await
        .map_err(|err| CliError::new(format!("server init failed: {err}")))?;
    write_stderr_line(&format!("tillhouse listening on {}", config.server.bind))
        .map_err(|err| CliError::new(output_error("stderr", &err)))?;
    server.serve().await.map_err(|err| CliError::new(format!("server failed: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Tenant Commands
// ============================================================================

/// Dispatches tenant subcommands.
async fn command_tenant(config: &TillhouseConfig, command: TenantCommand) -> CliResult<ExitCode> {
    // Path lookup is pure and must not create the master registry.
    if let TenantCommand::Path(arg) = &command {
        let code = parse_code(&arg.code)?;
        let path = tenant_db_path(&config.storage.data_dir, &code);
        write_stdout_line(&path.display().to_string())?;
        return Ok(ExitCode::SUCCESS);
    }
    let lifecycle = open_lifecycle(config).await?;
    let super_admin = ActorArg::SuperAdmin.principal();
    match command {
        TenantCommand::Provision(command) => {
            let password = read_password(&command.password_env)?;
            let record = provision(&lifecycle, &command, password).await?;
            write_json(&record)?;
        }
        TenantCommand::List(command) => {
            let records = lifecycle.list(command.status).await.map_err(tenancy_error)?;
            write_json(&records)?;
        }
        TenantCommand::Approve(arg) => {
            let record = lifecycle
                .approve(&parse_code(&arg.code)?, &super_admin)
                .await
                .map_err(tenancy_error)?;
            write_json(&record)?;
        }
        TenantCommand::Reject(arg) => {
            lifecycle.reject(&parse_code(&arg.code)?, &super_admin).await.map_err(tenancy_error)?;
            write_stdout_line("rejected")?;
        }
        TenantCommand::SetStatus(command) => {
            let record = lifecycle
                .set_status(&parse_code(&command.code)?, command.status, &super_admin)
                .await
                .map_err(tenancy_error)?;
            write_json(&record)?;
        }
        TenantCommand::Delete(arg) => {
            let outcome: DeleteOutcome = lifecycle
                .delete(&parse_code(&arg.code)?, &super_admin)
                .await
                .map_err(tenancy_error)?;
            write_json(&outcome)?;
        }
        TenantCommand::Orphans => {
            let report: OrphanReport = lifecycle.find_orphans().await.map_err(tenancy_error)?;
            write_json(&report)?;
            if !report.is_clean() {
                return Ok(ExitCode::FAILURE);
            }
        }
        TenantCommand::Path(arg) => {
            let path = lifecycle.factory().tenant_db_path(&parse_code(&arg.code)?);
            write_stdout_line(&path.display().to_string())?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Builds the lifecycle service, initializes the registry, and runs bootstrap.
async fn open_lifecycle(config: &TillhouseConfig) -> CliResult<TenantLifecycle> {
    let lifecycle =
        build_lifecycle(config).map_err(|err| CliError::new(format!("init failed: {err}")))?;
    lifecycle
        .registry()
        .ensure_initialized()
        .await
        .map_err(|err| CliError::new(format!("master registry init failed: {err}")))?;
    bootstrap_from_config(&lifecycle, config)
        .await
        .map_err(|err| CliError::new(format!("bootstrap failed: {err}")))?;
    Ok(lifecycle)
}

/// Provisions a tenant from CLI arguments.
async fn provision(
    lifecycle: &TenantLifecycle,
    command: &ProvisionCommand,
    password: String,
) -> CliResult<TenantRecord> {
    let request = NewTenant {
        business_name: command.business_name.clone(),
        owner_name: command.owner_name.clone(),
        owner_email: command.owner_email.clone(),
        owner_phone: command.owner_phone.clone(),
        username: command.username.clone(),
        password,
    };
    lifecycle.provision(request, &command.actor.principal()).await.map_err(tenancy_error)
}

// ============================================================================
// SECTION: Migrate Command
// ============================================================================

/// Executes the `migrate` command; fails when any tenant file failed.
async fn command_migrate(config: &TillhouseConfig) -> CliResult<ExitCode> {
    let lines = migrate_all(config).await?;
    let failed = lines.iter().any(|line| line.error.is_some());
    write_json(&lines)?;
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

/// Migrates the master registry and every tenant file.
async fn migrate_all(config: &TillhouseConfig) -> CliResult<Vec<MigrateLine>> {
    let lifecycle = open_lifecycle(config).await?;
    let results = lifecycle
        .factory()
        .migrate_all()
        .await
        .map_err(|err| CliError::new(format!("tenant listing failed: {err}")))?;
    Ok(results
        .into_iter()
        .map(|(tenant_code, result)| match result {
            Ok(report) => MigrateLine {
                tenant_code,
                report: Some(report),
                error: None,
            },
            Err(err) => MigrateLine {
                tenant_code,
                report: None,
                error: Some(err.to_string()),
            },
        })
        .collect())
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a tenant code argument.
fn parse_code(value: &str) -> CliResult<TenantCode> {
    TenantCode::parse(value).map_err(|err| CliError::new(format!("invalid tenant code: {err}")))
}

/// Reads a non-empty password from an environment variable.
fn read_password(variable: &str) -> CliResult<String> {
    match std::env::var(variable) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(CliError::new(format!("password variable {variable} is not set"))),
    }
}

/// Formats a lifecycle failure.
fn tenancy_error(error: tillhouse_tenancy::TenancyError) -> CliError {
    CliError::new(format!("tenant operation failed: {error}"))
}

/// Writes pretty JSON to stdout.
fn write_json<T: Serialize>(value: &T) -> CliResult<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("json serialization failed: {err}")))?;
    write_stdout_line(&text)
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}").map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
