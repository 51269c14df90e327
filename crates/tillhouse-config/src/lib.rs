// crates/tillhouse-config/src/lib.rs
// ============================================================================
// Module: Tillhouse Config Library
// Description: Canonical config model, validation, and example generation.
// Purpose: Single source of truth for tillhouse.toml semantics.
// Dependencies: serde, tillhouse-core, tillhouse-store-sqlite, toml
// ============================================================================

//! ## Overview
//! `tillhouse-config` defines the configuration model shared by the server
//! and the CLI. Loading is strict and fail-closed: oversized, non-UTF-8, or
//! inconsistent files are rejected before any database is touched.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
