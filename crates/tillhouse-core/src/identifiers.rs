// crates/tillhouse-core/src/identifiers.rs
// ============================================================================
// Module: Tillhouse Identifiers
// Description: Validated tenant codes and their generation from business names.
// Purpose: Make unsafe tenant file names unrepresentable.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! A [`TenantCode`] permanently names exactly one tenant database file, so it
//! is validated once at construction and is path-safe afterwards. Codes are
//! generated from the business name plus a creation timestamp; the timestamp
//! source is strictly increasing within a process, which keeps generated codes
//! unique without a retry loop.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::AtomicI64;
use std::sync::atomic::Ordering;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::time::unix_millis;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum tenant code length in bytes.
pub const MAX_TENANT_CODE_LENGTH: usize = 96;
/// Maximum length of the business-name slug inside a generated code.
const MAX_SLUG_LENGTH: usize = 40;
/// Slug used when a business name has no usable characters.
const FALLBACK_SLUG: &str = "tenant";

/// Last timestamp handed out for code generation.
static LAST_CODE_MILLIS: AtomicI64 = AtomicI64::new(0);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Identifier validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdentifierError {
    /// Tenant code is empty.
    #[error("tenant code must not be empty")]
    Empty,
    /// Tenant code exceeds [`MAX_TENANT_CODE_LENGTH`].
    #[error("tenant code exceeds {MAX_TENANT_CODE_LENGTH} bytes")]
    TooLong,
    /// Tenant code contains a character outside `[a-z0-9_-]` or starts with a separator.
    #[error("tenant code contains invalid character: {0:?}")]
    InvalidCharacter(char),
}

// ============================================================================
// SECTION: Tenant Code
// ============================================================================

/// Immutable tenant identifier, safe to embed in a file name.
///
/// # Invariants
/// - 1 to [`MAX_TENANT_CODE_LENGTH`] bytes.
/// - Only lowercase ASCII letters, digits, `_` and `-`.
/// - The first character is a letter or digit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantCode(String);

impl TenantCode {
    /// Parses and validates a tenant code.
    ///
    /// # Errors
    ///
    /// Returns [`IdentifierError`] when the value breaks a code invariant.
    pub fn parse(value: impl Into<String>) -> Result<Self, IdentifierError> {
        let value = value.into();
        if value.is_empty() {
            return Err(IdentifierError::Empty);
        }
        if value.len() > MAX_TENANT_CODE_LENGTH {
            return Err(IdentifierError::TooLong);
        }
        for (index, ch) in value.chars().enumerate() {
            let allowed = ch.is_ascii_lowercase()
                || ch.is_ascii_digit()
                || (index > 0 && (ch == '_' || ch == '-'));
            if !allowed {
                return Err(IdentifierError::InvalidCharacter(ch));
            }
        }
        Ok(Self(value))
    }

    /// Generates a fresh code for a business using the process code clock.
    #[must_use]
    pub fn generate(business_name: &str) -> Self {
        Self::from_parts(business_name, next_code_millis())
    }

    /// Builds the code for a business name at an explicit creation timestamp.
    #[must_use]
    pub fn from_parts(business_name: &str, created_at_ms: i64) -> Self {
        Self(format!("{}_{}", business_slug(business_name), created_at_ms.max(0)))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<String> for TenantCode {
    type Error = IdentifierError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for TenantCode {
    type Error = IdentifierError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TenantCode> for String {
    fn from(value: TenantCode) -> Self {
        value.0
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Lowercases a business name into `[a-z0-9_]`, collapsing separator runs.
fn business_slug(business_name: &str) -> String {
    let mut slug = String::with_capacity(business_name.len().min(MAX_SLUG_LENGTH));
    let mut pending_separator = false;
    for ch in business_name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_separator = true;
        }
        if slug.len() >= MAX_SLUG_LENGTH {
            break;
        }
    }
    slug.truncate(MAX_SLUG_LENGTH);
    let trimmed = slug.trim_end_matches('_');
    if trimmed.is_empty() { FALLBACK_SLUG.to_string() } else { trimmed.to_string() }
}

/// Returns a millisecond timestamp strictly greater than any previously returned.
fn next_code_millis() -> i64 {
    let now = unix_millis();
    let mut last = LAST_CODE_MILLIS.load(Ordering::Relaxed);
    loop {
        let candidate = if now > last { now } else { last + 1 };
        match LAST_CODE_MILLIS.compare_exchange_weak(
            last,
            candidate,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return candidate,
            Err(observed) => last = observed,
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test-only assertions are permitted."
    )]

    use std::collections::BTreeSet;

    use proptest::prelude::*;

    use super::IdentifierError;
    use super::TenantCode;

    #[test]
    fn slug_collapses_punctuation_and_spaces() {
        let code = TenantCode::from_parts("Bob's Diner", 1_700_000_000_000);
        assert_eq!(code.as_str(), "bob_s_diner_1700000000000");
    }

    #[test]
    fn empty_business_name_uses_fallback_slug() {
        let code = TenantCode::from_parts("  ***  ", 5);
        assert_eq!(code.as_str(), "tenant_5");
    }

    #[test]
    fn parse_rejects_path_separators_and_uppercase() {
        assert_eq!(TenantCode::parse("../etc"), Err(IdentifierError::InvalidCharacter('.')));
        assert_eq!(TenantCode::parse("Abc"), Err(IdentifierError::InvalidCharacter('A')));
        assert_eq!(TenantCode::parse("_abc"), Err(IdentifierError::InvalidCharacter('_')));
        assert_eq!(TenantCode::parse(""), Err(IdentifierError::Empty));
        assert_eq!(TenantCode::parse("a".repeat(97)), Err(IdentifierError::TooLong));
    }

    #[test]
    fn generated_codes_are_unique_for_the_same_name() {
        let codes: BTreeSet<_> = (0 .. 500).map(|_| TenantCode::generate("Same Name")).collect();
        assert_eq!(codes.len(), 500);
    }

    #[test]
    fn serde_round_trip_validates() {
        let code: TenantCode = serde_json::from_str("\"cafe_1\"").unwrap();
        assert_eq!(code.as_str(), "cafe_1");
        assert!(serde_json::from_str::<TenantCode>("\"Cafe/1\"").is_err());
    }

    proptest! {
        #[test]
        fn generated_codes_always_parse(name in ".{0,80}", ts in 0i64 .. i64::MAX) {
            let code = TenantCode::from_parts(&name, ts);
            prop_assert_eq!(TenantCode::parse(code.as_str()), Ok(code.clone()));
        }
    }
}
