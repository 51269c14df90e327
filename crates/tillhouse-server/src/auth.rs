// crates/tillhouse-server/src/auth.rs
// ============================================================================
// Module: Principal Resolution
// Description: Bearer token authentication mapped onto tenancy principals.
// Purpose: Provide a strict, fail-closed principal resolver for HTTP requests.
// Dependencies: sha2, subtle, thiserror, tillhouse-config, tillhouse-core
// ============================================================================

//! ## Overview
//! [`PrincipalResolver`] is the seam between HTTP and authentication. The
//! shipped [`BearerTokenPrincipals`] maps configured bearer tokens to
//! principals. Only SHA-256 fingerprints of the tokens are kept in memory, and
//! a presented token is compared against every fingerprint in constant time.

// ============================================================================
// SECTION: Imports
// ============================================================================

use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tillhouse_config::AuthConfig;
use tillhouse_core::Principal;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted `Authorization` header size.
const MAX_AUTH_HEADER_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Authentication errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Missing or invalid credentials.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

// ============================================================================
// SECTION: Traits
// ============================================================================

/// Resolves the caller of a request from its `Authorization` header.
pub trait PrincipalResolver: Send + Sync {
    /// Returns the authenticated principal.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the caller cannot be authenticated.
    fn resolve(&self, authorization: Option<&str>) -> Result<Principal, AuthError>;
}

// ============================================================================
// SECTION: Bearer Tokens
// ============================================================================

/// One configured token, kept as a fingerprint.
struct TokenBinding {
    /// SHA-256 of the token bytes.
    fingerprint: [u8; 32],
    /// Principal granted by the token.
    principal: Principal,
}

/// Static bearer-token resolver.
pub struct BearerTokenPrincipals {
    /// Configured bindings.
    bindings: Vec<TokenBinding>,
}

impl BearerTokenPrincipals {
    /// Builds a resolver from `(token, principal)` pairs.
    #[must_use]
    pub fn new(entries: impl IntoIterator<Item = (String, Principal)>) -> Self {
        let bindings = entries
            .into_iter()
            .map(|(token, principal)| TokenBinding {
                fingerprint: fingerprint(&token),
                principal,
            })
            .collect();
        Self { bindings }
    }

    /// Builds a resolver from validated auth configuration.
    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.tokens.iter().map(|entry| {
            let principal = match &entry.tenant_code {
                Some(code) => Principal::tenant(entry.subject.clone(), entry.role, code.clone()),
                None => Principal::platform(entry.subject.clone(), entry.role),
            };
            (entry.token.clone(), principal)
        }))
    }

    /// Returns the number of configured tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Returns true when no tokens are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl PrincipalResolver for BearerTokenPrincipals {
    fn resolve(&self, authorization: Option<&str>) -> Result<Principal, AuthError> {
        let token = parse_bearer_token(authorization)?;
        let presented = fingerprint(token);
        let mut matched: Option<&Principal> = None;
        for binding in &self.bindings {
            if bool::from(binding.fingerprint[..].ct_eq(&presented[..])) {
                matched = Some(&binding.principal);
            }
        }
        matched
            .cloned()
            .ok_or_else(|| AuthError::Unauthenticated("invalid bearer token".to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Hashes a token for storage and comparison.
fn fingerprint(token: &str) -> [u8; 32] {
    let digest = Sha256::digest(token.as_bytes());
    let mut out = [0_u8; 32];
    out.copy_from_slice(&digest);
    out
}

/// Extracts the token from a `Bearer` authorization header.
fn parse_bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    let header =
        header.ok_or_else(|| AuthError::Unauthenticated("missing authorization".to_string()))?;
    if header.len() > MAX_AUTH_HEADER_BYTES {
        return Err(AuthError::Unauthenticated("authorization header too large".to_string()));
    }
    let mut parts = header.trim().splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default().trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::Unauthenticated("invalid authorization header".to_string()));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use tillhouse_core::Principal;
    use tillhouse_core::Role;
    use tillhouse_core::TenantCode;

    use super::AuthError;
    use super::BearerTokenPrincipals;
    use super::PrincipalResolver;

    fn resolver() -> BearerTokenPrincipals {
        BearerTokenPrincipals::new([
            ("root-token".to_string(), Principal::platform("root", Role::SuperAdmin)),
            (
                "owner-token".to_string(),
                Principal::tenant("bob", Role::Owner, TenantCode::parse("bob_1").unwrap()),
            ),
        ])
    }

    #[test]
    fn resolves_configured_tokens() {
        let resolver = resolver();
        assert_eq!(resolver.len(), 2);
        let root = resolver.resolve(Some("Bearer root-token")).unwrap();
        assert_eq!(root.role, Role::SuperAdmin);
        let owner = resolver.resolve(Some("bearer   owner-token ")).unwrap();
        assert_eq!(owner.tenant_code.unwrap().as_str(), "bob_1");
    }

    #[test]
    fn rejects_missing_malformed_and_unknown_tokens() {
        let resolver = resolver();
        for header in [None, Some("Basic abc"), Some("Bearer"), Some("Bearer other-token")] {
            assert!(matches!(resolver.resolve(header), Err(AuthError::Unauthenticated(_))));
        }
        let oversized = format!("Bearer {}", "a".repeat(9_000));
        assert!(resolver.resolve(Some(&oversized)).is_err());
        assert!(BearerTokenPrincipals::new([]).is_empty());
    }
}
