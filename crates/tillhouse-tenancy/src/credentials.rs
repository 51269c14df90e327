// crates/tillhouse-tenancy/src/credentials.rs
// ============================================================================
// Module: Owner Credentials
// Description: Argon2id password hashing and verification.
// Purpose: Keep plaintext passwords out of every store.
// Dependencies: argon2, rand
// ============================================================================

//! Hashes are PHC strings (`$argon2id$...`) with a random 16-byte salt, so
//! the same hash can be stored in the registry and mirrored into a tenant file.

use argon2::Argon2;
use argon2::PasswordHash;
use argon2::PasswordHasher;
use argon2::PasswordVerifier;
use argon2::password_hash::SaltString;
use rand::RngCore;

use crate::error::TenancyError;

/// Salt length in bytes.
const SALT_LENGTH: usize = 16;

/// Hashes a password with Argon2id.
///
/// # Errors
///
/// Returns [`TenancyError::Invalid`] for an empty password and
/// [`TenancyError::Credential`] when hashing fails.
pub fn hash_password(password: &str) -> Result<String, TenancyError> {
    if password.is_empty() {
        return Err(TenancyError::Invalid("password must not be empty".to_string()));
    }
    let mut salt_bytes = [0_u8; SALT_LENGTH];
    rand::thread_rng().fill_bytes(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|err| TenancyError::Credential(format!("salt encoding failed: {err}")))?;
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| TenancyError::Credential(format!("password hashing failed: {err}")))
}

/// Returns true when `password` matches the PHC `hash`.
///
/// # Errors
///
/// Returns [`TenancyError::Credential`] when the stored hash is malformed.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, TenancyError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|err| TenancyError::Credential(format!("stored hash is malformed: {err}")))?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(TenancyError::Credential(format!("password verification failed: {err}"))),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions are permitted.")]

    use super::hash_password;
    use super::verify_password;

    #[test]
    fn hash_verifies_only_the_original_password() {
        let hash = hash_password("bob123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("bob123"));
        assert!(verify_password("bob123", &hash).unwrap());
        assert!(!verify_password("bob124", &hash).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn malformed_hash_and_empty_password_are_rejected() {
        assert!(verify_password("x", "plaintext").is_err());
        assert!(hash_password("").is_err());
    }
}
