//! Credential hashing
//!
//! Passwords are stored as Argon2id PHC strings
//! (`$argon2id$v=19$m=...,t=...,p=...$<salt>$<hash>`), so the salt and
//! parameters travel with the hash.

use crate::{Error, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// Hash a password with a fresh random salt
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| Error::Internal(format!("Password hashing failed: {}", e)))
}

/// Check a password against a stored PHC string
///
/// A stored value that does not parse never verifies.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_then_verify() {
        let stored = hash_password("crossing-safely").unwrap();
        assert!(verify_password("crossing-safely", &stored));
        assert!(!verify_password("crossing-safely!", &stored));
    }

    #[test]
    fn test_same_password_gets_different_salts() {
        let a = hash_password("pw").unwrap();
        let b = hash_password("pw").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("pw", &a));
        assert!(verify_password("pw", &b));
    }

    #[test]
    fn test_stored_value_is_argon2id_phc() {
        let stored = hash_password("Secret1").unwrap();
        assert!(stored.starts_with("$argon2id$"));
        assert!(!stored.contains("Secret1"));
        let parsed = PasswordHash::new(&stored).unwrap();
        assert!(parsed.salt.is_some());
    }

    #[test]
    fn test_malformed_stored_value_never_verifies() {
        assert!(!verify_password("pw", "no-separator"));
        assert!(!verify_password("pw", ""));
        // Legacy salted-digest format is not accepted
        assert!(!verify_password("pw", "00ff$abcdef"));
    }
}
