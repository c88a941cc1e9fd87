//! Password hashing with Argon2id

use argon2::password_hash::{rand_core::OsRng, SaltString};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Password hashing failed")]
    Hash,
}

/// Hash a plaintext password with a fresh random salt.
pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| PasswordError::Hash)
}

/// Verify a plaintext password against a stored hash. Unparseable hashes
/// verify as false.
pub fn verify_password(hash: &str, plain: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("Secret123!").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password(&hash, "Secret123!"));
        assert!(!verify_password(&hash, "wrong-password"));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("Secret123!").unwrap();
        let b = hash_password("Secret123!").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn garbage_hash_verifies_false() {
        assert!(!verify_password("not-a-hash", "Secret123!"));
    }
}
