//! # Password Credentials
//!
//! Passwords are stored as Argon2id PHC strings with a per-password random
//! salt. Verification goes through `argon2`'s `PasswordVerifier`, which
//! compares digests in constant time.
//!
//! A mismatch is a normal outcome (`Ok(false)`); only a failure of the
//! hashing function itself is an error. Callers must present both outcomes
//! identically to clients.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{
    Error as PhcError, PasswordHash as Phc, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;

use crate::error::PasswordError;

/// One-way password credential (Argon2id PHC string).
///
/// `Debug` never prints the hash.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    /// Hash a plaintext password with a fresh random salt.
    pub fn set(plaintext: &str) -> Result<Self, PasswordError> {
        let salt = SaltString::generate(&mut OsRng);
        let phc = Argon2::default()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|e| PasswordError::Hashing(e.to_string()))?;
        Ok(Self(phc.to_string()))
    }

    /// Wrap a PHC string loaded from the store.
    pub fn from_phc(phc: impl Into<String>) -> Self {
        Self(phc.into())
    }

    /// The PHC string, for persistence.
    pub fn as_phc(&self) -> &str {
        &self.0
    }

    /// Check whether `plaintext` matches this credential.
    ///
    /// Returns `Ok(false)` on a legitimate mismatch and `Err` only when the
    /// stored hash is unusable or the hash function fails.
    pub fn matches(&self, plaintext: &str) -> Result<bool, PasswordError> {
        let parsed = Phc::new(&self.0).map_err(|e| PasswordError::MalformedHash(e.to_string()))?;
        match Argon2::default().verify_password(plaintext.as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(PhcError::Password) => Ok(false),
            Err(e) => Err(PasswordError::Hashing(e.to_string())),
        }
    }
}

impl std::fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordHash([REDACTED])")
    }
}
