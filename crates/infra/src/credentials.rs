//! Argon2 credential hashing.

use argon2::{
    Argon2,
    password_hash::{PasswordHasher, SaltString, rand_core::OsRng},
};

use geoaccess_auth::{CredentialHasher, CredentialRecord};
use geoaccess_core::{DomainError, DomainResult};

/// Argon2id with a fresh random salt per hash; records are PHC strings.
#[derive(Debug, Default, Clone, Copy)]
pub struct Argon2Hasher;

impl Argon2Hasher {
    pub fn new() -> Self {
        Self
    }
}

impl CredentialHasher for Argon2Hasher {
    fn hash(&self, password: &str) -> DomainResult<CredentialRecord> {
        let salt = SaltString::generate(&mut OsRng);

        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| CredentialRecord::new(hash.to_string()))
            .map_err(|e| DomainError::storage(format!("credential hashing failed: {e}")))
    }
}
