//! Credential hashing boundary.
//!
//! The core never inspects a credential record; it only asks a
//! [`CredentialHasher`] to produce one from a raw password.

use geoaccess_core::DomainResult;

/// Opaque, already-hashed credential (e.g. a PHC string).
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord(String);

impl CredentialRecord {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("CredentialRecord(<redacted>)")
    }
}

/// `hash(password) -> credentialRecord`.
///
/// Checking a password against a record belongs to whatever authenticates
/// users, which is not part of this crate.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, password: &str) -> DomainResult<CredentialRecord>;
}
