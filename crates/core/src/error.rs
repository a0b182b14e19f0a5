//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Every failure is scoped to the single operation that produced it and carries
/// enough context for the caller to correct the input and resubmit.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A required field is missing or malformed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A name collides with an existing entity in the same namespace.
    #[error("duplicate name: {0}")]
    DuplicateName(String),

    /// The (normalized) email is already registered.
    #[error("duplicate email: {0}")]
    DuplicateEmail(String),

    /// A referenced identifier does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A referenced parent in the geographic hierarchy does not exist.
    #[error("invalid parent: {0}")]
    InvalidParent(String),

    /// The role referenced by a user does not exist.
    #[error("invalid role: {0}")]
    InvalidRole(String),

    /// Deletion is blocked by existing references.
    #[error("has dependents: {0}")]
    HasDependents(String),

    /// The requested association already exists.
    #[error("already assigned: {0}")]
    AlreadyAssigned(String),

    /// The credential does not satisfy the minimum policy.
    #[error("password must be at least {min_length} characters long")]
    WeakPassword { min_length: usize },

    /// Unclassified persistence failure.
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

/// Stable, wire-friendly classification of a [`DomainError`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    DuplicateName,
    DuplicateEmail,
    NotFound,
    InvalidParent,
    InvalidRole,
    HasDependents,
    AlreadyAssigned,
    WeakPassword,
    StorageFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::DuplicateName => "duplicate_name",
            ErrorKind::DuplicateEmail => "duplicate_email",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidParent => "invalid_parent",
            ErrorKind::InvalidRole => "invalid_role",
            ErrorKind::HasDependents => "has_dependents",
            ErrorKind::AlreadyAssigned => "already_assigned",
            ErrorKind::WeakPassword => "weak_password",
            ErrorKind::StorageFailure => "storage_failure",
        }
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn duplicate_name(msg: impl Into<String>) -> Self {
        Self::DuplicateName(msg.into())
    }

    pub fn duplicate_email(email: impl Into<String>) -> Self {
        Self::DuplicateEmail(email.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn invalid_parent(msg: impl Into<String>) -> Self {
        Self::InvalidParent(msg.into())
    }

    pub fn invalid_role(msg: impl Into<String>) -> Self {
        Self::InvalidRole(msg.into())
    }

    pub fn has_dependents(msg: impl Into<String>) -> Self {
        Self::HasDependents(msg.into())
    }

    pub fn already_assigned(msg: impl Into<String>) -> Self {
        Self::AlreadyAssigned(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::StorageFailure(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::Validation(_) => ErrorKind::Validation,
            DomainError::DuplicateName(_) => ErrorKind::DuplicateName,
            DomainError::DuplicateEmail(_) => ErrorKind::DuplicateEmail,
            DomainError::NotFound(_) => ErrorKind::NotFound,
            DomainError::InvalidParent(_) => ErrorKind::InvalidParent,
            DomainError::InvalidRole(_) => ErrorKind::InvalidRole,
            DomainError::HasDependents(_) => ErrorKind::HasDependents,
            DomainError::AlreadyAssigned(_) => ErrorKind::AlreadyAssigned,
            DomainError::WeakPassword { .. } => ErrorKind::WeakPassword,
            DomainError::StorageFailure(_) => ErrorKind::StorageFailure,
        }
    }
}
