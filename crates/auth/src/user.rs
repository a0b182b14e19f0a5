//! User directory model.
//!
//! A user has exactly one role and an optional home department. Emails are
//! case-insensitive: they are lowercased before any uniqueness check or write.

use chrono::{DateTime, Utc};
use serde::Serialize;

use geoaccess_core::{DepartmentId, DomainError, DomainResult, Entity, RoleId, UserId};

use crate::catalog::Role;
use crate::credentials::CredentialRecord;
use crate::grant::GrantView;
use crate::input;
use crate::scope::Ancestry;

/// Minimum accepted password length (in characters).
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub credential: CredentialRecord,
    pub role_id: RoleId,
    pub department_id: Option<DepartmentId>,
    pub created_at: DateTime<Utc>,
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }

    fn sort_name(&self) -> &str {
        &self.name
    }
}

/// Raw user fields as received from a caller.
///
/// `role_id`/`department_id` are `None` when the caller did not provide them
/// (absent, zero or non-numeric at the transport edge).
#[derive(Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role_id: Option<RoleId>,
    pub department_id: Option<DepartmentId>,
}

impl core::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NewUser")
            .field("name", &self.name)
            .field("email", &self.email)
            .field("role_id", &self.role_id)
            .field("department_id", &self.department_id)
            .finish_non_exhaustive()
    }
}

/// User fields that passed local validation; references are not checked yet.
pub struct ValidatedUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role_id: RoleId,
    pub department_id: Option<DepartmentId>,
}

impl NewUser {
    /// Check required fields, normalize the email and enforce the password policy.
    ///
    /// Does not touch storage: role/department existence and email uniqueness
    /// are checked by the directory service.
    pub fn validate(self) -> DomainResult<ValidatedUser> {
        let name = self.name.trim();
        let email = normalize_email(&self.email);

        let role_id = match self.role_id {
            Some(role_id) if !name.is_empty() && !email.is_empty() && !self.password.is_empty() => role_id,
            _ => {
                return Err(DomainError::validation(
                    "name, email, password and role are required",
                ));
            }
        };

        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(DomainError::WeakPassword {
                min_length: MIN_PASSWORD_LENGTH,
            });
        }

        Ok(ValidatedUser {
            name: input::required_name("user name", name)?,
            email,
            password: self.password,
            role_id,
            department_id: self.department_id,
        })
    }
}

/// Trim and lowercase an email address.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Everything storage needs to insert a user.
#[derive(Debug, Clone)]
pub struct UserDraft {
    pub name: String,
    pub email: String,
    pub credential: CredentialRecord,
    pub role_id: RoleId,
    pub department_id: Option<DepartmentId>,
}

/// A user with its role, home department (with ancestry) and scoped grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub department: Option<Ancestry>,
    pub grants: Vec<GrantView>,
    pub created_at: DateTime<Utc>,
}
