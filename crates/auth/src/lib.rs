//! `geoaccess-auth`: scoped-authorization domain model.
//!
//! Roles, permissions, users and the geographic hierarchy that narrows where a
//! permission grant applies. This crate is intentionally decoupled from HTTP and
//! storage.

pub mod catalog;
pub mod credentials;
pub mod geography;
pub mod grant;
pub mod input;
pub mod scope;
pub mod user;

pub use catalog::{Permission, PermissionRemoval, PermissionWithRoles, Role, RoleWithPermissions};
pub use credentials::{CredentialHasher, CredentialRecord};
pub use geography::{Country, CountryTree, Department, DepartmentListing, Region, RegionListing, RegionTree};
pub use grant::{GrantBatchOutcome, GrantRequest, GrantView, ScopedGrant, collapse_duplicates};
pub use scope::{Ancestry, GrantKey, Scope, ScopeLevel, ScopeRef};
pub use user::{MIN_PASSWORD_LENGTH, NewUser, User, UserDraft, UserProfile, ValidatedUser, normalize_email};
