use async_trait::async_trait;
use thiserror::Error;

use geoaccess_auth::{
    Country, Department, GrantBatchOutcome, GrantKey, Permission, PermissionRemoval, Region, Role,
    ScopedGrant, User, UserDraft,
};
use geoaccess_core::{
    CountryId, DepartmentId, DomainError, PermissionId, RegionId, RoleId, UserId,
};

/// Names of the constraints every store enforces.
///
/// The in-memory store reports the same names the Postgres schema declares, so
/// error mapping does not depend on the backend.
pub mod constraints {
    pub const COUNTRIES_NAME: &str = "uq_countries_name";
    pub const REGIONS_COUNTRY_NAME: &str = "uq_regions_country_name";
    pub const DEPARTMENTS_REGION_NAME: &str = "uq_departments_region_name";
    pub const ROLES_NAME: &str = "uq_roles_name";
    pub const PERMISSIONS_NAME: &str = "uq_permissions_name";
    pub const ROLE_PERMISSIONS_PAIR: &str = "pk_role_permissions";
    pub const USERS_EMAIL: &str = "uq_users_email";
    pub const USER_PERMISSIONS_SCOPE: &str = "uq_user_permissions_scope";

    pub const REGIONS_COUNTRY: &str = "fk_regions_country";
    pub const DEPARTMENTS_REGION: &str = "fk_departments_region";
    pub const ROLE_PERMISSIONS_ROLE: &str = "fk_role_permissions_role";
    pub const ROLE_PERMISSIONS_PERMISSION: &str = "fk_role_permissions_permission";
    pub const USERS_ROLE: &str = "fk_users_role";
    pub const USERS_DEPARTMENT: &str = "fk_users_department";
    pub const USER_PERMISSIONS_USER: &str = "fk_user_permissions_user";
    pub const USER_PERMISSIONS_PERMISSION: &str = "fk_user_permissions_permission";
    pub const USER_PERMISSIONS_COUNTRY: &str = "fk_user_permissions_country";
    pub const USER_PERMISSIONS_REGION: &str = "fk_user_permissions_region";
    pub const USER_PERMISSIONS_DEPARTMENT: &str = "fk_user_permissions_department";
}

/// Storage operation error.
///
/// These are **infrastructure errors**; services translate them into the
/// nearest [`DomainError`] kind.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("foreign key constraint violated: {constraint}")]
    ForeignKeyViolation { constraint: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn unique(constraint: &str) -> Self {
        Self::UniqueViolation {
            constraint: constraint.to_string(),
        }
    }

    pub fn foreign_key(constraint: &str) -> Self {
        Self::ForeignKeyViolation {
            constraint: constraint.to_string(),
        }
    }

    /// Name of the violated constraint, if any.
    pub fn constraint(&self) -> Option<&str> {
        match self {
            StoreError::UniqueViolation { constraint } | StoreError::ForeignKeyViolation { constraint } => {
                Some(constraint)
            }
            StoreError::Backend(_) => None,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Default translation of write-time constraint violations.
///
/// Call sites where the same constraint means something else (a foreign key
/// hit while *deleting* a role is a dependents problem, not a missing parent)
/// match on the constraint before falling back to this.
impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        use constraints::*;

        let message = err.to_string();
        match &err {
            StoreError::UniqueViolation { constraint } => match constraint.as_str() {
                COUNTRIES_NAME | REGIONS_COUNTRY_NAME | DEPARTMENTS_REGION_NAME | ROLES_NAME
                | PERMISSIONS_NAME => DomainError::duplicate_name(message),
                USERS_EMAIL => DomainError::duplicate_email(message),
                ROLE_PERMISSIONS_PAIR => DomainError::already_assigned(message),
                _ => DomainError::storage(message),
            },
            StoreError::ForeignKeyViolation { constraint } => match constraint.as_str() {
                REGIONS_COUNTRY | DEPARTMENTS_REGION | USERS_DEPARTMENT => {
                    DomainError::invalid_parent(message)
                }
                USERS_ROLE => DomainError::invalid_role(message),
                ROLE_PERMISSIONS_ROLE
                | ROLE_PERMISSIONS_PERMISSION
                | USER_PERMISSIONS_USER
                | USER_PERMISSIONS_PERMISSION
                | USER_PERMISSIONS_COUNTRY
                | USER_PERMISSIONS_REGION
                | USER_PERMISSIONS_DEPARTMENT => DomainError::not_found(message),
                _ => DomainError::storage(message),
            },
            StoreError::Backend(_) => DomainError::storage(message),
        }
    }
}

/// Country/region/department persistence.
///
/// Listings are ordered by name ascending with the id as tie-breaker.
#[async_trait]
pub trait GeographyStore: Send + Sync {
    async fn insert_country(&self, name: &str) -> StoreResult<Country>;
    async fn insert_region(&self, country_id: CountryId, name: &str) -> StoreResult<Region>;
    async fn insert_department(&self, region_id: RegionId, name: &str) -> StoreResult<Department>;

    async fn country(&self, id: CountryId) -> StoreResult<Option<Country>>;
    async fn region(&self, id: RegionId) -> StoreResult<Option<Region>>;
    async fn department(&self, id: DepartmentId) -> StoreResult<Option<Department>>;

    async fn country_by_name(&self, name: &str) -> StoreResult<Option<Country>>;
    async fn region_by_name(&self, country_id: CountryId, name: &str) -> StoreResult<Option<Region>>;
    async fn department_by_name(&self, region_id: RegionId, name: &str) -> StoreResult<Option<Department>>;

    async fn countries(&self) -> StoreResult<Vec<Country>>;
    async fn regions(&self, country_id: Option<CountryId>) -> StoreResult<Vec<Region>>;
    async fn departments(&self, region_id: Option<RegionId>) -> StoreResult<Vec<Department>>;
}

/// Role/permission persistence.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_role(&self, name: &str, description: Option<&str>) -> StoreResult<Role>;
    async fn insert_permission(&self, name: &str, description: Option<&str>) -> StoreResult<Permission>;

    async fn role(&self, id: RoleId) -> StoreResult<Option<Role>>;
    async fn permission(&self, id: PermissionId) -> StoreResult<Option<Permission>>;
    async fn role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
    async fn permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>>;

    async fn roles(&self) -> StoreResult<Vec<Role>>;
    async fn permissions(&self) -> StoreResult<Vec<Permission>>;

    /// Every `(role, permission)` association.
    async fn role_permission_pairs(&self) -> StoreResult<Vec<(RoleId, PermissionId)>>;
    /// Permissions attached to a role, ordered by permission name.
    async fn role_permissions(&self, role_id: RoleId) -> StoreResult<Vec<Permission>>;

    async fn insert_role_permission(&self, role_id: RoleId, permission_id: PermissionId) -> StoreResult<()>;
    /// Returns whether a row was removed.
    async fn remove_role_permission(&self, role_id: RoleId, permission_id: PermissionId) -> StoreResult<bool>;

    /// Fails with a foreign-key violation while anything still references the role.
    async fn delete_role(&self, id: RoleId) -> StoreResult<Option<Role>>;

    /// Atomically remove the permission's role links, its user grants and the
    /// permission itself. `None` if the permission does not exist.
    async fn delete_permission_cascade(&self, id: PermissionId) -> StoreResult<Option<PermissionRemoval>>;
}

/// User and scoped-grant persistence.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    /// Insert the user and its grants in one atomic unit.
    ///
    /// A grant that collides with an existing row is skipped, not an error; a
    /// failure inserting the user writes nothing.
    async fn insert_user_with_grants(
        &self,
        draft: UserDraft,
        grants: &[GrantKey],
    ) -> StoreResult<(User, GrantBatchOutcome)>;

    /// Skip-on-conflict batch insert for an existing user.
    async fn insert_grants(&self, user_id: UserId, grants: &[GrantKey]) -> StoreResult<GrantBatchOutcome>;

    /// Returns whether a row was removed.
    async fn remove_grant(&self, user_id: UserId, key: &GrantKey) -> StoreResult<bool>;

    async fn user(&self, id: UserId) -> StoreResult<Option<User>>;
    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    /// Ordered by name ascending.
    async fn users(&self) -> StoreResult<Vec<User>>;

    /// Grants of one user, or of everyone when `user_id` is `None`.
    async fn grants(&self, user_id: Option<UserId>) -> StoreResult<Vec<ScopedGrant>>;

    /// Delete the user and, by cascade, all its grants.
    async fn delete_user(&self, id: UserId) -> StoreResult<Option<User>>;
}

/// The full storage engine consumed by the services.
pub trait AccessStore: GeographyStore + CatalogStore + DirectoryStore {}

impl<T> AccessStore for T where T: GeographyStore + CatalogStore + DirectoryStore + ?Sized {}

#[cfg(test)]
mod tests {
    use super::constraints::*;
    use super::*;
    use geoaccess_core::ErrorKind;

    #[test]
    fn unique_violations_map_to_conflict_kinds() {
        let cases = [
            (COUNTRIES_NAME, ErrorKind::DuplicateName),
            (REGIONS_COUNTRY_NAME, ErrorKind::DuplicateName),
            (DEPARTMENTS_REGION_NAME, ErrorKind::DuplicateName),
            (ROLES_NAME, ErrorKind::DuplicateName),
            (PERMISSIONS_NAME, ErrorKind::DuplicateName),
            (USERS_EMAIL, ErrorKind::DuplicateEmail),
            (ROLE_PERMISSIONS_PAIR, ErrorKind::AlreadyAssigned),
            ("uq_something_else", ErrorKind::StorageFailure),
        ];
        for (constraint, kind) in cases {
            let err: DomainError = StoreError::unique(constraint).into();
            assert_eq!(err.kind(), kind, "{constraint}");
        }
    }

    #[test]
    fn foreign_key_violations_map_to_reference_kinds() {
        let cases = [
            (REGIONS_COUNTRY, ErrorKind::InvalidParent),
            (DEPARTMENTS_REGION, ErrorKind::InvalidParent),
            (USERS_DEPARTMENT, ErrorKind::InvalidParent),
            (USERS_ROLE, ErrorKind::InvalidRole),
            (ROLE_PERMISSIONS_ROLE, ErrorKind::NotFound),
            (ROLE_PERMISSIONS_PERMISSION, ErrorKind::NotFound),
            (USER_PERMISSIONS_USER, ErrorKind::NotFound),
            (USER_PERMISSIONS_PERMISSION, ErrorKind::NotFound),
            (USER_PERMISSIONS_COUNTRY, ErrorKind::NotFound),
            (USER_PERMISSIONS_REGION, ErrorKind::NotFound),
            (USER_PERMISSIONS_DEPARTMENT, ErrorKind::NotFound),
            ("fk_something_else", ErrorKind::StorageFailure),
        ];
        for (constraint, kind) in cases {
            let err: DomainError = StoreError::foreign_key(constraint).into();
            assert_eq!(err.kind(), kind, "{constraint}");
        }
    }

    #[test]
    fn backend_errors_are_storage_failures() {
        let err: DomainError = StoreError::Backend("connection reset".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
        assert!(err.to_string().contains("connection reset"));
    }
}
