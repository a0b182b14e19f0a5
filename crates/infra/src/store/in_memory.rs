use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::Utc;

use geoaccess_auth::{
    Country, Department, GrantBatchOutcome, GrantKey, Permission, PermissionRemoval, Region, Role,
    ScopedGrant, User, UserDraft,
};
use geoaccess_core::entity::sort_by_name;
use geoaccess_core::{CountryId, DepartmentId, Entity, PermissionId, RegionId, RoleId, UserId};

use super::r#trait::{
    CatalogStore, DirectoryStore, GeographyStore, StoreError, StoreResult, constraints,
};

/// Per-table id sequences (first id handed out is 1).
#[derive(Debug, Default)]
struct Sequences {
    country: i64,
    region: i64,
    department: i64,
    role: i64,
    permission: i64,
    user: i64,
}

impl Sequences {
    fn next(counter: &mut i64) -> i64 {
        *counter += 1;
        *counter
    }
}

#[derive(Debug, Default)]
struct Tables {
    seq: Sequences,
    countries: BTreeMap<CountryId, Country>,
    regions: BTreeMap<RegionId, Region>,
    departments: BTreeMap<DepartmentId, Department>,
    roles: BTreeMap<RoleId, Role>,
    permissions: BTreeMap<PermissionId, Permission>,
    role_permissions: BTreeSet<(RoleId, PermissionId)>,
    users: BTreeMap<UserId, User>,
    /// Keyed by the canonical grant key, which is what makes the uniqueness
    /// constraint hold structurally.
    grants: BTreeMap<(UserId, GrantKey), ScopedGrant>,
}

impl Tables {
    /// Check every foreign key of a grant row.
    fn check_grant_references(&self, user_id: UserId, key: &GrantKey) -> StoreResult<()> {
        if !self.users.contains_key(&user_id) {
            return Err(StoreError::foreign_key(constraints::USER_PERMISSIONS_USER));
        }
        if !self.permissions.contains_key(&key.permission_id) {
            return Err(StoreError::foreign_key(constraints::USER_PERMISSIONS_PERMISSION));
        }
        if key.scope.country_id.is_some_and(|id| !self.countries.contains_key(&id)) {
            return Err(StoreError::foreign_key(constraints::USER_PERMISSIONS_COUNTRY));
        }
        if key.scope.region_id.is_some_and(|id| !self.regions.contains_key(&id)) {
            return Err(StoreError::foreign_key(constraints::USER_PERMISSIONS_REGION));
        }
        if key.scope.department_id.is_some_and(|id| !self.departments.contains_key(&id)) {
            return Err(StoreError::foreign_key(constraints::USER_PERMISSIONS_DEPARTMENT));
        }
        Ok(())
    }

    /// Skip-on-conflict insert. All references are checked before the first
    /// row is written so a rejected batch leaves no trace.
    fn insert_grant_rows(&mut self, user_id: UserId, grants: &[GrantKey]) -> StoreResult<GrantBatchOutcome> {
        for key in grants {
            self.check_grant_references(user_id, key)?;
        }

        let now = Utc::now();
        let mut outcome = GrantBatchOutcome::default();
        for key in grants {
            let slot = (user_id, *key);
            if self.grants.contains_key(&slot) {
                outcome.skipped.push(*key);
                continue;
            }
            self.grants.insert(
                slot,
                ScopedGrant {
                    user_id,
                    permission_id: key.permission_id,
                    scope: key.scope,
                    granted_at: now,
                },
            );
            outcome.inserted.push(*key);
        }
        Ok(outcome)
    }
}

fn sorted<'a, E>(rows: impl Iterator<Item = &'a E>) -> Vec<E>
where
    E: Entity + Clone + 'a,
{
    let mut out: Vec<E> = rows.cloned().collect();
    sort_by_name(&mut out);
    out
}

/// In-memory storage engine.
///
/// Intended for tests/dev. A single lock guards every table and each trait
/// method holds it for its whole duration, so multi-row operations are atomic
/// exactly like a database transaction.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| StoreError::Backend("lock poisoned".to_string()))
    }
}

#[async_trait]
impl GeographyStore for InMemoryStore {
    async fn insert_country(&self, name: &str) -> StoreResult<Country> {
        let mut t = self.write()?;
        if t.countries.values().any(|c| c.name == name) {
            return Err(StoreError::unique(constraints::COUNTRIES_NAME));
        }
        let country = Country {
            id: CountryId::from_db(Sequences::next(&mut t.seq.country)),
            name: name.to_string(),
        };
        t.countries.insert(country.id, country.clone());
        Ok(country)
    }

    async fn insert_region(&self, country_id: CountryId, name: &str) -> StoreResult<Region> {
        let mut t = self.write()?;
        if !t.countries.contains_key(&country_id) {
            return Err(StoreError::foreign_key(constraints::REGIONS_COUNTRY));
        }
        if t.regions.values().any(|r| r.country_id == country_id && r.name == name) {
            return Err(StoreError::unique(constraints::REGIONS_COUNTRY_NAME));
        }
        let region = Region {
            id: RegionId::from_db(Sequences::next(&mut t.seq.region)),
            country_id,
            name: name.to_string(),
        };
        t.regions.insert(region.id, region.clone());
        Ok(region)
    }

    async fn insert_department(&self, region_id: RegionId, name: &str) -> StoreResult<Department> {
        let mut t = self.write()?;
        if !t.regions.contains_key(&region_id) {
            return Err(StoreError::foreign_key(constraints::DEPARTMENTS_REGION));
        }
        if t.departments.values().any(|d| d.region_id == region_id && d.name == name) {
            return Err(StoreError::unique(constraints::DEPARTMENTS_REGION_NAME));
        }
        let department = Department {
            id: DepartmentId::from_db(Sequences::next(&mut t.seq.department)),
            region_id,
            name: name.to_string(),
        };
        t.departments.insert(department.id, department.clone());
        Ok(department)
    }

    async fn country(&self, id: CountryId) -> StoreResult<Option<Country>> {
        Ok(self.read()?.countries.get(&id).cloned())
    }

    async fn region(&self, id: RegionId) -> StoreResult<Option<Region>> {
        Ok(self.read()?.regions.get(&id).cloned())
    }

    async fn department(&self, id: DepartmentId) -> StoreResult<Option<Department>> {
        Ok(self.read()?.departments.get(&id).cloned())
    }

    async fn country_by_name(&self, name: &str) -> StoreResult<Option<Country>> {
        Ok(self.read()?.countries.values().find(|c| c.name == name).cloned())
    }

    async fn region_by_name(&self, country_id: CountryId, name: &str) -> StoreResult<Option<Region>> {
        Ok(self
            .read()?
            .regions
            .values()
            .find(|r| r.country_id == country_id && r.name == name)
            .cloned())
    }

    async fn department_by_name(&self, region_id: RegionId, name: &str) -> StoreResult<Option<Department>> {
        Ok(self
            .read()?
            .departments
            .values()
            .find(|d| d.region_id == region_id && d.name == name)
            .cloned())
    }

    async fn countries(&self) -> StoreResult<Vec<Country>> {
        Ok(sorted(self.read()?.countries.values()))
    }

    async fn regions(&self, country_id: Option<CountryId>) -> StoreResult<Vec<Region>> {
        let t = self.read()?;
        Ok(sorted(
            t.regions
                .values()
                .filter(|r| country_id.is_none_or(|c| r.country_id == c)),
        ))
    }

    async fn departments(&self, region_id: Option<RegionId>) -> StoreResult<Vec<Department>> {
        let t = self.read()?;
        Ok(sorted(
            t.departments
                .values()
                .filter(|d| region_id.is_none_or(|r| d.region_id == r)),
        ))
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn insert_role(&self, name: &str, description: Option<&str>) -> StoreResult<Role> {
        let mut t = self.write()?;
        if t.roles.values().any(|r| r.name == name) {
            return Err(StoreError::unique(constraints::ROLES_NAME));
        }
        let role = Role {
            id: RoleId::from_db(Sequences::next(&mut t.seq.role)),
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        t.roles.insert(role.id, role.clone());
        Ok(role)
    }

    async fn insert_permission(&self, name: &str, description: Option<&str>) -> StoreResult<Permission> {
        let mut t = self.write()?;
        if t.permissions.values().any(|p| p.name == name) {
            return Err(StoreError::unique(constraints::PERMISSIONS_NAME));
        }
        let permission = Permission {
            id: PermissionId::from_db(Sequences::next(&mut t.seq.permission)),
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        t.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    async fn role(&self, id: RoleId) -> StoreResult<Option<Role>> {
        Ok(self.read()?.roles.get(&id).cloned())
    }

    async fn permission(&self, id: PermissionId) -> StoreResult<Option<Permission>> {
        Ok(self.read()?.permissions.get(&id).cloned())
    }

    async fn role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        Ok(self.read()?.roles.values().find(|r| r.name == name).cloned())
    }

    async fn permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>> {
        Ok(self.read()?.permissions.values().find(|p| p.name == name).cloned())
    }

    async fn roles(&self) -> StoreResult<Vec<Role>> {
        Ok(sorted(self.read()?.roles.values()))
    }

    async fn permissions(&self) -> StoreResult<Vec<Permission>> {
        Ok(sorted(self.read()?.permissions.values()))
    }

    async fn role_permission_pairs(&self) -> StoreResult<Vec<(RoleId, PermissionId)>> {
        Ok(self.read()?.role_permissions.iter().copied().collect())
    }

    async fn role_permissions(&self, role_id: RoleId) -> StoreResult<Vec<Permission>> {
        let t = self.read()?;
        Ok(sorted(
            t.role_permissions
                .iter()
                .filter(|(r, _)| *r == role_id)
                .filter_map(|(_, p)| t.permissions.get(p)),
        ))
    }

    async fn insert_role_permission(&self, role_id: RoleId, permission_id: PermissionId) -> StoreResult<()> {
        let mut t = self.write()?;
        if !t.roles.contains_key(&role_id) {
            return Err(StoreError::foreign_key(constraints::ROLE_PERMISSIONS_ROLE));
        }
        if !t.permissions.contains_key(&permission_id) {
            return Err(StoreError::foreign_key(constraints::ROLE_PERMISSIONS_PERMISSION));
        }
        if !t.role_permissions.insert((role_id, permission_id)) {
            return Err(StoreError::unique(constraints::ROLE_PERMISSIONS_PAIR));
        }
        Ok(())
    }

    async fn remove_role_permission(&self, role_id: RoleId, permission_id: PermissionId) -> StoreResult<bool> {
        Ok(self.write()?.role_permissions.remove(&(role_id, permission_id)))
    }

    async fn delete_role(&self, id: RoleId) -> StoreResult<Option<Role>> {
        let mut t = self.write()?;
        if t.role_permissions.iter().any(|(r, _)| *r == id) {
            return Err(StoreError::foreign_key(constraints::ROLE_PERMISSIONS_ROLE));
        }
        if t.users.values().any(|u| u.role_id == id) {
            return Err(StoreError::foreign_key(constraints::USERS_ROLE));
        }
        Ok(t.roles.remove(&id))
    }

    async fn delete_permission_cascade(&self, id: PermissionId) -> StoreResult<Option<PermissionRemoval>> {
        let mut t = self.write()?;
        let Some(permission) = t.permissions.get(&id).cloned() else {
            return Ok(None);
        };

        let links_before = t.role_permissions.len();
        t.role_permissions.retain(|(_, p)| *p != id);
        let role_links_removed = (links_before - t.role_permissions.len()) as u64;

        let grants_before = t.grants.len();
        t.grants.retain(|(_, key), _| key.permission_id != id);
        let user_grants_removed = (grants_before - t.grants.len()) as u64;

        t.permissions.remove(&id);

        Ok(Some(PermissionRemoval {
            permission,
            role_links_removed,
            user_grants_removed,
        }))
    }
}

#[async_trait]
impl DirectoryStore for InMemoryStore {
    async fn insert_user_with_grants(
        &self,
        draft: UserDraft,
        grants: &[GrantKey],
    ) -> StoreResult<(User, GrantBatchOutcome)> {
        let mut t = self.write()?;

        if !t.roles.contains_key(&draft.role_id) {
            return Err(StoreError::foreign_key(constraints::USERS_ROLE));
        }
        if draft.department_id.is_some_and(|d| !t.departments.contains_key(&d)) {
            return Err(StoreError::foreign_key(constraints::USERS_DEPARTMENT));
        }
        if t.users.values().any(|u| u.email == draft.email) {
            return Err(StoreError::unique(constraints::USERS_EMAIL));
        }

        let id = UserId::from_db(Sequences::next(&mut t.seq.user));
        let user = User {
            id,
            name: draft.name,
            email: draft.email,
            credential: draft.credential,
            role_id: draft.role_id,
            department_id: draft.department_id,
            created_at: Utc::now(),
        };
        t.users.insert(id, user.clone());

        match t.insert_grant_rows(id, grants) {
            Ok(outcome) => Ok((user, outcome)),
            Err(err) => {
                // Roll back the user row: the unit is all-or-nothing.
                t.users.remove(&id);
                Err(err)
            }
        }
    }

    async fn insert_grants(&self, user_id: UserId, grants: &[GrantKey]) -> StoreResult<GrantBatchOutcome> {
        self.write()?.insert_grant_rows(user_id, grants)
    }

    async fn remove_grant(&self, user_id: UserId, key: &GrantKey) -> StoreResult<bool> {
        Ok(self.write()?.grants.remove(&(user_id, *key)).is_some())
    }

    async fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(self.read()?.users.values().find(|u| u.email == email).cloned())
    }

    async fn users(&self) -> StoreResult<Vec<User>> {
        Ok(sorted(self.read()?.users.values()))
    }

    async fn grants(&self, user_id: Option<UserId>) -> StoreResult<Vec<ScopedGrant>> {
        let t = self.read()?;
        Ok(t.grants
            .iter()
            .filter(|((u, _), _)| user_id.is_none_or(|id| *u == id))
            .map(|(_, g)| g.clone())
            .collect())
    }

    async fn delete_user(&self, id: UserId) -> StoreResult<Option<User>> {
        let mut t = self.write()?;
        let removed = t.users.remove(&id);
        if removed.is_some() {
            t.grants.retain(|(u, _), _| *u != id);
        }
        Ok(removed)
    }
}
