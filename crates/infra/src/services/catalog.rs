//! Role/permission catalog.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument};

use geoaccess_auth::{
    Permission, PermissionRemoval, PermissionWithRoles, Role, RoleWithPermissions, input,
};
use geoaccess_core::entity::sort_by_name;
use geoaccess_core::{DomainError, DomainResult, PermissionId, RoleId};

use crate::store::{CatalogStore, StoreError, constraints};

pub struct CatalogService<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for CatalogService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> CatalogService<S>
where
    S: CatalogStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, description), err)]
    pub async fn create_role(&self, name: &str, description: Option<&str>) -> DomainResult<Role> {
        let name = input::required_name("role name", name)?;
        let description = input::optional_description(description);

        if self.store.role_by_name(&name).await?.is_some() {
            return Err(DomainError::duplicate_name(format!("role '{name}' already exists")));
        }

        let role = self.store.insert_role(&name, description.as_deref()).await?;
        info!(role_id = %role.id, "role created");
        Ok(role)
    }

    #[instrument(skip(self, description), err)]
    pub async fn create_permission(&self, name: &str, description: Option<&str>) -> DomainResult<Permission> {
        let name = input::required_name("permission name", name)?;
        let description = input::optional_description(description);

        if self.store.permission_by_name(&name).await?.is_some() {
            return Err(DomainError::duplicate_name(format!("permission '{name}' already exists")));
        }

        let permission = self.store.insert_permission(&name, description.as_deref()).await?;
        info!(permission_id = %permission.id, "permission created");
        Ok(permission)
    }

    /// Delete a role that has no permissions attached.
    ///
    /// A role still held by users is refused as well: the user's role is a
    /// required reference.
    #[instrument(skip(self), fields(role_id = %role_id), err)]
    pub async fn delete_role(&self, role_id: RoleId) -> DomainResult<Role> {
        let role = self
            .store
            .role(role_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("role {role_id} does not exist")))?;

        let attached = self.store.role_permissions(role_id).await?;
        if !attached.is_empty() {
            return Err(detach_first(&role, attached.len()));
        }

        match self.store.delete_role(role_id).await {
            Ok(Some(removed)) => {
                info!("role deleted");
                Ok(removed)
            }
            Ok(None) => Err(DomainError::not_found(format!("role {role_id} does not exist"))),
            Err(StoreError::ForeignKeyViolation { constraint }) if constraint == constraints::USERS_ROLE => {
                Err(DomainError::has_dependents(format!(
                    "role '{}' is still assigned to users; reassign them before deleting it",
                    role.name
                )))
            }
            Err(StoreError::ForeignKeyViolation { constraint })
                if constraint == constraints::ROLE_PERMISSIONS_ROLE =>
            {
                Err(detach_first(&role, 1))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Remove a permission together with every role link and user grant that
    /// references it, atomically.
    #[instrument(skip(self), fields(permission_id = %permission_id), err)]
    pub async fn delete_permission(&self, permission_id: PermissionId) -> DomainResult<PermissionRemoval> {
        let removal = self
            .store
            .delete_permission_cascade(permission_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("permission {permission_id} does not exist")))?;

        info!(
            role_links_removed = removal.role_links_removed,
            user_grants_removed = removal.user_grants_removed,
            "permission deleted"
        );
        Ok(removal)
    }

    #[instrument(skip(self), fields(role_id = %role_id, permission_id = %permission_id), err)]
    pub async fn assign_permission_to_role(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> DomainResult<RoleWithPermissions> {
        let role = self
            .store
            .role(role_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("role {role_id} does not exist")))?;
        if self.store.permission(permission_id).await?.is_none() {
            return Err(DomainError::not_found(format!("permission {permission_id} does not exist")));
        }

        let current = self.store.role_permissions(role_id).await?;
        if current.iter().any(|p| p.id == permission_id) {
            return Err(already_assigned(role_id, permission_id));
        }

        match self.store.insert_role_permission(role_id, permission_id).await {
            Ok(()) => {}
            Err(StoreError::UniqueViolation { .. }) => return Err(already_assigned(role_id, permission_id)),
            Err(err) => return Err(err.into()),
        }
        info!("permission assigned to role");

        let permissions = self.store.role_permissions(role_id).await?;
        Ok(RoleWithPermissions { role, permissions })
    }

    #[instrument(skip(self), fields(role_id = %role_id, permission_id = %permission_id), err)]
    pub async fn revoke_permission_from_role(
        &self,
        role_id: RoleId,
        permission_id: PermissionId,
    ) -> DomainResult<RoleWithPermissions> {
        let role = self
            .store
            .role(role_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("role {role_id} does not exist")))?;

        if !self.store.remove_role_permission(role_id, permission_id).await? {
            return Err(DomainError::not_found(format!(
                "permission {permission_id} is not assigned to role {role_id}"
            )));
        }
        info!("permission removed from role");

        let permissions = self.store.role_permissions(role_id).await?;
        Ok(RoleWithPermissions { role, permissions })
    }

    /// Roles by name, each with its permissions by name.
    #[instrument(skip(self), err)]
    pub async fn list_roles(&self) -> DomainResult<Vec<RoleWithPermissions>> {
        let roles = self.store.roles().await?;
        let permissions = by_id(self.store.permissions().await?, |p| p.id);

        let mut attached: BTreeMap<RoleId, Vec<Permission>> = BTreeMap::new();
        for (role_id, permission_id) in self.store.role_permission_pairs().await? {
            if let Some(permission) = permissions.get(&permission_id) {
                attached.entry(role_id).or_default().push(permission.clone());
            }
        }

        Ok(roles
            .into_iter()
            .map(|role| {
                let mut permissions = attached.remove(&role.id).unwrap_or_default();
                sort_by_name(&mut permissions);
                RoleWithPermissions { role, permissions }
            })
            .collect())
    }

    /// Permissions by name, each with the roles it is attached to by name.
    #[instrument(skip(self), err)]
    pub async fn list_permissions(&self) -> DomainResult<Vec<PermissionWithRoles>> {
        let permissions = self.store.permissions().await?;
        let roles = by_id(self.store.roles().await?, |r| r.id);

        let mut holders: BTreeMap<PermissionId, Vec<Role>> = BTreeMap::new();
        for (role_id, permission_id) in self.store.role_permission_pairs().await? {
            if let Some(role) = roles.get(&role_id) {
                holders.entry(permission_id).or_default().push(role.clone());
            }
        }

        Ok(permissions
            .into_iter()
            .map(|permission| {
                let mut roles = holders.remove(&permission.id).unwrap_or_default();
                sort_by_name(&mut roles);
                PermissionWithRoles { permission, roles }
            })
            .collect())
    }
}

fn by_id<K: Ord, V>(items: Vec<V>, key: impl Fn(&V) -> K) -> BTreeMap<K, V> {
    items.into_iter().map(|v| (key(&v), v)).collect()
}

fn detach_first(role: &Role, attached: usize) -> DomainError {
    DomainError::has_dependents(format!(
        "role '{}' still has {attached} permission(s) attached; detach its permissions first",
        role.name
    ))
}

fn already_assigned(role_id: RoleId, permission_id: PermissionId) -> DomainError {
    DomainError::already_assigned(format!(
        "permission {permission_id} is already assigned to role {role_id}"
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryStore, StoreResult};
    use async_trait::async_trait;

    fn service() -> CatalogService<InMemoryStore> {
        CatalogService::new(Arc::new(InMemoryStore::new()))
    }

    /// In-memory catalog whose writes fail the way a concurrent writer would
    /// make them fail after the service's own checks passed.
    #[derive(Default)]
    struct RacingCatalog {
        inner: InMemoryStore,
        permission_insert: Option<StoreError>,
        link_insert: Option<StoreError>,
        role_delete: Option<StoreError>,
    }

    fn fail_with(injected: &Option<StoreError>) -> StoreResult<()> {
        match injected {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    #[async_trait]
    impl CatalogStore for RacingCatalog {
        async fn insert_role(&self, name: &str, description: Option<&str>) -> StoreResult<Role> {
            self.inner.insert_role(name, description).await
        }

        async fn insert_permission(&self, name: &str, description: Option<&str>) -> StoreResult<Permission> {
            fail_with(&self.permission_insert)?;
            self.inner.insert_permission(name, description).await
        }

        async fn role(&self, id: RoleId) -> StoreResult<Option<Role>> {
            self.inner.role(id).await
        }

        async fn permission(&self, id: PermissionId) -> StoreResult<Option<Permission>> {
            self.inner.permission(id).await
        }

        async fn role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
            self.inner.role_by_name(name).await
        }

        async fn permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>> {
            self.inner.permission_by_name(name).await
        }

        async fn roles(&self) -> StoreResult<Vec<Role>> {
            self.inner.roles().await
        }

        async fn permissions(&self) -> StoreResult<Vec<Permission>> {
            self.inner.permissions().await
        }

        async fn role_permission_pairs(&self) -> StoreResult<Vec<(RoleId, PermissionId)>> {
            self.inner.role_permission_pairs().await
        }

        async fn role_permissions(&self, role_id: RoleId) -> StoreResult<Vec<Permission>> {
            self.inner.role_permissions(role_id).await
        }

        async fn insert_role_permission(&self, role_id: RoleId, permission_id: PermissionId) -> StoreResult<()> {
            fail_with(&self.link_insert)?;
            self.inner.insert_role_permission(role_id, permission_id).await
        }

        async fn remove_role_permission(&self, role_id: RoleId, permission_id: PermissionId) -> StoreResult<bool> {
            self.inner.remove_role_permission(role_id, permission_id).await
        }

        async fn delete_role(&self, id: RoleId) -> StoreResult<Option<Role>> {
            fail_with(&self.role_delete)?;
            self.inner.delete_role(id).await
        }

        async fn delete_permission_cascade(&self, id: PermissionId) -> StoreResult<Option<PermissionRemoval>> {
            self.inner.delete_permission_cascade(id).await
        }
    }

    fn racing(store: RacingCatalog) -> CatalogService<RacingCatalog> {
        CatalogService::new(Arc::new(store))
    }

    #[tokio::test]
    async fn write_time_name_collision_is_duplicate_name() {
        let catalog = racing(RacingCatalog {
            permission_insert: Some(StoreError::unique(constraints::PERMISSIONS_NAME)),
            ..Default::default()
        });
        let err = catalog.create_permission("read", None).await.unwrap_err();
        assert!(matches!(err, DomainError::DuplicateName(_)), "{err:?}");
    }

    #[tokio::test]
    async fn write_time_pair_collision_is_already_assigned() {
        let catalog = racing(RacingCatalog {
            link_insert: Some(StoreError::unique(constraints::ROLE_PERMISSIONS_PAIR)),
            ..Default::default()
        });
        let role = catalog.create_role("admin", None).await.unwrap();
        let read = catalog.create_permission("read", None).await.unwrap();

        let err = catalog.assign_permission_to_role(role.id, read.id).await.unwrap_err();
        assert!(matches!(err, DomainError::AlreadyAssigned(_)), "{err:?}");
    }

    #[tokio::test]
    async fn role_held_by_users_at_delete_time_has_dependents() {
        let catalog = racing(RacingCatalog {
            role_delete: Some(StoreError::foreign_key(constraints::USERS_ROLE)),
            ..Default::default()
        });
        let role = catalog.create_role("operador", None).await.unwrap();

        match catalog.delete_role(role.id).await.unwrap_err() {
            DomainError::HasDependents(message) => assert!(message.contains("reassign")),
            other => panic!("expected HasDependents, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn storage_failure_at_write_time_is_storage_failure() {
        let catalog = racing(RacingCatalog {
            permission_insert: Some(StoreError::Backend("connection reset".to_string())),
            ..Default::default()
        });
        let err = catalog.create_permission("read", None).await.unwrap_err();
        assert!(matches!(err, DomainError::StorageFailure(_)), "{err:?}");
    }

    #[tokio::test]
    async fn description_is_trimmed_and_blank_means_absent() {
        let catalog = service();
        let role = catalog.create_role(" admin ", Some("  ")).await.unwrap();
        assert_eq!(role.name, "admin");
        assert_eq!(role.description, None);

        let permission = catalog
            .create_permission("read", Some(" Lectura general "))
            .await
            .unwrap();
        assert_eq!(permission.description.as_deref(), Some("Lectura general"));
    }

    #[tokio::test]
    async fn duplicate_permission_name_is_duplicate_name() {
        let catalog = service();
        catalog.create_permission("read", None).await.unwrap();
        let err = catalog.create_permission("read", None).await.unwrap_err();
        assert!(matches!(err, DomainError::DuplicateName(_)));
    }

    #[tokio::test]
    async fn role_with_permissions_cannot_be_deleted_until_detached() {
        let catalog = service();
        let role = catalog.create_role("admin", None).await.unwrap();
        let permission = catalog.create_permission("read", None).await.unwrap();
        catalog.assign_permission_to_role(role.id, permission.id).await.unwrap();

        let err = catalog.delete_role(role.id).await.unwrap_err();
        match err {
            DomainError::HasDependents(message) => assert!(message.contains("detach its permissions first")),
            other => panic!("expected HasDependents, got {other:?}"),
        }

        let detached = catalog
            .revoke_permission_from_role(role.id, permission.id)
            .await
            .unwrap();
        assert!(detached.permissions.is_empty());

        let removed = catalog.delete_role(role.id).await.unwrap();
        assert_eq!(removed.id, role.id);
        assert!(catalog.list_roles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_unknown_ids_is_not_found() {
        let catalog = service();
        assert!(matches!(
            catalog.delete_role(RoleId::from_db(3)).await,
            Err(DomainError::NotFound(_))
        ));
        assert!(matches!(
            catalog.delete_permission(PermissionId::from_db(3)).await,
            Err(DomainError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn assignment_reloads_permissions_by_name() {
        let catalog = service();
        let role = catalog.create_role("admin", None).await.unwrap();
        let write = catalog.create_permission("write", None).await.unwrap();
        let read = catalog.create_permission("read", None).await.unwrap();

        catalog.assign_permission_to_role(role.id, write.id).await.unwrap();
        let loaded = catalog.assign_permission_to_role(role.id, read.id).await.unwrap();

        let names: Vec<_> = loaded.permissions.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["read", "write"]);
    }

    #[tokio::test]
    async fn assignment_with_unknown_ids_is_not_found() {
        let catalog = service();
        let role = catalog.create_role("admin", None).await.unwrap();
        let err = catalog
            .assign_permission_to_role(role.id, PermissionId::from_db(9))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn listings_carry_reverse_relations() {
        let catalog = service();
        let viewer = catalog.create_role("viewer", None).await.unwrap();
        let admin = catalog.create_role("admin", None).await.unwrap();
        let read = catalog.create_permission("read", None).await.unwrap();
        catalog.create_permission("audit", None).await.unwrap();
        catalog.assign_permission_to_role(viewer.id, read.id).await.unwrap();
        catalog.assign_permission_to_role(admin.id, read.id).await.unwrap();

        let roles = catalog.list_roles().await.unwrap();
        assert_eq!(roles[0].role.name, "admin");
        assert_eq!(roles[0].permissions, vec![read.clone()]);

        let permissions = catalog.list_permissions().await.unwrap();
        assert_eq!(permissions[0].permission.name, "audit");
        assert!(permissions[0].roles.is_empty());
        let holders: Vec<_> = permissions[1].roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(holders, ["admin", "viewer"]);
    }

    #[tokio::test]
    async fn listing_and_assignment_agree_on_mixed_case_order() {
        let catalog = service();
        let role = catalog.create_role("admin", None).await.unwrap();
        let zeta = catalog.create_permission("Zeta", None).await.unwrap();
        let alpha = catalog.create_permission("alpha", None).await.unwrap();

        catalog.assign_permission_to_role(role.id, alpha.id).await.unwrap();
        let assigned = catalog.assign_permission_to_role(role.id, zeta.id).await.unwrap();
        let listed = catalog.list_roles().await.unwrap();

        let names: Vec<_> = assigned.permissions.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["Zeta", "alpha"]);
        assert_eq!(listed[0].permissions, assigned.permissions);
    }
}
