//! User directory.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, instrument};

use geoaccess_auth::{
    CredentialHasher, GrantView, NewUser, Permission, Role, ScopeRef, ScopedGrant, User, UserDraft,
    UserProfile, ValidatedUser,
};
use geoaccess_core::{DomainError, DomainResult, PermissionId, RoleId, UserId};

use super::resolver::{HierarchySnapshot, ScopeResolver};
use crate::store::AccessStore;

/// Creates, lists and deletes users.
///
/// User creation is split in two steps so the grant engine can slot its own
/// validation between them: [`UserDirectory::check`] runs every check that
/// needs no write, [`UserDirectory::seal`] hashes the credential.
pub struct UserDirectory<S: ?Sized> {
    store: Arc<S>,
    resolver: ScopeResolver<S>,
    hasher: Arc<dyn CredentialHasher>,
}

impl<S: ?Sized> Clone for UserDirectory<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            resolver: self.resolver.clone(),
            hasher: Arc::clone(&self.hasher),
        }
    }
}

impl<S> UserDirectory<S>
where
    S: AccessStore + ?Sized,
{
    pub fn new(store: Arc<S>, hasher: Arc<dyn CredentialHasher>) -> Self {
        Self {
            resolver: ScopeResolver::new(Arc::clone(&store)),
            store,
            hasher,
        }
    }

    /// Validate fields, then the role, the home department and the email, in
    /// that order. Nothing is written.
    pub async fn check(&self, new_user: NewUser) -> DomainResult<ValidatedUser> {
        let user = new_user.validate()?;

        if self.store.role(user.role_id).await?.is_none() {
            return Err(DomainError::invalid_role(format!("role {} does not exist", user.role_id)));
        }
        if let Some(department_id) = user.department_id {
            if self.store.department(department_id).await?.is_none() {
                return Err(DomainError::invalid_parent(format!(
                    "department {department_id} does not exist"
                )));
            }
        }
        if self.store.user_by_email(&user.email).await?.is_some() {
            return Err(DomainError::duplicate_email(format!(
                "email '{}' is already registered",
                user.email
            )));
        }

        Ok(user)
    }

    /// Hash the credential; the raw password does not outlive this call.
    pub fn seal(&self, user: ValidatedUser) -> DomainResult<UserDraft> {
        let credential = self.hasher.hash(&user.password)?;
        Ok(UserDraft {
            name: user.name,
            email: user.email,
            credential,
            role_id: user.role_id,
            department_id: user.department_id,
        })
    }

    #[instrument(skip(self, new_user), fields(role_id = ?new_user.role_id), err)]
    pub async fn create_user(&self, new_user: NewUser) -> DomainResult<UserProfile> {
        let draft = self.seal(self.check(new_user).await?)?;
        let (user, _) = self.store.insert_user_with_grants(draft, &[]).await?;
        info!(user_id = %user.id, "user created");
        self.profile(user.id).await
    }

    /// Delete a user and, by cascade, its grants. Returns the removed user.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn delete_user(&self, user_id: UserId) -> DomainResult<User> {
        let removed = self
            .store
            .delete_user(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("user {user_id} does not exist")))?;
        info!("user deleted");
        Ok(removed)
    }

    /// Every user by name with role, home department and grants.
    #[instrument(skip(self), err)]
    pub async fn list_users(&self) -> DomainResult<Vec<UserProfile>> {
        let users = self.store.users().await?;
        let grants = self.store.grants(None).await?;
        self.assemble(users, grants).await
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn profile(&self, user_id: UserId) -> DomainResult<UserProfile> {
        let user = self
            .store
            .user(user_id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("user {user_id} does not exist")))?;
        let grants = self.store.grants(Some(user_id)).await?;

        self.assemble(vec![user], grants)
            .await?
            .pop()
            .ok_or_else(|| DomainError::storage(format!("user {user_id} vanished while loading")))
    }

    /// Grant views of one user, by permission name.
    pub(crate) async fn grant_views(&self, grants: Vec<ScopedGrant>) -> DomainResult<Vec<GrantView>> {
        let permissions = self.permission_index().await?;
        let snapshot = self.resolver.snapshot().await?;
        grants
            .into_iter()
            .map(|g| grant_view(&permissions, &snapshot, g))
            .collect::<DomainResult<Vec<_>>>()
            .map(sort_views)
    }

    async fn assemble(&self, users: Vec<User>, grants: Vec<ScopedGrant>) -> DomainResult<Vec<UserProfile>> {
        let roles: BTreeMap<RoleId, Role> = self.store.roles().await?.into_iter().map(|r| (r.id, r)).collect();
        let permissions = self.permission_index().await?;
        let snapshot = self.resolver.snapshot().await?;

        let mut by_user: BTreeMap<UserId, Vec<GrantView>> = BTreeMap::new();
        for grant in grants {
            let user_id = grant.user_id;
            by_user
                .entry(user_id)
                .or_default()
                .push(grant_view(&permissions, &snapshot, grant)?);
        }

        users
            .into_iter()
            .map(|user| -> DomainResult<UserProfile> {
                let role = roles.get(&user.role_id).cloned().ok_or_else(|| {
                    DomainError::storage(format!("user {} references a missing role", user.id))
                })?;
                let department = user
                    .department_id
                    .map(|id| snapshot.resolve_ancestry(ScopeRef::Department(id)))
                    .transpose()?;
                let grants = sort_views(by_user.remove(&user.id).unwrap_or_default());

                Ok(UserProfile {
                    id: user.id,
                    name: user.name,
                    email: user.email,
                    role,
                    department,
                    grants,
                    created_at: user.created_at,
                })
            })
            .collect()
    }

    async fn permission_index(&self) -> DomainResult<BTreeMap<PermissionId, Permission>> {
        Ok(self
            .store
            .permissions()
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect())
    }
}

fn grant_view(
    permissions: &BTreeMap<PermissionId, Permission>,
    snapshot: &HierarchySnapshot,
    grant: ScopedGrant,
) -> DomainResult<GrantView> {
    let permission = permissions.get(&grant.permission_id).cloned().ok_or_else(|| {
        DomainError::storage(format!("grant references missing permission {}", grant.permission_id))
    })?;
    let ancestry = snapshot.resolve_scope(&grant.scope)?;

    Ok(GrantView {
        permission,
        scope: ancestry.scope(),
        label: ancestry.label(),
        ancestry,
        granted_at: grant.granted_at,
    })
}

/// Permission name ascending; same permission at several scopes is ordered
/// from global to most specific.
fn sort_views(mut views: Vec<GrantView>) -> Vec<GrantView> {
    views.sort_by(|a, b| {
        a.permission
            .name
            .cmp(&b.permission.name)
            .then_with(|| a.permission.id.cmp(&b.permission.id))
            .then_with(|| a.ancestry.level().cmp(&b.ancestry.level()))
            .then_with(|| a.scope.cmp(&b.scope))
    });
    views
}
