//! Scoped grant engine.
//!
//! Every grant request is resolved server-side into a canonical
//! [`GrantKey`]; the caller never supplies ancestor ids. A batch is
//! deduplicated in memory first, then written with skip-on-conflict so
//! that re-granting an existing `(permission, scope)` is a no-op, not an error.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument};

use geoaccess_auth::{
    GrantBatchOutcome, GrantKey, GrantRequest, GrantView, NewUser, ScopeRef, UserProfile,
    collapse_duplicates,
};
use geoaccess_core::{DomainError, DomainResult, PermissionId, UserId};

use super::directory::UserDirectory;
use super::resolver::ScopeResolver;
use crate::store::AccessStore;

/// A freshly created user plus what happened to its initial grant batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedUser {
    pub user: UserProfile,
    pub grants: GrantBatchOutcome,
}

pub struct GrantEngine<S: ?Sized> {
    store: Arc<S>,
    resolver: ScopeResolver<S>,
    directory: UserDirectory<S>,
}

impl<S: ?Sized> Clone for GrantEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            resolver: self.resolver.clone(),
            directory: self.directory.clone(),
        }
    }
}

impl<S> GrantEngine<S>
where
    S: AccessStore + ?Sized,
{
    pub fn new(store: Arc<S>, directory: UserDirectory<S>) -> Self {
        Self {
            resolver: ScopeResolver::new(Arc::clone(&store)),
            store,
            directory,
        }
    }

    /// Create a user and its initial grants in one atomic write.
    ///
    /// All validation (user fields, references, every grant's scope and
    /// permission) happens before the write. If the user cannot be inserted,
    /// no grant is written; grants that already exist are skipped.
    #[instrument(
        skip(self, new_user, requests),
        fields(role_id = ?new_user.role_id, requested = requests.len()),
        err
    )]
    pub async fn create_user_with_grants(
        &self,
        new_user: NewUser,
        requests: &[GrantRequest],
    ) -> DomainResult<CreatedUser> {
        let validated = self.directory.check(new_user).await?;
        let (keys, collapsed) = self.resolve_batch(requests).await?;
        let draft = self.directory.seal(validated)?;

        let (user, mut outcome) = self.store.insert_user_with_grants(draft, &keys).await?;
        outcome.collapsed = collapsed;
        log_outcome(user.id, &outcome);
        info!(user_id = %user.id, "user created");

        Ok(CreatedUser {
            user: self.directory.profile(user.id).await?,
            grants: outcome,
        })
    }

    /// Add grants to an existing user with the same resolution and
    /// deduplication rules as the initial batch.
    #[instrument(skip(self, requests), fields(user_id = %user_id, requested = requests.len()), err)]
    pub async fn grant_permissions(
        &self,
        user_id: UserId,
        requests: &[GrantRequest],
    ) -> DomainResult<GrantBatchOutcome> {
        self.require_user(user_id).await?;
        let (keys, collapsed) = self.resolve_batch(requests).await?;

        let mut outcome = self.store.insert_grants(user_id, &keys).await?;
        outcome.collapsed = collapsed;
        log_outcome(user_id, &outcome);
        Ok(outcome)
    }

    /// Remove one grant. `NotFound` if the user has no grant of that permission
    /// at exactly that scope.
    #[instrument(skip(self), fields(user_id = %user_id, permission_id = %permission_id), err)]
    pub async fn revoke_grant(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
        target: ScopeRef,
    ) -> DomainResult<GrantKey> {
        self.require_user(user_id).await?;
        let key = self.resolver.canonical_key(permission_id, target).await?;

        if !self.store.remove_grant(user_id, &key).await? {
            return Err(DomainError::not_found(format!("user {user_id} has no grant {key}")));
        }
        info!(grant = %key, "grant revoked");
        Ok(key)
    }

    /// The user's `(permission, scope)` pairs exactly as recorded, by
    /// permission name. Widening a country grant to its regions is left to
    /// whoever consumes this list.
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    pub async fn resolve_effective_grants(&self, user_id: UserId) -> DomainResult<Vec<GrantView>> {
        self.require_user(user_id).await?;
        let grants = self.store.grants(Some(user_id)).await?;
        self.directory.grant_views(grants).await
    }

    /// Resolve every request to its canonical key, check the permissions exist
    /// and collapse duplicates.
    async fn resolve_batch(&self, requests: &[GrantRequest]) -> DomainResult<(Vec<GrantKey>, usize)> {
        let mut keys = Vec::with_capacity(requests.len());
        let mut known = BTreeSet::new();

        for request in requests {
            if known.insert(request.permission_id)
                && self.store.permission(request.permission_id).await?.is_none()
            {
                return Err(DomainError::not_found(format!(
                    "permission {} does not exist",
                    request.permission_id
                )));
            }
            keys.push(
                self.resolver
                    .canonical_key(request.permission_id, request.scope)
                    .await?,
            );
        }

        Ok(collapse_duplicates(keys))
    }

    async fn require_user(&self, user_id: UserId) -> DomainResult<()> {
        match self.store.user(user_id).await? {
            Some(_) => Ok(()),
            None => Err(DomainError::not_found(format!("user {user_id} does not exist"))),
        }
    }
}

fn log_outcome(user_id: UserId, outcome: &GrantBatchOutcome) {
    for key in &outcome.skipped {
        debug!(user_id = %user_id, grant = %key, "grant already present, skipped");
    }
    info!(
        user_id = %user_id,
        inserted = outcome.inserted.len(),
        skipped = outcome.skipped.len(),
        collapsed = outcome.collapsed,
        "grant batch written"
    );
}
