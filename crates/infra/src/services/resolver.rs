//! Scope resolution over the geographic hierarchy.
//!
//! Read-only: nothing here writes to the store. Callers name one level and id
//! ([`ScopeRef`]); the resolver walks up to the country and returns the full
//! [`Ancestry`], from which the canonical grant key and the display label are
//! derived.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::instrument;

use geoaccess_auth::{Ancestry, Country, Department, GrantKey, Region, Scope, ScopeRef};
use geoaccess_core::{CountryId, DepartmentId, DomainError, DomainResult, PermissionId, RegionId};

use crate::store::GeographyStore;

pub struct ScopeResolver<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for ScopeResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> ScopeResolver<S>
where
    S: GeographyStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Full ancestor chain of `target`. `NotFound` if the id does not exist at
    /// the stated level.
    #[instrument(skip(self), err)]
    pub async fn resolve_ancestry(&self, target: ScopeRef) -> DomainResult<Ancestry> {
        match target {
            ScopeRef::Global => Ok(Ancestry::global()),
            ScopeRef::Country(id) => {
                let country = self.store.country(id).await?.ok_or_else(|| missing_country(id))?;
                Ok(Ancestry::of_country(country))
            }
            ScopeRef::Region(id) => {
                let region = self.store.region(id).await?.ok_or_else(|| missing_region(id))?;
                let country = self.parent_country(&region).await?;
                Ancestry::of_region(region, country)
            }
            ScopeRef::Department(id) => {
                let department = self
                    .store
                    .department(id)
                    .await?
                    .ok_or_else(|| missing_department(id))?;
                let region = self
                    .store
                    .region(department.region_id)
                    .await?
                    .ok_or_else(|| orphan("department", department.id, "region"))?;
                let country = self.parent_country(&region).await?;
                Ancestry::of_department(department, region, country)
            }
        }
    }

    /// Resolve a recorded triple, rejecting ancestor ids that do not match the
    /// leaf's real ancestors.
    pub async fn resolve_scope(&self, scope: &Scope) -> DomainResult<Ancestry> {
        let ancestry = self.resolve_ancestry(scope.target()).await?;
        check_agreement(scope, ancestry)
    }

    /// Canonical grant key for `permission_id` at `target`, ancestors filled in.
    pub async fn canonical_key(&self, permission_id: PermissionId, target: ScopeRef) -> DomainResult<GrantKey> {
        let ancestry = self.resolve_ancestry(target).await?;
        Ok(GrantKey::new(permission_id, ancestry.scope()))
    }

    /// Display label for a recorded triple, e.g.
    /// `Departamento Santiago · Región Metropolitana · País Chile`.
    pub async fn describe_scope(&self, scope: &Scope) -> DomainResult<String> {
        Ok(self.resolve_scope(scope).await?.label())
    }

    /// Load the whole hierarchy once for bulk resolution (listings).
    #[instrument(skip(self), err)]
    pub async fn snapshot(&self) -> DomainResult<HierarchySnapshot> {
        Ok(HierarchySnapshot {
            countries: self.store.countries().await?.into_iter().map(|c| (c.id, c)).collect(),
            regions: self.store.regions(None).await?.into_iter().map(|r| (r.id, r)).collect(),
            departments: self
                .store
                .departments(None)
                .await?
                .into_iter()
                .map(|d| (d.id, d))
                .collect(),
        })
    }

    async fn parent_country(&self, region: &Region) -> DomainResult<Country> {
        self.store
            .country(region.country_id)
            .await?
            .ok_or_else(|| orphan("region", region.id, "country"))
    }
}

/// The hierarchy loaded into memory, for resolving many scopes without a store
/// round trip each.
#[derive(Debug, Clone, Default)]
pub struct HierarchySnapshot {
    countries: BTreeMap<CountryId, Country>,
    regions: BTreeMap<RegionId, Region>,
    departments: BTreeMap<DepartmentId, Department>,
}

impl HierarchySnapshot {
    pub fn resolve_ancestry(&self, target: ScopeRef) -> DomainResult<Ancestry> {
        match target {
            ScopeRef::Global => Ok(Ancestry::global()),
            ScopeRef::Country(id) => Ok(Ancestry::of_country(self.country(id)?)),
            ScopeRef::Region(id) => {
                let region = self.regions.get(&id).cloned().ok_or_else(|| missing_region(id))?;
                let country = self
                    .country(region.country_id)
                    .map_err(|_| orphan("region", region.id, "country"))?;
                Ancestry::of_region(region, country)
            }
            ScopeRef::Department(id) => {
                let department = self
                    .departments
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| missing_department(id))?;
                let region = self
                    .regions
                    .get(&department.region_id)
                    .cloned()
                    .ok_or_else(|| orphan("department", department.id, "region"))?;
                let country = self
                    .country(region.country_id)
                    .map_err(|_| orphan("region", region.id, "country"))?;
                Ancestry::of_department(department, region, country)
            }
        }
    }

    pub fn resolve_scope(&self, scope: &Scope) -> DomainResult<Ancestry> {
        let ancestry = self.resolve_ancestry(scope.target())?;
        check_agreement(scope, ancestry)
    }

    fn country(&self, id: CountryId) -> DomainResult<Country> {
        self.countries.get(&id).cloned().ok_or_else(|| missing_country(id))
    }
}

fn check_agreement(scope: &Scope, ancestry: Ancestry) -> DomainResult<Ancestry> {
    if scope.agrees_with(&ancestry.scope()) {
        Ok(ancestry)
    } else {
        Err(DomainError::validation(format!(
            "scope {:?} is not a consistent ancestor chain (expected {:?})",
            scope,
            ancestry.scope()
        )))
    }
}

fn missing_country(id: CountryId) -> DomainError {
    DomainError::not_found(format!("country {id} does not exist"))
}

fn missing_region(id: RegionId) -> DomainError {
    DomainError::not_found(format!("region {id} does not exist"))
}

fn missing_department(id: DepartmentId) -> DomainError {
    DomainError::not_found(format!("department {id} does not exist"))
}

/// A stored row whose parent is gone: the store broke its own foreign key.
fn orphan(kind: &str, id: impl core::fmt::Display, parent: &str) -> DomainError {
    DomainError::storage(format!("{kind} {id} references a missing {parent}"))
}
