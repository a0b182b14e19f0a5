//! Country → Region → Department hierarchy.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{info, instrument};

use geoaccess_auth::{
    Country, CountryTree, Department, DepartmentListing, Region, RegionListing, RegionTree, input,
};
use geoaccess_core::{CountryId, DomainError, DomainResult, RegionId};

use crate::store::GeographyStore;

/// Creates and lists geographic entities.
///
/// Each create checks its parent and its name before writing; a constraint
/// violation at write time (a concurrent create of the same name) is reported
/// with the same error kind as the pre-check would have produced.
pub struct GeographyService<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for GeographyService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> GeographyService<S>
where
    S: GeographyStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self), err)]
    pub async fn create_country(&self, name: &str) -> DomainResult<Country> {
        let name = input::required_name("country name", name)?;

        if self.store.country_by_name(&name).await?.is_some() {
            return Err(DomainError::duplicate_name(format!("country '{name}' already exists")));
        }

        let country = self.store.insert_country(&name).await?;
        info!(country_id = %country.id, "country created");
        Ok(country)
    }

    #[instrument(skip(self), fields(country_id = %country_id), err)]
    pub async fn create_region(&self, name: &str, country_id: CountryId) -> DomainResult<Region> {
        let name = input::required_name("region name", name)?;

        if self.store.country(country_id).await?.is_none() {
            return Err(DomainError::invalid_parent(format!("country {country_id} does not exist")));
        }
        if self.store.region_by_name(country_id, &name).await?.is_some() {
            return Err(DomainError::duplicate_name(format!(
                "region '{name}' already exists in country {country_id}"
            )));
        }

        let region = self.store.insert_region(country_id, &name).await?;
        info!(region_id = %region.id, "region created");
        Ok(region)
    }

    #[instrument(skip(self), fields(region_id = %region_id), err)]
    pub async fn create_department(&self, name: &str, region_id: RegionId) -> DomainResult<Department> {
        let name = input::required_name("department name", name)?;

        if self.store.region(region_id).await?.is_none() {
            return Err(DomainError::invalid_parent(format!("region {region_id} does not exist")));
        }
        if self.store.department_by_name(region_id, &name).await?.is_some() {
            return Err(DomainError::duplicate_name(format!(
                "department '{name}' already exists in region {region_id}"
            )));
        }

        let department = self.store.insert_department(region_id, &name).await?;
        info!(department_id = %department.id, "department created");
        Ok(department)
    }

    /// Countries by name; with descendants, regions and departments nested
    /// under them, each level by name.
    #[instrument(skip(self), err)]
    pub async fn list_countries(&self, with_descendants: bool) -> DomainResult<Vec<CountryTree>> {
        let countries = self.store.countries().await?;
        if !with_descendants {
            return Ok(countries
                .into_iter()
                .map(|country| CountryTree { country, regions: None })
                .collect());
        }

        let mut departments = group(self.store.departments(None).await?, |d| d.region_id);
        let mut regions: HashMap<CountryId, Vec<RegionTree>> = HashMap::new();
        for region in self.store.regions(None).await? {
            let children = departments.remove(&region.id).unwrap_or_default();
            regions.entry(region.country_id).or_default().push(RegionTree {
                region,
                departments: children,
            });
        }

        Ok(countries
            .into_iter()
            .map(|country| {
                let children = regions.remove(&country.id).unwrap_or_default();
                CountryTree {
                    country,
                    regions: Some(children),
                }
            })
            .collect())
    }

    /// Regions by name, optionally restricted to one country. A filter naming
    /// an unknown country yields an empty list.
    #[instrument(skip(self), err)]
    pub async fn list_regions(&self, country_id: Option<CountryId>) -> DomainResult<Vec<RegionListing>> {
        let regions = self.store.regions(country_id).await?;
        let countries: BTreeMap<CountryId, Country> = self
            .store
            .countries()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();
        let mut departments = group(self.store.departments(None).await?, |d| d.region_id);

        regions
            .into_iter()
            .map(|region| -> DomainResult<RegionListing> {
                let country = countries.get(&region.country_id).cloned().ok_or_else(|| {
                    DomainError::storage(format!("region {} has no country", region.id))
                })?;
                let children = departments.remove(&region.id).unwrap_or_default();
                Ok(RegionListing {
                    region,
                    country,
                    departments: children,
                })
            })
            .collect()
    }

    /// Departments by name with their region and country, optionally restricted
    /// to one region.
    #[instrument(skip(self), err)]
    pub async fn list_departments(&self, region_id: Option<RegionId>) -> DomainResult<Vec<DepartmentListing>> {
        let departments = self.store.departments(region_id).await?;
        let regions: BTreeMap<RegionId, Region> = self
            .store
            .regions(None)
            .await?
            .into_iter()
            .map(|r| (r.id, r))
            .collect();
        let countries: BTreeMap<CountryId, Country> = self
            .store
            .countries()
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        departments
            .into_iter()
            .map(|department| -> DomainResult<DepartmentListing> {
                let region = regions.get(&department.region_id).cloned().ok_or_else(|| {
                    DomainError::storage(format!("department {} has no region", department.id))
                })?;
                let country = countries.get(&region.country_id).cloned().ok_or_else(|| {
                    DomainError::storage(format!("region {} has no country", region.id))
                })?;
                Ok(DepartmentListing {
                    department,
                    region,
                    country,
                })
            })
            .collect()
    }
}

/// Group an already-ordered listing by parent, keeping the order inside each group.
fn group<K, V>(items: Vec<V>, parent: impl Fn(&V) -> K) -> HashMap<K, Vec<V>>
where
    K: std::hash::Hash + Eq,
{
    let mut out: HashMap<K, Vec<V>> = HashMap::new();
    for item in items {
        out.entry(parent(&item)).or_default().push(item);
    }
    out
}
