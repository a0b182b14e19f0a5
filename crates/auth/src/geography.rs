//! Geographic hierarchy: Country → Region → Department.
//!
//! The hierarchy is a strict 3-level tree. A department only references its
//! region; its country is always the region's country, so there is no field
//! that could ever disagree.

use serde::{Deserialize, Serialize};

use geoaccess_core::{CountryId, DepartmentId, Entity, RegionId};

// ─────────────────────────────────────────────────────────────────────────────
// Entities
// ─────────────────────────────────────────────────────────────────────────────

/// Top level of the hierarchy. Names are globally unique (exact match).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: CountryId,
    pub name: String,
}

/// Second level. Names are unique within the owning country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub country_id: CountryId,
    pub name: String,
}

/// Leaf level. Names are unique within the owning region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub region_id: RegionId,
    pub name: String,
}

impl Entity for Country {
    type Id = CountryId;

    fn id(&self) -> CountryId {
        self.id
    }

    fn sort_name(&self) -> &str {
        &self.name
    }
}

impl Entity for Region {
    type Id = RegionId;

    fn id(&self) -> RegionId {
        self.id
    }

    fn sort_name(&self) -> &str {
        &self.name
    }
}

impl Entity for Department {
    type Id = DepartmentId;

    fn id(&self) -> DepartmentId {
        self.id
    }

    fn sort_name(&self) -> &str {
        &self.name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listings
// ─────────────────────────────────────────────────────────────────────────────

/// A country with (optionally) its nested regions and departments.
///
/// `regions` is `None` when descendants were not requested, which keeps "not
/// loaded" distinguishable from "has no regions".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountryTree {
    #[serde(flatten)]
    pub country: Country,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regions: Option<Vec<RegionTree>>,
}

/// A region with its departments, ordered by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionTree {
    #[serde(flatten)]
    pub region: Region,
    pub departments: Vec<Department>,
}

/// Region listing row: the region, its country and its departments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionListing {
    #[serde(flatten)]
    pub region: Region,
    pub country: Country,
    pub departments: Vec<Department>,
}

/// Department listing row: the department with its region and country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentListing {
    #[serde(flatten)]
    pub department: Department,
    pub region: Region,
    pub country: Country,
}
