//! Scope model for permission grants.
//!
//! A grant's scope is recorded as a `(country, region, department)` triple where
//! every component is independently nullable:
//!
//! | country | region | department | meaning |
//! |---------|--------|------------|---------|
//! | -       | -      | -          | global |
//! | set     | -      | -          | the country and everything below it |
//! | set     | set    | -          | the region and its departments |
//! | set     | set    | set        | the department only |
//!
//! Callers never submit a triple. They submit a [`ScopeRef`] naming a single
//! level and id, and the resolver fills in the ancestors from the hierarchy.
//! This module holds the pure parts: the submission type, the stored triple,
//! the resolved [`Ancestry`] and the canonical [`GrantKey`].

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use geoaccess_core::{CountryId, DepartmentId, DomainError, DomainResult, PermissionId, RegionId};

use crate::geography::{Country, Department, Region};

// ─────────────────────────────────────────────────────────────────────────────
// Submission
// ─────────────────────────────────────────────────────────────────────────────

/// Scope as submitted by a caller: one level and one id, nothing else.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "level", content = "id", rename_all = "snake_case")]
pub enum ScopeRef {
    Global,
    Country(CountryId),
    Region(RegionId),
    Department(DepartmentId),
}

impl ScopeRef {
    pub fn level(&self) -> ScopeLevel {
        match self {
            ScopeRef::Global => ScopeLevel::Global,
            ScopeRef::Country(_) => ScopeLevel::Country,
            ScopeRef::Region(_) => ScopeLevel::Region,
            ScopeRef::Department(_) => ScopeLevel::Department,
        }
    }
}

/// Parses the flat tags used by the console forms: `global`, `pais:3`,
/// `country:3`, `region:5`, `departamento:7`, `department:7`.
impl FromStr for ScopeRef {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("global") {
            return Ok(ScopeRef::Global);
        }

        let (tag, id) = s
            .split_once(':')
            .ok_or_else(|| DomainError::validation(format!("invalid scope tag '{s}'")))?;

        match ScopeLevel::from_name(tag)? {
            ScopeLevel::Global => Err(DomainError::validation(format!("invalid scope tag '{s}'"))),
            ScopeLevel::Country => Ok(ScopeRef::Country(id.parse()?)),
            ScopeLevel::Region => Ok(ScopeRef::Region(id.parse()?)),
            ScopeLevel::Department => Ok(ScopeRef::Department(id.parse()?)),
        }
    }
}

/// Scope levels in precedence order: department > region > country > global.
///
/// The derived `Ord` follows that precedence (`Global` is the least specific).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeLevel {
    Global,
    Country,
    Region,
    Department,
}

impl ScopeLevel {
    /// Level from its English or Spanish name, case-insensitive.
    pub fn from_name(name: &str) -> DomainResult<Self> {
        match name.trim().to_lowercase().as_str() {
            "global" => Ok(ScopeLevel::Global),
            "pais" | "país" | "country" => Ok(ScopeLevel::Country),
            "region" | "región" => Ok(ScopeLevel::Region),
            "departamento" | "department" => Ok(ScopeLevel::Department),
            other => Err(DomainError::validation(format!("unknown scope level '{other}'"))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stored triple
// ─────────────────────────────────────────────────────────────────────────────

/// The recorded `(country, region, department)` triple of a grant.
///
/// `None` is a distinct value from any id: a grant on a country is never the
/// same grant as one on any of its regions.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub country_id: Option<CountryId>,
    pub region_id: Option<RegionId>,
    pub department_id: Option<DepartmentId>,
}

impl Scope {
    pub const GLOBAL: Scope = Scope {
        country_id: None,
        region_id: None,
        department_id: None,
    };

    pub fn is_global(&self) -> bool {
        *self == Self::GLOBAL
    }

    /// Most specific non-null level.
    pub fn level(&self) -> ScopeLevel {
        self.target().level()
    }

    /// The leaf the triple points at, by precedence.
    pub fn target(&self) -> ScopeRef {
        if let Some(id) = self.department_id {
            ScopeRef::Department(id)
        } else if let Some(id) = self.region_id {
            ScopeRef::Region(id)
        } else if let Some(id) = self.country_id {
            ScopeRef::Country(id)
        } else {
            ScopeRef::Global
        }
    }

    /// Whether every id present here agrees with `resolved`.
    ///
    /// Absent ancestors are fine (the resolver fills them in); a present id that
    /// differs from the real ancestor is a sibling mismatch.
    pub fn agrees_with(&self, resolved: &Scope) -> bool {
        fn agree<T: PartialEq>(given: Option<T>, real: Option<T>) -> bool {
            match given {
                None => true,
                Some(g) => real.is_some_and(|r| r == g),
            }
        }

        agree(self.country_id, resolved.country_id)
            && agree(self.region_id, resolved.region_id)
            && agree(self.department_id, resolved.department_id)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Ancestry
// ─────────────────────────────────────────────────────────────────────────────

/// A fully resolved scope: the target entity plus every ancestor.
///
/// Constructors check that the chain is consistent, so an `Ancestry` never
/// contains a region from one country paired with a different country.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ancestry {
    level: ScopeLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    country: Option<Country>,
    #[serde(skip_serializing_if = "Option::is_none")]
    region: Option<Region>,
    #[serde(skip_serializing_if = "Option::is_none")]
    department: Option<Department>,
}

impl Ancestry {
    pub fn global() -> Self {
        Self {
            level: ScopeLevel::Global,
            country: None,
            region: None,
            department: None,
        }
    }

    pub fn of_country(country: Country) -> Self {
        Self {
            level: ScopeLevel::Country,
            country: Some(country),
            region: None,
            department: None,
        }
    }

    pub fn of_region(region: Region, country: Country) -> DomainResult<Self> {
        if region.country_id != country.id {
            return Err(DomainError::validation(format!(
                "region {} does not belong to country {}",
                region.id, country.id
            )));
        }
        Ok(Self {
            level: ScopeLevel::Region,
            country: Some(country),
            region: Some(region),
            department: None,
        })
    }

    pub fn of_department(department: Department, region: Region, country: Country) -> DomainResult<Self> {
        if department.region_id != region.id {
            return Err(DomainError::validation(format!(
                "department {} does not belong to region {}",
                department.id, region.id
            )));
        }
        let mut ancestry = Self::of_region(region, country)?;
        ancestry.level = ScopeLevel::Department;
        ancestry.department = Some(department);
        Ok(ancestry)
    }

    pub fn level(&self) -> ScopeLevel {
        self.level
    }

    pub fn country(&self) -> Option<&Country> {
        self.country.as_ref()
    }

    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    pub fn department(&self) -> Option<&Department> {
        self.department.as_ref()
    }

    /// The canonical triple for this chain, ancestors filled in.
    pub fn scope(&self) -> Scope {
        Scope {
            country_id: self.country.as_ref().map(|c| c.id),
            region_id: self.region.as_ref().map(|r| r.id),
            department_id: self.department.as_ref().map(|d| d.id),
        }
    }

    /// Human-readable label, most specific level first, walking up to the
    /// country: `Departamento Santiago · Región Metropolitana · País Chile`.
    pub fn label(&self) -> String {
        let mut parts = Vec::with_capacity(3);
        if let Some(d) = &self.department {
            parts.push(format!("Departamento {}", d.name));
        }
        if let Some(r) = &self.region {
            parts.push(format!("Región {}", r.name));
        }
        if let Some(c) = &self.country {
            parts.push(format!("País {}", c.name));
        }

        if parts.is_empty() {
            "Global".to_string()
        } else {
            parts.join(" · ")
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Canonical key
// ─────────────────────────────────────────────────────────────────────────────

/// Canonical identity of a grant for one user: the permission plus the
/// resolved triple.
///
/// Two grants are the same grant iff their keys are equal. The derived `Hash`,
/// `Eq` and `Ord` are what in-memory deduplication uses; [`GrantKey::canonical`]
/// is the string form of the same tuple.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GrantKey {
    pub permission_id: PermissionId,
    #[serde(flatten)]
    pub scope: Scope,
}

impl GrantKey {
    pub fn new(permission_id: PermissionId, scope: Scope) -> Self {
        Self { permission_id, scope }
    }

    /// Deterministic string form, `-` standing for null:
    /// `"<permission>|<country>|<region>|<department>"`.
    pub fn canonical(&self) -> String {
        fn part<T: core::fmt::Display>(v: Option<T>) -> String {
            v.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
        }

        format!(
            "{}|{}|{}|{}",
            self.permission_id,
            part(self.scope.country_id),
            part(self.scope.region_id),
            part(self.scope.department_id)
        )
    }
}

impl core::fmt::Display for GrantKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chile() -> Country {
        Country {
            id: CountryId::from_db(1),
            name: "Chile".to_string(),
        }
    }

    fn metropolitana() -> Region {
        Region {
            id: RegionId::from_db(10),
            country_id: CountryId::from_db(1),
            name: "Metropolitana".to_string(),
        }
    }

    fn santiago() -> Department {
        Department {
            id: DepartmentId::from_db(100),
            region_id: RegionId::from_db(10),
            name: "Santiago".to_string(),
        }
    }

    #[test]
    fn department_label_walks_up_to_country() {
        let ancestry = Ancestry::of_department(santiago(), metropolitana(), chile()).unwrap();
        assert_eq!(
            ancestry.label(),
            "Departamento Santiago · Región Metropolitana · País Chile"
        );
        assert_eq!(
            ancestry.scope(),
            Scope {
                country_id: Some(CountryId::from_db(1)),
                region_id: Some(RegionId::from_db(10)),
                department_id: Some(DepartmentId::from_db(100)),
            }
        );
    }

    #[test]
    fn less_specific_labels() {
        let region = Ancestry::of_region(metropolitana(), chile()).unwrap();
        assert_eq!(region.label(), "Región Metropolitana · País Chile");
        assert_eq!(Ancestry::of_country(chile()).label(), "País Chile");
        assert_eq!(Ancestry::global().label(), "Global");
    }

    #[test]
    fn mismatched_chain_is_rejected() {
        let mut other = chile();
        other.id = CountryId::from_db(2);
        assert!(Ancestry::of_region(metropolitana(), other).is_err());

        let mut stray = santiago();
        stray.region_id = RegionId::from_db(11);
        assert!(Ancestry::of_department(stray, metropolitana(), chile()).is_err());
    }

    #[test]
    fn target_follows_precedence() {
        let scope = Scope {
            country_id: Some(CountryId::from_db(1)),
            region_id: Some(RegionId::from_db(10)),
            department_id: None,
        };
        assert_eq!(scope.target(), ScopeRef::Region(RegionId::from_db(10)));
        assert_eq!(scope.level(), ScopeLevel::Region);
        assert_eq!(Scope::GLOBAL.level(), ScopeLevel::Global);
        assert!(ScopeLevel::Department > ScopeLevel::Region);
        assert!(ScopeLevel::Country > ScopeLevel::Global);
    }

    #[test]
    fn agrees_with_allows_missing_ancestors_but_not_siblings() {
        let resolved = Ancestry::of_department(santiago(), metropolitana(), chile())
            .unwrap()
            .scope();

        let leaf_only = Scope {
            department_id: Some(DepartmentId::from_db(100)),
            ..Scope::GLOBAL
        };
        assert!(leaf_only.agrees_with(&resolved));

        let sibling = Scope {
            country_id: Some(CountryId::from_db(2)),
            department_id: Some(DepartmentId::from_db(100)),
            ..Scope::GLOBAL
        };
        assert!(!sibling.agrees_with(&resolved));
    }

    #[test]
    fn canonical_key_distinguishes_null_from_ids() {
        let country_level = GrantKey::new(
            PermissionId::from_db(3),
            Scope {
                country_id: Some(CountryId::from_db(1)),
                ..Scope::GLOBAL
            },
        );
        let region_level = GrantKey::new(
            PermissionId::from_db(3),
            Scope {
                country_id: Some(CountryId::from_db(1)),
                region_id: Some(RegionId::from_db(10)),
                department_id: None,
            },
        );

        assert_eq!(country_level.canonical(), "3|1|-|-");
        assert_eq!(region_level.canonical(), "3|1|10|-");
        assert_ne!(country_level, region_level);
        assert_eq!(GrantKey::new(PermissionId::from_db(3), Scope::GLOBAL).to_string(), "3|-|-|-");
    }

    #[test]
    fn parses_console_scope_tags() {
        assert_eq!("global".parse::<ScopeRef>().unwrap(), ScopeRef::Global);
        assert_eq!("".parse::<ScopeRef>().unwrap(), ScopeRef::Global);
        assert_eq!(
            "pais:3".parse::<ScopeRef>().unwrap(),
            ScopeRef::Country(CountryId::from_db(3))
        );
        assert_eq!(
            "region:5".parse::<ScopeRef>().unwrap(),
            ScopeRef::Region(RegionId::from_db(5))
        );
        assert_eq!(
            "departamento:7".parse::<ScopeRef>().unwrap(),
            ScopeRef::Department(DepartmentId::from_db(7))
        );
        assert_eq!(
            "Department:7".parse::<ScopeRef>().unwrap(),
            ScopeRef::Department(DepartmentId::from_db(7))
        );
    }

    #[test]
    fn rejects_malformed_scope_tags() {
        assert!("departamento".parse::<ScopeRef>().is_err());
        assert!("departamento:0".parse::<ScopeRef>().is_err());
        assert!("planet:1".parse::<ScopeRef>().is_err());
        assert!("region:abc".parse::<ScopeRef>().is_err());
    }

    #[test]
    fn scope_ref_json_shape() {
        let json = serde_json::to_value(ScopeRef::Department(DepartmentId::from_db(7))).unwrap();
        assert_eq!(json, serde_json::json!({ "level": "department", "id": 7 }));

        let parsed: ScopeRef = serde_json::from_value(serde_json::json!({ "level": "global" })).unwrap();
        assert_eq!(parsed, ScopeRef::Global);
    }
}
