//! Request bodies and the conversions from loose JSON into domain inputs.
//!
//! Ids are taken as raw JSON values so that numbers and numeric strings are
//! both accepted; absent or unusable ids are "not provided" for optional
//! fields and a validation error for required ones.

use serde::Deserialize;
use serde_json::Value;

use geoaccess_auth::{GrantRequest, NewUser, ScopeLevel, ScopeRef};
use geoaccess_core::{DomainResult, optional_id, required_id};

#[derive(Debug, Deserialize)]
pub struct CreateCountryRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateRegionRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "countryId")]
    pub country_id: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDepartmentRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default, alias = "regionId")]
    pub region_id: Option<Value>,
}

/// Body for both roles and permissions.
#[derive(Debug, Deserialize)]
pub struct CreateCatalogEntryRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignPermissionRequest {
    #[serde(default, alias = "roleId")]
    pub role_id: Option<Value>,
    #[serde(default, alias = "permissionId")]
    pub permission_id: Option<Value>,
}

#[derive(Deserialize)]
pub struct CreateUserRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, alias = "roleId")]
    pub role_id: Option<Value>,
    #[serde(default, alias = "departmentId")]
    pub department_id: Option<Value>,
    #[serde(default)]
    pub grants: Vec<GrantInput>,
}

impl CreateUserRequest {
    pub fn into_parts(self) -> DomainResult<(NewUser, Vec<GrantRequest>)> {
        let grants = grant_requests(&self.grants)?;
        let new_user = NewUser {
            name: self.name,
            email: self.email,
            password: self.password,
            role_id: optional_id(self.role_id.as_ref()),
            department_id: optional_id(self.department_id.as_ref()),
        };
        Ok((new_user, grants))
    }
}

#[derive(Debug, Deserialize)]
pub struct GrantBatchRequest {
    #[serde(default)]
    pub grants: Vec<GrantInput>,
}

/// One grant as submitted: a permission and a scope naming a single level.
#[derive(Debug, Deserialize)]
pub struct GrantInput {
    #[serde(default, alias = "permissionId")]
    pub permission_id: Option<Value>,
    #[serde(default)]
    pub scope: Option<ScopeInput>,
}

/// Either the structured form `{"level": "region", "id": 5}` or a flat tag
/// such as `"departamento:7"`. Absent means global.
///
/// The structured id goes through the same number-or-numeric-string rules
/// as every other body id.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ScopeInput {
    Tag(String),
    Structured {
        level: String,
        #[serde(default)]
        id: Option<Value>,
    },
}

impl ScopeInput {
    pub fn to_scope(&self) -> DomainResult<ScopeRef> {
        let (level, id) = match self {
            ScopeInput::Tag(tag) => return tag.parse(),
            ScopeInput::Structured { level, id } => (ScopeLevel::from_name(level)?, id.as_ref()),
        };
        Ok(match level {
            ScopeLevel::Global => ScopeRef::Global,
            ScopeLevel::Country => ScopeRef::Country(required_id("scope.id", id)?),
            ScopeLevel::Region => ScopeRef::Region(required_id("scope.id", id)?),
            ScopeLevel::Department => ScopeRef::Department(required_id("scope.id", id)?),
        })
    }
}

impl GrantInput {
    pub fn to_request(&self) -> DomainResult<GrantRequest> {
        let scope = match &self.scope {
            None => ScopeRef::Global,
            Some(input) => input.to_scope()?,
        };
        Ok(GrantRequest {
            permission_id: required_id("permission_id", self.permission_id.as_ref())?,
            scope,
        })
    }
}

pub fn grant_requests(inputs: &[GrantInput]) -> DomainResult<Vec<GrantRequest>> {
    inputs.iter().map(GrantInput::to_request).collect()
}

#[derive(Debug, Default, Deserialize)]
pub struct CountriesQuery {
    pub with_descendants: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RegionsQuery {
    pub country_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DepartmentsQuery {
    pub region_id: Option<String>,
}

/// Optional id from a query-string value, with the same leniency as bodies.
pub fn query_id<T: geoaccess_core::SerialId>(raw: Option<String>) -> Option<T> {
    optional_id(raw.map(Value::String).as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geoaccess_core::{CountryId, DepartmentId, DomainError, PermissionId, RegionId};
    use serde_json::json;

    fn grant(value: Value) -> DomainResult<GrantRequest> {
        serde_json::from_value::<GrantInput>(value).unwrap().to_request()
    }

    #[test]
    fn scope_accepts_structured_and_tag_forms() {
        let structured = grant(json!({"permission_id": 3, "scope": {"level": "region", "id": 5}})).unwrap();
        assert_eq!(structured.scope, ScopeRef::Region(RegionId::from_db(5)));

        let tagged = grant(json!({"permissionId": "3", "scope": "departamento:7"})).unwrap();
        assert_eq!(tagged.permission_id, PermissionId::from_db(3));
        assert_eq!(tagged.scope, ScopeRef::Department(DepartmentId::from_db(7)));
    }

    #[test]
    fn structured_scope_ids_follow_body_id_rules() {
        let from_string = grant(json!({"permission_id": 1, "scope": {"level": "region", "id": "5"}})).unwrap();
        assert_eq!(from_string.scope, ScopeRef::Region(RegionId::from_db(5)));

        for bad in [json!(0), json!(-1), json!("abc"), json!(null)] {
            let err = grant(json!({"permission_id": 1, "scope": {"level": "region", "id": bad}})).unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "id {bad}: {err:?}");
        }

        let err = grant(json!({"permission_id": 1, "scope": {"level": "department"}})).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn structured_scope_levels() {
        let global = grant(json!({"permission_id": 1, "scope": {"level": "global"}})).unwrap();
        assert_eq!(global.scope, ScopeRef::Global);

        let pais = grant(json!({"permission_id": 1, "scope": {"level": "pais", "id": 2}})).unwrap();
        assert_eq!(pais.scope, ScopeRef::Country(CountryId::from_db(2)));

        let err = grant(json!({"permission_id": 1, "scope": {"level": "planet", "id": 2}})).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn missing_scope_is_global() {
        assert_eq!(grant(json!({"permission_id": 1})).unwrap().scope, ScopeRef::Global);
    }

    #[test]
    fn grant_without_permission_is_rejected() {
        let err = grant(json!({"permission_id": 0, "scope": "global"})).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn unusable_role_id_becomes_absent() {
        let body: CreateUserRequest = serde_json::from_value(json!({
            "name": "Ana",
            "email": "ana@example.com",
            "password": "12345678",
            "roleId": "abc",
            "department_id": 4,
        }))
        .unwrap();
        let (user, grants) = body.into_parts().unwrap();
        assert_eq!(user.role_id, None);
        assert_eq!(user.department_id, Some(DepartmentId::from_db(4)));
        assert!(grants.is_empty());
    }

    #[test]
    fn query_ids_ignore_garbage() {
        assert_eq!(query_id::<RegionId>(Some("9".to_string())), Some(RegionId::from_db(9)));
        assert_eq!(query_id::<RegionId>(Some("-1".to_string())), None);
        assert_eq!(query_id::<RegionId>(None), None);
    }
}
