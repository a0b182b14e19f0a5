//! Role/permission catalog.
//!
//! Role-level permissions carry no scope: a permission attached to a role is
//! always global. Scoped grants live on users (see [`crate::grant`]).

use serde::{Deserialize, Serialize};

use geoaccess_core::{Entity, PermissionId, RoleId};

/// Named role. Every user has exactly one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub description: Option<String>,
}

/// Named permission, e.g. `CrearAeronaves`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub id: PermissionId,
    pub name: String,
    pub description: Option<String>,
}

impl Entity for Role {
    type Id = RoleId;

    fn id(&self) -> RoleId {
        self.id
    }

    fn sort_name(&self) -> &str {
        &self.name
    }
}

impl Entity for Permission {
    type Id = PermissionId;

    fn id(&self) -> PermissionId {
        self.id
    }

    fn sort_name(&self) -> &str {
        &self.name
    }
}

/// A role with its attached permissions ordered by permission name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleWithPermissions {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<Permission>,
}

/// A permission with the roles it is attached to, ordered by role name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionWithRoles {
    #[serde(flatten)]
    pub permission: Permission,
    pub roles: Vec<Role>,
}

/// Result of an (atomic) permission deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionRemoval {
    #[serde(flatten)]
    pub permission: Permission,
    /// RolePermission rows removed alongside the permission.
    pub role_links_removed: u64,
    /// Scoped user grants removed alongside the permission.
    pub user_grants_removed: u64,
}
