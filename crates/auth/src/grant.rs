//! Scoped user grants.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use geoaccess_core::{PermissionId, UserId};

use crate::catalog::Permission;
use crate::scope::{Ancestry, GrantKey, Scope, ScopeRef};

/// A grant as requested by a caller, before resolution.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRequest {
    pub permission_id: PermissionId,
    pub scope: ScopeRef,
}

/// A recorded `(user, permission, scope)` row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedGrant {
    pub user_id: UserId,
    pub permission_id: PermissionId,
    #[serde(flatten)]
    pub scope: Scope,
    pub granted_at: DateTime<Utc>,
}

impl ScopedGrant {
    pub fn key(&self) -> GrantKey {
        GrantKey::new(self.permission_id, self.scope)
    }
}

/// A grant as presented in listings: permission detail plus resolved scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrantView {
    pub permission: Permission,
    pub scope: Scope,
    pub ancestry: Ancestry,
    pub label: String,
    pub granted_at: DateTime<Utc>,
}

/// What a batch grant write actually did.
///
/// Skipping an already-present grant is not a failure; this report lets the
/// caller tell "nothing new happened" apart from an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GrantBatchOutcome {
    /// Keys written by this operation.
    pub inserted: Vec<GrantKey>,
    /// Keys that already existed in storage and were left untouched.
    pub skipped: Vec<GrantKey>,
    /// In-batch duplicates collapsed before writing.
    pub collapsed: usize,
}

impl GrantBatchOutcome {
    pub fn is_noop(&self) -> bool {
        self.inserted.is_empty()
    }
}

/// Collapse duplicate keys, keeping first-occurrence order.
///
/// Returns the unique keys and how many entries were dropped. Which copy
/// survives does not matter: identical keys are identical grants.
pub fn collapse_duplicates(keys: impl IntoIterator<Item = GrantKey>) -> (Vec<GrantKey>, usize) {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    let mut dropped = 0;

    for key in keys {
        if seen.insert(key) {
            unique.push(key);
        } else {
            dropped += 1;
        }
    }

    (unique, dropped)
}
