//! Postgres-backed access store.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped to `StoreError` as follows:
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `UniqueViolation { constraint }` |
//! | Database (foreign key violation) | `23503` | `ForeignKeyViolation { constraint }` |
//! | Database (other) | Any other | `Backend` |
//! | PoolClosed / RowNotFound / Other | N/A | `Backend` |
//!
//! Constraint names in [`SCHEMA`] match [`super::constraints`], which is what
//! lets the services translate a violation into the right domain error.
//!
//! Names sort with `COLLATE "C"` so listings come back in the same byte order
//! the services and the in-memory store use.
//!
//! ## Grant uniqueness
//!
//! `NULL` never equals `NULL` in a plain unique constraint, so two global grants
//! of the same permission would both be accepted. The `uq_user_permissions_scope`
//! index compares `COALESCE(id, 0)` instead, which is safe because serial ids
//! start at 1.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use geoaccess_auth::{
    CredentialRecord, Country, Department, GrantBatchOutcome, GrantKey, Permission,
    PermissionRemoval, Region, Role, Scope, ScopedGrant, User, UserDraft,
};
use geoaccess_core::{CountryId, DepartmentId, PermissionId, RegionId, RoleId, UserId};

use super::r#trait::{CatalogStore, DirectoryStore, GeographyStore, StoreError, StoreResult};

/// Idempotent DDL applied by [`PostgresStore::migrate`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS countries (
    id   BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL,
    CONSTRAINT uq_countries_name UNIQUE (name)
);

CREATE TABLE IF NOT EXISTS regions (
    id         BIGSERIAL PRIMARY KEY,
    country_id BIGINT NOT NULL,
    name       TEXT NOT NULL,
    CONSTRAINT fk_regions_country FOREIGN KEY (country_id) REFERENCES countries (id),
    CONSTRAINT uq_regions_country_name UNIQUE (country_id, name)
);

CREATE TABLE IF NOT EXISTS departments (
    id        BIGSERIAL PRIMARY KEY,
    region_id BIGINT NOT NULL,
    name      TEXT NOT NULL,
    CONSTRAINT fk_departments_region FOREIGN KEY (region_id) REFERENCES regions (id),
    CONSTRAINT uq_departments_region_name UNIQUE (region_id, name)
);

CREATE TABLE IF NOT EXISTS roles (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    CONSTRAINT uq_roles_name UNIQUE (name)
);

CREATE TABLE IF NOT EXISTS permissions (
    id          BIGSERIAL PRIMARY KEY,
    name        TEXT NOT NULL,
    description TEXT,
    CONSTRAINT uq_permissions_name UNIQUE (name)
);

CREATE TABLE IF NOT EXISTS role_permissions (
    role_id       BIGINT NOT NULL,
    permission_id BIGINT NOT NULL,
    CONSTRAINT pk_role_permissions PRIMARY KEY (role_id, permission_id),
    CONSTRAINT fk_role_permissions_role FOREIGN KEY (role_id) REFERENCES roles (id),
    CONSTRAINT fk_role_permissions_permission FOREIGN KEY (permission_id) REFERENCES permissions (id)
);

CREATE TABLE IF NOT EXISTS users (
    id            BIGSERIAL PRIMARY KEY,
    name          TEXT NOT NULL,
    email         TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    role_id       BIGINT NOT NULL,
    department_id BIGINT,
    created_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT uq_users_email UNIQUE (email),
    CONSTRAINT fk_users_role FOREIGN KEY (role_id) REFERENCES roles (id),
    CONSTRAINT fk_users_department FOREIGN KEY (department_id) REFERENCES departments (id)
);

CREATE TABLE IF NOT EXISTS user_permissions (
    id            BIGSERIAL PRIMARY KEY,
    user_id       BIGINT NOT NULL,
    permission_id BIGINT NOT NULL,
    country_id    BIGINT,
    region_id     BIGINT,
    department_id BIGINT,
    granted_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT fk_user_permissions_user FOREIGN KEY (user_id) REFERENCES users (id) ON DELETE CASCADE,
    CONSTRAINT fk_user_permissions_permission FOREIGN KEY (permission_id) REFERENCES permissions (id),
    CONSTRAINT fk_user_permissions_country FOREIGN KEY (country_id) REFERENCES countries (id),
    CONSTRAINT fk_user_permissions_region FOREIGN KEY (region_id) REFERENCES regions (id),
    CONSTRAINT fk_user_permissions_department FOREIGN KEY (department_id) REFERENCES departments (id),
    CONSTRAINT ck_user_permissions_shape CHECK (
        (department_id IS NULL OR region_id IS NOT NULL)
        AND (region_id IS NULL OR country_id IS NOT NULL)
    )
);

CREATE UNIQUE INDEX IF NOT EXISTS uq_user_permissions_scope ON user_permissions (
    user_id,
    permission_id,
    COALESCE(country_id, 0),
    COALESCE(region_id, 0),
    COALESCE(department_id, 0)
);
"#;

/// Postgres-backed access store.
///
/// Multi-row writes (user plus grants, permission cascade) run in a single
/// transaction; everything else is a single statement against the pool.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: Arc<PgPool>,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Apply [`SCHEMA`]. Safe to run on every start.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mapping
// ─────────────────────────────────────────────────────────────────────────────

fn col<'r, T>(row: &'r PgRow, name: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Backend(format!("failed to read column {name}: {e}")))
}

fn country_from_row(row: &PgRow) -> StoreResult<Country> {
    Ok(Country {
        id: CountryId::from_db(col(row, "id")?),
        name: col(row, "name")?,
    })
}

fn region_from_row(row: &PgRow) -> StoreResult<Region> {
    Ok(Region {
        id: RegionId::from_db(col(row, "id")?),
        country_id: CountryId::from_db(col(row, "country_id")?),
        name: col(row, "name")?,
    })
}

fn department_from_row(row: &PgRow) -> StoreResult<Department> {
    Ok(Department {
        id: DepartmentId::from_db(col(row, "id")?),
        region_id: RegionId::from_db(col(row, "region_id")?),
        name: col(row, "name")?,
    })
}

fn role_from_row(row: &PgRow) -> StoreResult<Role> {
    Ok(Role {
        id: RoleId::from_db(col(row, "id")?),
        name: col(row, "name")?,
        description: col(row, "description")?,
    })
}

fn permission_from_row(row: &PgRow) -> StoreResult<Permission> {
    Ok(Permission {
        id: PermissionId::from_db(col(row, "id")?),
        name: col(row, "name")?,
        description: col(row, "description")?,
    })
}

fn user_from_row(row: &PgRow) -> StoreResult<User> {
    let department_id: Option<i64> = col(row, "department_id")?;
    let password_hash: String = col(row, "password_hash")?;
    Ok(User {
        id: UserId::from_db(col(row, "id")?),
        name: col(row, "name")?,
        email: col(row, "email")?,
        credential: CredentialRecord::new(password_hash),
        role_id: RoleId::from_db(col(row, "role_id")?),
        department_id: department_id.map(DepartmentId::from_db),
        created_at: col(row, "created_at")?,
    })
}

fn grant_from_row(row: &PgRow) -> StoreResult<ScopedGrant> {
    let country_id: Option<i64> = col(row, "country_id")?;
    let region_id: Option<i64> = col(row, "region_id")?;
    let department_id: Option<i64> = col(row, "department_id")?;
    Ok(ScopedGrant {
        user_id: UserId::from_db(col(row, "user_id")?),
        permission_id: PermissionId::from_db(col(row, "permission_id")?),
        scope: Scope {
            country_id: country_id.map(CountryId::from_db),
            region_id: region_id.map(RegionId::from_db),
            department_id: department_id.map(DepartmentId::from_db),
        },
        granted_at: col(row, "granted_at")?,
    })
}

fn collect<T>(rows: Vec<PgRow>, map: fn(&PgRow) -> StoreResult<T>) -> StoreResult<Vec<T>> {
    rows.iter().map(map).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Geography
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl GeographyStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn insert_country(&self, name: &str) -> StoreResult<Country> {
        let row = sqlx::query("INSERT INTO countries (name) VALUES ($1) RETURNING id, name")
            .bind(name)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_country", e))?;
        country_from_row(&row)
    }

    #[instrument(skip(self), fields(country_id = %country_id), err)]
    async fn insert_region(&self, country_id: CountryId, name: &str) -> StoreResult<Region> {
        let row = sqlx::query(
            "INSERT INTO regions (country_id, name) VALUES ($1, $2) RETURNING id, country_id, name",
        )
        .bind(i64::from(country_id))
        .bind(name)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_region", e))?;
        region_from_row(&row)
    }

    #[instrument(skip(self), fields(region_id = %region_id), err)]
    async fn insert_department(&self, region_id: RegionId, name: &str) -> StoreResult<Department> {
        let row = sqlx::query(
            "INSERT INTO departments (region_id, name) VALUES ($1, $2) RETURNING id, region_id, name",
        )
        .bind(i64::from(region_id))
        .bind(name)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_department", e))?;
        department_from_row(&row)
    }

    async fn country(&self, id: CountryId) -> StoreResult<Option<Country>> {
        sqlx::query("SELECT id, name FROM countries WHERE id = $1")
            .bind(i64::from(id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("country", e))?
            .as_ref()
            .map(country_from_row)
            .transpose()
    }

    async fn region(&self, id: RegionId) -> StoreResult<Option<Region>> {
        sqlx::query("SELECT id, country_id, name FROM regions WHERE id = $1")
            .bind(i64::from(id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("region", e))?
            .as_ref()
            .map(region_from_row)
            .transpose()
    }

    async fn department(&self, id: DepartmentId) -> StoreResult<Option<Department>> {
        sqlx::query("SELECT id, region_id, name FROM departments WHERE id = $1")
            .bind(i64::from(id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("department", e))?
            .as_ref()
            .map(department_from_row)
            .transpose()
    }

    async fn country_by_name(&self, name: &str) -> StoreResult<Option<Country>> {
        sqlx::query("SELECT id, name FROM countries WHERE name = $1")
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("country_by_name", e))?
            .as_ref()
            .map(country_from_row)
            .transpose()
    }

    async fn region_by_name(&self, country_id: CountryId, name: &str) -> StoreResult<Option<Region>> {
        sqlx::query("SELECT id, country_id, name FROM regions WHERE country_id = $1 AND name = $2")
            .bind(i64::from(country_id))
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("region_by_name", e))?
            .as_ref()
            .map(region_from_row)
            .transpose()
    }

    async fn department_by_name(&self, region_id: RegionId, name: &str) -> StoreResult<Option<Department>> {
        sqlx::query("SELECT id, region_id, name FROM departments WHERE region_id = $1 AND name = $2")
            .bind(i64::from(region_id))
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("department_by_name", e))?
            .as_ref()
            .map(department_from_row)
            .transpose()
    }

    async fn countries(&self) -> StoreResult<Vec<Country>> {
        let rows = sqlx::query("SELECT id, name FROM countries ORDER BY name COLLATE \"C\" ASC, id ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("countries", e))?;
        collect(rows, country_from_row)
    }

    async fn regions(&self, country_id: Option<CountryId>) -> StoreResult<Vec<Region>> {
        let rows = sqlx::query(
            r#"
            SELECT id, country_id, name
            FROM regions
            WHERE ($1::BIGINT IS NULL OR country_id = $1)
            ORDER BY name COLLATE "C" ASC, id ASC
            "#,
        )
        .bind(country_id.map(i64::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("regions", e))?;
        collect(rows, region_from_row)
    }

    async fn departments(&self, region_id: Option<RegionId>) -> StoreResult<Vec<Department>> {
        let rows = sqlx::query(
            r#"
            SELECT id, region_id, name
            FROM departments
            WHERE ($1::BIGINT IS NULL OR region_id = $1)
            ORDER BY name COLLATE "C" ASC, id ASC
            "#,
        )
        .bind(region_id.map(i64::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("departments", e))?;
        collect(rows, department_from_row)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl CatalogStore for PostgresStore {
    #[instrument(skip(self), err)]
    async fn insert_role(&self, name: &str, description: Option<&str>) -> StoreResult<Role> {
        let row = sqlx::query(
            "INSERT INTO roles (name, description) VALUES ($1, $2) RETURNING id, name, description",
        )
        .bind(name)
        .bind(description)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_role", e))?;
        role_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn insert_permission(&self, name: &str, description: Option<&str>) -> StoreResult<Permission> {
        let row = sqlx::query(
            "INSERT INTO permissions (name, description) VALUES ($1, $2) RETURNING id, name, description",
        )
        .bind(name)
        .bind(description)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_permission", e))?;
        permission_from_row(&row)
    }

    async fn role(&self, id: RoleId) -> StoreResult<Option<Role>> {
        sqlx::query("SELECT id, name, description FROM roles WHERE id = $1")
            .bind(i64::from(id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("role", e))?
            .as_ref()
            .map(role_from_row)
            .transpose()
    }

    async fn permission(&self, id: PermissionId) -> StoreResult<Option<Permission>> {
        sqlx::query("SELECT id, name, description FROM permissions WHERE id = $1")
            .bind(i64::from(id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("permission", e))?
            .as_ref()
            .map(permission_from_row)
            .transpose()
    }

    async fn role_by_name(&self, name: &str) -> StoreResult<Option<Role>> {
        sqlx::query("SELECT id, name, description FROM roles WHERE name = $1")
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("role_by_name", e))?
            .as_ref()
            .map(role_from_row)
            .transpose()
    }

    async fn permission_by_name(&self, name: &str) -> StoreResult<Option<Permission>> {
        sqlx::query("SELECT id, name, description FROM permissions WHERE name = $1")
            .bind(name)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("permission_by_name", e))?
            .as_ref()
            .map(permission_from_row)
            .transpose()
    }

    async fn roles(&self) -> StoreResult<Vec<Role>> {
        let rows = sqlx::query("SELECT id, name, description FROM roles ORDER BY name COLLATE \"C\" ASC, id ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("roles", e))?;
        collect(rows, role_from_row)
    }

    async fn permissions(&self) -> StoreResult<Vec<Permission>> {
        let rows = sqlx::query("SELECT id, name, description FROM permissions ORDER BY name COLLATE \"C\" ASC, id ASC")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("permissions", e))?;
        collect(rows, permission_from_row)
    }

    async fn role_permission_pairs(&self) -> StoreResult<Vec<(RoleId, PermissionId)>> {
        let rows = sqlx::query("SELECT role_id, permission_id FROM role_permissions")
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("role_permission_pairs", e))?;
        rows.iter()
            .map(|row| -> StoreResult<(RoleId, PermissionId)> {
                Ok((
                    RoleId::from_db(col(row, "role_id")?),
                    PermissionId::from_db(col(row, "permission_id")?),
                ))
            })
            .collect()
    }

    async fn role_permissions(&self, role_id: RoleId) -> StoreResult<Vec<Permission>> {
        let rows = sqlx::query(
            r#"
            SELECT p.id, p.name, p.description
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            WHERE rp.role_id = $1
            ORDER BY p.name COLLATE "C" ASC, p.id ASC
            "#,
        )
        .bind(i64::from(role_id))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("role_permissions", e))?;
        collect(rows, permission_from_row)
    }

    #[instrument(skip(self), fields(role_id = %role_id, permission_id = %permission_id), err)]
    async fn insert_role_permission(&self, role_id: RoleId, permission_id: PermissionId) -> StoreResult<()> {
        sqlx::query("INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)")
            .bind(i64::from(role_id))
            .bind(i64::from(permission_id))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_role_permission", e))?;
        Ok(())
    }

    async fn remove_role_permission(&self, role_id: RoleId, permission_id: PermissionId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2")
            .bind(i64::from(role_id))
            .bind(i64::from(permission_id))
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("remove_role_permission", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(role_id = %id), err)]
    async fn delete_role(&self, id: RoleId) -> StoreResult<Option<Role>> {
        sqlx::query("DELETE FROM roles WHERE id = $1 RETURNING id, name, description")
            .bind(i64::from(id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_role", e))?
            .as_ref()
            .map(role_from_row)
            .transpose()
    }

    #[instrument(skip(self), fields(permission_id = %id), err)]
    async fn delete_permission_cascade(&self, id: PermissionId) -> StoreResult<Option<PermissionRemoval>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let Some(row) = sqlx::query("SELECT id, name, description FROM permissions WHERE id = $1 FOR UPDATE")
            .bind(i64::from(id))
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("lock_permission", e))?
        else {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Ok(None);
        };
        let permission = permission_from_row(&row)?;

        let role_links_removed = sqlx::query("DELETE FROM role_permissions WHERE permission_id = $1")
            .bind(i64::from(id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_role_links", e))?
            .rows_affected();

        let user_grants_removed = sqlx::query("DELETE FROM user_permissions WHERE permission_id = $1")
            .bind(i64::from(id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_user_grants", e))?
            .rows_affected();

        sqlx::query("DELETE FROM permissions WHERE id = $1")
            .bind(i64::from(id))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("delete_permission", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(Some(PermissionRemoval {
            permission,
            role_links_removed,
            user_grants_removed,
        }))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Directory
// ─────────────────────────────────────────────────────────────────────────────

/// Skip-on-conflict grant inserts inside an open transaction.
///
/// `ON CONFLICT DO NOTHING` reports zero affected rows for a key that already
/// exists, which is how inserted and skipped keys are told apart.
async fn insert_grant_rows(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    grants: &[GrantKey],
) -> StoreResult<GrantBatchOutcome> {
    let mut outcome = GrantBatchOutcome::default();

    for key in grants {
        let affected = sqlx::query(
            r#"
            INSERT INTO user_permissions (user_id, permission_id, country_id, region_id, department_id)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(i64::from(user_id))
        .bind(i64::from(key.permission_id))
        .bind(key.scope.country_id.map(i64::from))
        .bind(key.scope.region_id.map(i64::from))
        .bind(key.scope.department_id.map(i64::from))
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_grant", e))?
        .rows_affected();

        if affected == 0 {
            outcome.skipped.push(*key);
        } else {
            outcome.inserted.push(*key);
        }
    }

    Ok(outcome)
}

const USER_COLUMNS: &str = "id, name, email, password_hash, role_id, department_id, created_at";

#[async_trait]
impl DirectoryStore for PostgresStore {
    #[instrument(
        skip(self, draft, grants),
        fields(role_id = %draft.role_id, grant_count = grants.len()),
        err
    )]
    async fn insert_user_with_grants(
        &self,
        draft: UserDraft,
        grants: &[GrantKey],
    ) -> StoreResult<(User, GrantBatchOutcome)> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO users (name, email, password_hash, role_id, department_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&draft.name)
        .bind(&draft.email)
        .bind(draft.credential.as_str())
        .bind(i64::from(draft.role_id))
        .bind(draft.department_id.map(i64::from))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_user", e))?;
        let user = user_from_row(&row)?;

        // An error here drops `tx`, which rolls the user row back too.
        let outcome = insert_grant_rows(&mut tx, user.id, grants).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok((user, outcome))
    }

    #[instrument(skip(self, grants), fields(user_id = %user_id, grant_count = grants.len()), err)]
    async fn insert_grants(&self, user_id: UserId, grants: &[GrantKey]) -> StoreResult<GrantBatchOutcome> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let outcome = insert_grant_rows(&mut tx, user_id, grants).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(outcome)
    }

    #[instrument(skip(self), fields(user_id = %user_id, grant = %key), err)]
    async fn remove_grant(&self, user_id: UserId, key: &GrantKey) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM user_permissions
            WHERE user_id = $1
              AND permission_id = $2
              AND country_id IS NOT DISTINCT FROM $3
              AND region_id IS NOT DISTINCT FROM $4
              AND department_id IS NOT DISTINCT FROM $5
            "#,
        )
        .bind(i64::from(user_id))
        .bind(i64::from(key.permission_id))
        .bind(key.scope.country_id.map(i64::from))
        .bind(key.scope.region_id.map(i64::from))
        .bind(key.scope.department_id.map(i64::from))
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("remove_grant", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(i64::from(id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user", e))?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user_by_email", e))?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }

    async fn users(&self) -> StoreResult<Vec<User>> {
        let rows = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY name COLLATE \"C\" ASC, id ASC"
        ))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("users", e))?;
        collect(rows, user_from_row)
    }

    async fn grants(&self, user_id: Option<UserId>) -> StoreResult<Vec<ScopedGrant>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, permission_id, country_id, region_id, department_id, granted_at
            FROM user_permissions
            WHERE ($1::BIGINT IS NULL OR user_id = $1)
            ORDER BY user_id ASC, id ASC
            "#,
        )
        .bind(user_id.map(i64::from))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("grants", e))?;
        collect(rows, grant_from_row)
    }

    #[instrument(skip(self), fields(user_id = %id), err)]
    async fn delete_user(&self, id: UserId) -> StoreResult<Option<User>> {
        sqlx::query(&format!("DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}"))
            .bind(i64::from(id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_user", e))?
            .as_ref()
            .map(user_from_row)
            .transpose()
    }
}

/// Map SQLx errors to `StoreError`, keeping the violated constraint name.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let constraint = db_err.constraint().unwrap_or_default().to_string();
            match db_err.code().as_deref() {
                Some("23505") => StoreError::UniqueViolation { constraint },
                Some("23503") => StoreError::ForeignKeyViolation { constraint },
                _ => StoreError::Backend(format!(
                    "database error in {}: {}",
                    operation,
                    db_err.message()
                )),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Backend(format!("connection pool closed in {}", operation)),
        _ => StoreError::Backend(format!("sqlx error in {}: {}", operation, err)),
    }
}
