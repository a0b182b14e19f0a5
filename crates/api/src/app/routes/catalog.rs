use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::{delete, get, post},
};

use geoaccess_core::{PermissionId, RoleId, required_id};

use crate::app::{dto, errors, extract::ApiJson, routes::path_id, services::AppServices};

pub fn roles_router() -> Router {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/assign", post(assign_permission))
        .route("/:id", delete(delete_role))
        .route("/:id/permissions/:permission_id", delete(revoke_permission))
}

pub fn permissions_router() -> Router {
    Router::new()
        .route("/", get(list_permissions).post(create_permission))
        .route("/:id", delete(delete_permission))
}

// ─────────────────────────────────────────────────────────────────────────────
// Roles
// ─────────────────────────────────────────────────────────────────────────────

pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::CreateCatalogEntryRequest>,
) -> axum::response::Response {
    let result = services
        .console
        .catalog
        .create_role(&body.name, body.description.as_deref())
        .await;
    errors::respond(StatusCode::CREATED, result)
}

pub async fn list_roles(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    errors::respond(StatusCode::OK, services.console.catalog.list_roles().await)
}

pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let role_id: RoleId = match path_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    errors::respond(StatusCode::OK, services.console.catalog.delete_role(role_id).await)
}

pub async fn assign_permission(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::AssignPermissionRequest>,
) -> axum::response::Response {
    let ids = required_id::<RoleId>("role_id", body.role_id.as_ref()).and_then(|role_id| {
        required_id::<PermissionId>("permission_id", body.permission_id.as_ref()).map(|p| (role_id, p))
    });
    let (role_id, permission_id) = match ids {
        Ok(ids) => ids,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let result = services
        .console
        .catalog
        .assign_permission_to_role(role_id, permission_id)
        .await;
    errors::respond(StatusCode::CREATED, result)
}

pub async fn revoke_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Path((id, permission_id)): Path<(String, String)>,
) -> axum::response::Response {
    let (role_id, permission_id): (RoleId, PermissionId) = match (path_id(&id), path_id(&permission_id)) {
        (Ok(r), Ok(p)) => (r, p),
        (Err(response), _) | (_, Err(response)) => return response,
    };

    let result = services
        .console
        .catalog
        .revoke_permission_from_role(role_id, permission_id)
        .await;
    errors::respond(StatusCode::OK, result)
}

// ─────────────────────────────────────────────────────────────────────────────
// Permissions
// ─────────────────────────────────────────────────────────────────────────────

pub async fn create_permission(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::CreateCatalogEntryRequest>,
) -> axum::response::Response {
    let result = services
        .console
        .catalog
        .create_permission(&body.name, body.description.as_deref())
        .await;
    errors::respond(StatusCode::CREATED, result)
}

pub async fn list_permissions(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    errors::respond(StatusCode::OK, services.console.catalog.list_permissions().await)
}

/// Removes the permission together with its role links and user grants.
pub async fn delete_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let permission_id: PermissionId = match path_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    errors::respond(StatusCode::OK, services.console.catalog.delete_permission(permission_id).await)
}
