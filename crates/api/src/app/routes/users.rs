use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path},
    http::StatusCode,
    routing::get,
};

use geoaccess_core::{DomainResult, UserId};

use crate::app::{dto, errors, extract::ApiJson, routes::path_id, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:id", get(get_user).delete(delete_user))
        .route(
            "/:id/grants",
            get(list_grants).post(grant_permissions).delete(revoke_grant),
        )
}

/// Create a user together with its initial grants in one write.
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::CreateUserRequest>,
) -> axum::response::Response {
    let (new_user, grants) = match body.into_parts() {
        Ok(parts) => parts,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let result = services
        .console
        .grants
        .create_user_with_grants(new_user, &grants)
        .await;
    errors::respond(StatusCode::CREATED, result)
}

pub async fn list_users(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    errors::respond(StatusCode::OK, services.console.directory.list_users().await)
}

pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let user_id: UserId = match path_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    errors::respond(StatusCode::OK, services.console.directory.profile(user_id).await)
}

pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let user_id: UserId = match path_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    errors::respond(StatusCode::OK, services.console.directory.delete_user(user_id).await)
}

// ─────────────────────────────────────────────────────────────────────────────
// Grants
// ─────────────────────────────────────────────────────────────────────────────

pub async fn list_grants(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let user_id: UserId = match path_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let result = services.console.grants.resolve_effective_grants(user_id).await;
    errors::respond(StatusCode::OK, result)
}

pub async fn grant_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::GrantBatchRequest>,
) -> axum::response::Response {
    let user_id: UserId = match path_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let requests = match dto::grant_requests(&body.grants) {
        Ok(requests) => requests,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let result = services.console.grants.grant_permissions(user_id, &requests).await;
    errors::respond(StatusCode::OK, result)
}

/// Body: one grant in the same shape as the batch entries.
pub async fn revoke_grant(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<dto::GrantInput>,
) -> axum::response::Response {
    let user_id: UserId = match path_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    errors::respond(StatusCode::OK, revoke(&services, user_id, &body).await)
}

async fn revoke(services: &AppServices, user_id: UserId, input: &dto::GrantInput) -> DomainResult<serde_json::Value> {
    let request = input.to_request()?;
    let key = services
        .console
        .grants
        .revoke_grant(user_id, request.permission_id, request.scope)
        .await?;
    Ok(serde_json::json!({ "revoked": key.canonical() }))
}
