use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    routing::get,
};

use serde_json::json;

use geoaccess_auth::ScopeRef;
use geoaccess_core::{DomainResult, required_id};

use crate::app::{dto, errors, extract::ApiJson, services::AppServices};

pub fn router() -> Router {
    Router::new()
        .route("/countries", get(list_countries).post(create_country))
        .route("/regions", get(list_regions).post(create_region))
        .route("/departments", get(list_departments).post(create_department))
        .route("/scopes/:tag", get(describe_scope))
}

pub async fn create_country(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::CreateCountryRequest>,
) -> axum::response::Response {
    let result = services.console.geography.create_country(&body.name).await;
    errors::respond(StatusCode::CREATED, result)
}

pub async fn list_countries(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::CountriesQuery>,
) -> axum::response::Response {
    let with_descendants = query.with_descendants.unwrap_or(true);
    let result = services.console.geography.list_countries(with_descendants).await;
    errors::respond(StatusCode::OK, result)
}

pub async fn create_region(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::CreateRegionRequest>,
) -> axum::response::Response {
    let country_id = match required_id("country_id", body.country_id.as_ref()) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let result = services.console.geography.create_region(&body.name, country_id).await;
    errors::respond(StatusCode::CREATED, result)
}

pub async fn list_regions(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::RegionsQuery>,
) -> axum::response::Response {
    let country_id = dto::query_id(query.country_id);
    let result = services.console.geography.list_regions(country_id).await;
    errors::respond(StatusCode::OK, result)
}

pub async fn create_department(
    Extension(services): Extension<Arc<AppServices>>,
    ApiJson(body): ApiJson<dto::CreateDepartmentRequest>,
) -> axum::response::Response {
    let region_id = match required_id("region_id", body.region_id.as_ref()) {
        Ok(id) => id,
        Err(e) => return errors::domain_error_to_response(e),
    };
    let result = services.console.geography.create_department(&body.name, region_id).await;
    errors::respond(StatusCode::CREATED, result)
}

pub async fn list_departments(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<dto::DepartmentsQuery>,
) -> axum::response::Response {
    let region_id = dto::query_id(query.region_id);
    let result = services.console.geography.list_departments(region_id).await;
    errors::respond(StatusCode::OK, result)
}

/// Resolve a flat scope tag (`pais:3`, `region:5`, `departamento:7`, `global`)
/// to its ancestry, stored triple and display label.
pub async fn describe_scope(
    Extension(services): Extension<Arc<AppServices>>,
    Path(tag): Path<String>,
) -> axum::response::Response {
    errors::respond(StatusCode::OK, scope_view(&services, &tag).await)
}

async fn scope_view(services: &AppServices, tag: &str) -> DomainResult<serde_json::Value> {
    let target: ScopeRef = tag.parse()?;
    let ancestry = services.console.resolver.resolve_ancestry(target).await?;
    Ok(json!({
        "scope": ancestry.scope(),
        "label": ancestry.label(),
        "ancestry": ancestry,
    }))
}
