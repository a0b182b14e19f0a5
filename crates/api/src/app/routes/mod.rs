use axum::Router;

pub mod catalog;
pub mod geography;
pub mod system;
pub mod users;

/// Router for every endpoint except `/health`.
pub fn router() -> Router {
    Router::new()
        .merge(geography::router())
        .nest("/roles", catalog::roles_router())
        .nest("/permissions", catalog::permissions_router())
        .nest("/users", users::router())
}

/// Parse a path segment into an id; a bad segment is a validation error.
pub(crate) fn path_id<T>(raw: &str) -> Result<T, axum::response::Response>
where
    T: core::str::FromStr<Err = geoaccess_core::DomainError>,
{
    raw.parse().map_err(super::errors::domain_error_to_response)
}
