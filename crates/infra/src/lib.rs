//! Infrastructure layer: storage engines, application services, credential hashing.

pub mod credentials;
pub mod services;
pub mod store;

mod integration_tests;

pub use credentials::Argon2Hasher;
pub use services::{
    AccessConsole, CatalogService, CreatedUser, GeographyService, GrantEngine, ScopeResolver,
    UserDirectory,
};
pub use store::{AccessStore, InMemoryStore, PostgresStore, StoreError};
