//! Storage boundary for the scoped-authorization graph.
//!
//! The services assume the store can perform atomic multi-row writes and
//! enforce unique constraints; this module defines that contract without making
//! any assumption about the engine behind it.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use r#trait::{
    AccessStore, CatalogStore, DirectoryStore, GeographyStore, StoreError, StoreResult, constraints,
};
