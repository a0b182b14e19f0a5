//! Application services over the access store.
//!
//! Each service owns a handle to the store and is injected where needed;
//! nothing reaches storage through global state.

pub mod catalog;
pub mod directory;
pub mod geography;
pub mod grants;
pub mod resolver;

use std::sync::Arc;

use geoaccess_auth::CredentialHasher;

pub use catalog::CatalogService;
pub use directory::UserDirectory;
pub use geography::GeographyService;
pub use grants::{CreatedUser, GrantEngine};
pub use resolver::{HierarchySnapshot, ScopeResolver};

use crate::store::AccessStore;

/// All services wired to one store.
pub struct AccessConsole<S: ?Sized> {
    pub geography: GeographyService<S>,
    pub catalog: CatalogService<S>,
    pub resolver: ScopeResolver<S>,
    pub directory: UserDirectory<S>,
    pub grants: GrantEngine<S>,
}

impl<S: ?Sized> Clone for AccessConsole<S> {
    fn clone(&self) -> Self {
        Self {
            geography: self.geography.clone(),
            catalog: self.catalog.clone(),
            resolver: self.resolver.clone(),
            directory: self.directory.clone(),
            grants: self.grants.clone(),
        }
    }
}

impl<S> AccessConsole<S>
where
    S: AccessStore + ?Sized,
{
    pub fn new(store: Arc<S>, hasher: Arc<dyn CredentialHasher>) -> Self {
        let directory = UserDirectory::new(Arc::clone(&store), hasher);
        Self {
            geography: GeographyService::new(Arc::clone(&store)),
            catalog: CatalogService::new(Arc::clone(&store)),
            resolver: ScopeResolver::new(Arc::clone(&store)),
            grants: GrantEngine::new(store, directory.clone()),
            directory,
        }
    }
}
