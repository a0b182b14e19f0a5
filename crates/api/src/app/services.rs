use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use geoaccess_infra::{AccessConsole, AccessStore, Argon2Hasher, InMemoryStore, PostgresStore};

use crate::config::AppConfig;

/// Which store the process is running against.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres,
}

impl StoreBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreBackend::InMemory => "in_memory",
            StoreBackend::Postgres => "postgres",
        }
    }
}

/// Shared services handed to every handler through an `Extension`.
pub struct AppServices {
    pub console: AccessConsole<dyn AccessStore>,
    pub backend: StoreBackend,
}

impl AppServices {
    pub fn new(store: Arc<dyn AccessStore>, backend: StoreBackend) -> Self {
        Self {
            console: AccessConsole::new(store, Arc::new(Argon2Hasher::new())),
            backend,
        }
    }

    /// Fresh, empty in-memory store. Used when no database is configured and
    /// by the black-box tests.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryStore::new()), StoreBackend::InMemory)
    }
}

/// Pick the store from configuration: Postgres when `DATABASE_URL` is set
/// (schema applied on connect), the in-memory store otherwise.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let Some(url) = config.database_url.as_deref() else {
        warn!("DATABASE_URL not set; using in-memory store, data will not survive a restart");
        return Ok(AppServices::in_memory());
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(url)
        .await
        .context("failed to connect to postgres")?;

    let store = PostgresStore::new(pool);
    store.migrate().await.context("failed to apply schema")?;
    info!(max_connections = config.max_connections, "postgres store ready");

    Ok(AppServices::new(Arc::new(store), StoreBackend::Postgres))
}
