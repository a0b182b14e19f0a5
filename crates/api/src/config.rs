//! Process configuration, read once from the environment at startup.

use anyhow::{Context, bail};

pub const BIND_ADDR_ENV: &str = "GEOACCESS_BIND_ADDR";
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";
pub const MAX_CONNECTIONS_ENV: &str = "GEOACCESS_DB_MAX_CONNECTIONS";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: String,
    /// `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let max_connections = match get(MAX_CONNECTIONS_ENV) {
            Some(raw) => {
                let n: u32 = raw
                    .parse()
                    .with_context(|| format!("{MAX_CONNECTIONS_ENV} must be a positive integer, got '{raw}'"))?;
                if n == 0 {
                    bail!("{MAX_CONNECTIONS_ENV} must be a positive integer, got 0");
                }
                n
            }
            None => DEFAULT_MAX_CONNECTIONS,
        };

        Ok(Self {
            bind_addr: get(BIND_ADDR_ENV).unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            database_url: get(DATABASE_URL_ENV),
            max_connections,
        })
    }
}
