//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// PostgreSQL connection configuration.
    pub connection: ConnectionConfig,

    /// Store configuration (storage name, schema file).
    pub store: StoreConfig,
}

/// PostgreSQL connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never serialized back out.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Maximum pool connections per storage (default: 4).
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Logical storage name. Maps to a PostgreSQL schema namespace; reusing
    /// the same name always yields the same underlying data.
    #[serde(default = "default_storage")]
    pub storage: String,

    /// Path to the schema definition file.
    pub schema_file: PathBuf,
}

fn default_pg_port() -> u16 {
    5432
}

fn default_pool_size() -> usize {
    4
}

fn default_storage() -> String {
    "vault".to_string()
}
