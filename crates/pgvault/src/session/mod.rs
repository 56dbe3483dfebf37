//! Session lifecycle: storage registry and database sessions.
//!
//! The registry owns one engine handle per logical storage name and is the
//! only place handles are created, so every consumer of the same storage
//! routes through the same handle. Sessions own the derived state - parsed
//! descriptors and per-table operations - and rebuild it whenever their
//! configuration changes, guarding against stale initializations with a
//! generation counter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::crypto::EncryptionKey;
use crate::engine::{PgEngine, StorageEngine};
use crate::error::Result;
use crate::ops::{build_tables, TableOps};
use crate::schema::{parse_tables, TableDescriptor};

/// Process-wide registry of storage engines, keyed by storage name.
///
/// At most one engine exists per name; opening the same name twice returns
/// the same handle. Engines are created lazily from the registry's
/// connection configuration, or injected up front with
/// [`StorageRegistry::register`].
pub struct StorageRegistry {
    connection: ConnectionConfig,
    engines: Mutex<HashMap<String, Arc<dyn StorageEngine>>>,
}

impl StorageRegistry {
    /// Create a registry that connects with the given configuration.
    #[must_use]
    pub fn new(connection: ConnectionConfig) -> Self {
        Self {
            connection,
            engines: Mutex::new(HashMap::new()),
        }
    }

    /// Get the engine for a storage name, connecting if none exists yet.
    pub async fn open(&self, storage: &str) -> Result<Arc<dyn StorageEngine>> {
        let mut engines = self.engines.lock().await;
        if let Some(engine) = engines.get(storage) {
            return Ok(engine.clone());
        }
        let engine: Arc<dyn StorageEngine> =
            Arc::new(PgEngine::connect(&self.connection, storage).await?);
        engines.insert(storage.to_string(), engine.clone());
        Ok(engine)
    }

    /// Pre-register an engine under a storage name, replacing any existing
    /// handle. Lets callers plug in a non-PostgreSQL engine.
    pub async fn register(&self, storage: &str, engine: Arc<dyn StorageEngine>) {
        self.engines
            .lock()
            .await
            .insert(storage.to_string(), engine);
    }

    /// Close and drop the engine for a storage name. Returns whether one
    /// existed.
    pub async fn close(&self, storage: &str) -> bool {
        let engine = self.engines.lock().await.remove(storage);
        match engine {
            Some(engine) => {
                engine.close().await;
                true
            }
            None => false,
        }
    }

    /// Close every registered engine.
    pub async fn close_all(&self) {
        let engines: Vec<_> = self.engines.lock().await.drain().collect();
        for (_, engine) in engines {
            engine.close().await;
        }
    }
}

/// A session's configuration: which storage, which schema, which key.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Logical storage name.
    pub storage: String,

    /// Schema definition text; initialization runs it verbatim, so it must
    /// use `IF NOT EXISTS` semantics to stay idempotent.
    pub schema_text: String,

    /// Active encryption key, if any. Rotating the key means reconfiguring
    /// the session.
    pub key: Option<EncryptionKey>,
}

struct SessionState {
    engine: Option<Arc<dyn StorageEngine>>,
    descriptors: Vec<TableDescriptor>,
    tables: HashMap<String, TableOps>,
    ready: bool,
    last_error: Option<String>,
}

/// Owner of one configured view onto a storage: parsed descriptors plus the
/// per-table operations map, rebuilt on every reconfiguration.
///
/// Reconfiguration is supersede-able: if `configure` is called again while a
/// previous call is still initializing, the older attempt discards its
/// results instead of overwriting newer state.
pub struct DatabaseSession {
    registry: Arc<StorageRegistry>,
    state: RwLock<SessionState>,
    generation: AtomicU64,
}

impl DatabaseSession {
    /// Create an unconfigured session backed by a registry.
    #[must_use]
    pub fn new(registry: Arc<StorageRegistry>) -> Self {
        Self {
            registry,
            state: RwLock::new(SessionState {
                engine: None,
                descriptors: Vec::new(),
                tables: HashMap::new(),
                ready: false,
                last_error: None,
            }),
            generation: AtomicU64::new(0),
        }
    }

    /// Apply a configuration: acquire the engine, run schema initialization,
    /// and rebuild the per-table operations.
    ///
    /// Initialization is idempotent (the schema text's `IF NOT EXISTS`
    /// semantics make re-running it safe). A call superseded by a newer
    /// `configure` discards its work and returns `Ok(())`; its errors are
    /// discarded too.
    pub async fn configure(&self, config: SessionConfig) -> Result<()> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            "configuring session for storage {} (generation {})",
            config.storage, generation
        );

        {
            let mut state = self.state.write().await;
            state.ready = false;
        }

        match self.initialize(&config).await {
            Ok((engine, descriptors, tables)) => {
                let mut state = self.state.write().await;
                if self.generation.load(Ordering::SeqCst) != generation {
                    debug!(
                        "discarding superseded initialization for storage {}",
                        config.storage
                    );
                    return Ok(());
                }
                info!(
                    "session ready: storage {} with {} tables (encryption {})",
                    config.storage,
                    descriptors.len(),
                    if config.key.is_some() { "on" } else { "off" }
                );
                state.engine = Some(engine);
                state.descriptors = descriptors;
                state.tables = tables;
                state.ready = true;
                state.last_error = None;
                Ok(())
            }
            Err(e) => {
                let mut state = self.state.write().await;
                if self.generation.load(Ordering::SeqCst) != generation {
                    debug!(
                        "discarding superseded initialization failure for storage {}: {}",
                        config.storage, e
                    );
                    return Ok(());
                }
                state.ready = false;
                state.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn initialize(
        &self,
        config: &SessionConfig,
    ) -> Result<(
        Arc<dyn StorageEngine>,
        Vec<TableDescriptor>,
        HashMap<String, TableOps>,
    )> {
        let descriptors = parse_tables(&config.schema_text);
        let engine = self.registry.open(&config.storage).await?;
        engine.batch_execute(&config.schema_text).await?;
        let tables = build_tables(engine.clone(), &descriptors, config.key.as_ref());
        Ok((engine, descriptors, tables))
    }

    /// Whether the last configuration completed successfully.
    pub async fn is_ready(&self) -> bool {
        self.state.read().await.ready
    }

    /// The last initialization error, if the session is not ready because
    /// of one.
    pub async fn last_error(&self) -> Option<String> {
        self.state.read().await.last_error.clone()
    }

    /// Operations for one table, if the session is ready and the schema
    /// defines it.
    pub async fn table(&self, name: &str) -> Option<TableOps> {
        let state = self.state.read().await;
        if !state.ready {
            return None;
        }
        state.tables.get(name).cloned()
    }

    /// Names of all tables the current schema defines.
    pub async fn table_names(&self) -> Vec<String> {
        let state = self.state.read().await;
        state.descriptors.iter().map(|t| t.name.clone()).collect()
    }

    /// Parsed descriptor for one table.
    pub async fn descriptor(&self, name: &str) -> Option<TableDescriptor> {
        let state = self.state.read().await;
        state
            .descriptors
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }
}
