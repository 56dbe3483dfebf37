//! # pgvault
//!
//! Typed, transparently-encrypted data access over PostgreSQL.
//!
//! This library parses a Postgres-flavored schema definition into table and
//! column descriptors, derives per-table CRUD operations (plus vector
//! search for tables with an embedding column), and transparently encrypts
//! TEXT columns with AES-256-GCM when an encryption key is active:
//!
//! - **Schema parsing** into typed descriptors, one pass, shared everywhere
//! - **Typed CRUD** - create, find_many, find_unique, update, delete,
//!   delete_many - with validation before any I/O
//! - **Transparent field encryption**: callers see plaintext, storage holds
//!   ciphertext
//! - **Vector search** over pgvector embedding columns
//! - **Session lifecycle** with idempotent schema initialization and
//!   supersede-safe reconfiguration
//!
//! ## Example
//!
//! ```rust,no_run
//! use pgvault::{Config, DatabaseSession, Row, SessionConfig, StorageRegistry};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> pgvault::Result<()> {
//!     let config = Config::load("pgvault.yaml")?;
//!     let schema_text = config.schema_text()?;
//!     let registry = Arc::new(StorageRegistry::new(config.connection.clone()));
//!
//!     let session = DatabaseSession::new(registry);
//!     session
//!         .configure(SessionConfig {
//!             storage: config.store.storage.clone(),
//!             schema_text,
//!             key: None,
//!         })
//!         .await?;
//!
//!     if let Some(notes) = session.table("notes").await {
//!         let row = notes.create(Row::new().with("body", "hello")).await?;
//!         println!("created: {:?}", row);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod crypto;
pub mod engine;
pub mod error;
pub mod ops;
pub mod schema;
pub mod session;

// Re-exports for convenient access
pub use config::{Config, ConnectionConfig, StoreConfig};
pub use self::core::{Row, Value};
pub use crypto::{decrypt_value, encrypt_value, EncryptionKey, DECRYPT_FAILED_SENTINEL};
pub use engine::{PgEngine, StorageEngine};
pub use error::{Result, VaultError};
pub use ops::{build_from_schema, build_tables, FindOptions, OrderBy, TableOps};
pub use schema::{extract_columns, parse_tables, ColumnDescriptor, SqlType, TableDescriptor, ValueType};
pub use session::{DatabaseSession, SessionConfig, StorageRegistry};
