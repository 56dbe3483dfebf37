//! Storage engine abstraction.
//!
//! All data access goes through the [`StorageEngine`] trait so the CRUD
//! layer and session stay engine-agnostic: production binds PostgreSQL via
//! [`PgEngine`], tests substitute a recording engine.

pub mod postgres;

pub use postgres::PgEngine;

use crate::core::{Row, Value};
use crate::error::Result;
use async_trait::async_trait;

/// A live handle to one logical storage instance.
///
/// Implementations are shared (`Arc`) and internally pooled; every method is
/// self-contained, so an abandoned call leaves no partial state behind.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Execute a multi-statement SQL batch.
    ///
    /// Used for schema initialization; atomicity across the statements is
    /// whatever the engine's own batch semantics provide.
    async fn batch_execute(&self, sql: &str) -> Result<()>;

    /// Run a parameterized query and return the resulting rows, in engine
    /// order.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Run a parameterized statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Close the engine, releasing pooled connections.
    async fn close(&self);
}
