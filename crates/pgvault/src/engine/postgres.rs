//! PostgreSQL storage engine over a deadpool connection pool.

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use chrono::{DateTime, NaiveDateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::types::{to_sql_checked, IsNull, Kind, ToSql, Type};
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::core::identifier::{quote_ident, validate_storage_name};
use crate::core::{format_vector, Row, Value};
use crate::engine::StorageEngine;
use crate::error::{Result, VaultError};

/// PostgreSQL implementation of [`StorageEngine`].
///
/// Each engine is pinned to one storage namespace: the pool's connections
/// carry a `search_path` pointing at the storage's schema, and the schema is
/// created on connect with `CREATE SCHEMA IF NOT EXISTS`.
pub struct PgEngine {
    pool: Pool,
    storage: String,
}

impl PgEngine {
    /// Connect to PostgreSQL and bind the engine to a storage namespace.
    pub async fn connect(config: &ConnectionConfig, storage: &str) -> Result<Self> {
        validate_storage_name(storage)?;

        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        // Unqualified table names in generated SQL resolve to this storage
        pg_config.options(format!("-c search_path={},public", storage));

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(config.pool_size)
            .build()
            .map_err(|e| VaultError::pool(format!("Failed to create pool: {}", e), storage))?;

        // Smoke-test the connection and make sure the namespace exists
        let client = pool
            .get()
            .await
            .map_err(|e| VaultError::pool(format!("Failed to get connection: {}", e), storage))?;
        client
            .batch_execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(storage)?))
            .await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{} (storage: {})",
            config.host, config.port, config.database, storage
        );

        Ok(Self {
            pool,
            storage: storage.to_string(),
        })
    }

    /// The storage name this engine is bound to.
    #[must_use]
    pub fn storage(&self) -> &str {
        &self.storage
    }

    async fn client(&self) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| VaultError::pool(format!("Failed to get connection: {}", e), &self.storage))
    }
}

#[async_trait]
impl StorageEngine for PgEngine {
    async fn batch_execute(&self, sql: &str) -> Result<()> {
        debug!("batch executing {} bytes of SQL", sql.len());
        let client = self.client().await?;
        client.batch_execute(sql).await?;
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        debug!("query: {}", sql);
        let client = self.client().await?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = client.query(sql, &param_refs).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        debug!("execute: {}", sql);
        let client = self.client().await?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        Ok(client.execute(sql, &param_refs).await?)
    }

    async fn close(&self) {
        self.pool.close();
    }
}

// =============================================================================
// Wire conversion
// =============================================================================

impl ToSql for Value {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(b) => b.to_sql(ty, out),
            Value::Int(i) => {
                if *ty == Type::INT2 {
                    (*i as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*i as i32).to_sql(ty, out)
                } else {
                    i.to_sql(ty, out)
                }
            }
            Value::Float(f) => {
                if *ty == Type::FLOAT4 {
                    (*f as f32).to_sql(ty, out)
                } else {
                    f.to_sql(ty, out)
                }
            }
            Value::Text(s) => {
                if matches!(ty.kind(), Kind::Enum(_)) {
                    // Enum wire format is the bare label
                    out.put_slice(s.as_bytes());
                    Ok(IsNull::No)
                } else {
                    s.to_sql(ty, out)
                }
            }
            Value::Timestamp(t) => {
                if *ty == Type::TIMESTAMPTZ {
                    DateTime::<Utc>::from_naive_utc_and_offset(*t, Utc).to_sql(ty, out)
                } else {
                    t.to_sql(ty, out)
                }
            }
            Value::Json(j) => j.to_sql(ty, out),
            Value::Vector(v) => {
                if ty.name() == "vector" {
                    // pgvector binary format: dim, unused, then f32 elements
                    out.put_u16(u16::try_from(v.len())?);
                    out.put_u16(0);
                    for f in v {
                        out.put_f32(*f);
                    }
                    Ok(IsNull::No)
                } else {
                    format_vector(v).to_sql(ty, out)
                }
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Coercion is decided per-value at bind time; mismatches surface as
        // engine errors
        true
    }

    to_sql_checked!();
}

/// Decode an engine row into an ordered name -> value mapping.
fn decode_row(row: &tokio_postgres::Row) -> Row {
    let mut out = Row::new();
    for (idx, col) in row.columns().iter().enumerate() {
        out.insert(col.name().to_string(), decode_column(row, idx, col.type_()));
    }
    out
}

fn decode_column(row: &tokio_postgres::Row, idx: usize, ty: &Type) -> Value {
    fn get<'a, T>(row: &'a tokio_postgres::Row, idx: usize, into: impl Fn(T) -> Value) -> Value
    where
        T: tokio_postgres::types::FromSql<'a>,
    {
        match row.try_get::<_, Option<T>>(idx) {
            Ok(Some(v)) => into(v),
            Ok(None) => Value::Null,
            Err(e) => {
                warn!("failed to decode column {}: {}", idx, e);
                Value::Null
            }
        }
    }

    if *ty == Type::BOOL {
        get::<bool>(row, idx, Value::Bool)
    } else if *ty == Type::INT2 {
        get::<i16>(row, idx, |v| Value::Int(v as i64))
    } else if *ty == Type::INT4 {
        get::<i32>(row, idx, |v| Value::Int(v as i64))
    } else if *ty == Type::INT8 {
        get::<i64>(row, idx, Value::Int)
    } else if *ty == Type::FLOAT4 {
        get::<f32>(row, idx, |v| Value::Float(v as f64))
    } else if *ty == Type::FLOAT8 {
        get::<f64>(row, idx, Value::Float)
    } else if *ty == Type::TEXT
        || *ty == Type::VARCHAR
        || *ty == Type::BPCHAR
        || *ty == Type::NAME
        || *ty == Type::UNKNOWN
    {
        get::<String>(row, idx, Value::Text)
    } else if *ty == Type::TIMESTAMP {
        get::<NaiveDateTime>(row, idx, Value::Timestamp)
    } else if *ty == Type::TIMESTAMPTZ {
        get::<DateTime<Utc>>(row, idx, |v| Value::Timestamp(v.naive_utc()))
    } else if *ty == Type::JSON || *ty == Type::JSONB {
        get::<serde_json::Value>(row, idx, Value::Json)
    } else if matches!(ty.kind(), Kind::Enum(_)) {
        get::<EnumLabel>(row, idx, |v| Value::Text(v.0))
    } else {
        // Generated projections cast vector and unrecognized columns to
        // text, so this only fires for SQL written outside the CRUD layer
        warn!("unsupported column type {} at index {}", ty.name(), idx);
        Value::Null
    }
}

/// Reads a PostgreSQL enum value as its label.
struct EnumLabel(String);

impl<'a> tokio_postgres::types::FromSql<'a> for EnumLabel {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(EnumLabel(std::str::from_utf8(raw)?.to_string()))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(ty.kind(), Kind::Enum(_))
    }
}
