//! Per-table CRUD operations with transparent field encryption.
//!
//! [`build_tables`] turns parsed table descriptors, a storage engine handle
//! and an optional encryption key into one [`TableOps`] per table. Writers
//! encrypt eligible TEXT fields before any SQL is issued; readers decrypt
//! them before rows reach the caller, so the caller only ever sees plaintext
//! while storage only ever holds ciphertext.
//!
//! Failure semantics: engine errors propagate verbatim; payload problems are
//! `Validation` errors raised before any I/O; a field that fails to decrypt
//! is replaced by the sentinel marker (and logged) instead of aborting the
//! whole read.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::{parse_vector, quote_ident, Row, Value};
use crate::crypto::{self, EncryptionKey, DECRYPT_FAILED_SENTINEL};
use crate::engine::StorageEngine;
use crate::error::{Result, VaultError};
use crate::schema::{parse_tables, TableDescriptor, ValueType};

/// Default similarity threshold for [`TableOps::search`].
///
/// Distance is pgvector's `<#>` (negated inner product): more-similar rows
/// have smaller, more negative distances. The caller-facing similarity
/// threshold is negated exactly once, into the distance bound
/// `distance < -threshold`, and the same `<#>` expression drives both the
/// WHERE filter and the ascending ORDER BY.
pub const DEFAULT_SEARCH_THRESHOLD: f64 = 0.8;

/// Default result limit for [`TableOps::search`].
pub const DEFAULT_SEARCH_LIMIT: i64 = 10;

/// Options for [`TableOps::find_many`].
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// Equality filter; all entries must match.
    pub filter: Option<Row>,

    /// Result ordering. Without it, engine order is preserved.
    pub order_by: Option<OrderBy>,

    /// Maximum number of rows to return.
    pub limit: Option<i64>,

    /// Number of rows to skip.
    pub offset: Option<i64>,
}

/// Result ordering for [`TableOps::find_many`].
#[derive(Debug, Clone)]
pub struct OrderBy {
    /// Column to order by.
    pub column: String,

    /// Descending instead of ascending.
    pub descending: bool,
}

impl OrderBy {
    /// Ascending order on a column.
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    /// Descending order on a column.
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// CRUD operations over a single table.
///
/// Cheap to clone; the engine handle, descriptor and key are shared.
#[derive(Clone)]
pub struct TableOps {
    engine: Arc<dyn StorageEngine>,
    table: Arc<TableDescriptor>,
    key: Option<EncryptionKey>,
    encrypted_fields: Arc<Vec<String>>,
}

/// Build the per-table operations map from already-parsed descriptors.
///
/// Encryption eligibility is computed here, once per table: TEXT columns
/// when a key is active, nothing otherwise.
pub fn build_tables(
    engine: Arc<dyn StorageEngine>,
    tables: &[TableDescriptor],
    key: Option<&EncryptionKey>,
) -> HashMap<String, TableOps> {
    tables
        .iter()
        .map(|table| {
            let ops = TableOps::new(engine.clone(), table.clone(), key.cloned());
            debug!(
                "built operations for table {} ({} encrypted fields)",
                table.name,
                ops.encrypted_fields.len()
            );
            (table.name.clone(), ops)
        })
        .collect()
}

/// Build the per-table operations map straight from schema text.
pub fn build_from_schema(
    engine: Arc<dyn StorageEngine>,
    schema_text: &str,
    key: Option<&EncryptionKey>,
) -> HashMap<String, TableOps> {
    build_tables(engine, &parse_tables(schema_text), key)
}

impl TableOps {
    fn new(engine: Arc<dyn StorageEngine>, table: TableDescriptor, key: Option<EncryptionKey>) -> Self {
        let encrypted_fields: Vec<String> = if key.is_some() {
            table.text_columns().map(|c| c.name.clone()).collect()
        } else {
            Vec::new()
        };
        Self {
            engine,
            table: Arc::new(table),
            key,
            encrypted_fields: Arc::new(encrypted_fields),
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.table.name
    }

    /// The parsed descriptor behind these operations.
    #[must_use]
    pub fn descriptor(&self) -> &TableDescriptor {
        &self.table
    }

    /// Whether [`TableOps::search`] is available for this table.
    #[must_use]
    pub fn supports_search(&self) -> bool {
        self.table.embedding_column().is_some()
    }

    /// Insert a row and return it, decrypted.
    ///
    /// Required columns (NOT NULL without a server-side default) missing
    /// from `data` fail validation before any I/O.
    pub async fn create(&self, data: Row) -> Result<Row> {
        self.validate_payload(&data, true)?;
        let data = self.encrypt_payload(data)?;

        let table = quote_ident(&self.table.name)?;
        let projection = build_projection(&self.table)?;

        let sql = if data.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, projection)
        } else {
            let mut cols = Vec::with_capacity(data.len());
            let mut placeholders = Vec::with_capacity(data.len());
            for (i, (name, _)) in data.iter().enumerate() {
                cols.push(quote_ident(name)?);
                placeholders.push(format!("${}", i + 1));
            }
            format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                table,
                cols.join(", "),
                placeholders.join(", "),
                projection
            )
        };

        let params: Vec<Value> = data.into_iter().map(|(_, v)| v).collect();
        let rows = self.engine.query(&sql, &params).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| VaultError::operation(&self.table.name, "insert returned no row"))?;
        Ok(self.decode_row(row))
    }

    /// Query rows matching the options, decrypted, in engine order apart
    /// from the requested ordering.
    pub async fn find_many(&self, options: FindOptions) -> Result<Vec<Row>> {
        let filter = options.filter.unwrap_or_default();
        self.validate_filter(&filter)?;

        let mut sql = format!(
            "SELECT {} FROM {}",
            build_projection(&self.table)?,
            quote_ident(&self.table.name)?
        );
        if !filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&build_where(&filter, 1)?);
        }
        if let Some(order) = &options.order_by {
            if self.table.column(&order.column).is_none() {
                return Err(VaultError::Validation(format!(
                    "unknown column {} in order_by for table {}",
                    order.column, self.table.name
                )));
            }
            if self.is_encrypted(&order.column) {
                // Ciphertext order is meaningless, but unlike filtering it
                // cannot return wrong rows - only a useless order
                warn!(
                    "ordering {}.{} by ciphertext; result order will be arbitrary",
                    self.table.name, order.column
                );
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&quote_ident(&order.column)?);
            sql.push_str(if order.descending { " DESC" } else { " ASC" });
        }
        if let Some(limit) = options.limit {
            sql.push_str(&format!(" LIMIT {}", validate_count(limit, "limit")?));
        }
        if let Some(offset) = options.offset {
            sql.push_str(&format!(" OFFSET {}", validate_count(offset, "offset")?));
        }

        let params = filter_params(filter);
        let rows = self.engine.query(&sql, &params).await?;
        Ok(rows.into_iter().map(|r| self.decode_row(r)).collect())
    }

    /// Single-row lookup, typically by primary key. No match is `None`, not
    /// an error.
    pub async fn find_unique(&self, filter: Row) -> Result<Option<Row>> {
        self.require_filter(&filter, "find_unique")?;
        self.validate_filter(&filter)?;

        let sql = format!(
            "SELECT {} FROM {} WHERE {} LIMIT 1",
            build_projection(&self.table)?,
            quote_ident(&self.table.name)?,
            build_where(&filter, 1)?
        );

        let params = filter_params(filter);
        let rows = self.engine.query(&sql, &params).await?;
        Ok(rows.into_iter().next().map(|r| self.decode_row(r)))
    }

    /// Update matching rows and return the updated row, decrypted.
    ///
    /// An empty `data` short-circuits to a [`TableOps::find_unique`] read
    /// instead of issuing a no-op UPDATE.
    pub async fn update(&self, filter: Row, data: Row) -> Result<Option<Row>> {
        if data.is_empty() {
            return self.find_unique(filter).await;
        }
        self.require_filter(&filter, "update")?;
        self.validate_filter(&filter)?;
        self.validate_payload(&data, false)?;
        let data = self.encrypt_payload(data)?;

        let mut assignments = Vec::with_capacity(data.len());
        for (i, (name, _)) in data.iter().enumerate() {
            assignments.push(format!("{} = ${}", quote_ident(name)?, i + 1));
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE {} RETURNING {}",
            quote_ident(&self.table.name)?,
            assignments.join(", "),
            build_where(&filter, data.len() + 1)?,
            build_projection(&self.table)?
        );

        let mut params: Vec<Value> = data.into_iter().map(|(_, v)| v).collect();
        params.extend(filter_params(filter));
        let rows = self.engine.query(&sql, &params).await?;
        Ok(rows.into_iter().next().map(|r| self.decode_row(r)))
    }

    /// Delete the matching row and return it, decrypted, or `None` if
    /// nothing matched. Intended for primary-key filters.
    pub async fn delete(&self, filter: Row) -> Result<Option<Row>> {
        self.require_filter(&filter, "delete")?;
        self.validate_filter(&filter)?;

        let sql = format!(
            "DELETE FROM {} WHERE {} RETURNING {}",
            quote_ident(&self.table.name)?,
            build_where(&filter, 1)?,
            build_projection(&self.table)?
        );

        let params = filter_params(filter);
        let rows = self.engine.query(&sql, &params).await?;
        Ok(rows.into_iter().next().map(|r| self.decode_row(r)))
    }

    /// Delete all matching rows (all rows when no filter is given) and
    /// return them, decrypted.
    pub async fn delete_many(&self, filter: Option<Row>) -> Result<Vec<Row>> {
        let filter = filter.unwrap_or_default();
        self.validate_filter(&filter)?;

        let mut sql = format!("DELETE FROM {}", quote_ident(&self.table.name)?);
        if !filter.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&build_where(&filter, 1)?);
        }
        sql.push_str(&format!(" RETURNING {}", build_projection(&self.table)?));

        let params = filter_params(filter);
        let rows = self.engine.query(&sql, &params).await?;
        Ok(rows.into_iter().map(|r| self.decode_row(r)).collect())
    }

    /// Nearest-neighbor search over the table's embedding column.
    ///
    /// Results carry an extra `distance` column and arrive in ascending
    /// distance order (most similar first); text fields are decrypted
    /// exactly as on every other read path. See
    /// [`DEFAULT_SEARCH_THRESHOLD`] for the distance convention.
    pub async fn search(
        &self,
        embedding: &[f32],
        threshold: Option<f64>,
        limit: Option<i64>,
    ) -> Result<Vec<Row>> {
        let Some(column) = self.table.embedding_column() else {
            return Err(VaultError::SearchUnsupported(self.table.name.clone()));
        };
        if let ValueType::FloatVector(Some(dim)) = column.value_type {
            if embedding.len() != dim {
                return Err(VaultError::Validation(format!(
                    "embedding has {} dimensions, column {}.{} expects {}",
                    embedding.len(),
                    self.table.name,
                    column.name,
                    dim
                )));
            }
        }

        let threshold = threshold.unwrap_or(DEFAULT_SEARCH_THRESHOLD);
        let limit = validate_count(limit.unwrap_or(DEFAULT_SEARCH_LIMIT), "limit")?;

        let distance = format!("{} <#> $1", quote_ident(&column.name)?);
        let sql = format!(
            "SELECT {}, {} AS \"distance\" FROM {} WHERE {} < $2 ORDER BY {} ASC LIMIT {}",
            build_projection(&self.table)?,
            distance,
            quote_ident(&self.table.name)?,
            distance,
            distance,
            limit
        );

        let params = vec![Value::Vector(embedding.to_vec()), Value::Float(-threshold)];
        let rows = self.engine.query(&sql, &params).await?;
        Ok(rows.into_iter().map(|r| self.decode_row(r)).collect())
    }

    // =========================================================================
    // Validation and encryption plumbing
    // =========================================================================

    fn is_encrypted(&self, column: &str) -> bool {
        self.encrypted_fields.iter().any(|f| f == column)
    }

    /// Check a write payload: every column must exist and be writable, and
    /// on create every required column must be present. Runs before any I/O.
    fn validate_payload(&self, data: &Row, for_create: bool) -> Result<()> {
        for (name, _) in data.iter() {
            let column = self.table.column(name).ok_or_else(|| {
                VaultError::Validation(format!(
                    "unknown column {} for table {}",
                    name, self.table.name
                ))
            })?;
            if let ValueType::Unknown(raw) = &column.value_type {
                return Err(VaultError::Validation(format!(
                    "column {}.{} has unrecognized type {:?}; writes are unsupported",
                    self.table.name, name, raw
                )));
            }
        }

        if for_create {
            for column in &self.table.columns {
                if column.required() && !data.contains(&column.name) {
                    return Err(VaultError::Validation(format!(
                        "missing required column {} for table {}",
                        column.name, self.table.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Check a filter: columns must exist, and equality against an
    /// encryption-eligible column is rejected outright - non-deterministic
    /// ciphertext can never match, so the filter would silently return
    /// nothing.
    fn validate_filter(&self, filter: &Row) -> Result<()> {
        for (name, _) in filter.iter() {
            if self.table.column(name).is_none() {
                return Err(VaultError::Validation(format!(
                    "unknown column {} in filter for table {}",
                    name, self.table.name
                )));
            }
            if self.is_encrypted(name) {
                return Err(VaultError::EncryptedFilter {
                    table: self.table.name.clone(),
                    column: name.to_string(),
                });
            }
        }
        Ok(())
    }

    fn require_filter(&self, filter: &Row, operation: &str) -> Result<()> {
        if filter.is_empty() {
            return Err(VaultError::Validation(format!(
                "{} on table {} requires a non-empty filter",
                operation, self.table.name
            )));
        }
        Ok(())
    }

    /// Replace plaintext with ciphertext in every encryption-eligible field
    /// of a write payload. NULLs pass through untouched.
    fn encrypt_payload(&self, mut data: Row) -> Result<Row> {
        if let Some(key) = &self.key {
            for field in self.encrypted_fields.iter() {
                if let Some(value) = data.get_mut(field) {
                    if let Value::Text(plaintext) = value {
                        *value = Value::Text(crypto::encrypt_value(plaintext, key)?);
                    }
                }
            }
        }
        Ok(data)
    }

    /// Decrypt eligible fields and decode vector text literals before a row
    /// is handed to the caller. A field that fails to decrypt becomes the
    /// sentinel marker; the failure is logged, never silent.
    fn decode_row(&self, mut row: Row) -> Row {
        if let Some(key) = &self.key {
            for field in self.encrypted_fields.iter() {
                if let Some(value) = row.get_mut(field) {
                    if let Value::Text(ciphertext) = value {
                        match crypto::decrypt_value(ciphertext, key) {
                            Ok(plaintext) => *value = Value::Text(plaintext),
                            Err(e) => {
                                warn!(
                                    "decryption failed for {}.{}: {}",
                                    self.table.name, field, e
                                );
                                *value = Value::Text(DECRYPT_FAILED_SENTINEL.to_string());
                            }
                        }
                    }
                }
            }
        }

        for column in &self.table.columns {
            if matches!(column.value_type, ValueType::FloatVector(_)) {
                if let Some(value) = row.get_mut(&column.name) {
                    if let Value::Text(literal) = value {
                        if let Some(vector) = parse_vector(literal) {
                            *value = Value::Vector(vector);
                        }
                    }
                }
            }
        }

        row
    }
}

// =============================================================================
// SQL builders
// =============================================================================

/// Build the SELECT/RETURNING projection for a table.
///
/// Vector and unknown-typed columns are cast to text so every row decodes
/// through the same small set of wire types; [`TableOps::decode_row`] turns
/// vector literals back into float vectors.
fn build_projection(table: &TableDescriptor) -> Result<String> {
    if table.columns.is_empty() {
        return Ok("*".to_string());
    }
    let mut parts = Vec::with_capacity(table.columns.len());
    for column in &table.columns {
        let quoted = quote_ident(&column.name)?;
        match column.value_type {
            ValueType::FloatVector(_) | ValueType::Unknown(_) => {
                parts.push(format!("{}::text AS {}", quoted, quoted));
            }
            _ => parts.push(quoted),
        }
    }
    Ok(parts.join(", "))
}

/// Build an equality WHERE clause with placeholders starting at
/// `first_param`. NULL entries become `IS NULL` and consume no placeholder;
/// [`filter_params`] applies the matching skip when binding.
fn build_where(filter: &Row, first_param: usize) -> Result<String> {
    let mut conditions = Vec::with_capacity(filter.len());
    let mut index = first_param;
    for (name, value) in filter.iter() {
        let quoted = quote_ident(name)?;
        if value.is_null() {
            conditions.push(format!("{} IS NULL", quoted));
        } else {
            conditions.push(format!("{} = ${}", quoted, index));
            index += 1;
        }
    }
    Ok(conditions.join(" AND "))
}

/// Bindable parameters for a WHERE clause built by [`build_where`].
fn filter_params(filter: Row) -> Vec<Value> {
    filter
        .into_iter()
        .map(|(_, v)| v)
        .filter(|v| !v.is_null())
        .collect()
}

/// Reject negative LIMIT/OFFSET values before they reach the engine.
fn validate_count(value: i64, what: &str) -> Result<i64> {
    if value < 0 {
        return Err(VaultError::Validation(format!(
            "{} must be non-negative, got {}",
            what, value
        )));
    }
    Ok(value)
}
