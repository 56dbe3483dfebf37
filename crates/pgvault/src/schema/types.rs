//! Parsed schema metadata types.

use serde::{Deserialize, Serialize};

/// A recognized SQL column type, as written in the schema text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlType {
    /// 64-bit integer.
    BigInt,

    /// 32-bit integer (`INTEGER` or `INT`).
    Integer,

    /// Unbounded text. The only type eligible for transparent encryption.
    Text,

    /// Bounded text. Not encryption-eligible.
    Varchar,

    /// pgvector column, with the declared dimension when one was given.
    Vector(Option<usize>),

    /// Boolean.
    Boolean,

    /// Timestamp without timezone.
    Timestamp,

    /// JSON document.
    Json,

    /// Binary JSON document.
    Jsonb,

    /// Enumeration with its ordered literal set.
    Enum(Vec<String>),

    /// Anything the parser did not recognize, carrying the raw type token.
    ///
    /// Unknown is an explicit variant callers must handle; it never widens
    /// silently into a permissive type.
    Unknown(String),
}

/// The semantic type of the values a column stores and returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    /// Whole numbers.
    Integer,

    /// Strings.
    Text,

    /// Booleans.
    Boolean,

    /// Timestamps.
    Timestamp,

    /// Float vectors, with the declared dimension when one was given.
    FloatVector(Option<usize>),

    /// Structured JSON documents.
    Json,

    /// One of a fixed set of string literals.
    Enum(Vec<String>),

    /// Unrecognized; values round-trip as text.
    Unknown(String),
}

/// Parsed column definition: name, SQL type, semantic type, and the
/// constraint facts the CRUD layer needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name, unquoted.
    pub name: String,

    /// Type as declared in the schema text.
    pub sql_type: SqlType,

    /// Semantic value type derived from `sql_type`.
    pub value_type: ValueType,

    /// Whether the definition carried `NOT NULL` (or `PRIMARY KEY`, which
    /// implies it).
    pub not_null: bool,

    /// Whether the column is filled server-side when omitted (`DEFAULT ...`
    /// or `GENERATED ... AS IDENTITY`).
    pub has_default: bool,

    /// Whether the definition carried `PRIMARY KEY`.
    pub primary_key: bool,
}

impl ColumnDescriptor {
    /// A column is required in `create` payloads when it is NOT NULL and the
    /// server cannot fill it in.
    #[must_use]
    pub fn required(&self) -> bool {
        self.not_null && !self.has_default
    }
}

/// Parsed table definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDescriptor {
    /// Table name, unquoted.
    pub name: String,

    /// Column definitions in declaration order.
    pub columns: Vec<ColumnDescriptor>,
}

impl TableDescriptor {
    /// Look up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The embedding column driving vector search, when the table has one.
    #[must_use]
    pub fn embedding_column(&self) -> Option<&ColumnDescriptor> {
        self.columns
            .iter()
            .find(|c| c.name == "embedding" && matches!(c.value_type, ValueType::FloatVector(_)))
    }

    /// Columns eligible for transparent encryption: TEXT, and nothing else.
    pub fn text_columns(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter().filter(|c| c.sql_type == SqlType::Text)
    }
}
