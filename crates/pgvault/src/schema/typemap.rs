//! Mapping from SQL column types to semantic value types.

use super::types::{SqlType, ValueType};

/// Map a SQL column type to the semantic type of its values.
///
/// This single function is used everywhere a column's value type is needed -
/// by the parser when building descriptors, by the CRUD layer for encryption
/// eligibility and vector decoding, and by the CLI for schema reports - so
/// the static view of a column can never disagree with what the runtime
/// stores and returns.
pub fn value_type(sql_type: &SqlType) -> ValueType {
    match sql_type {
        SqlType::BigInt | SqlType::Integer => ValueType::Integer,
        SqlType::Text | SqlType::Varchar => ValueType::Text,
        SqlType::Vector(dim) => ValueType::FloatVector(*dim),
        SqlType::Boolean => ValueType::Boolean,
        SqlType::Timestamp => ValueType::Timestamp,
        SqlType::Json | SqlType::Jsonb => ValueType::Json,
        SqlType::Enum(literals) => ValueType::Enum(literals.clone()),
        SqlType::Unknown(raw) => ValueType::Unknown(raw.clone()),
    }
}
