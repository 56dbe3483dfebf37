//! Core types shared across the crate: values, rows, identifier handling.

pub mod identifier;
pub mod value;

pub use identifier::{qualify, quote_ident, validate_identifier};
pub use value::{format_vector, parse_vector, Row, Value};
