//! Centralized identifier validation and quoting for SQL injection prevention.
//!
//! SQL identifiers (table names, column names, schema names) cannot be passed
//! as parameters in prepared statements - only data values can be
//! parameterized. Every SQL builder in this crate therefore routes identifiers
//! through this module: validate for suspicious patterns, then apply
//! PostgreSQL double-quote quoting with internal quotes doubled.

use crate::error::{Result, VaultError};

/// Maximum identifier length. PostgreSQL truncates identifiers at 63 bytes;
/// anything longer in a payload is a mistake or an attack.
const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
///
/// # Errors
///
/// Returns `VaultError::Config` for invalid identifiers with a descriptive message.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VaultError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(VaultError::Config(format!(
            "SECURITY: Identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(VaultError::Config(format!(
            "SECURITY: Identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// Escapes double quotes by doubling them and wraps in double quotes.
/// Validates the identifier before quoting.
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a table name with its storage namespace.
///
/// Returns `schema.table` with proper quoting.
pub fn qualify(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(table)?))
}

/// Validate a storage name.
///
/// Storage names become schema namespaces and travel through connection
/// options where quoting is unavailable, so they are held to a stricter
/// rule than general identifiers: ASCII letters, digits and underscores,
/// not starting with a digit.
pub fn validate_storage_name(name: &str) -> Result<()> {
    validate_identifier(name)?;

    let starts_with_digit = name.chars().next().is_some_and(|c| c.is_ascii_digit());
    if starts_with_digit
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(VaultError::Config(format!(
            "Storage name must be [A-Za-z_][A-Za-z0-9_]*: {:?}",
            name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier_normal() {
        assert!(validate_identifier("users").is_ok());
        assert!(validate_identifier("my_table").is_ok());
        assert!(validate_identifier("Table123").is_ok());
        assert!(validate_identifier("column with spaces").is_ok());
    }

    #[test]
    fn test_validate_identifier_rejects_empty() {
        let result = validate_identifier("");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_identifier_rejects_null_byte() {
        let result = validate_identifier("table\0name");
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("null byte"));
    }

    #[test]
    fn test_validate_identifier_rejects_too_long() {
        let long_name = "a".repeat(MAX_IDENTIFIER_LENGTH + 1);
        let result = validate_identifier(&long_name);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("maximum length"));
    }

    #[test]
    fn test_quote_ident_normal() {
        assert_eq!(quote_ident("users").unwrap(), "\"users\"");
        assert_eq!(quote_ident("my_table").unwrap(), "\"my_table\"");
        assert_eq!(quote_ident("Users").unwrap(), "\"Users\"");
    }

    #[test]
    fn test_quote_ident_escapes_double_quote() {
        assert_eq!(quote_ident("table\"name").unwrap(), "\"table\"\"name\"");
        assert_eq!(quote_ident("a\"b\"c").unwrap(), "\"a\"\"b\"\"c\"");
    }

    #[test]
    fn test_quote_ident_sql_injection_safely_quoted() {
        // These should be safely quoted (no validation failure, just quoted)
        let result = quote_ident("Robert'); DROP TABLE Students;--");
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), "\"Robert'); DROP TABLE Students;--\"");
    }

    #[test]
    fn test_qualify() {
        assert_eq!(qualify("vault", "users").unwrap(), "\"vault\".\"users\"");
    }

    #[test]
    fn test_qualify_rejects_invalid_parts() {
        assert!(qualify("", "users").is_err());
        assert!(qualify("vault", "table\0name").is_err());
    }

    #[test]
    fn test_validate_storage_name() {
        assert!(validate_storage_name("vault").is_ok());
        assert!(validate_storage_name("app_2").is_ok());
        assert!(validate_storage_name("2fast").is_err());
        assert!(validate_storage_name("has space").is_err());
        assert!(validate_storage_name("semi;colon").is_err());
        assert!(validate_storage_name("").is_err());
    }
}
