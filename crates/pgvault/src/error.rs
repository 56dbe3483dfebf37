//! Error types for the pgvault library.

use thiserror::Error;

/// Main error type for data-access operations.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Configuration error (invalid YAML, missing fields, bad identifiers, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage engine error, propagated verbatim from the server.
    #[error("Storage error: {0}")]
    Storage(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A create/update payload failed validation before any I/O was attempted.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Equality filtering against a transparently-encrypted column.
    ///
    /// Encryption is non-deterministic, so the stored ciphertext can never
    /// match a fresh encryption of the filter value.
    #[error("Cannot filter on encrypted column {column} of table {table}")]
    EncryptedFilter { table: String, column: String },

    /// Authenticated decryption failed (wrong key, tampered or truncated input).
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Vector search requested on a table without an embedding column.
    #[error("Table {0} has no embedding column")]
    SearchUnsupported(String),

    /// An operation violated an engine-level expectation.
    #[error("Operation failed for table {table}: {message}")]
    Operation { table: String, message: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl VaultError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        VaultError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create an Operation error
    pub fn operation(table: impl Into<String>, message: impl Into<String>) -> Self {
        VaultError::Operation {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        // Add error chain for wrapped errors
        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            VaultError::Config(_) | VaultError::Yaml(_) => 2,
            VaultError::Validation(_)
            | VaultError::EncryptedFilter { .. }
            | VaultError::SearchUnsupported(_) => 3,
            VaultError::Storage(_) | VaultError::Pool { .. } => 4,
            VaultError::Decryption(_) | VaultError::Encryption(_) => 5,
            _ => 1,
        }
    }
}

/// Result type alias for data-access operations.
pub type Result<T> = std::result::Result<T, VaultError>;
