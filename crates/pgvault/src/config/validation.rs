//! Configuration validation.

use super::Config;
use crate::core::identifier::validate_storage_name;
use crate::error::{Result, VaultError};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    if config.connection.host.is_empty() {
        return Err(VaultError::Config("connection.host is required".into()));
    }
    if config.connection.database.is_empty() {
        return Err(VaultError::Config("connection.database is required".into()));
    }
    if config.connection.user.is_empty() {
        return Err(VaultError::Config("connection.user is required".into()));
    }
    if config.connection.pool_size == 0 {
        return Err(VaultError::Config(
            "connection.pool_size must be at least 1".into(),
        ));
    }

    // The storage name becomes a schema identifier in generated SQL
    validate_storage_name(&config.store.storage)
        .map_err(|e| VaultError::Config(format!("store.storage: {}", e)))?;

    if config.store.schema_file.as_os_str().is_empty() {
        return Err(VaultError::Config("store.schema_file is required".into()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConnectionConfig, StoreConfig};
    use std::path::PathBuf;

    fn valid_config() -> Config {
        Config {
            connection: ConnectionConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "vault_db".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                pool_size: 4,
            },
            store: StoreConfig {
                storage: "vault".to_string(),
                schema_file: PathBuf::from("schema.sql"),
            },
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_missing_host() {
        let mut config = valid_config();
        config.connection.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_database() {
        let mut config = valid_config();
        config.connection.database = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_pool_size() {
        let mut config = valid_config();
        config.connection.pool_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_storage_name_is_validated_as_identifier() {
        let mut config = valid_config();
        config.store.storage = "bad\0name".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_connection_config_debug_redacts_password() {
        let mut config = valid_config();
        config.connection.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.connection);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_123"),
            "Debug output should not contain actual password value"
        );
    }

    #[test]
    fn test_password_not_serialized() {
        let mut config = valid_config();
        config.connection.password = "super_secret".to_string();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(
            !yaml.contains("super_secret"),
            "Password was serialized: {}",
            yaml
        );
    }
}
