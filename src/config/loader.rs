//! Configuration loading from disk.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::schema::GatewayConfig;
use crate::config::validation::{validate_config, ValidationError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("configuration validation failed with {} error(s)", .0.len())]
    Validation(Vec<ValidationError>),
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<GatewayConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: GatewayConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_a_valid_file() {
        let path = std::env::temp_dir().join("query-gateway-loader-valid.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[web]\nbind_address = \"127.0.0.1:9999\"").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.web.bind_address, "127.0.0.1:9999");

        fs::remove_file(path).ok();
    }

    #[test]
    fn invalid_values_fail_validation() {
        let path = std::env::temp_dir().join("query-gateway-loader-invalid.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[backend]\nquery_endpoint = \"nonsense\"").unwrap();

        assert!(matches!(
            load_config(&path),
            Err(ConfigError::Validation(_))
        ));

        fs::remove_file(path).ok();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let path = std::env::temp_dir().join("query-gateway-loader-absent.toml");
        assert!(matches!(load_config(&path), Err(ConfigError::Io { .. })));
    }
}
