//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::DecoyConfig;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("No valid ports provided")]
    NoValidPorts,

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Load configuration from a TOML file.
///
/// The result is not validated yet; command line overrides are applied on
/// top of it first.
pub fn load_config(path: &Path) -> Result<DecoyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: DecoyConfig = toml::from_str(&content)?;

    tracing::debug!(path = %path.display(), "Configuration file loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [listener]
            ports = [2222, 8080]
            max_connections = 7

            [connection]
            timeout_secs = 3
            "#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listener.max_connections, 7);
        assert_eq!(config.listener.ports.len(), 2);
        assert_eq!(config.connection.timeout_secs, 3);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[listener\nports = ").unwrap();

        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
