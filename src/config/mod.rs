pub mod validation;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::protocol::profile::EndpointProfile;

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Top-level configuration: named endpoint profiles plus logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    pub profiles: BTreeMap<String, EndpointProfile>,
}

impl ClientConfig {
    /// Look up a profile by name.
    #[must_use]
    pub fn profile(&self, name: &str) -> Option<&EndpointProfile> {
        self.profiles.get(name)
    }
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or
/// [`ConfigError::Validation`] when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<ClientConfig, ConfigError> {
    let config: ClientConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: impl AsRef<Path>) -> Result<ClientConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::profile::{BackendKind, Framing, ResponseSchema};

    #[test]
    fn test_load_example_config() {
        let config = load_config("config.example.yaml");
        assert!(
            config.is_ok(),
            "Failed to load example config: {:?}",
            config.err()
        );
        let config = config.unwrap();
        assert_eq!(config.logging.log_level, "INFO");

        let openai = config.profile("openai").unwrap();
        assert_eq!(openai.backend, BackendKind::OpenAiChat);
        assert!(openai.auth.is_some());

        let ollama = config.profile("ollama").unwrap();
        assert_eq!(ollama.backend, BackendKind::Generic);
        let generic = ollama.generic.as_ref().unwrap();
        match &generic.schema {
            ResponseSchema::Stream(schema) => assert_eq!(schema.framing, Framing::Lines),
            ResponseSchema::Buffer(_) => panic!("expected stream schema"),
        }
        assert!(config.profile("missing").is_none());
    }

    #[test]
    fn test_logging_defaults() {
        let config = parse_config("profiles:\n  local:\n    base_url: http://127.0.0.1:8080\n")
            .unwrap();
        assert_eq!(config.logging.log_level, "INFO");
        assert_eq!(config.profiles.len(), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config("does-not-exist.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_bad_yaml_is_yaml_error() {
        let err = parse_config("profiles: [").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }
}
