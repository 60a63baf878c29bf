use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

use super::loader::ConfigLoader;
use crate::errors::ConfigError;
use crate::logging::{LogFormat, LoggingConfig};

// Configuration location constants
pub const USER_CONFIG_PATH: &str = "~/.config/package-runtime";
pub const CONFIG_FILE_NAME: &str = "config.toml";

// Environment overrides
pub const ENV_LOG_LEVEL: &str = "PACKAGE_RUNTIME_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "PACKAGE_RUNTIME_LOG_FORMAT";
pub const ENV_STRICT: &str = "PACKAGE_RUNTIME_STRICT";

/// Main runtime configuration
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub logging: LoggingConfig,
    /// Application supplied property values, keyed by package then property
    pub properties: BTreeMap<String, BTreeMap<String, Value>>,
    /// Treat any diagnostic as a failure
    pub strict: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            properties: BTreeMap::new(),
            strict: false,
        }
    }
}

/// Partial logging section as it appears in the file
#[derive(Deserialize, Debug, Default)]
pub struct PartialLoggingConfig {
    level: Option<String>,
    format: Option<LogFormat>,
}

/// Partial runtime configuration for loading from files
#[derive(Deserialize, Debug, Default)]
pub struct PartialRuntimeConfig {
    logging: Option<PartialLoggingConfig>,
    properties: Option<BTreeMap<String, BTreeMap<String, Value>>>,
    strict: Option<bool>,
}

impl RuntimeConfig {
    /// Load configuration from the default location and environment
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load_config()
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        ConfigLoader::new().load_config_from(&path)
    }

    /// Create RuntimeConfig from partial config and environment
    pub fn from_partial_and_env(
        partial: Option<PartialRuntimeConfig>,
        env_map: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let partial = partial.unwrap_or_default();
        let partial_logging = partial.logging.unwrap_or_default();

        let mut logging = LoggingConfig::default();

        if let Some(level) = env_map.get(ENV_LOG_LEVEL).or(partial_logging.level.as_ref()) {
            logging.level = Level::from_str(level).map_err(|_| ConfigError::InvalidValue {
                key: "logging.level".to_string(),
                value: level.clone(),
            })?;
        }

        if let Some(format) = env_map.get(ENV_LOG_FORMAT) {
            logging.format = format.parse().map_err(|_| ConfigError::InvalidValue {
                key: "logging.format".to_string(),
                value: format.clone(),
            })?;
        } else if let Some(format) = partial_logging.format {
            logging.format = format;
        }

        let strict = match env_map.get(ENV_STRICT) {
            Some(value) => parse_bool(ENV_STRICT, value)?,
            None => partial.strict.unwrap_or(false),
        };

        Ok(RuntimeConfig {
            logging,
            properties: partial.properties.unwrap_or_default(),
            strict,
        })
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn partial(text: &str) -> PartialRuntimeConfig {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::from_partial_and_env(None, HashMap::new()).unwrap();
        assert_eq!(config.logging.level, Level::INFO);
        assert_eq!(config.logging.format, LogFormat::Pretty);
        assert!(config.properties.is_empty());
        assert!(!config.strict);
    }

    #[test]
    fn test_file_values() {
        let config = RuntimeConfig::from_partial_and_env(
            Some(partial(
                r#"
                strict = true

                [logging]
                level = "debug"
                format = "json"

                [properties.map]
                zoom = 5
                center = [7.0, 51.0]
                "#,
            )),
            HashMap::new(),
        )
        .unwrap();

        assert!(config.strict);
        assert_eq!(config.logging.level, Level::DEBUG);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.properties["map"]["zoom"], json!(5));
        assert_eq!(config.properties["map"]["center"], json!([7.0, 51.0]));
    }

    #[test]
    fn test_env_overrides_file() {
        let env = HashMap::from([
            (ENV_LOG_LEVEL.to_string(), "warn".to_string()),
            (ENV_LOG_FORMAT.to_string(), "compact".to_string()),
            (ENV_STRICT.to_string(), "no".to_string()),
        ]);
        let config = RuntimeConfig::from_partial_and_env(
            Some(partial("strict = true\n[logging]\nlevel = \"trace\"\n")),
            env,
        )
        .unwrap();

        assert_eq!(config.logging.level, Level::WARN);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert!(!config.strict);
    }

    #[test]
    fn test_invalid_values() {
        let env = HashMap::from([(ENV_LOG_LEVEL.to_string(), "loud".to_string())]);
        let err = RuntimeConfig::from_partial_and_env(None, env).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "logging.level"));

        let env = HashMap::from([(ENV_STRICT.to_string(), "maybe".to_string())]);
        assert!(RuntimeConfig::from_partial_and_env(None, env).is_err());
    }
}
