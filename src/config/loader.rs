use std::{collections::HashMap, env, fs, path::Path, path::PathBuf};
use crate::errors::ConfigError;

use super::runtime_config::{
    PartialRuntimeConfig, RuntimeConfig, CONFIG_FILE_NAME, ENV_LOG_FORMAT, ENV_LOG_LEVEL,
    ENV_STRICT, USER_CONFIG_PATH,
};

/// Configuration loader responsible for loading config from files and environment
pub struct ConfigLoader {
    base_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader with default paths
    pub fn new() -> Self {
        Self { base_path: None }
    }

    /// Create a config loader with custom base path (for testing)
    pub fn with_base_path(base_path: PathBuf) -> Self {
        Self { base_path: Some(base_path) }
    }

    /// Load configuration from the default location; a missing file means defaults
    pub fn load_config(&self) -> Result<RuntimeConfig, ConfigError> {
        let config_path = self.default_config_path();
        let partial = if config_path.exists() {
            Some(self.load_partial_config(&config_path)?)
        } else {
            tracing::debug!(path = %config_path.display(), "No runtime config file, using defaults");
            None
        };

        RuntimeConfig::from_partial_and_env(partial, self.collect_env_vars())
    }

    /// Load configuration from an explicit file; the file must exist
    pub fn load_config_from(&self, path: &Path) -> Result<RuntimeConfig, ConfigError> {
        let partial = self.load_partial_config(path)?;
        RuntimeConfig::from_partial_and_env(Some(partial), self.collect_env_vars())
    }

    /// Path of the default config file with tilde expansion and base path override
    pub fn default_config_path(&self) -> PathBuf {
        let base = if let Some(base_path) = &self.base_path {
            // For testing: use custom base path
            base_path.join(USER_CONFIG_PATH.trim_start_matches("~/"))
        } else {
            let expanded = shellexpand::tilde(USER_CONFIG_PATH);
            PathBuf::from(expanded.as_ref())
        };

        base.join(CONFIG_FILE_NAME)
    }

    fn load_partial_config(&self, path: &Path) -> Result<PartialRuntimeConfig, ConfigError> {
        let display = path.display().to_string();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(display.clone(), e))?;

        toml::from_str(&content).map_err(|e| ConfigError::TomlParse(display, e))
    }

    /// Collect the environment variables the runtime understands
    fn collect_env_vars(&self) -> HashMap<String, String> {
        [ENV_LOG_LEVEL, ENV_LOG_FORMAT, ENV_STRICT]
            .iter()
            .filter_map(|key| env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect()
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_default_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_base_path(temp_dir.path().to_path_buf());

        assert!(loader
            .default_config_path()
            .ends_with(".config/package-runtime/config.toml"));
        let config = loader.load_config().unwrap();
        assert!(config.properties.is_empty());
    }

    #[test]
    fn test_load_default_file() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::with_base_path(temp_dir.path().to_path_buf());
        let path = loader.default_config_path();
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "[properties.auth]\nurl = \"https://example.org\"\n").unwrap();

        let config = loader.load_config().unwrap();
        assert_eq!(config.properties["auth"]["url"], "https://example.org");
    }

    #[test]
    fn test_explicit_file_errors() {
        let temp_dir = TempDir::new().unwrap();
        let loader = ConfigLoader::new();

        let missing = temp_dir.path().join("absent.toml");
        assert!(matches!(
            loader.load_config_from(&missing),
            Err(ConfigError::FileRead(..))
        ));

        let broken = temp_dir.path().join("broken.toml");
        fs::write(&broken, "strict = [").unwrap();
        assert!(matches!(
            loader.load_config_from(&broken),
            Err(ConfigError::TomlParse(..))
        ));
    }
}
