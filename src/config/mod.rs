pub mod loader;
pub mod runtime_config;

// Re-export commonly used types
pub use loader::ConfigLoader;
pub use runtime_config::{PartialRuntimeConfig, RuntimeConfig};

// Re-export constants
pub use runtime_config::{CONFIG_FILE_NAME, ENV_LOG_FORMAT, ENV_LOG_LEVEL, ENV_STRICT};
