pub mod logging_config;
pub mod resolver_config;
pub mod loader;

// Re-export commonly used types
pub use logging_config::{LoggingSettings, PartialLoggingSettings};
pub use resolver_config::{PartialResolverConfig, ResolverConfig};
pub use loader::{ConfigLoader, CONFIG_FILE_NAME, USER_CONFIG_PATH};

impl ResolverConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, crate::errors::ConfigError> {
        ConfigLoader::new().load_config()
    }
}
