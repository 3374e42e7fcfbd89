use std::{collections::HashMap, env, fs, path::{Path, PathBuf}};
use crate::errors::ConfigError;

use super::logging_config::{ENV_LOG_FORMAT, ENV_LOG_LEVEL};
use super::resolver_config::{PartialResolverConfig, ResolverConfig, ENV_EXPORT_ALL, ENV_PRECEDENCE};

// Configuration location constants
pub const USER_CONFIG_PATH: &str = "~/.config/wiregraph";
pub const CONFIG_FILE_NAME: &str = "config.toml";

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

    /// Load configuration from the default location
    ///
    /// A missing file is not an error; defaults and environment apply.
    pub fn load_config(&self) -> Result<ResolverConfig, ConfigError> {
        let config_path = self.config_file_path();
        let partial_config = self.load_partial_config(&config_path)?;
        ResolverConfig::from_partial_and_env(partial_config, &self.collect_env_vars())
    }

    /// Load configuration from an explicit file, which must exist
    pub fn load_from_path(&self, config_path: &Path) -> Result<ResolverConfig, ConfigError> {
        let partial_config = self.read_partial_config(config_path)?;
        ResolverConfig::from_partial_and_env(Some(partial_config), &self.collect_env_vars())
    }

    /// Path of the user config file, with tilde expansion and base path override
    pub fn config_file_path(&self) -> PathBuf {
        let base = match &self.base_path {
            Some(base_path) => base_path.join(USER_CONFIG_PATH.trim_start_matches("~/")),
            None => PathBuf::from(shellexpand::tilde(USER_CONFIG_PATH).as_ref()),
        };
        base.join(CONFIG_FILE_NAME)
    }

    /// Load partial configuration from TOML file, `None` when the file is absent
    fn load_partial_config(&self, config_path: &Path) -> Result<Option<PartialResolverConfig>, ConfigError> {
        if !config_path.exists() {
            tracing::debug!("配置文件 {:?} 不存在，使用默认配置", config_path);
            return Ok(None);
        }
        self.read_partial_config(config_path).map(Some)
    }

    fn read_partial_config(&self, config_path: &Path) -> Result<PartialResolverConfig, ConfigError> {
        let content = fs::read_to_string(config_path).map_err(|e| {
            ConfigError::FileRead(config_path.to_string_lossy().to_string(), e)
        })?;

        let partial_config: PartialResolverConfig = toml::from_str(&content).map_err(|e| {
            ConfigError::TomlParse(config_path.to_string_lossy().to_string(), e)
        })?;

        tracing::debug!("已加载配置文件: {:?}", config_path);
        Ok(partial_config)
    }

    /// Collect relevant environment variables
    fn collect_env_vars(&self) -> HashMap<String, String> {
        let env_keys = [ENV_EXPORT_ALL, ENV_PRECEDENCE, ENV_LOG_LEVEL, ENV_LOG_FORMAT];

        let mut env_map = HashMap::new();
        for key in &env_keys {
            if let Ok(value) = env::var(key) {
                env_map.insert(key.to_string(), value);
            }
        }
        env_map
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
