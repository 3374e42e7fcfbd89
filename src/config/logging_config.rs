use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::Level;
use crate::errors::ConfigError;
use crate::logging::LogFormat;

pub const ENV_LOG_LEVEL: &str = "WIREGRAPH_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "WIREGRAPH_LOG_FORMAT";

/// Logging settings carried by the resolver configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: Level,
    pub format: LogFormat,
}

/// Partial logging settings for loading from files
#[derive(Deserialize, Debug, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
    pub format: Option<LogFormat>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
        }
    }
}

impl LoggingSettings {
    /// Create LoggingSettings from environment variables and file config
    pub fn from_env_or_file(
        file_settings: Option<PartialLoggingSettings>,
        env_map: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let level = match env_map
            .get(ENV_LOG_LEVEL)
            .cloned()
            .or_else(|| file_settings.as_ref().and_then(|s| s.level.clone()))
        {
            Some(value) => Level::from_str(value.trim()).map_err(|e| ConfigError::InvalidValue {
                field: "logging.level".to_string(),
                value,
                reason: e.to_string(),
            })?,
            None => defaults.level,
        };

        let format = match env_map.get(ENV_LOG_FORMAT) {
            Some(value) => LogFormat::from_str(value).map_err(|reason| ConfigError::InvalidValue {
                field: "logging.format".to_string(),
                value: value.clone(),
                reason,
            })?,
            None => file_settings
                .and_then(|s| s.format)
                .unwrap_or(defaults.format),
        };

        Ok(Self { level, format })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_file() {
        let file_settings = PartialLoggingSettings {
            level: Some("debug".to_string()),
            format: Some(LogFormat::Json),
        };

        let settings = LoggingSettings::from_env_or_file(Some(file_settings), &HashMap::new()).unwrap();
        assert_eq!(settings.level, Level::DEBUG);
        assert_eq!(settings.format, LogFormat::Json);
    }

    #[test]
    fn test_env_overrides_file() {
        let file_settings = PartialLoggingSettings {
            level: Some("debug".to_string()),
            format: None,
        };
        let mut env_map = HashMap::new();
        env_map.insert(ENV_LOG_LEVEL.to_string(), "warn".to_string());
        env_map.insert(ENV_LOG_FORMAT.to_string(), "compact".to_string());

        let settings = LoggingSettings::from_env_or_file(Some(file_settings), &env_map).unwrap();
        assert_eq!(settings.level, Level::WARN);
        assert_eq!(settings.format, LogFormat::Compact);
    }

    #[test]
    fn test_invalid_level() {
        let mut env_map = HashMap::new();
        env_map.insert(ENV_LOG_LEVEL.to_string(), "loud".to_string());
        assert!(matches!(
            LoggingSettings::from_env_or_file(None, &env_map),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
