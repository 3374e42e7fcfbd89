use serde::Deserialize;
use std::collections::HashMap;
use std::str::FromStr;
use crate::errors::ConfigError;
use crate::graph::Precedence;

use super::logging_config::{LoggingSettings, PartialLoggingSettings};

pub const ENV_EXPORT_ALL: &str = "WIREGRAPH_EXPORT_ALL";
pub const ENV_PRECEDENCE: &str = "WIREGRAPH_PRECEDENCE";

/// Resolver configuration
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolverConfig {
    /// Precedence used by binding sites that do not specify their own
    pub default_precedence: Precedence,
    /// Whether newly created scopes start in export-all mode
    pub export_all_by_default: bool,
    pub logging: LoggingSettings,
}

/// Partial resolver configuration for loading from files
#[derive(Deserialize, Debug, Default)]
pub struct PartialResolverConfig {
    pub default_precedence: Option<Precedence>,
    pub export_all_by_default: Option<bool>,
    pub logging: Option<PartialLoggingSettings>,
}

impl ResolverConfig {
    /// Create ResolverConfig from partial file config and environment
    ///
    /// Environment values override file values, which override defaults.
    pub fn from_partial_and_env(
        partial: Option<PartialResolverConfig>,
        env_map: &HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let partial = partial.unwrap_or_default();

        let default_precedence = match env_map.get(ENV_PRECEDENCE) {
            Some(value) => Precedence::from_str(value).map_err(|e| ConfigError::InvalidValue {
                field: ENV_PRECEDENCE.to_string(),
                value: value.clone(),
                reason: e.to_string(),
            })?,
            None => partial.default_precedence.unwrap_or_default(),
        };
        if default_precedence.levels().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "default_precedence".to_string(),
                value: String::new(),
                reason: "at least one binding level is required".to_string(),
            });
        }

        let export_all_by_default = match env_map.get(ENV_EXPORT_ALL) {
            Some(value) => parse_bool(value).ok_or_else(|| ConfigError::InvalidValue {
                field: ENV_EXPORT_ALL.to_string(),
                value: value.clone(),
                reason: "expected true/false, yes/no or 1/0".to_string(),
            })?,
            None => partial.export_all_by_default.unwrap_or(false),
        };

        let logging = LoggingSettings::from_env_or_file(partial.logging, env_map)?;

        Ok(Self {
            default_precedence,
            export_all_by_default,
            logging,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
