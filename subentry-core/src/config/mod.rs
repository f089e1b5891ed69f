//! Configuration management for the subentry engine
//!
//! This module provides environment-based configuration management with
//! support for defaults, TOML files and validation.

use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

mod error;

pub use error::ConfigError;

/// Main engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Subentry and collective attribute settings
    pub engine: EngineConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Subentry and collective attribute settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reject inheritance sources outside the subentry's parent subtree
    pub enforce_inheritance_root_scope: bool,

    /// Accept legacy `ldapSubentry` entries as subentries
    pub legacy_subentries: bool,

    /// Name of the operational attribute listing contributing subentries
    pub operational_attribute: String,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enforce_inheritance_root_scope: true,
            legacy_subentries: true,
            operational_attribute: "collectiveAttributeSubentries".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: SUBENTRY_<SECTION>_<KEY>
    /// Example: SUBENTRY_ENGINE_LEGACY_SUBENTRIES=false
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from a variable lookup
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        // Engine config
        if let Some(flag) = lookup("SUBENTRY_ENGINE_ENFORCE_INHERITANCE_ROOT_SCOPE") {
            self.engine.enforce_inheritance_root_scope = flag
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid root scope flag: {}", e)))?;
        }
        if let Some(flag) = lookup("SUBENTRY_ENGINE_LEGACY_SUBENTRIES") {
            self.engine.legacy_subentries = flag.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid legacy subentries flag: {}", e))
            })?;
        }
        if let Some(name) = lookup("SUBENTRY_ENGINE_OPERATIONAL_ATTRIBUTE") {
            self.engine.operational_attribute = name;
        }

        // Logging config
        if let Some(level) = lookup("SUBENTRY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = lookup("SUBENTRY_LOG_JSON") {
            self.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }
        Ok(())
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = &self.engine.operational_attribute;
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid operational attribute name: {:?}",
                name
            )));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.engine.enforce_inheritance_root_scope);
        assert!(config.engine.legacy_subentries);
        assert_eq!(config.engine.operational_attribute, "collectiveAttributeSubentries");
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.engine.operational_attribute = String::new();
        assert!(config.validate().is_err());

        config = Config::default();
        config.engine.operational_attribute = "bad name".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_log_level_validation() {
        let mut config = Config::default();

        config.logging.level = "invalid".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SUBENTRY_ENGINE_LEGACY_SUBENTRIES", "false"),
            ("SUBENTRY_ENGINE_ENFORCE_INHERITANCE_ROOT_SCOPE", "false"),
            ("SUBENTRY_LOG_LEVEL", "debug"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string())).unwrap();
        assert!(!config.engine.legacy_subentries);
        assert!(!config.engine.enforce_inheritance_root_scope);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_env_invalid_flag() {
        let mut config = Config::default();
        let result =
            config.apply_env(|key| (key == "SUBENTRY_LOG_JSON").then(|| "maybe".to_string()));
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subentry.toml");

        let mut config = Config::default();
        config.engine.legacy_subentries = false;
        config.logging.json_format = true;
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subentry.toml");
        std::fs::write(&path, "[engine]\nlegacy_subentries = false\n").unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert!(!loaded.engine.legacy_subentries);
        assert!(loaded.engine.enforce_inheritance_root_scope);
        assert_eq!(loaded.logging, LoggingConfig::default());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/subentry.toml"),
            Err(ConfigError::FileReadError(_))
        ));
    }
}
