/*!
 * Configuration management for relayflow.
 *
 * This module layers configuration sources (file, then environment) through the
 * `config` crate and deserializes the result into strongly typed sections.
 */
use std::path::Path;
use std::time::Duration;

use config::{Config as ConfigLib, Environment, File};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Core configuration for relayflow
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Bridge behaviour
    #[serde(default)]
    pub bridge: BridgeOptions,
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Application name, used as the source of published deltas
    #[serde(default = "default_app_name")]
    pub app_name: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to use JSON format for logs
    #[serde(default)]
    pub json_format: bool,
}

/// Options controlling how modules are bridged onto the bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeOptions {
    /// Path template for channel keys; `{m}` is the module id, `{c}` the channel index
    #[serde(default = "default_switchpath")]
    pub switchpath: String,

    /// Control channel specification, `<kind>:<name>`
    #[serde(default = "default_controlchannel")]
    pub controlchannel: String,

    /// Publish the requested state before the device echoes its status
    #[serde(default)]
    pub optimistic_updates: bool,

    /// Reopen a closed link after this many milliseconds. Unset keeps a
    /// closed link closed until the process restarts.
    #[serde(default)]
    pub reconnect_delay_ms: Option<u64>,

    /// Send the status request command as soon as a link opens
    #[serde(default = "default_status_on_open")]
    pub status_on_open: bool,
}

impl BridgeOptions {
    /// Get the reconnect delay, if reconnection is enabled
    pub fn reconnect_delay(&self) -> Option<Duration> {
        self.reconnect_delay_ms.map(Duration::from_millis)
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            app_name: default_app_name(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            switchpath: default_switchpath(),
            controlchannel: default_controlchannel(),
            optimistic_updates: false,
            reconnect_delay_ms: None,
            status_on_open: default_status_on_open(),
        }
    }
}

fn default_app_name() -> String {
    "relayflow".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_switchpath() -> String {
    "electrical.switches.bank.{m}.{c}".to_string()
}

fn default_controlchannel() -> String {
    "notification:notifications.devantech".to_string()
}

fn default_status_on_open() -> bool {
    true
}

/// A builder for creating a configuration
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_file: Option<String>,
    environment_prefix: Option<String>,
}

impl ConfigBuilder {
    /// Create a new ConfigBuilder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the config file path
    pub fn with_config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Set the environment variable prefix for configuration
    pub fn with_environment_prefix<S: AsRef<str>>(mut self, prefix: S) -> Self {
        self.environment_prefix = Some(prefix.as_ref().to_string());
        self
    }

    /// Build the core configuration sections
    pub fn build(self) -> Result<Config> {
        self.load()
    }

    /// Layer the configured sources and deserialize them into `T`.
    ///
    /// Missing keys fall back to the serde defaults of `T`, so a missing
    /// config file yields `T`'s defaults rather than an error.
    pub fn load<T: DeserializeOwned>(self) -> Result<T> {
        let mut config_builder = ConfigLib::builder();

        if let Some(config_file) = self.config_file {
            let path = Path::new(&config_file);
            if path.exists() {
                debug!("Loading configuration from {}", config_file);
                config_builder = config_builder.add_source(File::with_name(&config_file));
            } else {
                debug!("Configuration file {} does not exist, using defaults", config_file);
            }
        }

        if let Some(prefix) = self.environment_prefix {
            debug!("Loading configuration from environment variables with prefix {}", prefix);
            config_builder = config_builder.add_source(
                Environment::with_prefix(&prefix)
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config_lib = config_builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build configuration: {}", e)))?;

        let config = config_lib
            .try_deserialize()
            .map_err(|e| Error::config(format!("Failed to deserialize configuration: {}", e)))?;

        info!("Configuration loaded successfully");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.app_name, "relayflow");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.bridge.switchpath, "electrical.switches.bank.{m}.{c}");
        assert!(!config.bridge.optimistic_updates);
        assert!(config.bridge.status_on_open);
        assert_eq!(config.bridge.reconnect_delay(), None);
    }

    #[test]
    fn test_config_builder_defaults() {
        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(config.general.app_name, "relayflow");
        assert_eq!(config.bridge.controlchannel, "notification:notifications.devantech");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = ConfigBuilder::new()
            .with_config_file("/nonexistent/relayflow.toml")
            .build()
            .unwrap();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_config_builder_with_file() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("config.toml");

        {
            let mut file = File::create(&file_path)?;
            file.write_all(br#"
                [general]
                app_name = "devantech"

                [logging]
                level = "debug"
                json_format = true

                [bridge]
                switchpath = "switches.{m}.{c}"
                optimistic_updates = true
                reconnect_delay_ms = 2500
            "#)?;
        }

        let config = ConfigBuilder::new()
            .with_config_file(file_path)
            .build()?;

        assert_eq!(config.general.app_name, "devantech");
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
        assert_eq!(config.bridge.switchpath, "switches.{m}.{c}");
        assert!(config.bridge.optimistic_updates);
        assert_eq!(config.bridge.reconnect_delay(), Some(Duration::from_millis(2500)));
        // untouched keys keep their defaults
        assert!(config.bridge.status_on_open);

        Ok(())
    }

    #[test]
    fn test_config_builder_with_env() -> Result<()> {
        env::set_var("RELAYFLOWTEST__GENERAL__APP_NAME", "env-app");
        env::set_var("RELAYFLOWTEST__BRIDGE__OPTIMISTIC_UPDATES", "true");

        let config = ConfigBuilder::new()
            .with_environment_prefix("relayflowtest")
            .build()?;

        assert_eq!(config.general.app_name, "env-app");
        assert!(config.bridge.optimistic_updates);

        env::remove_var("RELAYFLOWTEST__GENERAL__APP_NAME");
        env::remove_var("RELAYFLOWTEST__BRIDGE__OPTIMISTIC_UPDATES");

        Ok(())
    }
}
