/*!
 * Bridge settings.
 *
 * The core configuration sections plus the device catalog and the module
 * list, loaded in one pass through [`ConfigBuilder`].
 */
use std::path::Path;

use serde::{Deserialize, Serialize};

use relayflow_core::config::{BridgeOptions, ConfigBuilder, GeneralConfig, LoggingConfig};
use relayflow_devices::{Device, ModuleConfig};

use crate::error::Result;

/// Everything a bridge needs to run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// General configuration
    #[serde(default)]
    pub general: GeneralConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Bridge behaviour
    #[serde(default)]
    pub bridge: BridgeOptions,

    /// The device catalog
    #[serde(default)]
    pub devices: Vec<Device>,

    /// Configured relay modules
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

impl Settings {
    /// Load settings from an optional file, then environment variables
    /// starting with `env_prefix`
    pub fn load(config_file: Option<&Path>, env_prefix: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::new();
        if let Some(path) = config_file {
            builder = builder.with_config_file(path);
        }
        if let Some(prefix) = env_prefix {
            builder = builder.with_environment_prefix(prefix);
        }
        Ok(builder.load()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_load_catalog_and_modules() -> Result<()> {
        let dir = tempdir().map_err(relayflow_core::error::Error::from)?;
        let path = dir.path().join("relayflow.toml");
        fs::write(
            &path,
            r#"
            [bridge]
            optimistic_updates = true

            [[devices]]
            id = "ESP32RELAY8 ESP32-R8"
            size = 8

            [[devices.protocols]]
            id = "tcp"
            statuscommand = "ST"

            [[devices.protocols.commands]]
            channel = 0
            on = "SW{c}1"
            off = "SW{c}0"

            [[modules]]
            id = "m1"
            deviceid = "ESP32-R8"
            devicecstring = "tcp:10.0.0.5:17123"

            [[modules.channels]]
            index = 1
            description = "Anchor light"
            "#,
        )
        .map_err(relayflow_core::error::Error::from)?;

        let settings = Settings::load(Some(&path), None)?;

        assert!(settings.bridge.optimistic_updates);
        assert_eq!(settings.general.app_name, "relayflow");

        assert_eq!(settings.devices.len(), 1);
        let protocol = &settings.devices[0].protocols[0];
        assert_eq!(protocol.status_command.as_deref(), Some("ST"));
        assert_eq!(protocol.status_length, 1);
        assert_eq!(protocol.channels[0].address, 0);
        assert_eq!(protocol.channels[0].on_command, "SW{c}1");

        assert_eq!(settings.modules.len(), 1);
        assert_eq!(settings.modules[0].device_id, "ESP32-R8");
        assert_eq!(settings.modules[0].cstring, "tcp:10.0.0.5:17123");
        assert_eq!(settings.modules[0].channels[0].description.as_deref(), Some("Anchor light"));
        Ok(())
    }

    #[test]
    fn test_empty_settings() -> Result<()> {
        let settings = Settings::load(None, None)?;
        assert!(settings.devices.is_empty());
        assert!(settings.modules.is_empty());
        assert_eq!(settings.bridge.controlchannel, "notification:notifications.devantech");
        Ok(())
    }
}
