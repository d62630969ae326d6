/*!
 * Module definitions and their validation.
 *
 * A [`ModuleConfig`] is what the user wrote. [`ValidatedModule::validate`]
 * checks it against the [`Catalog`] and produces an immutable record with
 * every channel's commands and status mask resolved, so nothing downstream
 * has to consult the catalog again.
 */
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::connection::{ConnectionDescriptor, TransportKind};
use crate::error::ValidationError;

/// A relay module as configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Unique module id
    pub id: String,
    /// Alias of the catalog device
    #[serde(default, rename = "deviceid")]
    pub device_id: String,
    /// Connection string
    #[serde(default, alias = "devicecstring")]
    pub cstring: String,
    /// Declared channels; empty means every channel of the device
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

/// A channel as configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Logical index used by control requests and paths
    pub index: u32,
    /// Physical address, when it differs from the index
    #[serde(default)]
    pub address: Option<u32>,
    /// Display name
    #[serde(default)]
    pub description: Option<String>,
}

/// A channel with its commands resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    /// Logical index
    pub index: u32,
    /// Physical address
    pub address: u32,
    /// Display name
    pub description: String,
    /// Template switching the channel on
    pub on_command: String,
    /// Template switching the channel off
    pub off_command: String,
    /// Bits of the status word reporting this channel
    pub status_mask: u64,
}

impl Channel {
    /// The template for a desired state
    pub fn command_template(&self, state: bool) -> &str {
        if state {
            &self.on_command
        } else {
            &self.off_command
        }
    }
}

/// A module that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedModule {
    id: String,
    device_id: String,
    connection: ConnectionDescriptor,
    channels: Vec<Channel>,
    status_command: Option<String>,
    status_length: usize,
    authentication_token: Option<String>,
}

impl ValidatedModule {
    /// Validate a module definition against the catalog
    pub fn validate(config: &ModuleConfig, catalog: &Catalog) -> Result<Self, ValidationError> {
        let device_id = config.device_id.trim();
        if device_id.is_empty() {
            return Err(ValidationError::MissingDeviceId);
        }
        let device = catalog.lookup(device_id)?;

        let connection = ConnectionDescriptor::parse(&config.cstring).map_err(|source| {
            ValidationError::ConnectionString {
                cstring: config.cstring.clone(),
                source,
            }
        })?;

        let protocol = device
            .protocol(connection.protocol())
            .ok_or_else(|| ValidationError::UnsupportedProtocol(connection.protocol().to_string()))?;

        if config.channels.len() > device.size as usize {
            return Err(ValidationError::TooManyChannels {
                declared: config.channels.len(),
                size: device.size,
            });
        }

        let declared = if config.channels.is_empty() {
            (1..=device.size)
                .map(|index| ChannelConfig {
                    index,
                    address: None,
                    description: None,
                })
                .collect()
        } else {
            config.channels.clone()
        };

        let table = protocol.expanded_channels(device.size);
        let mut seen = HashSet::new();
        let mut channels = Vec::with_capacity(declared.len());
        for channel in declared {
            let address = channel.address.unwrap_or(channel.index);
            let template = table
                .iter()
                .find(|t| t.address == address)
                .filter(|_| seen.insert(channel.index))
                .ok_or(ValidationError::InvalidChannel {
                    index: channel.index,
                    address,
                })?;

            channels.push(Channel {
                index: channel.index,
                address,
                description: channel
                    .description
                    .unwrap_or_else(|| format!("Relay {}", channel.index)),
                on_command: template.on_command.clone(),
                off_command: template.off_command.clone(),
                status_mask: template.effective_mask(),
            });
        }

        Ok(Self {
            id: config.id.clone(),
            device_id: device_id.to_string(),
            connection,
            channels,
            status_command: protocol.status_command.clone(),
            status_length: protocol.status_length,
            authentication_token: protocol.authentication_token.clone(),
        })
    }

    /// The module id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The device alias the module was configured with
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// The parsed connection string
    pub fn connection(&self) -> &ConnectionDescriptor {
        &self.connection
    }

    /// The transport the module is reached over
    pub fn protocol(&self) -> TransportKind {
        self.connection.protocol()
    }

    /// Channels in declaration order
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// The channel with a logical index
    pub fn channel(&self, index: u32) -> Option<&Channel> {
        self.channels.iter().find(|c| c.index == index)
    }

    /// Template of the status request command
    pub fn status_command(&self) -> Option<&str> {
        self.status_command.as_deref()
    }

    /// Length in bytes of a status report
    pub fn status_length(&self) -> usize {
        self.status_length
    }

    /// Template substituted for `{A}`
    pub fn authentication_token(&self) -> Option<&str> {
        self.authentication_token.as_deref()
    }
}

/// Validate every module, keeping the ones that pass.
///
/// Rejected modules are logged and left out; the rest of the run carries on
/// with whatever remains.
pub fn validate_modules(configs: &[ModuleConfig], catalog: &Catalog) -> Vec<ValidatedModule> {
    let mut ids = HashSet::new();
    let modules = configs
        .iter()
        .filter_map(|config| {
            let result = if ids.contains(config.id.as_str()) {
                Err(ValidationError::DuplicateModuleId(config.id.clone()))
            } else {
                ValidatedModule::validate(config, catalog)
            };
            match result {
                Ok(module) => {
                    ids.insert(config.id.as_str());
                    debug!(
                        "module {}: {} on {} with {} channels",
                        module.id(),
                        module.device_id(),
                        module.connection(),
                        module.channels().len()
                    );
                    Some(module)
                }
                Err(e) => {
                    error!("module {}: {}", config.id, e);
                    None
                }
            }
        })
        .collect::<Vec<_>>();

    if modules.is_empty() {
        warn!("there are no usable module definitions");
    } else {
        info!(
            "{} of {} module definitions are usable",
            modules.len(),
            configs.len()
        );
    }
    modules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Device;
    use serde_json::json;

    fn catalog() -> Catalog {
        let devices: Vec<Device> = serde_json::from_value(json!([
            {
                "id": "ESP32RELAY8",
                "size": 8,
                "protocols": [
                    { "id": "tcp", "channels": [ { "address": 0, "oncommand": "SW{c}1", "offcommand": "SW{c}0" } ] }
                ]
            },
            {
                "id": "DS2824 DS2",
                "size": 2,
                "protocols": [{
                    "id": "tcp",
                    "statuscommand": "ST",
                    "statuslength": 2,
                    "authenticationtoken": "{p}",
                    "channels": [
                        { "address": 1, "oncommand": "{A}R1", "offcommand": "{A}r1", "statusmask": 256 },
                        { "address": 2, "oncommand": "{A}R2", "offcommand": "{A}r2", "statusmask": 512 }
                    ]
                }]
            }
        ]))
        .unwrap();
        Catalog::new(devices)
    }

    fn module(device_id: &str, cstring: &str, channels: Vec<ChannelConfig>) -> ModuleConfig {
        ModuleConfig {
            id: "m1".to_string(),
            device_id: device_id.to_string(),
            cstring: cstring.to_string(),
            channels,
        }
    }

    fn channel(index: u32, address: Option<u32>) -> ChannelConfig {
        ChannelConfig {
            index,
            address,
            description: None,
        }
    }

    #[test]
    fn test_zero_channels_synthesizes_device_size() {
        let module = ValidatedModule::validate(
            &module("ESP32RELAY8", "tcp:10.0.0.5:17123", vec![]),
            &catalog(),
        )
        .unwrap();

        assert_eq!(module.channels().len(), 8);
        for (i, channel) in module.channels().iter().enumerate() {
            let address = i as u32 + 1;
            assert_eq!(channel.index, address);
            assert_eq!(channel.address, address);
            assert_eq!(channel.status_mask, 1 << (address - 1));
            assert_eq!(channel.on_command, "SW{c}1");
            assert_eq!(channel.off_command, "SW{c}0");
            assert_eq!(channel.description, format!("Relay {}", address));
        }
        assert_eq!(module.status_length(), 1);
        assert_eq!(module.status_command(), None);
        assert_eq!(module.protocol(), TransportKind::Tcp);
    }

    #[test]
    fn test_protocol_fields_are_copied() {
        let module = ValidatedModule::validate(
            &module("DS2", "pw@tcp:relay:17123", vec![]),
            &catalog(),
        )
        .unwrap();

        assert_eq!(module.device_id(), "DS2");
        assert_eq!(module.status_command(), Some("ST"));
        assert_eq!(module.status_length(), 2);
        assert_eq!(module.authentication_token(), Some("{p}"));
        assert_eq!(module.channel(2).unwrap().status_mask, 512);
    }

    #[test]
    fn test_explicit_address_maps_index() {
        let mut config = module("ESP32RELAY8", "tcp:h:1", vec![channel(1, Some(5))]);
        config.channels[0].description = Some("Pump".to_string());
        let module = ValidatedModule::validate(&config, &catalog()).unwrap();

        let ch = module.channel(1).unwrap();
        assert_eq!(ch.address, 5);
        assert_eq!(ch.status_mask, 0x10);
        assert_eq!(ch.description, "Pump");
        assert!(module.channel(5).is_none());
    }

    #[test]
    fn test_rejections() {
        let catalog = catalog();
        let check = |config: ModuleConfig| ValidatedModule::validate(&config, &catalog).unwrap_err();

        assert_eq!(check(module("", "tcp:h:1", vec![])), ValidationError::MissingDeviceId);
        assert_eq!(
            check(module("NOPE", "tcp:h:1", vec![])),
            ValidationError::InvalidDeviceId("NOPE".to_string())
        );
        assert!(matches!(
            check(module("ESP32RELAY8", "tcp:h", vec![])),
            ValidationError::ConnectionString { .. }
        ));
        assert_eq!(
            check(module("ESP32RELAY8", "usb:/dev/ttyACM0", vec![])),
            ValidationError::UnsupportedProtocol("usb".to_string())
        );
        assert_eq!(
            check(module("DS2", "tcp:h:1", vec![channel(1, None), channel(2, None), channel(3, None)])),
            ValidationError::TooManyChannels { declared: 3, size: 2 }
        );
        assert_eq!(
            check(module("ESP32RELAY8", "tcp:h:1", vec![channel(9, None)])),
            ValidationError::InvalidChannel { index: 9, address: 9 }
        );
        assert_eq!(
            check(module("ESP32RELAY8", "tcp:h:1", vec![channel(2, None), channel(2, Some(3))])),
            ValidationError::InvalidChannel { index: 2, address: 3 }
        );
    }

    #[test_log::test]
    fn test_validate_modules_keeps_the_usable_ones() {
        let mut second = module("ESP32RELAY8", "tcp:h:2", vec![]);
        second.id = "m2".to_string();
        let configs = vec![
            module("ESP32RELAY8", "tcp:h:1", vec![]),
            module("ESP32RELAY8", "tcp:h:1", vec![]),
            module("NOPE", "tcp:h:1", vec![]),
            second,
        ];

        let modules = validate_modules(&configs, &catalog());
        let ids: Vec<_> = modules.iter().map(|m| m.id()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
    }

    #[test]
    fn test_no_usable_modules_is_not_fatal() {
        assert!(validate_modules(&[module("NOPE", "tcp:h:1", vec![])], &catalog()).is_empty());
    }
}
