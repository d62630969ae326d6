/*!
 * The device protocol catalog.
 *
 * The catalog is data: for every supported relay product it lists the
 * channel count and, per transport, the command templates, the status
 * request and how to decode the status reply. It is supplied with the
 * configuration and checked once when the bridge starts.
 *
 * A channel table holding a single entry with address 0 is a uniform
 * template: it stands for every physical address `1..=size`.
 */
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::connection::TransportKind;
use crate::error::ValidationError;

/// Status frames are decoded into a `u64`, so no device can report more channels
pub const MAX_CHANNELS: u32 = 64;

/// Longest status frame, in bytes
pub const MAX_STATUS_LENGTH: usize = 8;

/// A relay product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Space separated aliases of the product
    pub id: String,
    /// Number of relay channels
    pub size: u32,
    /// One descriptor per supported transport
    #[serde(default)]
    pub protocols: Vec<ProtocolDescriptor>,
}

/// How a device is driven over one transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolDescriptor {
    /// Transport tag
    pub id: TransportKind,
    /// Command that asks the device for a status report
    #[serde(default, rename = "statuscommand")]
    pub status_command: Option<String>,
    /// Length in bytes of a status report
    #[serde(default = "default_status_length", rename = "statuslength")]
    pub status_length: usize,
    /// Substituted for `{A}` in commands
    #[serde(default, rename = "authenticationtoken")]
    pub authentication_token: Option<String>,
    /// Command templates per channel address
    #[serde(default, alias = "commands")]
    pub channels: Vec<ChannelTemplate>,
}

/// Command templates for one channel address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTemplate {
    /// Physical address, or 0 for a uniform template
    #[serde(alias = "channel")]
    pub address: u32,
    /// Template switching the channel on
    #[serde(rename = "oncommand", alias = "on")]
    pub on_command: String,
    /// Template switching the channel off
    #[serde(rename = "offcommand", alias = "off")]
    pub off_command: String,
    /// Bits of the status word reporting this channel
    #[serde(default, rename = "statusmask")]
    pub status_mask: Option<u64>,
}

fn default_status_length() -> usize {
    1
}

impl ChannelTemplate {
    /// The explicit status mask, or the bit of this address
    pub fn effective_mask(&self) -> u64 {
        self.status_mask
            .unwrap_or_else(|| default_mask(self.address))
    }
}

/// Single-bit mask of a 1-based address
pub fn default_mask(address: u32) -> u64 {
    address
        .checked_sub(1)
        .and_then(|bit| 1u64.checked_shl(bit))
        .unwrap_or(0)
}

impl Device {
    /// The product aliases
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.id.split_whitespace()
    }

    /// Whether `alias` names this product
    pub fn has_alias(&self, alias: &str) -> bool {
        self.aliases().any(|a| a == alias)
    }

    /// The descriptor for a transport
    pub fn protocol(&self, kind: TransportKind) -> Option<&ProtocolDescriptor> {
        self.protocols.iter().find(|p| p.id == kind)
    }

    /// Check the entry is usable
    pub fn check(&self) -> Result<(), ValidationError> {
        let invalid = |reason: String| ValidationError::InvalidCatalog {
            device: self.id.clone(),
            reason,
        };

        if self.aliases().next().is_none() {
            return Err(invalid("device has no id".to_string()));
        }
        if self.size == 0 || self.size > MAX_CHANNELS {
            return Err(invalid(format!(
                "size {} is outside 1..={}",
                self.size, MAX_CHANNELS
            )));
        }

        let mut seen = HashSet::new();
        for protocol in &self.protocols {
            if !seen.insert(protocol.id) {
                return Err(invalid(format!("protocol {} is listed twice", protocol.id)));
            }
            protocol
                .check(self.size)
                .map_err(|reason| invalid(format!("protocol {}: {}", protocol.id, reason)))?;
        }

        Ok(())
    }
}

impl ProtocolDescriptor {
    /// Whether the channel table is a single template for every address
    pub fn is_uniform(&self) -> bool {
        matches!(self.channels.as_slice(), [only] if only.address == 0)
    }

    /// The channel table with a uniform template expanded to one entry per address
    pub fn expanded_channels(&self, size: u32) -> Vec<ChannelTemplate> {
        match self.channels.as_slice() {
            [only] if only.address == 0 => (1..=size)
                .map(|address| ChannelTemplate {
                    address,
                    on_command: only.on_command.clone(),
                    off_command: only.off_command.clone(),
                    status_mask: None,
                })
                .collect(),
            _ => self.channels.clone(),
        }
    }

    fn check(&self, size: u32) -> Result<(), String> {
        if self.status_length == 0 || self.status_length > MAX_STATUS_LENGTH {
            return Err(format!(
                "status length {} is outside 1..={}",
                self.status_length, MAX_STATUS_LENGTH
            ));
        }
        if self.channels.is_empty() {
            return Err("empty channel table".to_string());
        }

        let bits = 8 * self.status_length as u32;
        for channel in self.expanded_channels(size) {
            if bits < u64::BITS && channel.effective_mask() >> bits != 0 {
                return Err(format!(
                    "status mask {:#x} of channel address {} does not fit a {} byte status frame",
                    channel.effective_mask(),
                    channel.address,
                    self.status_length
                ));
            }
        }
        if self.is_uniform() {
            return Ok(());
        }

        let mut seen = HashSet::new();
        for channel in &self.channels {
            if channel.address == 0 || channel.address > size {
                return Err(format!("channel address {} is outside 1..={}", channel.address, size));
            }
            if !seen.insert(channel.address) {
                return Err(format!("channel address {} is listed twice", channel.address));
            }
            if channel.status_mask == Some(0) {
                return Err(format!("channel address {} has a zero status mask", channel.address));
            }
        }
        Ok(())
    }
}

/// The checked set of known devices
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    devices: Vec<Device>,
}

impl Catalog {
    /// Build a catalog, dropping (and logging) entries that fail [`Device::check`]
    pub fn new(devices: Vec<Device>) -> Self {
        let devices = devices
            .into_iter()
            .filter(|device| match device.check() {
                Ok(()) => true,
                Err(e) => {
                    error!("{}", e);
                    false
                }
            })
            .collect::<Vec<_>>();

        debug!("Catalog holds {} devices", devices.len());
        Self { devices }
    }

    /// Find the single device carrying `alias`
    pub fn lookup(&self, alias: &str) -> Result<&Device, ValidationError> {
        let mut matches = self.devices.iter().filter(|d| d.has_alias(alias));
        match (matches.next(), matches.next()) {
            (Some(device), None) => Ok(device),
            (Some(_), Some(_)) => Err(ValidationError::AmbiguousDeviceId(alias.to_string())),
            (None, _) => Err(ValidationError::InvalidDeviceId(alias.to_string())),
        }
    }

    /// The devices in the catalog
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Number of devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the catalog holds no devices
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn esp32relay8() -> Device {
        serde_json::from_value(json!({
            "id": "ESP32RELAY8 ESP32-8",
            "size": 8,
            "protocols": [
                { "id": "tcp", "channels": [ { "address": 0, "oncommand": "SW{c}1", "offcommand": "SW{c}0" } ] }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_legacy_field_names() {
        let device: Device = serde_json::from_value(json!({
            "id": "USB-RLY02",
            "size": 2,
            "protocols": [{
                "id": "usb",
                "statuscommand": "[",
                "commands": [
                    { "channel": 1, "on": "e", "off": "o" },
                    { "channel": 2, "on": "f", "off": "p" }
                ]
            }]
        }))
        .unwrap();

        let usb = device.protocol(TransportKind::Usb).unwrap();
        assert_eq!(usb.status_length, 1);
        assert_eq!(usb.status_command.as_deref(), Some("["));
        assert_eq!(usb.channels[1].address, 2);
        assert_eq!(usb.channels[1].on_command, "f");
        assert!(device.check().is_ok());
    }

    #[test]
    fn test_unknown_protocol_is_rejected_at_load() {
        let result = serde_json::from_value::<Device>(json!({
            "id": "X", "size": 1,
            "protocols": [{ "id": "http", "channels": [] }]
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_uniform_expansion() {
        let device = esp32relay8();
        let tcp = device.protocol(TransportKind::Tcp).unwrap();
        assert!(tcp.is_uniform());

        let table = tcp.expanded_channels(device.size);
        assert_eq!(table.len(), 8);
        for (i, channel) in table.iter().enumerate() {
            assert_eq!(channel.address, i as u32 + 1);
            assert_eq!(channel.on_command, "SW{c}1");
            assert_eq!(channel.effective_mask(), 1 << i);
        }
    }

    #[test]
    fn test_explicit_mask_wins() {
        let channel = ChannelTemplate {
            address: 1,
            on_command: String::new(),
            off_command: String::new(),
            status_mask: Some(0x0100),
        };
        assert_eq!(channel.effective_mask(), 0x0100);
        assert_eq!(default_mask(0), 0);
        assert_eq!(default_mask(64), 1 << 63);
        assert_eq!(default_mask(65), 0);
    }

    #[test]
    fn test_lookup_by_alias() {
        let catalog = Catalog::new(vec![esp32relay8()]);
        assert_eq!(catalog.lookup("ESP32-8").unwrap().size, 8);
        assert_eq!(
            catalog.lookup("ESP32"),
            Err(ValidationError::InvalidDeviceId("ESP32".to_string()))
        );
    }

    #[test]
    fn test_ambiguous_alias() {
        let mut other = esp32relay8();
        other.id = "ESP32-8 CLONE".to_string();
        let catalog = Catalog::new(vec![esp32relay8(), other]);
        assert!(matches!(
            catalog.lookup("ESP32-8"),
            Err(ValidationError::AmbiguousDeviceId(_))
        ));
        assert!(catalog.lookup("CLONE").is_ok());
    }

    #[test_log::test]
    fn test_malformed_devices_are_dropped() {
        let mut zero = esp32relay8();
        zero.id = "ZERO".to_string();
        zero.size = 0;

        let mut out_of_range = esp32relay8();
        out_of_range.id = "RANGE".to_string();
        out_of_range.protocols[0].channels = vec![ChannelTemplate {
            address: 9,
            on_command: "x".to_string(),
            off_command: "y".to_string(),
            status_mask: None,
        }];

        let mut duplicate = esp32relay8();
        duplicate.id = "DUP".to_string();
        duplicate.protocols.push(duplicate.protocols[0].clone());

        let catalog = Catalog::new(vec![esp32relay8(), zero, out_of_range, duplicate]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.lookup("ESP32RELAY8").is_ok());
    }

    #[test]
    fn test_masks_must_fit_the_status_frame() {
        let mut sixteen = esp32relay8();
        sixteen.id = "R16".to_string();
        sixteen.size = 16;
        assert!(matches!(
            sixteen.check(),
            Err(ValidationError::InvalidCatalog { reason, .. }) if reason.contains("0x100")
        ));

        sixteen.protocols[0].status_length = 2;
        assert!(sixteen.check().is_ok());

        let mut wide_mask = esp32relay8();
        wide_mask.protocols[0].channels = vec![ChannelTemplate {
            address: 1,
            on_command: "x".to_string(),
            off_command: "y".to_string(),
            status_mask: Some(0x0100),
        }];
        assert!(wide_mask.check().is_err());

        let catalog = Catalog::new(vec![esp32relay8(), {
            let mut r16 = esp32relay8();
            r16.id = "R16".to_string();
            r16.size = 16;
            r16
        }]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.lookup("R16").is_err());
    }
}
