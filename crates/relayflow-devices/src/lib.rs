/*!
 * Relayflow Devices
 *
 * Everything that knows about Devantech relay hardware: the device catalog,
 * connection strings, module validation, command templates, status frames
 * and the TCP/serial links that carry them.
 */

#![warn(missing_docs)]

// Re-export core types
pub use relayflow_core::prelude;

pub mod catalog;
pub mod command;
pub mod connection;
pub mod error;
pub mod module;
pub mod registry;
pub mod status;
pub mod transport;

pub use catalog::{Catalog, ChannelTemplate, Device, ProtocolDescriptor};
pub use connection::{ConnectionDescriptor, ParseError, TransportKind};
pub use error::{DeviceError, Result, ValidationError};
pub use module::{validate_modules, Channel, ChannelConfig, ModuleConfig, ValidatedModule};
pub use registry::{ActiveModule, ModuleRegistry, Registration};
pub use transport::{connect, LinkEvent, LinkEvents, LinkState, ModuleLink};

/// Relayflow devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Transports this build can open
pub fn available_transports() -> Vec<TransportKind> {
    if cfg!(feature = "serial") {
        vec![TransportKind::Tcp, TransportKind::Usb]
    } else {
        vec![TransportKind::Tcp]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcp_always_available() {
        let transports = available_transports();
        assert!(transports.contains(&TransportKind::Tcp));
        assert_eq!(transports.contains(&TransportKind::Usb), cfg!(feature = "serial"));
    }
}
