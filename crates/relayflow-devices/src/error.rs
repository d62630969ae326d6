/*!
 * Error types for the relayflow devices crate.
 */
use thiserror::Error;

use crate::connection::ParseError;

/// Reasons a module (or a catalog entry) is rejected at startup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The module names no device
    #[error("module definition must include a device id")]
    MissingDeviceId,

    /// No catalog device carries the alias
    #[error("invalid device id ({0})")]
    InvalidDeviceId(String),

    /// More than one catalog device carries the alias
    #[error("ambiguous device id ({0}) matches several catalog devices")]
    AmbiguousDeviceId(String),

    /// The connection string does not follow the `tcp:`/`usb:` grammar
    #[error("connection string could not be parsed ({cstring}): {source}")]
    ConnectionString {
        /// The offending connection string
        cstring: String,
        /// Why parsing failed
        source: ParseError,
    },

    /// The device does not speak the protocol the connection string selects
    #[error("unsupported protocol '{0}'")]
    UnsupportedProtocol(String),

    /// The module declares more channels than the device has
    #[error("module declares {declared} channels but the device only has {size}")]
    TooManyChannels {
        /// Number of channels the module declared
        declared: usize,
        /// Number of channels the device provides
        size: u32,
    },

    /// A channel resolves to no entry of the protocol channel table
    #[error("invalid channel definition (channel {index}, address {address})")]
    InvalidChannel {
        /// The channel index
        index: u32,
        /// The address that was looked up
        address: u32,
    },

    /// Another module already uses this id
    #[error("duplicate module id ({0})")]
    DuplicateModuleId(String),

    /// A catalog device entry is malformed
    #[error("invalid catalog entry for device '{device}': {reason}")]
    InvalidCatalog {
        /// The device aliases
        device: String,
        /// What is wrong with it
        reason: String,
    },
}

/// Error type for device operations
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The module's link is not open
    #[error("Module {0} is not connected")]
    NotConnected(String),

    /// The module's transport failed
    #[error("Transport error: {0}")]
    Transport(String),

    /// The module has no transport implementation for its protocol
    #[error("Unsupported transport: {0}")]
    UnsupportedTransport(String),

    /// No command template matches the requested operation
    #[error("cannot recover operating command for module {module} channel {channel}")]
    CommandResolution {
        /// The module id
        module: String,
        /// The requested channel index
        channel: u32,
    },

    /// A status frame has the wrong length
    #[error("status frame length mismatch: expected {expected} bytes, got {actual}")]
    FrameLength {
        /// The module's status length
        expected: usize,
        /// The length of the received frame
        actual: usize,
    },

    /// Other error
    #[error("Other error: {0}")]
    Other(String),
}

/// Result type for device operations
pub type Result<T> = std::result::Result<T, DeviceError>;
