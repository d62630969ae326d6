/*!
 * Error types for the relayflow engine crate.
 */
use thiserror::Error;

use relayflow_devices::DeviceError;

/// Error type for relayflow engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// Bad control channel specification or control envelope
    #[error("Control error: {0}")]
    Control(String),

    /// Device error
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] relayflow_core::error::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for relayflow engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new control error
    pub fn control<S: AsRef<str>>(msg: S) -> Self {
        Error::Control(msg.as_ref().to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
