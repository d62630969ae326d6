/*!
 * Connection strings.
 *
 * A connection string names the transport a module is reached over:
 *
 * ```text
 * [[username:]password@]tcp:<host>:<port>
 * [[username:]password@]usb:<device path>
 * ```
 *
 * Parsing is purely textual. The port stays a string here; the transport
 * converts it when it opens the socket.
 */
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a connection string was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing to parse
    #[error("empty connection string")]
    Empty,

    /// Neither `tcp:` nor `usb:`
    #[error("unknown transport in '{0}', expected tcp:<host>:<port> or usb:<device>")]
    UnknownTransport(String),

    /// `tcp:` without a host
    #[error("missing host")]
    MissingHost,

    /// `tcp:` without a `:<port>` suffix
    #[error("missing port")]
    MissingPort,

    /// The port is not a decimal number
    #[error("invalid port '{0}'")]
    InvalidPort(String),

    /// `usb:` without a device path
    #[error("missing device path")]
    MissingDevice,
}

/// The transports a module can be reached over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Plain TCP byte stream
    Tcp,
    /// USB serial port
    Usb,
}

impl TransportKind {
    /// The tag used in connection strings and the catalog
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Tcp => "tcp",
            TransportKind::Usb => "usb",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TCP endpoint of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpEndpoint {
    /// Host name or address
    pub host: String,
    /// Port, as written in the connection string
    pub port: String,
    /// Optional user name
    pub username: Option<String>,
    /// Optional password
    pub password: Option<String>,
}

impl TcpEndpoint {
    /// The port as a number, if it fits in a `u16`
    pub fn port_number(&self) -> Option<u16> {
        self.port.parse().ok()
    }
}

/// Serial endpoint of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbEndpoint {
    /// Serial device path, e.g. `/dev/ttyACM0`
    pub device: String,
}

/// Parsed form of a connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionDescriptor {
    /// A TCP endpoint
    Tcp(TcpEndpoint),
    /// A serial endpoint
    Usb(UsbEndpoint),
}

impl ConnectionDescriptor {
    /// Parse a connection string
    pub fn parse(cstring: &str) -> Result<Self, ParseError> {
        let cstring = cstring.trim();
        if cstring.is_empty() {
            return Err(ParseError::Empty);
        }

        let (credentials, target) = match cstring.split_once('@') {
            Some((credentials, target)) => (Some(credentials.trim()), target.trim()),
            None => (None, cstring),
        };
        let (username, password) = match credentials {
            Some(credentials) => match credentials.split_once(':') {
                Some((user, pass)) => (non_empty(user), non_empty(pass)),
                None => (None, non_empty(credentials)),
            },
            None => (None, None),
        };

        if let Some(rest) = target.strip_prefix("tcp:") {
            let (host, port) = rest.rsplit_once(':').ok_or(ParseError::MissingPort)?;
            if host.is_empty() {
                return Err(ParseError::MissingHost);
            }
            if port.is_empty() || !port.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ParseError::InvalidPort(port.to_string()));
            }
            Ok(ConnectionDescriptor::Tcp(TcpEndpoint {
                host: host.to_string(),
                port: port.to_string(),
                username,
                password,
            }))
        } else if let Some(device) = target.strip_prefix("usb:") {
            if device.is_empty() {
                return Err(ParseError::MissingDevice);
            }
            Ok(ConnectionDescriptor::Usb(UsbEndpoint {
                device: device.to_string(),
            }))
        } else {
            Err(ParseError::UnknownTransport(target.to_string()))
        }
    }

    /// The transport this descriptor selects
    pub fn protocol(&self) -> TransportKind {
        match self {
            ConnectionDescriptor::Tcp(_) => TransportKind::Tcp,
            ConnectionDescriptor::Usb(_) => TransportKind::Usb,
        }
    }

    /// The user name, if the connection string carried one
    pub fn username(&self) -> Option<&str> {
        match self {
            ConnectionDescriptor::Tcp(tcp) => tcp.username.as_deref(),
            ConnectionDescriptor::Usb(_) => None,
        }
    }

    /// The password, if the connection string carried one
    pub fn password(&self) -> Option<&str> {
        match self {
            ConnectionDescriptor::Tcp(tcp) => tcp.password.as_deref(),
            ConnectionDescriptor::Usb(_) => None,
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

impl FromStr for ConnectionDescriptor {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Renders the endpoint without credentials, for logs
impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionDescriptor::Tcp(tcp) => write!(f, "tcp:{}:{}", tcp.host, tcp.port),
            ConnectionDescriptor::Usb(usb) => write!(f, "usb:{}", usb.device),
        }
    }
}
