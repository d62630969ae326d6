/*!
 * Control channel and control envelopes.
 *
 * Requests to switch a channel arrive as JSON envelopes:
 *
 * ```json
 * { "moduleid": "m1", "channelid": 3, "state": 1 }
 * ```
 *
 * `channelid` and `state` may also be numeric strings, and any non-zero
 * `state` means on. Notifications carry the request as a JSON string in
 * their `description` field; such envelopes are unwrapped first.
 */
use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{Error, Result};

/// Where control requests come from, parsed from `<kind>:<name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlChannel {
    /// A notification path on the host bus
    Notification(String),
}

impl ControlChannel {
    /// The notification path or channel name
    pub fn name(&self) -> &str {
        match self {
            ControlChannel::Notification(path) => path,
        }
    }
}

impl FromStr for ControlChannel {
    type Err = Error;

    fn from_str(spec: &str) -> Result<Self> {
        let (kind, name) = spec
            .split_once(':')
            .filter(|(kind, name)| !kind.is_empty() && !name.is_empty())
            .ok_or_else(|| Error::control(format!("bad control channel specification {}", spec)))?;

        match kind {
            "notification" => Ok(ControlChannel::Notification(name.to_string())),
            _ => Err(Error::control(format!("unimplemented control channel {}", spec))),
        }
    }
}

impl fmt::Display for ControlChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlChannel::Notification(path) => write!(f, "notification:{}", path),
        }
    }
}

/// A request to switch one channel of one module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlRequest {
    /// Target module id
    pub module_id: String,
    /// Target channel index
    pub channel: u32,
    /// Desired state
    pub state: bool,
}

impl ControlRequest {
    /// Parse an envelope from text.
    ///
    /// Text that is not JSON is an error. A JSON envelope missing one of the
    /// request fields is not a request and yields `None`.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let envelope: Value = serde_json::from_str(text)?;
        Self::from_envelope(&envelope)
    }

    /// Extract a request from a decoded envelope
    pub fn from_envelope(envelope: &Value) -> Result<Option<Self>> {
        let unwrapped;
        let command = match envelope.get("description").and_then(Value::as_str) {
            Some(description) => {
                unwrapped = serde_json::from_str::<Value>(description)?;
                &unwrapped
            }
            None => envelope,
        };

        let module_id = match command.get("moduleid") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => return Ok(None),
        };
        let Some(channel) = command.get("channelid").and_then(integer) else {
            return Ok(None);
        };
        let Some(state) = command.get("state").and_then(integer) else {
            return Ok(None);
        };

        let channel = u32::try_from(channel)
            .map_err(|_| Error::control(format!("channel {} is out of range", channel)))?;

        Ok(Some(Self {
            module_id,
            channel,
            state: state != 0,
        }))
    }
}

/// An integer given as a JSON number or a numeric string
fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

impl fmt::Display for ControlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "module {} channel {} {}",
            self.module_id,
            self.channel,
            if self.state { "on" } else { "off" }
        )
    }
}
