/*!
 * Core data types for relayflow.
 */
use std::fmt;

use serde::{Deserialize, Serialize};

/// Path template addressing one channel of one module on the bus.
///
/// `{m}` is replaced by the module id and `{c}` by the channel index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SwitchPath(String);

impl SwitchPath {
    /// Create a switch path from a template
    pub fn new<S: Into<String>>(template: S) -> Self {
        Self(template.into())
    }

    /// Get the raw template
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The path of a channel
    pub fn channel(&self, module_id: &str, index: u32) -> String {
        self.0
            .replace("{m}", module_id)
            .replace("{c}", &index.to_string())
    }

    /// The path a channel's state is published at
    pub fn state(&self, module_id: &str, index: u32) -> String {
        format!("{}.state", self.channel(module_id, index))
    }

    /// The path a channel's metadata is published at
    pub fn meta(&self, module_id: &str, index: u32) -> String {
        format!("{}.meta", self.channel(module_id, index))
    }
}

impl fmt::Display for SwitchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SwitchPath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SwitchPath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}
