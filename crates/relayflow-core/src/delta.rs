/*!
 * Outbound state deltas.
 *
 * A delta is the unit handed to the host bus: a batch of `(path, value)`
 * pairs stamped with a source and a timestamp. Deltas leave the bridge
 * through a [`DeltaSink`]; the default sink is an unbounded, order
 * preserving channel that any number of module tasks can publish into.
 */
use std::fmt::Debug;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};

/// A batch of path/value updates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    /// The updates carried by this delta
    pub updates: Vec<Update>,
}

/// One update inside a delta
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Who issued the update
    pub source: Source,
    /// When the update was issued
    pub timestamp: DateTime<Utc>,
    /// The path/value pairs
    pub values: Vec<PathValue>,
}

/// Origin of an update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Source type, always `plugin` for relayflow
    #[serde(rename = "type")]
    pub kind: String,
    /// Source name
    pub src: String,
}

/// A single value at a path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathValue {
    /// Dotted path of the value
    pub path: String,
    /// The value
    pub value: serde_json::Value,
}

impl PathValue {
    /// Create a new path/value pair
    pub fn new<P: Into<String>, V: Into<serde_json::Value>>(path: P, value: V) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

impl Delta {
    /// Create a delta holding a single update from `src`
    pub fn new<S: Into<String>>(src: S, values: Vec<PathValue>) -> Self {
        Self {
            updates: vec![Update {
                source: Source {
                    kind: "plugin".to_string(),
                    src: src.into(),
                },
                timestamp: Utc::now(),
                values,
            }],
        }
    }

    /// Iterate over every path/value pair in the delta
    pub fn values(&self) -> impl Iterator<Item = &PathValue> {
        self.updates.iter().flat_map(|u| u.values.iter())
    }

    /// Whether the delta carries no values
    pub fn is_empty(&self) -> bool {
        self.values().next().is_none()
    }
}

/// Receiver of outbound deltas
pub trait DeltaSink: Send + Sync + Debug {
    /// Hand a delta to the host bus
    fn publish(&self, delta: Delta) -> Result<()>;
}

/// A sink shared between module tasks
pub type SharedDeltaSink = Arc<dyn DeltaSink>;

/// Receiving half of a [`DeltaBus`]
pub type DeltaReceiver = mpsc::UnboundedReceiver<Delta>;

/// Channel-backed delta sink
#[derive(Debug, Clone)]
pub struct DeltaBus {
    sender: mpsc::UnboundedSender<Delta>,
}

impl DeltaBus {
    /// Create a bus and the receiver that drains it
    pub fn new() -> (Self, DeltaReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl DeltaSink for DeltaBus {
    fn publish(&self, delta: Delta) -> Result<()> {
        trace!("Publishing delta with {} values", delta.values().count());
        self.sender
            .send(delta)
            .map_err(|_| Error::runtime("Delta receiver has been dropped"))
    }
}
