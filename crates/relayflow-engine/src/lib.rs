/*!
 * Relayflow Engine
 *
 * This crate connects the device layer to the host bus: it supervises one
 * link per relay module, decodes control envelopes, dispatches them as
 * device commands and publishes channel state as deltas.
 */

#![warn(missing_docs)]

// Re-export core types
pub use relayflow_core::prelude;

pub mod bridge;
pub mod control;
pub mod dispatcher;
pub mod error;
pub mod settings;

// Re-export main types for convenience
pub use bridge::Bridge;
pub use control::{ControlChannel, ControlRequest};
pub use dispatcher::{DispatchOutcome, Dispatcher};
pub use error::{Error, Result};
pub use settings::Settings;

/// Relayflow engine crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
