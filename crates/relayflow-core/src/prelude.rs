/*!
 * Prelude module for relayflow core.
 *
 * This module re-exports commonly used types and functions from the relayflow
 * core crate to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::SwitchPath;

// Re-export delta types
pub use crate::delta::{Delta, DeltaBus, DeltaReceiver, DeltaSink, PathValue, SharedDeltaSink};

// Re-export config types
pub use crate::config::{BridgeOptions, Config, ConfigBuilder, GeneralConfig, LoggingConfig};

// Re-export utility functions
pub use crate::utils::spawn_and_log;

// Re-export logging macros
pub use tracing::{debug, error, info, trace, warn};

// Re-export core initialization
pub use crate::init;
