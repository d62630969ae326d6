/*!
 * relayflow Core
 *
 * This crate provides the ambient pieces shared by the relayflow crates:
 * configuration, logging, the outbound delta sink and small task helpers.
 */

#![warn(missing_docs)]

pub mod config;
pub mod delta;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod types;
pub mod utils;

/// Re-export of dependencies that are part of the public API
pub mod deps {
    pub use anyhow;
    pub use chrono;
    pub use futures;
    pub use serde;
    pub use serde_json;
    pub use tokio;
    pub use tracing;
}

/// relayflow core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library initialization with default logging
pub fn init() -> Result<(), error::Error> {
    logging::init()?;
    tracing::info!("relayflow core {} initialized", VERSION);
    Ok(())
}
