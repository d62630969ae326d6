/*!
 * Logging functionality for relayflow.
 *
 * This module provides tracing setup and the span helpers used by the
 * bridge. Traffic is logged under dedicated targets so it can be switched
 * on independently, e.g. `RUST_LOG=info,relayflow::commands=debug`.
 */
use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Target for inbound control requests and transmitted commands
pub const COMMANDS: &str = "relayflow::commands";

/// Target for decoded channel state
pub const STATE: &str = "relayflow::state";

/// Target for transport open/data/close traffic
pub const COMMS: &str = "relayflow::comms";

/// Initialize the logging system with default configuration
pub fn init() -> Result<()> {
    init_with(&LoggingConfig::default())
}

/// Initialize the logging system from a logging configuration section.
///
/// `RUST_LOG`, when set, takes precedence over `config.level`. Logs go to
/// stderr; stdout is left to the bridge output.
pub fn init_with(config: &LoggingConfig) -> Result<()> {
    tracing::subscriber::set_global_default(subscriber(config, std::io::stderr))
        .map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))
}

/// Build the subscriber described by `config`, writing to `writer`
fn subscriber<W>(config: &LoggingConfig, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.json_format {
        Box::new(registry.with(fmt::layer().json().with_target(true).with_writer(writer)))
    } else {
        Box::new(registry.with(fmt::layer().with_target(true).with_writer(writer)))
    }
}

/// A type alias for a tracing span
pub type Span = tracing::Span;

/// Create the span that per-module work runs in
pub fn module_span(module_id: &str) -> Span {
    tracing::info_span!("module", id = %module_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_init_twice_reports_error() {
        // The first call may lose to another test installing a subscriber,
        // but the second can never succeed.
        let _ = init();
        assert!(matches!(init(), Err(Error::Runtime(_))));
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn captured(config: &LoggingConfig) -> String {
        let capture = Capture::default();
        let writer = capture.clone();
        tracing::subscriber::with_default(subscriber(config, move || writer.clone()), || {
            tracing::warn!(target: STATE, "module m1: discarding status frame");
        });
        let bytes = capture.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    #[test]
    fn test_json_format() {
        let output = captured(&LoggingConfig {
            level: "info".to_string(),
            json_format: true,
        });
        let line: serde_json::Value = serde_json::from_str(output.lines().next().unwrap()).unwrap();
        assert_eq!(line["target"], "relayflow::state");
        assert_eq!(line["level"], "WARN");
        assert_eq!(line["fields"]["message"], "module m1: discarding status frame");
    }

    #[test]
    fn test_plain_format() {
        let output = captured(&LoggingConfig::default());
        assert!(output.contains("relayflow::state"));
        assert!(serde_json::from_str::<serde_json::Value>(output.trim()).is_err());
    }
}
