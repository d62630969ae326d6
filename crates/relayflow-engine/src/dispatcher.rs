/*!
 * Channel action dispatcher.
 *
 * Turns a `(module, channel, state)` request into bytes on the module's link:
 * the channel command first, then the status request so the device echoes
 * its real state. Nothing is queued; a module whose link is not open gets an
 * error back.
 */
use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error};

use relayflow_core::config::BridgeOptions;
use relayflow_core::delta::{Delta, PathValue, SharedDeltaSink};
use relayflow_core::logging::COMMANDS;
use relayflow_core::types::SwitchPath;
use relayflow_devices::command;
use relayflow_devices::{DeviceError, ModuleRegistry, ValidatedModule};

use crate::control::ControlRequest;
use crate::error::Result;

/// What became of a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The command was written to the module's link
    Sent {
        /// The bytes written for the channel
        command: Bytes,
        /// Whether a status request followed
        status_requested: bool,
    },
    /// No module with that id was configured; nothing happened
    UnknownModule,
}

/// Routes control requests to module links
#[derive(Debug)]
pub struct Dispatcher {
    modules: HashMap<String, Arc<ValidatedModule>>,
    registry: Arc<ModuleRegistry>,
    sink: SharedDeltaSink,
    switchpath: SwitchPath,
    source: String,
    optimistic: bool,
}

impl Dispatcher {
    /// Create a dispatcher over `modules`, writing through the links held
    /// in `registry`
    pub fn new(
        modules: impl IntoIterator<Item = Arc<ValidatedModule>>,
        registry: Arc<ModuleRegistry>,
        sink: SharedDeltaSink,
        options: &BridgeOptions,
        source: impl Into<String>,
    ) -> Self {
        Self {
            modules: modules
                .into_iter()
                .map(|module| (module.id().to_string(), module))
                .collect(),
            registry,
            sink,
            switchpath: SwitchPath::new(options.switchpath.as_str()),
            source: source.into(),
            optimistic: options.optimistic_updates,
        }
    }

    /// Handle a decoded control request
    pub fn dispatch(&self, request: &ControlRequest) -> Result<DispatchOutcome> {
        self.handle(&request.module_id, request.channel, request.state)
    }

    /// Switch `channel` of `module_id` to `state`
    pub fn handle(&self, module_id: &str, channel: u32, state: bool) -> Result<DispatchOutcome> {
        let Some(module) = self.modules.get(module_id) else {
            debug!(target: COMMANDS, "ignoring command for unknown module {}", module_id);
            return Ok(DispatchOutcome::UnknownModule);
        };

        let Some(command) = command::synthesize(module, channel, state) else {
            let err = DeviceError::CommandResolution {
                module: module_id.to_string(),
                channel,
            };
            error!(target: COMMANDS, "{}", err);
            return Err(err.into());
        };

        let link = self
            .registry
            .get(module_id)?
            .map(|active| active.link)
            .ok_or_else(|| DeviceError::NotConnected(module_id.to_string()))?;

        link.write(command.clone())?;
        debug!(
            target: COMMANDS,
            "transmitted operating command ({}) for module {} channel {}",
            command.escape_ascii(),
            module_id,
            channel
        );

        let status_requested = match command::status_request(module) {
            Some(request) => {
                link.write(request)?;
                true
            }
            None => false,
        };

        if self.optimistic {
            self.sink.publish(Delta::new(
                &self.source,
                vec![PathValue::new(self.switchpath.state(module_id, channel), state)],
            ))?;
        }

        Ok(DispatchOutcome::Sent {
            command,
            status_requested,
        })
    }
}
