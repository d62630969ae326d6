/*!
 * The bridge: module supervision and lifecycle.
 *
 * [`Bridge::start`] validates the configured modules, announces their
 * channels and spawns one supervisor task per module. A supervisor owns its
 * module's link: it registers the module while the link is open, decodes
 * whatever the device sends into state deltas and releases the registration
 * when the link closes.
 */
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use relayflow_core::delta::{Delta, PathValue, SharedDeltaSink};
use relayflow_core::logging::{module_span, COMMANDS, COMMS, STATE};
use relayflow_core::types::SwitchPath;
use relayflow_core::utils::spawn_and_log;
use relayflow_devices::transport::{self, LinkEvent};
use relayflow_devices::{
    available_transports, command, status, validate_modules, Catalog, DeviceError,
    ModuleRegistry, TransportKind, ValidatedModule,
};

use crate::control::{ControlChannel, ControlRequest};
use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::{Error, Result};
use crate::settings::Settings;

/// What a TCP device answers to a command it could not carry out
pub const FAILURE_TOKEN: &[u8] = b"fail";

/// A running bridge
#[derive(Debug)]
pub struct Bridge {
    modules: Vec<Arc<ValidatedModule>>,
    registry: Arc<ModuleRegistry>,
    dispatcher: Dispatcher,
    control: Option<ControlChannel>,
    supervisors: Mutex<Vec<JoinHandle<()>>>,
}

impl Bridge {
    /// Start bridging the configured modules onto `sink`.
    ///
    /// Must be called from within a tokio runtime. Invalid modules are
    /// logged and skipped; with no usable module left the bridge starts
    /// inactive.
    pub fn start(settings: Settings, sink: SharedDeltaSink) -> Result<Self> {
        let catalog = Catalog::new(settings.devices);
        debug!(
            "catalog holds {} devices, transports available: {:?}",
            catalog.len(),
            available_transports()
        );

        let modules: Vec<Arc<ValidatedModule>> = validate_modules(&settings.modules, &catalog)
            .into_iter()
            .map(Arc::new)
            .collect();
        let registry = ModuleRegistry::new();
        let source = settings.general.app_name;
        let options = settings.bridge;
        let dispatcher = Dispatcher::new(
            modules.iter().cloned(),
            registry.clone(),
            sink.clone(),
            &options,
            source.as_str(),
        );

        let mut bridge = Self {
            modules,
            registry,
            dispatcher,
            control: None,
            supervisors: Mutex::new(Vec::new()),
        };
        if bridge.modules.is_empty() {
            return Ok(bridge);
        }

        let switchpath = SwitchPath::new(options.switchpath.as_str());
        sink.publish(announcement(&bridge.modules, &switchpath, &source))?;

        let mut supervisors = Vec::with_capacity(bridge.modules.len());
        for module in &bridge.modules {
            let supervisor = Supervisor {
                module: module.clone(),
                registry: bridge.registry.clone(),
                sink: sink.clone(),
                switchpath: switchpath.clone(),
                source: source.clone(),
                status_on_open: options.status_on_open,
                reconnect_delay: options.reconnect_delay(),
            };
            supervisors.push(spawn_and_log(
                &format!("module {}", module.id()),
                module_span(module.id()),
                supervisor.run(),
            ));
        }
        bridge.supervisors = Mutex::new(supervisors);

        bridge.control = match options.controlchannel.parse::<ControlChannel>() {
            Ok(channel) => {
                info!("listening on control channel {}", channel);
                Some(channel)
            }
            Err(e) => {
                error!("{}", e);
                None
            }
        };

        info!("bridge started with {} modules", bridge.modules.len());
        Ok(bridge)
    }

    /// Whether any module is being bridged
    pub fn is_active(&self) -> bool {
        !self.modules.is_empty()
    }

    /// The modules that passed validation
    pub fn modules(&self) -> &[Arc<ValidatedModule>] {
        &self.modules
    }

    /// Modules whose links are currently open
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// The attached control channel
    pub fn control_channel(&self) -> Option<&ControlChannel> {
        self.control.as_ref()
    }

    /// The dispatcher behind [`Bridge::handle_envelope`]
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle one envelope received on the control channel.
    ///
    /// Returns `None` when the envelope does not carry a complete request.
    pub fn handle_envelope(&self, envelope: &str) -> Result<Option<DispatchOutcome>> {
        let Some(channel) = &self.control else {
            return Err(Error::control("no control channel is attached"));
        };

        let Some(request) = ControlRequest::parse(envelope)? else {
            debug!(target: COMMANDS, "ignoring incomplete envelope on {}: {}", channel, envelope);
            return Ok(None);
        };

        debug!(target: COMMANDS, "received command {}", request);
        self.dispatcher.dispatch(&request).map(Some)
    }

    /// Stop every supervisor, closing all links
    pub fn stop(&self) {
        let mut supervisors = match self.supervisors.lock() {
            Ok(supervisors) => supervisors,
            Err(poisoned) => poisoned.into_inner(),
        };
        if supervisors.is_empty() {
            return;
        }
        for task in supervisors.drain(..) {
            task.abort();
        }
        info!("bridge stopped");
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Channel metadata for every module, published once at start
fn announcement(modules: &[Arc<ValidatedModule>], switchpath: &SwitchPath, source: &str) -> Delta {
    let values = modules
        .iter()
        .flat_map(|module| {
            module.channels().iter().map(move |channel| {
                PathValue::new(
                    switchpath.meta(module.id(), channel.index),
                    json!({ "name": channel.description, "type": "relay" }),
                )
            })
        })
        .collect();
    Delta::new(source, values)
}

/// Owns one module's link
struct Supervisor {
    module: Arc<ValidatedModule>,
    registry: Arc<ModuleRegistry>,
    sink: SharedDeltaSink,
    switchpath: SwitchPath,
    source: String,
    status_on_open: bool,
    reconnect_delay: Option<Duration>,
}

impl Supervisor {
    async fn run(self) -> std::result::Result<(), DeviceError> {
        loop {
            self.run_link().await?;

            let Some(delay) = self.reconnect_delay else {
                warn!(target: COMMS, "module {}: link closed", self.module.id());
                return Ok(());
            };
            info!(
                target: COMMS,
                "module {}: link closed, reconnecting in {:?}",
                self.module.id(),
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Drive one link from connect to close
    async fn run_link(&self) -> std::result::Result<(), DeviceError> {
        let (link, mut events) = transport::connect(&self.module);
        let link = Arc::new(link);
        let mut registration = None;

        while let Some(event) = events.recv().await {
            match event {
                LinkEvent::Opened => {
                    registration = Some(self.registry.register(self.module.clone(), link.clone())?);
                    if self.status_on_open {
                        if let Some(request) = command::status_request(&self.module) {
                            if let Err(e) = link.write(request) {
                                warn!(target: COMMS, "module {}: status request failed: {}", self.module.id(), e);
                            }
                        }
                    }
                }
                LinkEvent::Data(payload) => self.process(&payload),
                LinkEvent::Error(e) => {
                    error!(target: COMMS, "module {}: {}", self.module.id(), DeviceError::Transport(e));
                }
                LinkEvent::Closed => break,
            }
        }

        drop(registration);
        Ok(())
    }

    /// Turn bytes from the device into a state delta
    fn process(&self, payload: &[u8]) {
        let id = self.module.id();
        if self.module.protocol() == TransportKind::Tcp && payload == FAILURE_TOKEN {
            error!(target: COMMANDS, "TCP command failure on module {}", id);
            return;
        }

        let states = status::decode(&self.module, payload);
        if states.is_empty() {
            return;
        }

        let values = states
            .into_iter()
            .map(|(index, state)| {
                debug!(target: STATE, "module {} channel {}: {}", id, index, state);
                PathValue::new(self.switchpath.state(id, index), state)
            })
            .collect();
        if let Err(e) = self.sink.publish(Delta::new(self.source.as_str(), values)) {
            warn!(target: STATE, "module {}: failed to publish state: {}", id, e);
        }
    }
}
