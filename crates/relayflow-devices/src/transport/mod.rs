/*!
 * Transport links.
 *
 * [`connect`] opens the link of one module and returns immediately. The
 * link runs as its own task that owns the stream; everything else talks
 * to it through channels:
 *
 * - [`LinkEvent`]s come out in a fixed order: at most one `Opened`, then any
 *   number of `Data`, then an optional `Error` followed by `Closed`.
 * - commands go in through [`ModuleLink::write`], which fails straight away
 *   unless the link is open.
 *
 * Links follow `Idle → Connecting → Open → Closed` and never reopen by
 * themselves.
 */
use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder, Framed};
use tracing::{debug, trace, warn};

use relayflow_core::logging::COMMS;

use crate::connection::ConnectionDescriptor;
use crate::error::{DeviceError, Result};
use crate::module::ValidatedModule;

pub mod codec;
mod serial;
mod tcp;

pub use codec::FixedLengthCodec;
pub use serial::BAUD_RATE;

/// Lifecycle of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Created, nothing attempted yet
    Idle,
    /// Opening the socket or port
    Connecting,
    /// Ready for commands
    Open,
    /// Gone for good
    Closed,
}

/// What a link reports to its owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The link is open
    Opened,
    /// Bytes arrived: a raw chunk over TCP, one status frame over serial
    Data(Bytes),
    /// The link failed; `Closed` follows
    Error(String),
    /// The link is closed
    Closed,
}

/// Receiving end of a link's events
pub type LinkEvents = mpsc::UnboundedReceiver<LinkEvent>;

/// Handle to one module's link
#[derive(Debug)]
pub struct ModuleLink {
    module_id: String,
    state: Arc<watch::Sender<LinkState>>,
    outbound: mpsc::UnboundedSender<Bytes>,
    task: Option<JoinHandle<()>>,
}

impl ModuleLink {
    /// The module this link belongs to
    pub fn module_id(&self) -> &str {
        &self.module_id
    }

    /// Current state of the link
    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    /// Whether commands can be written
    pub fn is_open(&self) -> bool {
        self.state() == LinkState::Open
    }

    /// Watch the link state
    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Hand a command to the link.
    ///
    /// Nothing is buffered for later: if the link is not open the command is
    /// dropped and [`DeviceError::NotConnected`] returned.
    pub fn write(&self, payload: Bytes) -> Result<()> {
        if !self.is_open() {
            return Err(DeviceError::NotConnected(self.module_id.clone()));
        }
        self.outbound
            .send(payload)
            .map_err(|_| DeviceError::NotConnected(self.module_id.clone()))
    }

    /// Close the link, dropping the stream
    pub fn close(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
        self.state.send_replace(LinkState::Closed);
    }
}

impl Drop for ModuleLink {
    fn drop(&mut self) {
        self.close();
    }
}

/// Start opening the link of `module`.
///
/// Must be called from within a tokio runtime. A module whose transport is
/// not compiled in gets its `Error` and `Closed` events before this returns.
pub fn connect(module: &ValidatedModule) -> (ModuleLink, LinkEvents) {
    let (events, events_rx) = mpsc::unbounded_channel();
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let state = Arc::new(watch::channel(LinkState::Idle).0);

    let io = LinkIo {
        module_id: module.id().to_string(),
        state: state.clone(),
        events,
        outbound: outbound_rx,
    };

    let task = match module.connection() {
        ConnectionDescriptor::Tcp(endpoint) => {
            state.send_replace(LinkState::Connecting);
            Some(tokio::spawn(tcp::run(endpoint.clone(), io)))
        }
        ConnectionDescriptor::Usb(endpoint) => {
            serial::spawn(endpoint.clone(), module.status_length(), io)
        }
    };

    let link = ModuleLink {
        module_id: module.id().to_string(),
        state,
        outbound,
        task,
    };
    (link, events_rx)
}

/// The task side of a link
struct LinkIo {
    module_id: String,
    state: Arc<watch::Sender<LinkState>>,
    events: mpsc::UnboundedSender<LinkEvent>,
    outbound: mpsc::UnboundedReceiver<Bytes>,
}

impl LinkIo {
    fn opened(&self) {
        debug!(target: COMMS, "module {}: link open", self.module_id);
        self.state.send_replace(LinkState::Open);
        let _ = self.events.send(LinkEvent::Opened);
    }

    /// Move frames in both directions until either side ends
    async fn pump<S, C>(&mut self, mut framed: Framed<S, C>) -> io::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
        C: Decoder<Item = BytesMut, Error = io::Error> + Encoder<Bytes, Error = io::Error>,
    {
        loop {
            tokio::select! {
                frame = framed.next() => match frame {
                    Some(Ok(frame)) => {
                        trace!(target: COMMS, "module {}: received {:02x?}", self.module_id, &frame[..]);
                        let _ = self.events.send(LinkEvent::Data(frame.freeze()));
                    }
                    Some(Err(e)) => return Err(e),
                    None => return Ok(()),
                },
                payload = self.outbound.recv() => match payload {
                    Some(payload) => {
                        trace!(target: COMMS, "module {}: sending {:02x?}", self.module_id, &payload[..]);
                        framed.send(payload).await?;
                    }
                    None => return Ok(()),
                },
            }
        }
    }

    /// Report the end of the link
    fn finish(self, result: std::result::Result<(), String>) {
        if let Err(e) = result {
            warn!(target: COMMS, "module {}: {}", self.module_id, e);
            let _ = self.events.send(LinkEvent::Error(e));
        }
        debug!(target: COMMS, "module {}: link closed", self.module_id);
        self.state.send_replace(LinkState::Closed);
        let _ = self.events.send(LinkEvent::Closed);
    }
}
