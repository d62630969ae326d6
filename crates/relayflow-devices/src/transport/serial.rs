//! Serial links: the port's byte stream is cut into status frames of the
//! module's status length.

use tokio::task::JoinHandle;

use super::LinkIo;
use crate::connection::UsbEndpoint;

/// Baud rate of Devantech USB relay modules
pub const BAUD_RATE: u32 = 19200;

#[cfg(feature = "serial")]
pub(super) fn spawn(endpoint: UsbEndpoint, frame_length: usize, io: LinkIo) -> Option<JoinHandle<()>> {
    io.state.send_replace(super::LinkState::Connecting);
    Some(tokio::spawn(run(endpoint, frame_length, io)))
}

#[cfg(not(feature = "serial"))]
pub(super) fn spawn(endpoint: UsbEndpoint, _frame_length: usize, io: LinkIo) -> Option<JoinHandle<()>> {
    let err = crate::error::DeviceError::UnsupportedTransport(format!(
        "cannot open {}, serial support is not compiled in (enable the `serial` feature)",
        endpoint.device
    ));
    io.finish(Err(err.to_string()));
    None
}

#[cfg(feature = "serial")]
async fn run(endpoint: UsbEndpoint, frame_length: usize, mut io: LinkIo) {
    use tokio_serial::SerialPortBuilderExt;
    use tokio_util::codec::Framed;
    use tracing::debug;

    use relayflow_core::logging::COMMS;

    use super::FixedLengthCodec;

    debug!(target: COMMS, "module {}: opening {} at {} baud", io.module_id, endpoint.device, BAUD_RATE);
    let port = match tokio_serial::new(&endpoint.device, BAUD_RATE).open_native_async() {
        Ok(port) => port,
        Err(e) => return io.finish(Err(format!("failed to open {}: {}", endpoint.device, e))),
    };

    io.opened();
    let result = io.pump(Framed::new(port, FixedLengthCodec::new(frame_length))).await;
    io.finish(result.map_err(|e| format!("serial port error: {}", e)));
}
