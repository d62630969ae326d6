//! TCP links: the socket's byte chunks are passed through as they arrive.

use tokio::net::TcpStream;
use tokio_util::codec::{BytesCodec, Framed};
use tracing::debug;

use relayflow_core::logging::COMMS;

use super::LinkIo;
use crate::connection::TcpEndpoint;

pub(super) async fn run(endpoint: TcpEndpoint, mut io: LinkIo) {
    let Some(port) = endpoint.port_number() else {
        return io.finish(Err(format!("invalid port {}", endpoint.port)));
    };

    debug!(target: COMMS, "module {}: connecting to {}:{}", io.module_id, endpoint.host, port);
    let stream = match TcpStream::connect((endpoint.host.as_str(), port)).await {
        Ok(stream) => stream,
        Err(e) => {
            return io.finish(Err(format!(
                "failed to connect to {}:{}: {}",
                endpoint.host, port, e
            )))
        }
    };
    let _ = stream.set_nodelay(true);

    io.opened();
    let result = io.pump(Framed::new(stream, BytesCodec::new())).await;
    io.finish(result.map_err(|e| format!("TCP connection error: {}", e)));
}
