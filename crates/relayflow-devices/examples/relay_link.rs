//! Toggle one relay of an ESP32RELAY8 and print the states it reports.
//!
//! ```text
//! cargo run -p relayflow-devices --example relay_link -- tcp:10.0.0.5:17123 3
//! ```

use std::sync::Arc;
use std::time::Duration;

use relayflow_devices::transport::{self, LinkEvent};
use relayflow_devices::{command, status, Catalog, Device, ModuleConfig, ValidatedModule};

use serde_json::json;
use tokio::time::sleep;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize the logger
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let mut args = std::env::args().skip(1);
    let cstring = args.next().unwrap_or_else(|| "tcp:127.0.0.1:17123".to_string());
    let channel: u32 = args.next().unwrap_or_else(|| "1".to_string()).parse()?;

    // A one-device catalog
    let device: Device = serde_json::from_value(json!({
        "id": "ESP32RELAY8",
        "size": 8,
        "protocols": [{
            "id": "tcp",
            "statuscommand": "ST",
            "channels": [ { "address": 0, "oncommand": "SW{c}1", "offcommand": "SW{c}0" } ]
        }]
    }))?;
    let catalog = Catalog::new(vec![device]);

    let module = ValidatedModule::validate(
        &ModuleConfig {
            id: "example".to_string(),
            device_id: "ESP32RELAY8".to_string(),
            cstring,
            channels: Vec::new(),
        },
        &catalog,
    )?;

    let (link, mut events) = transport::connect(&module);
    let link = Arc::new(link);

    while let Some(event) = events.recv().await {
        match event {
            LinkEvent::Opened => {
                // Toggle from a separate task so reports print as they arrive
                let link = link.clone();
                let module = module.clone();
                tokio::spawn(async move {
                    for state in [true, false] {
                        let writes = command::synthesize(&module, channel, state)
                            .into_iter()
                            .chain(command::status_request(&module));
                        for bytes in writes {
                            if let Err(e) = link.write(bytes) {
                                warn!("write failed: {}", e);
                            }
                        }
                        sleep(Duration::from_millis(500)).await;
                    }
                    link.close();
                });
            }
            LinkEvent::Data(payload) => {
                for (index, state) in status::decode(&module, &payload) {
                    info!("channel {}: {}", index, if state { "on" } else { "off" });
                }
            }
            LinkEvent::Error(e) => warn!("link error: {}", e),
            LinkEvent::Closed => break,
        }
    }

    Ok(())
}
