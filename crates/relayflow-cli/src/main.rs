use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

use relayflow_core::delta::{DeltaBus, DeltaReceiver};
use relayflow_core::logging;
use relayflow_devices::{command, validate_modules, Catalog, ValidatedModule};
use relayflow_engine::{Bridge, Settings};

const DEFAULT_CONFIG_PATH: &str = "relayflow.toml";
const ENV_PREFIX: &str = "RELAYFLOW";

#[derive(Parser, Debug)]
#[command(
    name = "relayflow",
    version,
    about = "Bridge Devantech relay modules onto a delta bus"
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, short, env = "RELAYFLOW_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level or filter directive, overriding the configuration.
    #[arg(long, env = "RELAYFLOW_LOG")]
    log_level: Option<String>,

    /// What to do. Defaults to `run`.
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Default)]
enum Command {
    /// Run the bridge: control envelopes as JSON lines on stdin, deltas as
    /// JSON lines on stdout.
    #[default]
    Run,
    /// Validate the configured modules and exit.
    Check,
    /// Print the bytes a channel command would put on the wire.
    Render {
        /// Module id
        module: String,
        /// Channel index
        channel: u32,
        /// Desired state: on/off, 1/0 or true/false
        #[arg(value_parser = parse_state, action = clap::ArgAction::Set)]
        state: bool,
    },
}

fn parse_state(value: &str) -> std::result::Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "1" | "true" => Ok(true),
        "off" | "0" | "false" => Ok(false),
        other => Err(format!("expected on or off, got '{}'", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(Some(&cli.config), Some(ENV_PREFIX))
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;

    let mut logging_config = settings.logging.clone();
    if let Some(level) = cli.log_level {
        logging_config.level = level;
    }
    logging::init_with(&logging_config)?;

    match cli.command.unwrap_or_default() {
        Command::Run => run(settings).await,
        Command::Check => check(&settings),
        Command::Render {
            module,
            channel,
            state,
        } => render(&settings, &module, channel, state),
    }
}

async fn run(settings: Settings) -> Result<()> {
    let (bus, deltas) = DeltaBus::new();
    let writer = tokio::spawn(write_deltas(deltas));

    let bridge = Bridge::start(settings, Arc::new(bus))?;
    if !bridge.is_active() {
        warn!("nothing to bridge, exiting");
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if !line.is_empty() {
                        if let Err(e) = bridge.handle_envelope(line) {
                            error!("{}", e);
                        }
                    }
                }
                Ok(None) => {
                    info!("stdin closed, no further control envelopes");
                    stdin_open = false;
                }
                Err(e) => {
                    error!("failed to read control envelopes: {}", e);
                    stdin_open = false;
                }
            },
            _ = signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    drop(bridge);
    // Supervisors release their sink handles as they wind down.
    let _ = tokio::time::timeout(Duration::from_secs(1), writer).await;
    Ok(())
}

async fn write_deltas(mut deltas: DeltaReceiver) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(delta) = deltas.recv().await {
        match serde_json::to_string(&delta) {
            Ok(line) => {
                stdout.write_all(line.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
            Err(e) => warn!("failed to serialize delta: {}", e),
        }
    }
    Ok(())
}

fn usable_modules(settings: &Settings) -> Vec<ValidatedModule> {
    let catalog = Catalog::new(settings.devices.clone());
    validate_modules(&settings.modules, &catalog)
}

fn check(settings: &Settings) -> Result<()> {
    let modules = usable_modules(settings);
    for module in &modules {
        println!(
            "{}: {} via {} ({} channels)",
            module.id(),
            module.device_id(),
            module.connection(),
            module.channels().len()
        );
    }

    if modules.len() < settings.modules.len() {
        bail!(
            "{} of {} modules are unusable",
            settings.modules.len() - modules.len(),
            settings.modules.len()
        );
    }
    Ok(())
}

fn render(settings: &Settings, module_id: &str, channel: u32, state: bool) -> Result<()> {
    let modules = usable_modules(settings);
    let module = modules
        .iter()
        .find(|m| m.id() == module_id)
        .with_context(|| format!("no usable module {}", module_id))?;

    let bytes = command::synthesize(module, channel, state).with_context(|| {
        format!(
            "cannot recover operating command for module {} channel {}",
            module_id, channel
        )
    })?;
    println!("{}", bytes.escape_ascii());

    if let Some(request) = command::status_request(module) {
        println!("status request: {}", request.escape_ascii());
    }
    Ok(())
}
