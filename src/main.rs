use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::{error, info, warn};

use wulpus::persistence::{default_config_path, default_routing_path};
use wulpus::transport::available_ports;
use wulpus::{
    AcquisitionConfig, AcquisitionLoop, AcquisitionOptions, Dongle, RoutingTable, StopReason,
    ValidationMode,
};

type CliResult = Result<(), Box<dyn std::error::Error>>;

const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "wulpus")]
#[command(about = "Configure the WULPUS probe and record acquisitions", long_about = None)]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List serial ports
    Ports,

    /// Write default config and routing documents
    Init {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        routing: Option<PathBuf>,
    },

    /// Print the configuration packet as hex without touching the probe
    Packet {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        routing: Option<PathBuf>,
        #[arg(long)]
        strict: bool,
    },

    /// Run one acquisition and save the result
    Acquire {
        /// Serial port of the dongle
        #[arg(long)]
        port: String,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        routing: Option<PathBuf>,
        /// Directory for data_<n>.json
        #[arg(long, default_value = ".")]
        output: PathBuf,
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

    let outcome = match cli.command {
        Commands::Ports => list_ports(),
        Commands::Init { config, routing } => init(config, routing),
        Commands::Packet {
            config,
            routing,
            strict,
        } => print_packet(config, routing, validation_mode(strict)),
        Commands::Acquire {
            port,
            config,
            routing,
            output,
            strict,
        } => acquire(&port, config, routing, &output, validation_mode(strict)),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn validation_mode(strict: bool) -> ValidationMode {
    if strict {
        ValidationMode::Strict
    } else {
        ValidationMode::Lenient
    }
}

fn default_routing() -> wulpus::Result<RoutingTable> {
    let mut routing = RoutingTable::new();
    routing.add_config(&[0], &[0], false)?;
    Ok(routing)
}

// Explicit paths must exist; the default documents fall back to built-in values.
fn load_config(path: Option<PathBuf>) -> wulpus::Result<AcquisitionConfig> {
    match path {
        Some(path) => AcquisitionConfig::load_from_file(path),
        None => {
            let path = default_config_path();
            if path.exists() {
                AcquisitionConfig::load_from_file(path)
            } else {
                info!("No config at {}, using defaults", path.display());
                Ok(AcquisitionConfig::default())
            }
        }
    }
}

fn load_routing(path: Option<PathBuf>) -> wulpus::Result<RoutingTable> {
    match path {
        Some(path) => RoutingTable::load_from_file(path),
        None => {
            let path = default_routing_path();
            if path.exists() {
                RoutingTable::load_from_file(path)
            } else {
                info!("No routing table at {}, using TX/RX on channel 0", path.display());
                default_routing()
            }
        }
    }
}

fn list_ports() -> CliResult {
    let ports = available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for port in ports {
        println!("{port}");
    }
    Ok(())
}

fn init(config: Option<PathBuf>, routing: Option<PathBuf>) -> CliResult {
    let config_path = config.unwrap_or_else(default_config_path);
    let routing_path = routing.unwrap_or_else(default_routing_path);

    AcquisitionConfig::default().save_to_file(&config_path)?;
    default_routing()?.save_to_file(&routing_path)?;

    println!("Wrote {}", config_path.display());
    println!("Wrote {}", routing_path.display());
    Ok(())
}

fn print_packet(config: Option<PathBuf>, routing: Option<PathBuf>, mode: ValidationMode) -> CliResult {
    let mut config = load_config(config)?;
    config.apply_routing(&load_routing(routing)?);
    let packet = config.build_packet_with(mode)?;

    let hex: Vec<String> = packet.iter().map(|byte| format!("{byte:02x}")).collect();
    for row in hex.chunks(16) {
        println!("{}", row.join(" "));
    }
    Ok(())
}

fn acquire(
    port: &str,
    config: Option<PathBuf>,
    routing: Option<PathBuf>,
    output: &Path,
    mode: ValidationMode,
) -> CliResult {
    let config = load_config(config)?;
    let routing = load_routing(routing)?;

    let mut dongle = Dongle::serial(port);
    dongle.open()?;
    info!("Connected to {port}");

    let acquisition = AcquisitionLoop::new(AcquisitionOptions {
        validation: mode,
        ..AcquisitionOptions::default()
    });
    let handle = acquisition
        .spawn(dongle, &config, &routing)
        .map_err(|(_, e)| e)?;

    let control = handle.control().clone();
    if let Err(e) = ctrlc::set_handler(move || {
        warn!("Ctrl-C received, stopping acquisition");
        control.cancel();
    }) {
        warn!("Could not install Ctrl-C handler: {e}");
    }

    while !handle.is_finished() {
        thread::sleep(PROGRESS_INTERVAL);
        let (received, requested) = handle.control().progress();
        info!(
            "{:?}: {received}/{requested} acquisitions",
            handle.control().state()
        );
    }

    let Some((mut dongle, result)) = handle.join() else {
        return Err("acquisition thread panicked".into());
    };
    if let Err(e) = dongle.close() {
        warn!("Failed to close {port}: {e}");
    }
    let result = result?;

    if let StopReason::Disconnected(reason) = &result.stop_reason {
        warn!("Acquisition ended early: {reason}");
    }
    let path = result.save_to_dir(output)?;
    println!("Saved {} acquisitions to {}", result.len(), path.display());
    Ok(())
}
