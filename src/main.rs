use anyhow::{Context, Result};
use clap::Parser;
use mbus_serial::logging::init_logger_with_level;
use mbus_serial::{BaudSwitchProbe, EventHooks, MBusBaudRate, MBusDeviceHandle, SerialConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "mbus-serial-request-data")]
#[command(about = "Request data from an M-Bus meter that answers at a higher baud rate")]
struct Cli {
    /// Dump every frame sent and received
    #[arg(short, long)]
    debug: bool,

    /// Baud rate the request is sent at
    #[arg(short, long)]
    baudrate: Option<u32>,

    /// Baud rate the meter answers at
    #[arg(long)]
    target_baudrate: Option<u32>,

    /// Receive attempts after the request
    #[arg(long)]
    attempts: Option<usize>,

    /// JSON file with `serial` and `probe` sections
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serial device, e.g. /dev/ttyUSB0
    device: String,

    /// Primary address of the meter
    address: u8,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct ToolConfig {
    serial: SerialConfig,
    probe: BaudSwitchProbe,
}

impl ToolConfig {
    fn load(cli: &Cli) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("Invalid configuration in {}", path.display()))?
            }
            None => ToolConfig::default(),
        };

        if let Some(rate) = cli.baudrate {
            config.serial.baudrate = MBusBaudRate::try_from(rate)?;
        }
        if let Some(rate) = cli.target_baudrate {
            config.probe.target_baudrate = MBusBaudRate::try_from(rate)?;
        }
        if let Some(attempts) = cli.attempts {
            config.probe.attempts = attempts;
        }
        Ok(config)
    }
}

fn run(cli: &Cli) -> Result<()> {
    let config = ToolConfig::load(cli)?;

    let hooks = if cli.debug {
        EventHooks::hex_dump()
    } else {
        EventHooks::new()
    };

    let mut handle = MBusDeviceHandle::connect_with_hooks(&cli.device, hooks)
        .context("Failed to setup connection to M-Bus gateway")?;

    let result = request(&mut handle, &config, cli.address);
    handle.disconnect()?;
    let reply = result?;

    println!("{}", hex::encode_upper(&reply.data));
    println!(
        "C={:02X} A={:02X} CI={:02X} ({} data bytes)",
        reply.control,
        reply.address,
        reply.control_information,
        reply.data.len()
    );
    Ok(())
}

fn request(
    handle: &mut MBusDeviceHandle,
    config: &ToolConfig,
    address: u8,
) -> Result<mbus_serial::MBusFrame> {
    let rate = config.serial.baudrate;
    handle
        .set_baud_rate(rate.as_u32())
        .with_context(|| format!("Failed to set baud rate to {rate}"))?;

    config
        .probe
        .run(handle, address)
        .context("Failed to receive M-Bus response frame")
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let level = if cli.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    init_logger_with_level(level);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
