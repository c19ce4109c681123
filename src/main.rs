// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the EZO sensor to Modbus TCP gateway
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use ezo_modbus_gateway::config::{output_config_schema, BusKind, Config, SensorConfig};
use ezo_modbus_gateway::daemon::Daemon;
use ezo_modbus_gateway::sensors::{ChannelAddresses, SensorBus, SimulatedBus};

/// Publish Atlas Scientific EZO readings (RTD, EC, pH) as Modbus TCP holding registers
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file, created with default values if missing
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Modbus listener address, overrides the configuration file
    #[arg(long)]
    modbus_address: Option<String>,

    /// Modbus listener port, overrides the configuration file
    #[arg(long)]
    modbus_port: Option<u16>,

    /// Use simulated sensors instead of the I2C bus
    #[arg(long)]
    simulate: bool,
}

/// Open the sensor bus selected by the configuration
fn open_bus(config: &SensorConfig) -> Result<Box<dyn SensorBus + Send>> {
    match config.bus {
        BusKind::Simulated => {
            info!("Using simulated sensors");
            Ok(Box::new(SimulatedBus::new(ChannelAddresses::from(config))))
        }
        BusKind::I2c => open_i2c_bus(&config.i2c_device),
    }
}

#[cfg(target_os = "linux")]
fn open_i2c_bus(device: &str) -> Result<Box<dyn SensorBus + Send>> {
    use ezo_modbus_gateway::sensors::EzoI2cBus;
    use linux_embedded_hal::{Delay, I2cdev};

    info!("Opening I2C bus {}", device);
    let i2c = I2cdev::new(device)
        .with_context(|| format!("Failed to open I2C device {}", device))?;
    Ok(Box::new(EzoI2cBus::new(i2c, Delay)))
}

#[cfg(not(target_os = "linux"))]
fn open_i2c_bus(device: &str) -> Result<Box<dyn SensorBus + Send>> {
    anyhow::bail!(
        "I2C device {} is only supported on Linux, use the simulated bus",
        device
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    if args.show_config_schema {
        return output_config_schema();
    }

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration {}", args.config.display()))?;
    config.apply_args(args.modbus_address, args.modbus_port, args.simulate);

    let bus = open_bus(&config.sensors)?;

    let mut daemon = Daemon::new();
    let shutdown = daemon.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => shutdown.trigger(),
            Err(e) => error!("Unable to listen for the interrupt signal: {}", e),
        }
    });

    info!("Ready");
    daemon.run(&config, bus).await?;
    Ok(())
}
