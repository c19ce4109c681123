use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::{self, Duration};
use tokio_modbus::prelude::*;

use ezo_modbus_gateway::modbus::{decode_float, FloatSlot, HOLDING_BASE};

/// Modbus client polling the float slots published by the EZO gateway
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Modbus server address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Modbus server port
    #[clap(long, default_value = "502")]
    port: u16,

    /// Unit identifier
    #[clap(long, default_value = "1")]
    unit: u8,

    /// Poll every N seconds instead of once
    #[clap(long)]
    interval: Option<u64>,

    /// Request timeout in seconds
    #[clap(long, default_value = "3")]
    timeout: u64,
}

async fn poll(ctx: &mut tokio_modbus::client::Context, timeout: Duration) -> Result<()> {
    let count = (FloatSlot::ALL.len() * 2) as u16;
    let words = time::timeout(timeout, ctx.read_holding_registers(HOLDING_BASE, count))
        .await
        .context("Request timed out")???;

    println!("Raw register values: {:04X?}", words);
    for slot in FloatSlot::ALL {
        let offset = (slot.address() - HOLDING_BASE) as usize;
        let value = decode_float([words[offset], words[offset + 1]]);
        println!("{} {:>3}: {:.6}{}", slot.address(), slot.label(), value, slot.unit());
    }
    println!();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();

    let socket_addr: SocketAddr = format!("{}:{}", args.address, args.port)
        .parse()
        .with_context(|| format!("Invalid server address {}:{}", args.address, args.port))?;
    println!("Connecting to Modbus server at {}", socket_addr);

    let mut ctx = tcp::connect_slave(socket_addr, Slave(args.unit)).await?;
    let timeout = Duration::from_secs(args.timeout);

    match args.interval {
        None => poll(&mut ctx, timeout).await?,
        Some(seconds) => {
            let mut ticker = time::interval(Duration::from_secs(seconds.max(1)));
            loop {
                ticker.tick().await;
                poll(&mut ctx, timeout).await?;
            }
        }
    }

    ctx.disconnect().await?;
    Ok(())
}
