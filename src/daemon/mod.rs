//! # Daemon Module
//!
//! The daemon module ties the gateway together: it owns the shared register
//! table, starts the Modbus TCP listener, runs the acquisition loop and makes
//! sure the listener is released on every exit path.
//!
//! ## Usage
//!
//! ```no_run
//! use ezo_modbus_gateway::{config::Config, daemon::Daemon};
//! use ezo_modbus_gateway::sensors::{ChannelAddresses, SimulatedBus};
//!
//! async fn run() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!     let bus = SimulatedBus::new(ChannelAddresses::from(&config.sensors));
//!
//!     let mut daemon = Daemon::new();
//!     let shutdown = daemon.shutdown_handle();
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.trigger();
//!     });
//!
//!     daemon.run(&config, bus).await?;
//!     Ok(())
//! }
//! ```

pub mod launch_daemon;

pub use launch_daemon::{Daemon, ShutdownHandle};
