// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use anyhow::Result;
use log::{error, info, warn};
use tokio::sync::watch;

use crate::acquisition::AcquisitionScheduler;
use crate::config::{Config, ModbusConfig};
use crate::modbus::{ModbusServer, RegisterTable};
use crate::sensors::{ChannelAddresses, SensorBus, SensorReadings};

/// Cloneable handle that asks a running daemon to stop.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        info!("Shutdown requested");
        self.0.send_replace(true);
    }
}

/// Owns the register table, the Modbus listener and the acquisition loop.
///
/// The listener is released when [`Daemon::run`] returns, whatever the
/// outcome, and at the latest when the daemon is dropped.
pub struct Daemon {
    table: Arc<RegisterTable>,
    shutdown: Arc<watch::Sender<bool>>,
    server: Option<ModbusServer>,
    modbus_addr: Option<SocketAddr>,
    releases: Option<Arc<AtomicUsize>>,
}

impl Default for Daemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Daemon {
    /// Create a new daemon with an empty holding block
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Daemon {
            table: Arc::new(RegisterTable::holding_block()),
            shutdown: Arc::new(shutdown),
            server: None,
            modbus_addr: None,
            releases: None,
        }
    }

    /// The table published to Modbus clients
    pub fn register_table(&self) -> Arc<RegisterTable> {
        Arc::clone(&self.table)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Stop the acquisition loop at the next opportunity
    pub fn shutdown(&self) {
        self.shutdown_handle().trigger();
    }

    /// Address of the Modbus listener once it has been started
    pub fn modbus_addr(&self) -> Option<SocketAddr> {
        self.modbus_addr
    }

    /// How many times the Modbus listener has been released
    pub fn listener_releases(&self) -> usize {
        self.releases
            .as_ref()
            .map_or(0, |releases| releases.load(Ordering::SeqCst))
    }

    /// Bind the Modbus listener. Calling it again while it runs is a no-op.
    pub async fn start_modbus_server(&mut self, config: &ModbusConfig) -> Result<SocketAddr> {
        if let Some(server) = &self.server {
            warn!("Modbus server already running on {}", server.local_addr());
            return Ok(server.local_addr());
        }

        info!("Starting Modbus server on {}:{}", config.address, config.port);
        let server = ModbusServer::start(config, Arc::clone(&self.table)).await?;
        let addr = server.local_addr();
        self.modbus_addr = Some(addr);
        self.releases = Some(server.release_counter());
        self.server = Some(server);
        Ok(addr)
    }

    async fn release_server(&mut self) {
        if let Some(mut server) = self.server.take() {
            server.shutdown().await;
        }
    }

    /// Start the configured services and run acquisition until shutdown.
    ///
    /// Returns the number of completed acquisition cycles.
    pub async fn run<B>(&mut self, config: &Config, bus: B) -> Result<u64>
    where
        B: SensorBus + Send + 'static,
    {
        if config.modbus.enabled {
            self.start_modbus_server(&config.modbus).await?;
        } else {
            info!("Modbus server disabled, registers are only updated locally");
        }

        let readings = SensorReadings::new(bus, ChannelAddresses::from(&config.sensors))
            .with_retries(config.acquisition.read_retries);
        let scheduler = AcquisitionScheduler::new(
            readings,
            Arc::clone(&self.table),
            config.acquisition.clone(),
        );

        let result = scheduler.run(self.shutdown.subscribe()).await;
        self.release_server().await;

        match &result {
            Ok(cycles) => info!("Gateway stopped cleanly after {} cycles", cycles),
            Err(e) => error!("Gateway stopped on error: {:#}", e),
        }
        result
    }
}
