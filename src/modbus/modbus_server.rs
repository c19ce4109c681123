// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus server implementation for the EZO sensor gateway
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the device that provides data,
//! while the client is the device that requests data.
//!
//! The server answers Read Holding Registers (0x03) requests against the shared
//! [`RegisterTable`]. Clients cannot modify the table: any other function code,
//! writes included, is answered with `IllegalFunction`.
//!
//! ## Usage Example
//!
//! See `src/bin/modbus_client.rs` for a client that polls and decodes the
//! published float slots.

use std::{
    future,
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use anyhow::{Context, Result};
use log::{debug, error, info};
use tokio::{net::TcpListener, net::TcpStream, task::JoinHandle};
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use super::register_table::RegisterTable;
use crate::config::ModbusConfig;

/// Largest quantity a single Read Holding Registers request may ask for
const MAX_READ_QUANTITY: u16 = 125;

/// Per-connection Modbus service exposing the shared register table.
///
/// One instance is created for every accepted client connection; all of them
/// share the same `Arc<RegisterTable>`.
pub struct GatewayModbusService {
    table: Arc<RegisterTable>,
}

impl GatewayModbusService {
    pub fn new(table: Arc<RegisterTable>) -> Self {
        Self { table }
    }
}

impl tokio_modbus::server::Service for GatewayModbusService {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    /// Process a Modbus request and provide a response
    ///
    /// - 0x03: Read Holding Registers
    ///
    /// Any other function code will return an IllegalFunction exception.
    fn call(&self, req: Self::Request) -> Self::Future {
        debug!("Received Modbus request: {:?}", req);

        let res = match req {
            Request::ReadHoldingRegisters(addr, cnt) => {
                debug!(
                    "Reading {} holding registers starting from address {}",
                    cnt, addr
                );
                register_read(&self.table, addr, cnt).map(Response::ReadHoldingRegisters)
            }
            _ => {
                error!(
                    "Exception::IllegalFunction - Unsupported function code in request: {req:?}"
                );
                Err(ExceptionCode::IllegalFunction)
            }
        };

        if let Err(e) = &res {
            error!("Modbus request error: {:?}", e);
        }

        future::ready(res)
    }
}

/// Read registers from the table on behalf of a client.
///
/// Client-supplied ranges outside the block are a protocol error, not a
/// programming error, so they map to a Modbus exception.
fn register_read(table: &RegisterTable, addr: u16, cnt: u16) -> Result<Vec<u16>, ExceptionCode> {
    if cnt == 0 || cnt > MAX_READ_QUANTITY {
        error!("Exception::IllegalDataValue - Invalid quantity {}", cnt);
        return Err(ExceptionCode::IllegalDataValue);
    }

    table.read(addr, cnt).map_err(|e| {
        error!("Exception::IllegalDataAddress - {}", e);
        ExceptionCode::IllegalDataAddress
    })
}

/// Running Modbus TCP listener.
///
/// The accept loop runs in its own task. The listener is released by
/// [`ModbusServer::shutdown`] or, as a last resort, when the value is dropped;
/// either way it is released exactly once.
pub struct ModbusServer {
    local_addr: SocketAddr,
    task: Option<JoinHandle<()>>,
    releases: Arc<AtomicUsize>,
}

impl ModbusServer {
    /// Bind the configured address and start serving `table`.
    pub async fn start(config: &ModbusConfig, table: Arc<RegisterTable>) -> Result<Self> {
        let listener = TcpListener::bind((config.address.as_str(), config.port))
            .await
            .with_context(|| {
                format!(
                    "Failed to bind Modbus listener on {}:{}",
                    config.address, config.port
                )
            })?;
        let local_addr = listener.local_addr()?;
        info!("Modbus server listening on {}", local_addr);

        let server = Server::new(listener);
        let task = tokio::spawn(async move {
            let on_connected = move |stream: TcpStream, socket_addr: SocketAddr| {
                let table = Arc::clone(&table);
                async move {
                    accept_tcp_connection(stream, socket_addr, move |client_addr| {
                        debug!("Modbus client connected from {}", client_addr);
                        Ok(Some(GatewayModbusService::new(Arc::clone(&table))))
                    })
                }
            };
            let on_process_error = |err: io::Error| {
                error!("Modbus connection error: {}", err);
            };

            if let Err(e) = server.serve(&on_connected, on_process_error).await {
                error!("Modbus server stopped: {}", e);
            }
        });

        Ok(Self {
            local_addr,
            task: Some(task),
            releases: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address the listener is bound to (useful when binding port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Shared counter of listener releases, observable after the server is gone
    pub fn release_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.releases)
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Stop accepting connections and wait until the listener is closed.
    ///
    /// Returns `true` if this call released the listener, `false` if it had
    /// already been released.
    pub async fn shutdown(&mut self) -> bool {
        let Some(task) = self.task.take() else {
            return false;
        };

        task.abort();
        match task.await {
            Ok(()) => debug!("Modbus accept loop had already finished"),
            Err(e) if e.is_cancelled() => debug!("Modbus accept loop cancelled"),
            Err(e) => error!("Modbus accept loop panicked: {}", e),
        }
        self.mark_released();
        true
    }

    fn mark_released(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        info!("Modbus listener on {} released", self.local_addr);
    }
}

impl Drop for ModbusServer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.mark_released();
        }
    }
}
