// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP server configuration
//!
//! This module defines the structures for configuring the Modbus TCP server
//! component of the gateway.

use serde::{Deserialize, Serialize};

/// Configuration for the Modbus TCP server component.
///
/// # Fields
///
/// * `enabled` - Flag to enable or disable the Modbus server
/// * `port` - TCP port number for the Modbus server (default: 502)
/// * `address` - Network address for the Modbus server to bind to (default: 0.0.0.0)
///
/// # Example
///
/// ```
/// use ezo_modbus_gateway::config::ModbusConfig;
///
/// let modbus_config = ModbusConfig {
///     enabled: true,
///     port: 5020,
///     address: "127.0.0.1".to_string(),
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Flag to enable or disable the Modbus server.
    ///
    /// When disabled, sensors are still polled and the register table is
    /// kept up to date, but no listener is opened.
    pub enabled: bool,

    /// The TCP port the Modbus server will listen on.
    ///
    /// Default value is 502, the standard Modbus TCP port, which requires
    /// elevated privileges on most systems.
    pub port: u16,

    /// The network address the Modbus server will bind to.
    ///
    /// Can be an IPv4/IPv6 address or a hostname. Default is "0.0.0.0" so
    /// that polling clients on the plant network can reach the gateway.
    pub address: String,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 502,
            address: "0.0.0.0".to_string(),
        }
    }
}
