// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use std::collections::HashSet;

use anyhow::{Context, Result};
use log::{debug, warn};

use super::{BusKind, Config, CONFIG_SCHEMA};

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./ezo_modbus_gateway --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

/// Check if a string is a valid IP address
///
/// Validates that a string represents a valid IPv4 or IPv6 address,
/// or is one of the special values like "localhost" or "0.0.0.0".
pub fn is_valid_ip_address(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }

    // Special cases
    matches!(addr, "localhost" | "::" | "::0" | "0.0.0.0")
}

/// Validates the configuration against additional rules that aren't covered by the JSON schema.
///
/// # Validation Rules
///
/// - **Device addresses**: every channel must use a distinct 7-bit I2C
///   address outside the reserved ranges (0x00-0x07 and 0x78-0x7F)
/// - **Cycle period**: the interval must be strictly positive
/// - **I2C device**: a device path is required when the I2C bus is selected
/// - **IP Address Format**: checked, but only produces a warning since
///   hostnames are accepted
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    let sensors = &config.sensors;
    let addresses = [
        ("temperature", sensors.temperature_address),
        ("conductivity", sensors.conductivity_address),
        ("ph", sensors.ph_address),
    ];

    let mut seen = HashSet::new();
    for (name, address) in addresses {
        if !(0x08..=0x77).contains(&address) {
            anyhow::bail!("Invalid I2C address {} for the {} sensor", address, name);
        }
        if !seen.insert(address) {
            anyhow::bail!("I2C address {} is used by more than one sensor", address);
        }
    }

    if config.acquisition.interval_ms == 0 {
        anyhow::bail!("Acquisition interval must be greater than zero");
    }

    if sensors.bus == BusKind::I2c && sensors.i2c_device.trim().is_empty() {
        anyhow::bail!("An I2C device path is required when the I2C bus is selected");
    }

    if !is_valid_ip_address(&config.modbus.address) {
        warn!(
            "Potentially invalid Modbus address format: {}",
            config.modbus.address
        );
    }

    Ok(())
}
