// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sensor bus configuration

use serde::{Deserialize, Serialize};

/// Which bus implementation drives the sensor channels.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// Linux I2C character device with EZO circuits attached
    I2c,
    /// In-process simulation, no hardware required
    Simulated,
}

/// Configuration of the sensor bus and the device address of each channel.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SensorConfig {
    pub bus: BusKind,

    /// Path of the I2C character device, only used with `bus: i2c`
    pub i2c_device: String,

    /// EZO-RTD address
    pub temperature_address: u8,

    /// EZO-EC address
    pub conductivity_address: u8,

    /// EZO-pH address
    pub ph_address: u8,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            bus: BusKind::I2c,
            i2c_device: "/dev/i2c-1".to_string(),
            temperature_address: 102,
            conductivity_address: 100,
            ph_address: 99,
        }
    }
}
