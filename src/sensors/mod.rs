// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Sensor acquisition module
//!
//! The gateway talks to three Atlas Scientific EZO circuits (RTD, EC and pH)
//! sharing one bus. The bus is not addressed per call: a device is selected
//! first, then plain text commands are exchanged with it.
//!
//! ## Key Components
//!
//! - [`SensorBus`]: the capability every bus implementation provides
//! - [`EzoI2cBus`]: EZO command framing over any `embedded-hal` I2C bus
//! - [`SimulatedBus`]: hardware-free bus for development and tests
//! - [`SensorReadings`]: calibrated float readings and temperature compensation

use std::fmt;

use thiserror::Error;

pub mod ezo_i2c;
pub mod readings;
pub mod simulated;

pub use ezo_i2c::EzoI2cBus;
pub use readings::{ChannelAddresses, SensorChannel, SensorReadings};
pub use simulated::SimulatedBus;

/// Failure reported by a sensor bus for a single command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("bus transfer failed: {0}")]
    Transport(String),
    #[error("no device selected")]
    NoDeviceSelected,
    #[error("device rejected the command as a syntax error")]
    SyntaxError,
    #[error("device has no data to send")]
    NoData,
    #[error("device still processing after the allotted time")]
    Pending,
    #[error("unexpected device response: {0}")]
    InvalidResponse(String),
}

/// A shared, non-addressed command bus.
///
/// Implementations keep track of the selected device; every command goes to
/// the device chosen by the last `select_device` call.
#[cfg_attr(test, mockall::automock)]
pub trait SensorBus {
    /// Route subsequent commands to the device at `address`.
    fn select_device(&mut self, address: u8) -> Result<(), BusError>;

    /// Send a text command to the selected device and return its text response.
    fn send_command(&mut self, command: &str) -> Result<String, BusError>;
}

impl<B: SensorBus + ?Sized> SensorBus for Box<B> {
    fn select_device(&mut self, address: u8) -> Result<(), BusError> {
        (**self).select_device(address)
    }

    fn send_command(&mut self, command: &str) -> Result<String, BusError> {
        (**self).send_command(command)
    }
}

/// The physical sensors behind the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Temperature,
    Conductivity,
    Ph,
}

impl Channel {
    /// Only the EC and pH circuits accept a compensation temperature
    pub fn supports_compensation(self) -> bool {
        matches!(self, Channel::Conductivity | Channel::Ph)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Temperature => "temperature",
            Channel::Conductivity => "conductivity",
            Channel::Ph => "pH",
        };
        f.write_str(name)
    }
}

/// A reading could not be obtained from a channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorReadError {
    #[error("{channel} sensor: {source}")]
    Bus {
        channel: Channel,
        #[source]
        source: BusError,
    },
    #[error("{channel} sensor returned a malformed reading: {response:?}")]
    Malformed { channel: Channel, response: String },
}

impl SensorReadError {
    /// The channel that failed
    pub fn channel(&self) -> Channel {
        match self {
            SensorReadError::Bus { channel, .. } | SensorReadError::Malformed { channel, .. } => {
                *channel
            }
        }
    }
}
