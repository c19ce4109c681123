// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated sensor bus
//!
//! Answers the subset of the EZO command set used by the gateway so the whole
//! acquisition and Modbus chain can run on a development machine:
//!
//! - `R`: current reading, nominal value plus uniform jitter
//! - `T,<value>`: store a compensation temperature (EC and pH circuits only)
//! - `T,?`: report the stored compensation temperature as `?T,<value>`
//!
//! Anything else is answered with a syntax error, as a real circuit would.

use std::collections::HashMap;

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::readings::ChannelAddresses;
use super::{BusError, Channel, SensorBus};

/// Nominal value and jitter amplitude of one simulated circuit
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatedValue {
    pub nominal: f32,
    pub jitter: f32,
}

/// In-process stand-in for the three EZO circuits.
pub struct SimulatedBus {
    devices: HashMap<u8, (Channel, SimulatedValue)>,
    compensation: HashMap<u8, f32>,
    selected: Option<u8>,
    rng: StdRng,
}

impl SimulatedBus {
    /// Plausible water readings: 25 °C, 500 ppm, pH 7
    pub fn new(addresses: ChannelAddresses) -> Self {
        Self::with_values(
            addresses,
            SimulatedValue {
                nominal: 25.0,
                jitter: 0.05,
            },
            SimulatedValue {
                nominal: 500.0,
                jitter: 2.5,
            },
            SimulatedValue {
                nominal: 7.0,
                jitter: 0.02,
            },
        )
    }

    /// Circuits that always report exactly the given values
    pub fn fixed(addresses: ChannelAddresses, temperature: f32, conductivity: f32, ph: f32) -> Self {
        let exact = |nominal| SimulatedValue {
            nominal,
            jitter: 0.0,
        };
        Self::with_values(addresses, exact(temperature), exact(conductivity), exact(ph))
    }

    pub fn with_values(
        addresses: ChannelAddresses,
        temperature: SimulatedValue,
        conductivity: SimulatedValue,
        ph: SimulatedValue,
    ) -> Self {
        let devices = HashMap::from([
            (addresses.temperature, (Channel::Temperature, temperature)),
            (addresses.conductivity, (Channel::Conductivity, conductivity)),
            (addresses.ph, (Channel::Ph, ph)),
        ]);

        Self {
            devices,
            compensation: HashMap::new(),
            selected: None,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Compensation temperature last stored on the device at `address`
    pub fn compensation(&self, address: u8) -> Option<f32> {
        self.compensation.get(&address).copied()
    }

    fn reading(&mut self, value: SimulatedValue) -> f32 {
        if value.jitter > 0.0 {
            value.nominal + self.rng.random_range(-value.jitter..=value.jitter)
        } else {
            value.nominal
        }
    }
}

impl SensorBus for SimulatedBus {
    fn select_device(&mut self, address: u8) -> Result<(), BusError> {
        if !self.devices.contains_key(&address) {
            return Err(BusError::Transport(format!(
                "no device acknowledged address {address}"
            )));
        }
        self.selected = Some(address);
        Ok(())
    }

    fn send_command(&mut self, command: &str) -> Result<String, BusError> {
        let address = self.selected.ok_or(BusError::NoDeviceSelected)?;
        let (channel, value) = self.devices[&address];
        debug!("Simulated {} <- {:?}", channel, command);

        let upper = command.trim().to_ascii_uppercase();
        if upper == "R" {
            let reading = self.reading(value);
            return Ok(format!("{:.3}", reading));
        }

        if !channel.supports_compensation() {
            return Err(BusError::SyntaxError);
        }

        match upper.strip_prefix("T,") {
            Some("?") => {
                let temperature = self.compensation.get(&address).copied().unwrap_or(25.0);
                Ok(format!("?T,{:.2}", temperature))
            }
            Some(text) => {
                let temperature: f32 = text.parse().map_err(|_| BusError::SyntaxError)?;
                self.compensation.insert(address, temperature);
                Ok(String::new())
            }
            None => Err(BusError::SyntaxError),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_readings() {
        let addresses = ChannelAddresses::default();
        let mut bus = SimulatedBus::fixed(addresses, 25.0, 500.0, 7.0);

        bus.select_device(addresses.temperature).unwrap();
        assert_eq!(bus.send_command("R").unwrap(), "25.000");
        bus.select_device(addresses.conductivity).unwrap();
        assert_eq!(bus.send_command("R").unwrap(), "500.000");
        bus.select_device(addresses.ph).unwrap();
        assert_eq!(bus.send_command("r").unwrap(), "7.000");
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let addresses = ChannelAddresses::default();
        let mut bus = SimulatedBus::new(addresses);
        bus.select_device(addresses.ph).unwrap();

        for _ in 0..100 {
            let value: f32 = bus.send_command("R").unwrap().parse().unwrap();
            assert!((6.97..=7.03).contains(&value), "pH {value}");
        }
    }

    #[test]
    fn test_temperature_compensation() {
        let addresses = ChannelAddresses::default();
        let mut bus = SimulatedBus::new(addresses);

        bus.select_device(addresses.conductivity).unwrap();
        assert_eq!(bus.send_command("T,19.500000").unwrap(), "");
        assert_eq!(bus.send_command("T,?").unwrap(), "?T,19.50");
        assert_eq!(bus.compensation(addresses.conductivity), Some(19.5));
        assert_eq!(bus.compensation(addresses.ph), None);

        // The RTD circuit has no compensation command
        bus.select_device(addresses.temperature).unwrap();
        assert_eq!(bus.send_command("T,19.5"), Err(BusError::SyntaxError));
    }

    #[test]
    fn test_unknown_device_and_command() {
        let mut bus = SimulatedBus::new(ChannelAddresses::default());
        assert_eq!(bus.send_command("R"), Err(BusError::NoDeviceSelected));
        assert!(matches!(bus.select_device(0x10), Err(BusError::Transport(_))));

        bus.select_device(99).unwrap();
        assert_eq!(bus.send_command("Cal,mid,7.00"), Err(BusError::SyntaxError));
    }
}
