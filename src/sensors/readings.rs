// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Calibrated readings from the three sensor channels
//!
//! [`SensorReadings`] owns the bus and one [`SensorChannel`] per physical
//! circuit. Every operation selects the channel's device before talking to
//! it, since the bus keeps no per-call addressing.

use log::{info, warn};

use super::{BusError, Channel, SensorBus, SensorReadError};
use crate::config::SensorConfig;

/// Device addresses of the three circuits on the shared bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelAddresses {
    pub temperature: u8,
    pub conductivity: u8,
    pub ph: u8,
}

impl Default for ChannelAddresses {
    fn default() -> Self {
        Self {
            temperature: 102,
            conductivity: 100,
            ph: 99,
        }
    }
}

impl From<&SensorConfig> for ChannelAddresses {
    fn from(config: &SensorConfig) -> Self {
        Self {
            temperature: config.temperature_address,
            conductivity: config.conductivity_address,
            ph: config.ph_address,
        }
    }
}

/// One physical sensor on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorChannel {
    channel: Channel,
    address: u8,
}

impl SensorChannel {
    pub fn new(channel: Channel, address: u8) -> Self {
        Self { channel, address }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn bus_error(&self, source: BusError) -> SensorReadError {
        SensorReadError::Bus {
            channel: self.channel,
            source,
        }
    }

    /// Select this channel and send `command` to it.
    fn query<B: SensorBus + ?Sized>(
        &self,
        bus: &mut B,
        command: &str,
    ) -> Result<String, SensorReadError> {
        bus.select_device(self.address)
            .map_err(|e| self.bus_error(e))?;
        bus.send_command(command).map_err(|e| self.bus_error(e))
    }

    /// Take a single reading.
    pub fn read<B: SensorBus + ?Sized>(&self, bus: &mut B) -> Result<f32, SensorReadError> {
        let response = self.query(bus, "R")?;
        parse_reading(self.channel, &response)
    }

    /// Store `temperature` as the compensation temperature and return the
    /// circuit's acknowledgement of the stored value.
    pub fn set_temperature_compensation<B: SensorBus + ?Sized>(
        &self,
        bus: &mut B,
        temperature: f32,
    ) -> Result<String, SensorReadError> {
        self.query(bus, &format!("T,{:.6}", temperature))?;
        self.query(bus, "T,?")
    }
}

/// Parse a reading response into a float.
///
/// Trailing NULs and surrounding whitespace are tolerated; anything else that
/// is not a plain number is reported as malformed.
fn parse_reading(channel: Channel, response: &str) -> Result<f32, SensorReadError> {
    let text = response.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    text.parse::<f32>()
        .map_err(|_| SensorReadError::Malformed {
            channel,
            response: response.to_string(),
        })
}

/// The three sensor channels behind a uniform "read a calibrated float"
/// interface.
pub struct SensorReadings<B> {
    bus: B,
    temperature: SensorChannel,
    conductivity: SensorChannel,
    ph: SensorChannel,
    read_retries: u8,
}

impl<B: SensorBus> SensorReadings<B> {
    pub fn new(bus: B, addresses: ChannelAddresses) -> Self {
        Self {
            bus,
            temperature: SensorChannel::new(Channel::Temperature, addresses.temperature),
            conductivity: SensorChannel::new(Channel::Conductivity, addresses.conductivity),
            ph: SensorChannel::new(Channel::Ph, addresses.ph),
            read_retries: 0,
        }
    }

    /// Retry a failed read up to `retries` more times.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.read_retries = retries;
        self
    }

    pub fn channel(&self, channel: Channel) -> SensorChannel {
        match channel {
            Channel::Temperature => self.temperature,
            Channel::Conductivity => self.conductivity,
            Channel::Ph => self.ph,
        }
    }

    /// Read `channel`, retrying according to the configured retry budget.
    pub fn read(&mut self, channel: Channel) -> Result<f32, SensorReadError> {
        let sensor = self.channel(channel);
        let mut attempt = 0;
        loop {
            match sensor.read(&mut self.bus) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.read_retries => {
                    attempt += 1;
                    warn!("{} (retry {}/{})", e, attempt, self.read_retries);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Temperature in °C
    pub fn read_temperature(&mut self) -> Result<f32, SensorReadError> {
        self.read(Channel::Temperature)
    }

    /// Electrical conductivity
    pub fn read_conductivity(&mut self) -> Result<f32, SensorReadError> {
        self.read(Channel::Conductivity)
    }

    pub fn read_ph(&mut self) -> Result<f32, SensorReadError> {
        self.read(Channel::Ph)
    }

    /// Send the compensation temperature to the conductivity circuit, then
    /// to the pH circuit. The acknowledgements are only logged.
    pub fn compensate(&mut self, temperature: f32) -> Result<(), SensorReadError> {
        for sensor in [self.conductivity, self.ph] {
            let ack = sensor.set_temperature_compensation(&mut self.bus, temperature)?;
            info!("{} compensation: {}", sensor.channel(), ack);
        }
        Ok(())
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::MockSensorBus;
    use mockall::{predicate::eq, Sequence};

    #[test]
    fn test_parse_reading() {
        assert_eq!(parse_reading(Channel::Ph, "7.002").unwrap(), 7.002);
        assert_eq!(parse_reading(Channel::Ph, " 25.104\0\0").unwrap(), 25.104);
        assert_eq!(parse_reading(Channel::Ph, "-3").unwrap(), -3.0);

        let err = parse_reading(Channel::Conductivity, "1413,706").unwrap_err();
        assert_eq!(err.channel(), Channel::Conductivity);
        assert!(matches!(err, SensorReadError::Malformed { .. }));
        assert!(parse_reading(Channel::Ph, "").is_err());
        assert!(parse_reading(Channel::Ph, "*ER").is_err());
    }

    #[test]
    fn test_read_selects_device_first() {
        let mut bus = MockSensorBus::new();
        let mut seq = Sequence::new();
        bus.expect_select_device()
            .with(eq(102))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        bus.expect_send_command()
            .withf(|cmd| cmd.eq_ignore_ascii_case("R"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("21.5".to_string()));

        let mut readings = SensorReadings::new(bus, ChannelAddresses::default());
        assert_eq!(readings.read_temperature().unwrap(), 21.5);
    }

    #[test]
    fn test_malformed_response_names_channel() {
        let mut bus = MockSensorBus::new();
        bus.expect_select_device().returning(|_| Ok(()));
        bus.expect_send_command()
            .returning(|_| Ok("not a number".to_string()));

        let mut readings = SensorReadings::new(bus, ChannelAddresses::default());
        let err = readings.read_ph().unwrap_err();
        assert_eq!(err.channel(), Channel::Ph);
        assert!(err.to_string().contains("pH"));
    }

    #[test]
    fn test_bus_failure_is_wrapped() {
        let mut bus = MockSensorBus::new();
        bus.expect_select_device()
            .returning(|_| Err(BusError::Transport("nack".to_string())));

        let mut readings = SensorReadings::new(bus, ChannelAddresses::default());
        assert_eq!(
            readings.read_conductivity(),
            Err(SensorReadError::Bus {
                channel: Channel::Conductivity,
                source: BusError::Transport("nack".to_string()),
            })
        );
    }

    #[test]
    fn test_retries_are_bounded() {
        let mut bus = MockSensorBus::new();
        bus.expect_select_device().times(3).returning(|_| Ok(()));
        bus.expect_send_command()
            .times(3)
            .returning(|_| Err(BusError::NoData));

        let mut readings = SensorReadings::new(bus, ChannelAddresses::default()).with_retries(2);
        assert!(readings.read_ph().is_err());
    }

    #[test]
    fn test_retry_recovers() {
        let mut bus = MockSensorBus::new();
        let mut seq = Sequence::new();
        bus.expect_select_device().returning(|_| Ok(()));
        bus.expect_send_command()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(BusError::Pending));
        bus.expect_send_command()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok("6.98".to_string()));

        let mut readings = SensorReadings::new(bus, ChannelAddresses::default()).with_retries(1);
        assert_eq!(readings.read_ph().unwrap(), 6.98);
    }

    #[test]
    fn test_compensate_conductivity_then_ph() {
        let mut bus = MockSensorBus::new();
        let mut seq = Sequence::new();

        for address in [100, 99] {
            bus.expect_select_device()
                .with(eq(address))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
            bus.expect_send_command()
                .withf(|cmd| cmd.eq_ignore_ascii_case("T,18.250000"))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(String::new()));
            bus.expect_select_device()
                .with(eq(address))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(()));
            bus.expect_send_command()
                .withf(|cmd| cmd.eq_ignore_ascii_case("T,?"))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok("?T,18.25".to_string()));
        }

        let mut readings = SensorReadings::new(bus, ChannelAddresses::default());
        readings.compensate(18.25).unwrap();
    }
}
