// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! EZO circuits in I2C mode
//!
//! A command is written as plain ASCII to the circuit. After a processing
//! delay the host reads a fixed 31 byte frame: the first byte is a status
//! code, the rest a NUL terminated ASCII payload.
//!
//! | Status | Meaning |
//! |--------|---------|
//! | 1 | Success |
//! | 2 | Syntax error |
//! | 254 | Still processing |
//! | 255 | No data to send |

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{Error as _, I2c, SevenBitAddress};
use log::{debug, trace};

use super::{BusError, SensorBus};

/// Size of a response frame, status byte included
const RESPONSE_LENGTH: usize = 31;

/// Processing time of reading and calibration commands
const LONG_DELAY_MS: u32 = 1500;

/// Processing time of every other command
const SHORT_DELAY_MS: u32 = 300;

/// Extra reads attempted while the circuit reports it is still processing
const PENDING_POLLS: u8 = 3;

const STATUS_SUCCESS: u8 = 1;
const STATUS_SYNTAX_ERROR: u8 = 2;
const STATUS_PENDING: u8 = 254;
const STATUS_NO_DATA: u8 = 255;

/// EZO command framing on top of a blocking I2C bus.
pub struct EzoI2cBus<I2C, D> {
    i2c: I2C,
    delay: D,
    address: Option<SevenBitAddress>,
}

impl<I2C, D> EzoI2cBus<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self {
            i2c,
            delay,
            address: None,
        }
    }

    /// Currently selected device, if any
    pub fn selected(&self) -> Option<SevenBitAddress> {
        self.address
    }

    /// Give back the underlying bus and delay provider
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    fn read_frame(&mut self, address: SevenBitAddress) -> Result<Result<String, BusError>, BusError> {
        let mut frame = [0u8; RESPONSE_LENGTH];
        self.i2c
            .read(address, &mut frame)
            .map_err(|e| BusError::Transport(format!("{:?}", e.kind())))?;
        trace!("EZO 0x{:02X} frame: {:?}", address, frame);
        Ok(parse_frame(&frame))
    }
}

/// How long the circuit needs before its answer can be read
fn processing_delay_ms(command: &str) -> u32 {
    let upper = command.to_ascii_uppercase();
    if upper.starts_with('R') || upper.starts_with("CAL") {
        LONG_DELAY_MS
    } else {
        SHORT_DELAY_MS
    }
}

/// Decode a response frame into its payload text.
fn parse_frame(frame: &[u8]) -> Result<String, BusError> {
    let Some((&status, payload)) = frame.split_first() else {
        return Err(BusError::InvalidResponse("empty frame".to_string()));
    };

    match status {
        STATUS_SUCCESS => {
            let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
            let text = std::str::from_utf8(&payload[..end])
                .map_err(|_| BusError::InvalidResponse(format!("{:?}", &payload[..end])))?;
            Ok(text.trim().to_string())
        }
        STATUS_SYNTAX_ERROR => Err(BusError::SyntaxError),
        STATUS_PENDING => Err(BusError::Pending),
        STATUS_NO_DATA => Err(BusError::NoData),
        other => Err(BusError::InvalidResponse(format!("status code {other}"))),
    }
}

impl<I2C, D> SensorBus for EzoI2cBus<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    fn select_device(&mut self, address: u8) -> Result<(), BusError> {
        if address > 0x7F {
            return Err(BusError::InvalidResponse(format!(
                "{address} is not a 7-bit address"
            )));
        }
        self.address = Some(address);
        Ok(())
    }

    fn send_command(&mut self, command: &str) -> Result<String, BusError> {
        let address = self.address.ok_or(BusError::NoDeviceSelected)?;
        debug!("EZO 0x{:02X} <- {:?}", address, command);

        self.i2c
            .write(address, command.as_bytes())
            .map_err(|e| BusError::Transport(format!("{:?}", e.kind())))?;

        // A sleeping circuit never answers
        if command.eq_ignore_ascii_case("sleep") {
            return Ok(String::new());
        }

        self.delay.delay_ms(processing_delay_ms(command));

        for _ in 0..PENDING_POLLS {
            match self.read_frame(address)? {
                Err(BusError::Pending) => self.delay.delay_ms(SHORT_DELAY_MS),
                other => {
                    debug!("EZO 0x{:02X} -> {:?}", address, other);
                    return other;
                }
            }
        }
        self.read_frame(address)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{ErrorKind, ErrorType, Operation};
    use std::collections::VecDeque;

    /// Records writes and serves canned response frames
    #[derive(Default)]
    struct FakeI2c {
        writes: Vec<(u8, String)>,
        frames: VecDeque<Vec<u8>>,
        fail: bool,
    }

    impl ErrorType for FakeI2c {
        type Error = ErrorKind;
    }

    impl I2c for FakeI2c {
        fn transaction(
            &mut self,
            address: u8,
            operations: &mut [Operation<'_>],
        ) -> Result<(), Self::Error> {
            if self.fail {
                return Err(ErrorKind::Other);
            }
            for op in operations {
                match op {
                    Operation::Write(bytes) => self
                        .writes
                        .push((address, String::from_utf8_lossy(&bytes[..]).into_owned())),
                    Operation::Read(buf) => {
                        let frame = self.frames.pop_front().unwrap_or_default();
                        buf.fill(0);
                        buf[..frame.len()].copy_from_slice(&frame);
                    }
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeDelay {
        total_ms: u64,
    }

    impl DelayNs for FakeDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.total_ms += u64::from(ns) / 1_000_000;
        }

        fn delay_ms(&mut self, ms: u32) {
            self.total_ms += u64::from(ms);
        }
    }

    fn frame(status: u8, text: &str) -> Vec<u8> {
        let mut frame = vec![status];
        frame.extend_from_slice(text.as_bytes());
        frame
    }

    #[test]
    fn test_read_command() {
        let mut i2c = FakeI2c::default();
        i2c.frames.push_back(frame(1, "25.104"));
        let mut bus = EzoI2cBus::new(i2c, FakeDelay::default());

        bus.select_device(102).unwrap();
        assert_eq!(bus.send_command("R").unwrap(), "25.104");

        let (i2c, delay) = bus.release();
        assert_eq!(i2c.writes, vec![(102, "R".to_string())]);
        assert_eq!(delay.total_ms, 1500);
    }

    #[test]
    fn test_short_command_delay() {
        let mut i2c = FakeI2c::default();
        i2c.frames.push_back(frame(1, "?T,25.00"));
        let mut bus = EzoI2cBus::new(i2c, FakeDelay::default());

        bus.select_device(100).unwrap();
        assert_eq!(bus.send_command("T,?").unwrap(), "?T,25.00");
        assert_eq!(bus.release().1.total_ms, 300);
    }

    #[test]
    fn test_command_without_selection() {
        let mut bus = EzoI2cBus::new(FakeI2c::default(), FakeDelay::default());
        assert_eq!(bus.send_command("R"), Err(BusError::NoDeviceSelected));
    }

    #[test]
    fn test_pending_is_polled_again() {
        let mut i2c = FakeI2c::default();
        i2c.frames.push_back(frame(254, ""));
        i2c.frames.push_back(frame(1, "7.002"));
        let mut bus = EzoI2cBus::new(i2c, FakeDelay::default());

        bus.select_device(99).unwrap();
        assert_eq!(bus.send_command("R").unwrap(), "7.002");
    }

    #[test]
    fn test_pending_forever_gives_up() {
        let mut i2c = FakeI2c::default();
        for _ in 0..=PENDING_POLLS {
            i2c.frames.push_back(frame(254, ""));
        }
        let mut bus = EzoI2cBus::new(i2c, FakeDelay::default());

        bus.select_device(99).unwrap();
        assert_eq!(bus.send_command("R"), Err(BusError::Pending));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(parse_frame(&frame(2, "")), Err(BusError::SyntaxError));
        assert_eq!(parse_frame(&frame(255, "")), Err(BusError::NoData));
        assert!(matches!(
            parse_frame(&frame(7, "")),
            Err(BusError::InvalidResponse(_))
        ));
        assert!(matches!(parse_frame(&[]), Err(BusError::InvalidResponse(_))));
        assert_eq!(parse_frame(&frame(1, "1413.2\0\0garbage")).unwrap(), "1413.2");
    }

    #[test]
    fn test_transport_failure() {
        let i2c = FakeI2c {
            fail: true,
            ..Default::default()
        };
        let mut bus = EzoI2cBus::new(i2c, FakeDelay::default());
        bus.select_device(102).unwrap();
        assert!(matches!(bus.send_command("R"), Err(BusError::Transport(_))));
    }

    #[test]
    fn test_sleep_has_no_response() {
        let mut bus = EzoI2cBus::new(FakeI2c::default(), FakeDelay::default());
        bus.select_device(102).unwrap();
        assert_eq!(bus.send_command("Sleep").unwrap(), "");
        assert_eq!(bus.release().1.total_ms, 0);
    }
}
