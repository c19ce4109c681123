// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Shared holding register block
//!
//! The gateway exposes a single contiguous block of holding registers. The
//! acquisition scheduler is the only writer; every Modbus client connection
//! reads from the same table. Each `read` and `write` call holds the lock for
//! the whole range it touches, so a reader never observes one freshly written
//! word of a float slot next to a stale one.

use std::fmt;
use std::sync::{PoisonError, RwLock};

use log::debug;
use thiserror::Error;

use super::codec::{decode_float, encode_float};

/// First register of the holding block
pub const HOLDING_BASE: u16 = 40001;

/// Number of registers in the holding block
pub const HOLDING_LENGTH: u16 = 10;

/// Access outside the register block.
///
/// This is a programming error: the scheduler only touches fixed slots, so
/// hitting it means the table was built with the wrong geometry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("register range {address}..{end} is outside the table range {base}..{limit}")]
pub struct AddressRangeError {
    pub address: u32,
    pub end: u32,
    pub base: u32,
    pub limit: u32,
}

/// A published measurement occupying two consecutive registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FloatSlot {
    /// Constant π, lets clients check their word order
    Diagnostic,
    /// RTD temperature in °C
    Temperature,
    /// Electrical conductivity
    Conductivity,
    /// pH
    Ph,
}

impl FloatSlot {
    /// All slots in register order
    pub const ALL: [FloatSlot; 4] = [
        FloatSlot::Diagnostic,
        FloatSlot::Temperature,
        FloatSlot::Conductivity,
        FloatSlot::Ph,
    ];

    /// Address of the first register of the slot
    pub fn address(self) -> u16 {
        match self {
            FloatSlot::Diagnostic => HOLDING_BASE,
            FloatSlot::Temperature => HOLDING_BASE + 2,
            FloatSlot::Conductivity => HOLDING_BASE + 4,
            FloatSlot::Ph => HOLDING_BASE + 6,
        }
    }

    /// Short label used in the cycle printout
    pub fn label(self) -> &'static str {
        match self {
            FloatSlot::Diagnostic => "QC",
            FloatSlot::Temperature => "RTD",
            FloatSlot::Conductivity => "EC",
            FloatSlot::Ph => "PH",
        }
    }

    /// Engineering unit suffix, empty for dimensionless values
    pub fn unit(self) -> &'static str {
        match self {
            FloatSlot::Diagnostic | FloatSlot::Ph => "",
            FloatSlot::Temperature => " (C)",
            FloatSlot::Conductivity => " (ppm)",
        }
    }
}

impl fmt::Display for FloatSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.address(), self.label())
    }
}

/// Fixed-size block of holding registers shared between the acquisition
/// loop and the Modbus service.
#[derive(Debug)]
pub struct RegisterTable {
    base: u16,
    registers: RwLock<Vec<u16>>,
}

impl Default for RegisterTable {
    fn default() -> Self {
        Self::holding_block()
    }
}

impl RegisterTable {
    /// Create a zero-filled table covering `[base, base + length)`.
    pub fn new(base: u16, length: u16) -> Self {
        Self {
            base,
            registers: RwLock::new(vec![0; length as usize]),
        }
    }

    /// The gateway's block: 40001..=40010
    pub fn holding_block() -> Self {
        Self::new(HOLDING_BASE, HOLDING_LENGTH)
    }

    pub fn base(&self) -> u16 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.registers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Translate an address range into an index range, checking the bounds.
    fn offset(&self, address: u16, span: usize, length: usize) -> Result<usize, AddressRangeError> {
        let base = u32::from(self.base);
        let limit = base + length as u32;
        let start = u32::from(address);
        let end = start + span as u32;

        if start < base || end > limit {
            return Err(AddressRangeError {
                address: start,
                end,
                base,
                limit,
            });
        }

        Ok((start - base) as usize)
    }

    /// Write consecutive registers starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns `AddressRangeError` if any of the target registers lies
    /// outside the table. Nothing is written in that case.
    pub fn write(&self, address: u16, values: &[u16]) -> Result<(), AddressRangeError> {
        let mut registers = self
            .registers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let start = self.offset(address, values.len(), registers.len())?;
        registers[start..start + values.len()].copy_from_slice(values);

        debug!(
            "Wrote {} registers at {}: {:04X?}",
            values.len(),
            address,
            values
        );
        Ok(())
    }

    /// Read `count` consecutive registers starting at `address`.
    ///
    /// # Errors
    ///
    /// Returns `AddressRangeError` if the range is not fully inside the table.
    pub fn read(&self, address: u16, count: u16) -> Result<Vec<u16>, AddressRangeError> {
        let registers = self
            .registers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let start = self.offset(address, count as usize, registers.len())?;
        Ok(registers[start..start + count as usize].to_vec())
    }

    /// Encode `value` and store it in `slot`.
    pub fn write_float(&self, slot: FloatSlot, value: f32) -> Result<(), AddressRangeError> {
        self.write(slot.address(), &encode_float(value))
    }

    /// Decode the current value of `slot`.
    pub fn read_float(&self, slot: FloatSlot) -> Result<f32, AddressRangeError> {
        let words = self.read(slot.address(), 2)?;
        Ok(decode_float([words[0], words[1]]))
    }
}
