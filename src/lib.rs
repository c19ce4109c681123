//! EZO Modbus gateway library
//!
//! This library bridges Atlas Scientific EZO sensor circuits (temperature,
//! electrical conductivity, pH) to a Modbus TCP holding register block, so
//! that industrial polling clients can read the measurements as 32-bit floats.

pub mod acquisition;
pub mod config;
pub mod daemon;
pub mod modbus;
pub mod sensors;
