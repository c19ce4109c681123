// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module provides the register side of the gateway: the float packing
//! convention, the shared holding register table and the Modbus TCP server
//! that lets polling clients read it.
//!
//! ## Key Components
//!
//! - `codec`: 32-bit float to register pair conversion
//! - `RegisterTable`: the shared, lock-protected holding block
//! - `ModbusServer`: TCP listener serving read requests against the table
//!
//! ## Register Map
//!
//! ### Holding Registers (Read-Only for clients)
//!
//! | Address | Content | Unit |
//! |---------|---------|------|
//! | 40001-40002 | Diagnostic constant (π) | - |
//! | 40003-40004 | Temperature | °C |
//! | 40005-40006 | Conductivity | ppm |
//! | 40007-40008 | pH | - |
//! | 40009-40010 | Reserved | - |
//!
//! Addresses are PDU addresses: poll them with
//! `modpoll -0 -1 -m tcp -t 4:float -r 40001 -c 4 <host>`.

pub mod codec;
pub mod modbus_server;
pub mod register_table;

pub use codec::{decode_float, encode_float};
pub use modbus_server::{GatewayModbusService, ModbusServer};
pub use register_table::{AddressRangeError, FloatSlot, RegisterTable, HOLDING_BASE, HOLDING_LENGTH};
