// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Packing of 32-bit floats into pairs of holding registers
//!
//! A float occupies two consecutive registers. The write path splits the
//! little-endian byte representation of the value into two little-endian
//! words, so the first register carries the low word and the second register
//! the high word ("CDAB" word order for most polling clients).
//!
//! The read-back path takes the two registers, lays them out as the
//! big-endian bytes of `(second, first)` and decodes a big-endian float.
//! Both paths are plain bit manipulation and therefore total: NaN payloads,
//! infinities and subnormals survive unchanged.
//!
//! | Value | First register | Second register |
//! |-------|----------------|-----------------|
//! | π (`3.1415927`) | `0x0FDB` | `0x4049` |
//! | `25.0` | `0x0000` | `0x41C8` |
//! | `7.0` | `0x0000` | `0x40E0` |

/// Encode a float into the two register words of a float slot.
///
/// The returned array is in register order: `[first, second]`.
pub fn encode_float(value: f32) -> [u16; 2] {
    let bytes = value.to_le_bytes();
    [
        u16::from_le_bytes([bytes[0], bytes[1]]),
        u16::from_le_bytes([bytes[2], bytes[3]]),
    ]
}

/// Decode the two register words of a float slot, in register order.
pub fn decode_float(words: [u16; 2]) -> f32 {
    let [first, second] = words;
    let high = second.to_be_bytes();
    let low = first.to_be_bytes();
    f32::from_be_bytes([high[0], high[1], low[0], low[1]])
}
