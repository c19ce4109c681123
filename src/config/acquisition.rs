// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Data acquisition configuration
//!
//! This module defines the structures for configuring the acquisition loop
//! that polls the sensors and publishes their readings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the acquisition loop.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AcquisitionConfig {
    /// Delay in milliseconds between the end of one cycle and the start of
    /// the next. Sensor latency is not subtracted.
    pub interval_ms: u64,

    /// Temperature compensation runs on the cycle where the cycle counter
    /// exceeds this value, i.e. every `compensation_threshold + 1` cycles.
    pub compensation_threshold: u32,

    /// Stop the gateway on the first sensor failure instead of skipping the
    /// affected register slot for one cycle.
    #[serde(default)]
    pub abort_on_sensor_error: bool,

    /// Extra attempts for a failed sensor read before giving up on the cycle.
    #[serde(default)]
    pub read_retries: u8,
}

impl AcquisitionConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            interval_ms: 1000,
            compensation_threshold: 14, // about once a minute at 1 s per cycle
            abort_on_sensor_error: false,
            read_retries: 0,
        }
    }
}
