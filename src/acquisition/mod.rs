// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Acquisition module
//!
//! This module drives the sensors on a fixed cadence and publishes their
//! readings into the shared register table.

pub mod scheduler;

pub use scheduler::{
    AcquisitionError, AcquisitionScheduler, CycleReport, SchedulerState, DIAGNOSTIC_VALUE,
};
