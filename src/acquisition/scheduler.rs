// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the ezo-modbus-gateway project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Cyclic acquisition and publication
//!
//! Every cycle publishes the diagnostic constant, then reads and publishes
//! temperature, conductivity and pH, in that order. Every
//! `compensation_threshold + 1` cycles the conductivity and pH circuits
//! receive the latest temperature for compensation.
//!
//! Cycles are separated by a fixed delay: the time spent talking to the
//! sensors is not subtracted from the interval.

use std::f64::consts::PI;
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time;

use crate::config::AcquisitionConfig;
use crate::modbus::{AddressRangeError, FloatSlot, RegisterTable};
use crate::sensors::{Channel, SensorBus, SensorReadError, SensorReadings};

/// Value published in the diagnostic slot
pub const DIAGNOSTIC_VALUE: f32 = PI as f32;

/// Failure that ends the acquisition loop.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error(transparent)]
    Sensor(#[from] SensorReadError),
    #[error(transparent)]
    AddressRange(#[from] AddressRangeError),
}

/// Where the scheduler is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Acquiring,
    Publishing,
    Compensating,
}

/// Outcome of one acquisition cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub timestamp: DateTime<Utc>,
    /// Slots refreshed during the cycle, in publication order
    pub published: Vec<FloatSlot>,
    /// Channels whose reading was skipped
    pub failed: Vec<Channel>,
    /// Whether temperature compensation was sent this cycle
    pub compensated: bool,
}

fn slot_for(channel: Channel) -> FloatSlot {
    match channel {
        Channel::Temperature => FloatSlot::Temperature,
        Channel::Conductivity => FloatSlot::Conductivity,
        Channel::Ph => FloatSlot::Ph,
    }
}

/// Sole writer of the register table.
pub struct AcquisitionScheduler<B> {
    readings: SensorReadings<B>,
    table: Arc<RegisterTable>,
    config: AcquisitionConfig,
    calibration_counter: u32,
    last_temperature: Option<f32>,
    state: SchedulerState,
    cycles: u64,
}

impl<B: SensorBus> AcquisitionScheduler<B> {
    pub fn new(
        readings: SensorReadings<B>,
        table: Arc<RegisterTable>,
        config: AcquisitionConfig,
    ) -> Self {
        Self {
            readings,
            table,
            config,
            calibration_counter: 0,
            last_temperature: None,
            state: SchedulerState::Idle,
            cycles: 0,
        }
    }

    pub fn calibration_counter(&self) -> u32 {
        self.calibration_counter
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Number of completed cycles
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Most recent successful temperature reading
    pub fn last_temperature(&self) -> Option<f32> {
        self.last_temperature
    }

    pub fn readings(&self) -> &SensorReadings<B> {
        &self.readings
    }

    /// Write `value` to `slot` and log the value read back from the table.
    fn publish(&mut self, slot: FloatSlot, value: f32) -> Result<(), AddressRangeError> {
        self.state = SchedulerState::Publishing;
        self.table.write_float(slot, value)?;
        let readback = self.table.read_float(slot)?;
        info!(
            "{} {:>3}: {:.6}{}",
            slot.address(),
            slot.label(),
            readback,
            slot.unit()
        );
        Ok(())
    }

    /// Read one channel, applying the failure policy.
    ///
    /// Returns `Ok(None)` when the reading failed and the slot is skipped.
    fn acquire(&mut self, channel: Channel) -> Result<Option<f32>, SensorReadError> {
        self.state = SchedulerState::Acquiring;
        match self.readings.read(channel) {
            Ok(value) => Ok(Some(value)),
            Err(e) if self.config.abort_on_sensor_error => Err(e),
            Err(e) => {
                warn!("Skipping {} for this cycle: {}", slot_for(channel), e);
                Ok(None)
            }
        }
    }

    fn compensate(&mut self) -> Result<bool, SensorReadError> {
        let Some(temperature) = self.last_temperature else {
            warn!("No temperature reading available, skipping temperature compensation");
            return Ok(false);
        };

        self.state = SchedulerState::Compensating;
        info!("Updating temperature compensation to {:.3} C", temperature);
        match self.readings.compensate(temperature) {
            Ok(()) => Ok(true),
            Err(e) if self.config.abort_on_sensor_error => Err(e),
            Err(e) => {
                warn!("Temperature compensation failed: {}", e);
                Ok(false)
            }
        }
    }

    /// Run one full acquisition cycle.
    ///
    /// # Errors
    ///
    /// `AddressRangeError` is always returned. A `SensorReadError` is only
    /// returned when `abort_on_sensor_error` is set; otherwise the affected
    /// slot keeps its previous value and the channel is listed in
    /// [`CycleReport::failed`].
    pub fn run_cycle(&mut self) -> Result<CycleReport, AcquisitionError> {
        let mut report = CycleReport {
            timestamp: Utc::now(),
            published: Vec::with_capacity(FloatSlot::ALL.len()),
            failed: Vec::new(),
            compensated: false,
        };

        self.publish(FloatSlot::Diagnostic, DIAGNOSTIC_VALUE)?;
        report.published.push(FloatSlot::Diagnostic);

        for channel in [Channel::Temperature, Channel::Conductivity, Channel::Ph] {
            match self.acquire(channel)? {
                Some(value) => {
                    if channel == Channel::Temperature {
                        self.last_temperature = Some(value);
                    }
                    self.publish(slot_for(channel), value)?;
                    report.published.push(slot_for(channel));
                }
                None => report.failed.push(channel),
            }
        }

        self.calibration_counter += 1;
        if self.calibration_counter > self.config.compensation_threshold {
            self.calibration_counter = 0;
            report.compensated = self.compensate()?;
        }

        self.state = SchedulerState::Idle;
        self.cycles += 1;
        Ok(report)
    }
}

impl<B: SensorBus + Send + 'static> AcquisitionScheduler<B> {
    /// Run cycles until `shutdown` becomes `true` or a cycle fails.
    ///
    /// Blocking sensor I/O runs on the blocking thread pool; the pacing sleep
    /// is interrupted as soon as shutdown is requested. Returns the number of
    /// completed cycles.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<u64> {
        let interval = self.config.interval();
        info!(
            "Starting acquisition loop ({} ms interval, compensation every {} cycles)",
            interval.as_millis(),
            self.config.compensation_threshold + 1
        );

        let mut scheduler = self;
        loop {
            if *shutdown.borrow() {
                break;
            }

            let (returned, outcome) = tokio::task::spawn_blocking(move || {
                let outcome = scheduler.run_cycle();
                (scheduler, outcome)
            })
            .await
            .context("Acquisition cycle panicked")?;
            scheduler = returned;

            let report = outcome.context("Acquisition cycle failed")?;
            debug!(
                "Cycle {} done: published {:?}, failed {:?}, compensated {}",
                scheduler.cycles, report.published, report.failed, report.compensated
            );

            let stop = tokio::select! {
                _ = time::sleep(interval) => false,
                _ = shutdown.wait_for(|stop| *stop) => true,
            };
            if stop {
                break;
            }
        }

        info!("Acquisition stopped after {} cycles", scheduler.cycles);
        Ok(scheduler.cycles)
    }
}
