//! The capture/playback engine.
//!
//! A [`Recorder`] owns the bus, the roster and the clock for as long as it
//! lives, so a capture and a playback can never run against the same bus at
//! once. The loops themselves live in `capture.rs` and `playback.rs`.

use std::time::Duration;

use crate::bus::{MotorBus, Register};
use crate::clock::{CancelToken, Clock, SystemClock, Wake};
use crate::error::{Error, Result};
use crate::roster::Roster;

/// How a capture or playback ended. Both are successful outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Ran to the requested duration or the last frame.
    Completed,
    /// Stopped early at an iteration boundary on request.
    Cancelled,
}

pub struct Recorder<B, C = SystemClock> {
    pub(crate) bus: B,
    pub(crate) roster: Roster,
    pub(crate) clock: C,
}

impl<B: MotorBus> Recorder<B> {
    pub fn new(bus: B, roster: Roster) -> Self {
        Self::with_clock(bus, roster, SystemClock::new())
    }
}

impl<B: MotorBus, C: Clock> Recorder<B, C> {
    pub fn with_clock(bus: B, roster: Roster, clock: C) -> Self {
        Self { bus, roster, clock }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn into_bus(self) -> B {
        self.bus
    }

    /// Enable or disable holding torque on every joint, in roster order.
    pub fn set_torque(&mut self, enabled: bool) -> Result<()> {
        for joint in &self.roster {
            self.bus.set_torque(joint, enabled)?;
        }
        if enabled {
            tracing::info!("Torque enabled");
        } else {
            tracing::info!("Torque disabled, the arm can be moved by hand");
        }
        Ok(())
    }

    /// Read every joint's present position, one bus read per joint.
    pub fn read_positions(&mut self, normalized: bool) -> Result<Vec<f64>> {
        let mut positions = Vec::with_capacity(self.roster.len());
        for joint in &self.roster {
            positions.push(self.bus.read(Register::PresentPosition, joint, normalized)?);
        }
        Ok(positions)
    }

    /// Write one goal position per joint, in roster order.
    pub fn write_positions(&mut self, positions: &[f64], normalized: bool) -> Result<()> {
        if positions.len() != self.roster.len() {
            return Err(Error::PositionCount {
                expected: self.roster.len(),
                found: positions.len(),
            });
        }
        for (joint, &position) in self.roster.iter().zip(positions) {
            self.bus.write(Register::GoalPosition, joint, position, normalized)?;
        }
        Ok(())
    }

    /// Wait on the engine's clock, e.g. for servos to settle after enabling torque.
    pub fn pause(&mut self, duration: Duration, cancel: &CancelToken) -> Wake {
        let deadline = self.clock.now() + duration;
        self.clock.sleep_until(deadline, cancel)
    }

    /// Normalized I/O needs a calibration entry for every joint.
    pub(crate) fn check_mode(&self, normalized: bool) -> Result<()> {
        if !normalized {
            return Ok(());
        }
        match self.bus.calibration() {
            Some(table) => table.ensure_covers(&self.roster),
            None => {
                let first = self.roster.names().next().unwrap_or_default();
                Err(Error::MissingCalibration(first.to_string()))
            }
        }
    }
}
