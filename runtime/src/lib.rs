//! Kinesthetic demonstration for Feetech servo arms.
//!
//! With torque off, a person moves the arm by hand while [`Recorder::capture`]
//! samples every joint at a fixed rate into a [`Trajectory`]. The trajectory
//! is saved as JSON, and [`Recorder::play`] later drives the arm back through
//! it with the same gaps between frames. Positions are raw servo ticks or,
//! with a [`CalibrationTable`], normalized units (-100..100, grippers 0..100).

pub mod bus;
pub mod calibration;
pub mod capture;
pub mod clock;
pub mod config;
pub mod error;
pub mod motors;
pub mod playback;
pub mod recorder;
pub mod roster;
pub mod sim;
pub mod trajectory;

#[cfg(test)]
pub(crate) mod testing;

pub use bus::{MotorBus, Register};
pub use calibration::{Calibration, CalibrationTable};
pub use capture::{Capture, CaptureSettings};
pub use clock::{cancellation, CancelHandle, CancelToken, Clock, SystemClock, Wake};
pub use error::{Error, ErrorKind, Result};
pub use motors::FeetechBus;
pub use playback::{step_wait, PlaybackReport};
pub use recorder::{Recorder, Termination};
pub use roster::{Joint, NormMode, Roster};
pub use sim::SimBus;
pub use trajectory::{Frame, Trajectory};
