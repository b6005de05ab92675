//! Replay of a recorded trajectory with its original inter-frame timing.
//!
//! Torque must already be on. Each frame is written joint by joint, then the
//! loop waits for the gap to the next frame's timestamp. Gaps are clamped at
//! zero, so frames recorded late or out of order are sent immediately instead
//! of being compensated for.

use std::time::Duration;

use crate::bus::{MotorBus, Register};
use crate::clock::{CancelToken, Clock, Wake};
use crate::error::{Error, Result};
use crate::recorder::{Recorder, Termination};
use crate::trajectory::{Frame, Trajectory};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    /// Frames fully written to the bus.
    pub frames_played: usize,
    pub termination: Termination,
}

/// Wait between two consecutive frames: their timestamp gap, never negative.
pub fn step_wait(current: &Frame, next: &Frame) -> Duration {
    Duration::try_from_secs_f64(next.timestamp - current.timestamp).unwrap_or(Duration::ZERO)
}

impl<B: MotorBus, C: Clock> Recorder<B, C> {
    /// Drive the arm through `trajectory`. `normalized` must match the mode
    /// the trajectory was captured in.
    ///
    /// Everything that can be checked without the bus is checked up front.
    /// Cancellation takes effect between frames, never inside one.
    pub fn play(
        &mut self,
        trajectory: &Trajectory,
        normalized: bool,
        cancel: &CancelToken,
    ) -> Result<PlaybackReport> {
        if trajectory.is_empty() {
            return Err(Error::EmptyTrajectory);
        }
        trajectory.check_roster(&self.roster)?;
        self.check_mode(normalized)?;
        self.check_goals(trajectory, normalized)?;

        let frames = trajectory.frames();
        let total = frames.len();
        tracing::info!(
            frames = total,
            duration_s = trajectory.duration(),
            normalized,
            "Playback started"
        );

        let report = |frames_played, termination| {
            tracing::info!(frames_played, total, ?termination, "Playback finished");
            PlaybackReport {
                frames_played,
                termination,
            }
        };

        for (i, frame) in frames.iter().enumerate() {
            if cancel.is_cancelled() {
                return Ok(report(i, Termination::Cancelled));
            }

            self.write_positions(&frame.positions, normalized)?;
            tracing::debug!(frame = i + 1, total, positions = ?frame.positions, "Replaying");

            if let Some(next) = frames.get(i + 1) {
                let deadline = self.clock.now() + step_wait(frame, next);
                if self.clock.sleep_until(deadline, cancel) == Wake::Cancelled {
                    return Ok(report(i + 1, Termination::Cancelled));
                }
            }
        }

        Ok(report(total, Termination::Completed))
    }

    /// Every goal must convert to a tick the register can hold.
    fn check_goals(&self, trajectory: &Trajectory, normalized: bool) -> Result<()> {
        for frame in trajectory.frames() {
            for (joint, &value) in self.roster.iter().zip(&frame.positions) {
                let raw = if normalized {
                    self.bus.calibration_for(joint)?.to_raw(joint.norm_mode, value)
                } else {
                    value
                };
                Register::GoalPosition.to_tick(raw)?;
            }
        }
        Ok(())
    }
}
