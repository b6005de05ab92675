//! Fixed-rate capture of a hand-guided motion.
//!
//! Torque must already be off so the arm can be moved by hand; the loop only
//! reads. Samples are scheduled on absolute deadlines (`start + n / rate`) so
//! sleep jitter does not accumulate. When an iteration runs past its next
//! deadline the schedule restarts from the current time instead of bursting
//! to catch up.

use std::time::Duration;

use crate::bus::MotorBus;
use crate::clock::{CancelToken, Clock, Wake};
use crate::error::{Error, Result};
use crate::recorder::{Recorder, Termination};
use crate::trajectory::{Frame, Trajectory};

#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    pub sample_rate_hz: f64,
    /// `None` records until cancelled.
    pub duration: Option<Duration>,
    /// Record calibrated units instead of raw ticks.
    pub normalized: bool,
}

impl CaptureSettings {
    /// Sampling period, or `InvalidSettings` for a non-positive rate or duration.
    pub fn period(&self) -> Result<Duration> {
        if !(self.sample_rate_hz.is_finite() && self.sample_rate_hz > 0.0) {
            return Err(Error::InvalidSettings(format!(
                "sample rate must be a positive number of Hz, got {}",
                self.sample_rate_hz
            )));
        }
        if self.duration.is_some_and(|d| d.is_zero()) {
            return Err(Error::InvalidSettings("capture duration must be positive".into()));
        }

        Duration::try_from_secs_f64(1.0 / self.sample_rate_hz)
            .ok()
            .filter(|p| !p.is_zero())
            .ok_or_else(|| {
                Error::InvalidSettings(format!("sample rate {} Hz is too high", self.sample_rate_hz))
            })
    }
}

/// Result of a capture: the frames plus why the loop stopped.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub trajectory: Trajectory,
    pub termination: Termination,
}

impl<B: MotorBus, C: Clock> Recorder<B, C> {
    /// Sample every joint at `settings.sample_rate_hz` until the duration
    /// elapses or `cancel` fires. Cancellation returns the frames captured so
    /// far; a bus failure aborts and discards them.
    pub fn capture(&mut self, settings: &CaptureSettings, cancel: &CancelToken) -> Result<Capture> {
        let period = settings.period()?;
        self.check_mode(settings.normalized)?;

        tracing::info!(
            rate_hz = settings.sample_rate_hz,
            duration_s = ?settings.duration.map(|d| d.as_secs_f64()),
            normalized = settings.normalized,
            "Capture started"
        );

        let start = self.clock.now();
        let mut frames: Vec<Frame> = Vec::new();
        let mut next_due = Duration::ZERO;
        let mut reported_secs = 0;

        let termination = loop {
            if cancel.is_cancelled() {
                break Termination::Cancelled;
            }

            let elapsed = self.clock.now().saturating_sub(start);
            if settings.duration.is_some_and(|d| elapsed >= d) {
                break Termination::Completed;
            }

            let positions = self.read_positions(settings.normalized)?;
            tracing::trace!(frame = frames.len(), ?positions, "Sampled");

            if elapsed.as_secs() > reported_secs {
                reported_secs = elapsed.as_secs();
                tracing::info!(
                    frames = frames.len() + 1,
                    elapsed_s = reported_secs,
                    ?positions,
                    "Recording"
                );
            }

            frames.push(Frame {
                timestamp: elapsed.as_secs_f64(),
                positions,
            });

            next_due += period;
            let now = self.clock.now().saturating_sub(start);
            if now > next_due {
                let overshoot = now - next_due;
                tracing::warn!(
                    "Sample budget exceeded by {:.1}ms",
                    overshoot.as_secs_f64() * 1000.0
                );
                next_due = now;
            }

            if self.clock.sleep_until(start + next_due, cancel) == Wake::Cancelled {
                break Termination::Cancelled;
            }
        };

        tracing::info!(frames = frames.len(), ?termination, "Capture finished");
        Ok(Capture {
            trajectory: Trajectory::new(frames),
            termination,
        })
    }
}
