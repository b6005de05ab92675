//! Simulated servo chain for running without hardware.
//!
//! Servos behave like the real ones from the engine's point of view: with
//! torque on, a goal write moves the joint there instantly; with torque off
//! the joint stays where a hand would have left it. Present-position reads
//! carry optional uniform sensor noise.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

use crate::bus::{MotorBus, Register};
use crate::calibration::CalibrationTable;
use crate::error::{Error, Result};
use crate::roster::{Joint, Roster};

const CENTER_TICK: i32 = 2048;
const MAX_TICK: i32 = 4095;

#[derive(Debug, Clone)]
struct SimServo {
    present: i32,
    goal: i32,
    torque: bool,
    homing_offset: i32,
    min_limit: i32,
    max_limit: i32,
}

pub struct SimBus {
    servos: HashMap<u8, SimServo>,
    calibration: Option<CalibrationTable>,
    noise_ticks: i32,
    rng: StdRng,
}

impl SimBus {
    /// One servo per roster joint, parked mid-range with torque off.
    pub fn new(roster: &Roster, calibration: Option<CalibrationTable>) -> Self {
        let servos = roster
            .iter()
            .map(|joint| {
                let cal = calibration.as_ref().and_then(|t| t.get(&joint.name));
                let (homing_offset, min_limit, max_limit) = match cal {
                    Some(c) => (c.homing_offset, c.range_min, c.range_max),
                    None => (0, 0, MAX_TICK),
                };
                let center = match cal {
                    Some(c) => (c.range_min + c.range_max) / 2,
                    None => CENTER_TICK,
                };
                let servo = SimServo {
                    present: center,
                    goal: center,
                    torque: false,
                    homing_offset,
                    min_limit,
                    max_limit,
                };
                (joint.id, servo)
            })
            .collect();

        Self {
            servos,
            calibration,
            noise_ticks: 0,
            rng: StdRng::seed_from_u64(0),
        }
    }

    /// Add up to `ticks` of uniform noise to every position read.
    pub fn with_noise(mut self, ticks: i32, seed: u64) -> Self {
        self.noise_ticks = ticks.abs();
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Move a joint as a hand would. Ignored while the servo holds torque.
    pub fn push_joint(&mut self, id: u8, ticks: i32) {
        if let Some(servo) = self.servos.get_mut(&id) {
            if !servo.torque {
                servo.present = ticks.clamp(0, MAX_TICK);
            }
        }
    }

    fn servo_mut(&mut self, joint: &Joint) -> Result<&mut SimServo> {
        self.servos
            .get_mut(&joint.id)
            .ok_or(Error::NoResponse { id: joint.id })
    }
}

impl MotorBus for SimBus {
    fn read_raw(&mut self, register: Register, joint: &Joint) -> Result<i32> {
        let noise = if self.noise_ticks > 0 {
            self.rng.gen_range(-self.noise_ticks..=self.noise_ticks)
        } else {
            0
        };
        let servo = self.servo_mut(joint)?;

        Ok(match register {
            Register::PresentPosition => (servo.present + noise).clamp(0, MAX_TICK),
            Register::GoalPosition => servo.goal,
            Register::TorqueEnable => servo.torque as i32,
            Register::HomingOffset => servo.homing_offset,
            Register::MinPositionLimit => servo.min_limit,
            Register::MaxPositionLimit => servo.max_limit,
        })
    }

    fn write_raw(&mut self, register: Register, joint: &Joint, value: i32) -> Result<()> {
        let servo = self.servo_mut(joint)?;
        match register {
            Register::TorqueEnable => servo.torque = value != 0,
            Register::GoalPosition => {
                servo.goal = value;
                if servo.torque {
                    servo.present = value.clamp(servo.min_limit, servo.max_limit);
                }
            }
            Register::HomingOffset => servo.homing_offset = value,
            Register::MinPositionLimit => servo.min_limit = value,
            Register::MaxPositionLimit => servo.max_limit = value,
            Register::PresentPosition => {
                tracing::warn!(joint = %joint.name, "Present_Position is read-only, write ignored");
            }
        }
        Ok(())
    }

    fn calibration(&self) -> Option<&CalibrationTable> {
        self.calibration.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::NormMode;
    use crate::testing::{calibrated_table, two_joint_roster};

    #[test]
    fn test_goal_tracks_only_with_torque() {
        let roster = two_joint_roster();
        let a = roster.iter().next().unwrap().clone();
        let mut bus = SimBus::new(&roster, None);

        bus.write(Register::GoalPosition, &a, 1000.0, false).unwrap();
        assert_eq!(bus.read(Register::PresentPosition, &a, false).unwrap(), 2048.0);

        bus.set_torque(&a, true).unwrap();
        bus.write(Register::GoalPosition, &a, 1000.0, false).unwrap();
        assert_eq!(bus.read(Register::PresentPosition, &a, false).unwrap(), 1000.0);

        bus.push_joint(a.id, 3000);
        assert_eq!(bus.read(Register::PresentPosition, &a, false).unwrap(), 1000.0);
    }

    #[test]
    fn test_hand_moves_free_joint() {
        let roster = two_joint_roster();
        let a = roster.iter().next().unwrap().clone();
        let mut bus = SimBus::new(&roster, None);
        bus.push_joint(a.id, 3100);
        assert_eq!(bus.read(Register::PresentPosition, &a, false).unwrap(), 3100.0);
    }

    #[test]
    fn test_normalized_read_starts_centered() {
        let roster = two_joint_roster();
        let mut bus = SimBus::new(&roster, Some(calibrated_table()));
        let joints: Vec<Joint> = roster.iter().cloned().collect();

        assert!(bus.read(Register::PresentPosition, &joints[0], true).unwrap().abs() < 1e-9);
        let b = bus.read(Register::PresentPosition, &joints[1], true).unwrap();
        assert!((b - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_noise_is_bounded() {
        let roster = two_joint_roster();
        let a = roster.iter().next().unwrap().clone();
        let mut bus = SimBus::new(&roster, None).with_noise(3, 7);
        for _ in 0..200 {
            let v = bus.read(Register::PresentPosition, &a, false).unwrap();
            assert!((2045.0..=2051.0).contains(&v), "{}", v);
        }
    }

    #[test]
    fn test_unknown_servo_does_not_respond() {
        let mut bus = SimBus::new(&two_joint_roster(), None);
        let ghost = Joint::new("ghost", 42, NormMode::RangeM100_100);
        assert!(matches!(
            bus.read(Register::PresentPosition, &ghost, false),
            Err(Error::NoResponse { id: 42 })
        ));
    }

    #[test]
    fn test_reports_calibration_registers() {
        let roster = two_joint_roster();
        let a = roster.iter().next().unwrap().clone();
        let mut bus = SimBus::new(&roster, Some(calibrated_table()));
        assert_eq!(bus.read_raw(Register::MinPositionLimit, &a).unwrap(), 1000);
        assert_eq!(bus.read_raw(Register::MaxPositionLimit, &a).unwrap(), 3000);
        assert_eq!(bus.read_raw(Register::HomingOffset, &a).unwrap(), 0);
    }
}
