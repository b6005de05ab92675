//! Motor bus contract consumed by the capture and playback loops.
//!
//! Implementors only move raw integer register values; the provided
//! [`MotorBus::read`] and [`MotorBus::write`] apply calibration when the
//! caller asks for normalized units, so every bus converts the same way.

use std::fmt;

use crate::calibration::{Calibration, CalibrationTable};
use crate::error::{Error, Result};
use crate::roster::Joint;

/// Control table registers of the STS3215 the engine touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    MinPositionLimit,
    MaxPositionLimit,
    HomingOffset,
    TorqueEnable,
    GoalPosition,
    PresentPosition,
}

impl Register {
    pub fn name(self) -> &'static str {
        match self {
            Register::MinPositionLimit => "Min_Position_Limit",
            Register::MaxPositionLimit => "Max_Position_Limit",
            Register::HomingOffset => "Homing_Offset",
            Register::TorqueEnable => "Torque_Enable",
            Register::GoalPosition => "Goal_Position",
            Register::PresentPosition => "Present_Position",
        }
    }

    pub fn address(self) -> u8 {
        match self {
            Register::MinPositionLimit => 9,
            Register::MaxPositionLimit => 11,
            Register::HomingOffset => 31,
            Register::TorqueEnable => 40,
            Register::GoalPosition => 42,
            Register::PresentPosition => 56,
        }
    }

    /// Width in bytes.
    pub fn size(self) -> u8 {
        match self {
            Register::TorqueEnable => 1,
            _ => 2,
        }
    }

    /// Sign bit of the sign-magnitude encoding, if the register is signed.
    fn sign_bit(self) -> Option<u32> {
        match self {
            Register::HomingOffset => Some(11),
            Register::GoalPosition | Register::PresentPosition => Some(15),
            _ => None,
        }
    }

    /// Registers holding a joint position, the only ones calibration applies to.
    pub fn is_position(self) -> bool {
        matches!(self, Register::GoalPosition | Register::PresentPosition)
    }

    /// Round `value` to a whole tick, failing if the register cannot hold it.
    pub fn to_tick(self, value: f64) -> Result<i32> {
        let out_of_range = || Error::ValueOutOfRange {
            register: self.name(),
            value,
        };
        if !value.is_finite() {
            return Err(out_of_range());
        }

        let tick = value.round();
        let (lo, hi) = match self.sign_bit() {
            Some(bit) => {
                let max = ((1u32 << bit) - 1) as f64;
                (-max, max)
            }
            None => (0.0, ((1u64 << (8 * self.size() as u32)) - 1) as f64),
        };
        if tick < lo || tick > hi {
            return Err(out_of_range());
        }
        Ok(tick as i32)
    }

    /// Encode a checked tick into the register's wire representation.
    pub fn encode(self, tick: i32) -> u32 {
        match self.sign_bit() {
            Some(bit) if tick < 0 => (1u32 << bit) | tick.unsigned_abs(),
            _ => tick.unsigned_abs(),
        }
    }

    /// Decode the register's wire representation.
    pub fn decode(self, raw: u32) -> i32 {
        match self.sign_bit() {
            Some(bit) => {
                let magnitude = (raw & ((1u32 << bit) - 1)) as i32;
                if raw & (1u32 << bit) != 0 {
                    -magnitude
                } else {
                    magnitude
                }
            }
            None => raw as i32,
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A bus of position-controlled actuators.
///
/// The engine assumes exclusive ownership of the bus for the duration of a
/// call and never issues concurrent requests.
pub trait MotorBus {
    /// Read a register as a raw integer.
    fn read_raw(&mut self, register: Register, joint: &Joint) -> Result<i32>;

    /// Write a raw integer to a register.
    fn write_raw(&mut self, register: Register, joint: &Joint, value: i32) -> Result<()>;

    /// Calibration used for normalized reads and writes, if any was loaded.
    fn calibration(&self) -> Option<&CalibrationTable>;

    /// Calibration entry for `joint`, or `MissingCalibration`.
    fn calibration_for(&self, joint: &Joint) -> Result<&Calibration> {
        self.calibration()
            .ok_or_else(|| Error::MissingCalibration(joint.name.clone()))?
            .require(&joint.name)
    }

    /// Read a register, converting position registers to normalized units
    /// when `normalized` is set.
    fn read(&mut self, register: Register, joint: &Joint, normalized: bool) -> Result<f64> {
        if normalized && register.is_position() {
            let cal = *self.calibration_for(joint)?;
            let raw = self.read_raw(register, joint)?;
            Ok(cal.to_normalized(joint.norm_mode, raw as f64))
        } else {
            Ok(self.read_raw(register, joint)? as f64)
        }
    }

    /// Write a register. With `normalized`, position values are mapped back
    /// to ticks through the joint's calibration first.
    fn write(&mut self, register: Register, joint: &Joint, value: f64, normalized: bool) -> Result<()> {
        let raw = if normalized && register.is_position() {
            self.calibration_for(joint)?.to_raw(joint.norm_mode, value)
        } else {
            value
        };
        let tick = register.to_tick(raw)?;
        self.write_raw(register, joint, tick)
    }

    /// Gate the joint's holding torque.
    fn set_torque(&mut self, joint: &Joint, enabled: bool) -> Result<()> {
        self.write_raw(Register::TorqueEnable, joint, enabled as i32)
    }
}

impl<B: MotorBus + ?Sized> MotorBus for Box<B> {
    fn read_raw(&mut self, register: Register, joint: &Joint) -> Result<i32> {
        (**self).read_raw(register, joint)
    }

    fn write_raw(&mut self, register: Register, joint: &Joint, value: i32) -> Result<()> {
        (**self).write_raw(register, joint, value)
    }

    fn calibration(&self) -> Option<&CalibrationTable> {
        (**self).calibration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_magnitude_positions() {
        let reg = Register::GoalPosition;
        assert_eq!(reg.encode(2048), 2048);
        assert_eq!(reg.encode(-5), 0x8005);
        assert_eq!(reg.decode(0x8005), -5);
        assert_eq!(reg.decode(4095), 4095);
    }

    #[test]
    fn test_homing_offset_sign_bit_11() {
        let reg = Register::HomingOffset;
        assert_eq!(reg.encode(-1381), (1 << 11) | 1381);
        assert_eq!(reg.decode((1 << 11) | 1381), -1381);
        assert!(reg.to_tick(2048.0).is_err());
        assert_eq!(reg.to_tick(-2047.0).unwrap(), -2047);
    }

    #[test]
    fn test_to_tick_rounds_and_bounds() {
        assert_eq!(Register::GoalPosition.to_tick(2047.6).unwrap(), 2048);
        assert_eq!(Register::GoalPosition.to_tick(-0.4).unwrap(), 0);
        assert!(Register::GoalPosition.to_tick(40_000.0).is_err());
        assert!(Register::GoalPosition.to_tick(f64::NAN).is_err());
        assert!(Register::TorqueEnable.to_tick(-1.0).is_err());
        assert!(Register::TorqueEnable.to_tick(256.0).is_err());
        assert_eq!(Register::TorqueEnable.to_tick(1.0).unwrap(), 1);
    }

    #[test]
    fn test_register_names_match_control_table() {
        assert_eq!(Register::PresentPosition.to_string(), "Present_Position");
        assert_eq!(Register::GoalPosition.name(), "Goal_Position");
        assert_eq!(Register::TorqueEnable.name(), "Torque_Enable");
    }
}
