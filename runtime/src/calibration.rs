//! Per-joint calibration and raw <-> normalized unit conversion.
//!
//! Ranges are recorded in the servo's homed frame: the Feetech firmware
//! reports `Present_Position = encoder - Homing_Offset`, so `range_min` and
//! `range_max` already include the homing offset and the conversion below
//! works directly on bus ticks. The offset itself is kept so the bus can check
//! it against what the servo has stored.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::roster::{Joint, NormMode, Roster};

/// Calibration record for one joint, as stored in the calibration file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calibration {
    pub id: u8,
    /// Non-zero inverts the direction of the normalized value.
    pub drive_mode: u8,
    pub homing_offset: i32,
    pub range_min: i32,
    pub range_max: i32,
}

impl Calibration {
    fn inverted(&self) -> bool {
        self.drive_mode != 0
    }

    fn span(&self) -> f64 {
        self.range_max as f64 - self.range_min as f64
    }

    /// Map a raw tick reading into `mode`'s normalized range.
    ///
    /// Readings outside `[range_min, range_max]` are clamped first.
    pub fn to_normalized(&self, mode: NormMode, raw: f64) -> f64 {
        let min = self.range_min as f64;
        let max = self.range_max as f64;
        let fraction = (raw.clamp(min, max) - min) / self.span();

        match mode {
            NormMode::RangeM100_100 => {
                let norm = fraction * 200.0 - 100.0;
                if self.inverted() {
                    -norm
                } else {
                    norm
                }
            }
            NormMode::Range0_100 => {
                let norm = fraction * 100.0;
                if self.inverted() {
                    100.0 - norm
                } else {
                    norm
                }
            }
        }
    }

    /// Inverse of [`to_normalized`](Self::to_normalized). The result is not
    /// rounded; the bus rounds to whole ticks when it encodes the register.
    pub fn to_raw(&self, mode: NormMode, normalized: f64) -> f64 {
        let min = self.range_min as f64;
        let (lo, hi) = mode.bounds();

        let fraction = match mode {
            NormMode::RangeM100_100 => {
                let v = if self.inverted() { -normalized } else { normalized };
                (v.clamp(lo, hi) + 100.0) / 200.0
            }
            NormMode::Range0_100 => {
                let v = if self.inverted() {
                    100.0 - normalized
                } else {
                    normalized
                };
                v.clamp(lo, hi) / 100.0
            }
        };

        fraction * self.span() + min
    }
}

/// Calibration records keyed by joint name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationTable {
    entries: BTreeMap<String, Calibration>,
}

impl CalibrationTable {
    /// Build a table, rejecting entries whose range is empty or inverted.
    pub fn new(entries: BTreeMap<String, Calibration>) -> Result<Self> {
        for (name, cal) in &entries {
            if cal.range_min >= cal.range_max {
                return Err(Error::InvalidCalibration {
                    joint: name.clone(),
                    reason: format!(
                        "range_min {} must be below range_max {}",
                        cal.range_min, cal.range_max
                    ),
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn get(&self, joint: &str) -> Option<&Calibration> {
        self.entries.get(joint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up `joint`, failing with `MissingCalibration`.
    pub fn require(&self, joint: &str) -> Result<&Calibration> {
        self.entries
            .get(joint)
            .ok_or_else(|| Error::MissingCalibration(joint.to_string()))
    }

    /// Succeed only if every joint in `roster` has an entry.
    pub fn ensure_covers(&self, roster: &Roster) -> Result<()> {
        for joint in roster {
            self.require(&joint.name)?;
        }
        Ok(())
    }

    pub fn to_normalized(&self, joint: &Joint, raw: f64) -> Result<f64> {
        Ok(self.require(&joint.name)?.to_normalized(joint.norm_mode, raw))
    }

    pub fn to_raw(&self, joint: &Joint, normalized: f64) -> Result<f64> {
        Ok(self.require(&joint.name)?.to_raw(joint.norm_mode, normalized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal(drive_mode: u8, min: i32, max: i32) -> Calibration {
        Calibration {
            id: 1,
            drive_mode,
            homing_offset: 0,
            range_min: min,
            range_max: max,
        }
    }

    fn table() -> CalibrationTable {
        let mut entries = BTreeMap::new();
        entries.insert("elbow_flex".to_string(), cal(0, 800, 3200));
        entries.insert("gripper".to_string(), cal(0, 2000, 3400));
        CalibrationTable::new(entries).unwrap()
    }

    #[test]
    fn test_centered_range_endpoints() {
        let c = cal(0, 800, 3200);
        assert!((c.to_normalized(NormMode::RangeM100_100, 800.0) + 100.0).abs() < 1e-9);
        assert!((c.to_normalized(NormMode::RangeM100_100, 3200.0) - 100.0).abs() < 1e-9);
        assert!(c.to_normalized(NormMode::RangeM100_100, 2000.0).abs() < 1e-9);
    }

    #[test]
    fn test_one_sided_range_endpoints() {
        let c = cal(0, 2000, 3400);
        assert!(c.to_normalized(NormMode::Range0_100, 2000.0).abs() < 1e-9);
        assert!((c.to_normalized(NormMode::Range0_100, 3400.0) - 100.0).abs() < 1e-9);
        assert!((c.to_normalized(NormMode::Range0_100, 2700.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_drive_mode_inverts() {
        let c = cal(1, 800, 3200);
        assert!((c.to_normalized(NormMode::RangeM100_100, 800.0) - 100.0).abs() < 1e-9);
        assert!((c.to_normalized(NormMode::RangeM100_100, 3200.0) + 100.0).abs() < 1e-9);

        let g = cal(1, 2000, 3400);
        assert!((g.to_normalized(NormMode::Range0_100, 2000.0) - 100.0).abs() < 1e-9);
        assert!(g.to_normalized(NormMode::Range0_100, 3400.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_range_readings_clamp() {
        let c = cal(0, 800, 3200);
        assert!((c.to_normalized(NormMode::RangeM100_100, 10.0) + 100.0).abs() < 1e-9);
        assert!((c.to_normalized(NormMode::RangeM100_100, 4000.0) - 100.0).abs() < 1e-9);
        assert!((c.to_raw(NormMode::RangeM100_100, 250.0) - 3200.0).abs() < 1e-9);
    }

    #[test]
    fn test_round_trip_inside_range() {
        for &(drive_mode, mode) in &[
            (0, NormMode::RangeM100_100),
            (1, NormMode::RangeM100_100),
            (0, NormMode::Range0_100),
            (1, NormMode::Range0_100),
        ] {
            let c = cal(drive_mode, 1017, 3071);
            for raw in (1017..=3071).step_by(37) {
                let raw = raw as f64;
                let back = c.to_raw(mode, c.to_normalized(mode, raw));
                assert!(
                    (back - raw).abs() < 1e-6,
                    "{:?} drive_mode={} raw={} back={}",
                    mode,
                    drive_mode,
                    raw,
                    back
                );
            }
        }
    }

    #[test]
    fn test_extreme_range_does_not_overflow() {
        let c = cal(0, -2_000_000_000, 2_000_000_000);
        assert!(c.to_normalized(NormMode::RangeM100_100, 0.0).abs() < 1e-9);
        assert!((c.to_normalized(NormMode::Range0_100, 2_000_000_000.0) - 100.0).abs() < 1e-9);
        assert!((c.to_raw(NormMode::RangeM100_100, 100.0) - 2_000_000_000.0).abs() < 1e-3);
        assert!((c.to_raw(NormMode::Range0_100, 0.0) + 2_000_000_000.0).abs() < 1e-3);
    }

    #[test]
    fn test_table_lookup_and_missing() {
        let t = table();
        let elbow = Joint::new("elbow_flex", 3, NormMode::RangeM100_100);
        assert!((t.to_normalized(&elbow, 3200.0).unwrap() - 100.0).abs() < 1e-9);

        let wrist = Joint::new("wrist_roll", 5, NormMode::RangeM100_100);
        assert!(matches!(
            t.to_normalized(&wrist, 2048.0),
            Err(Error::MissingCalibration(name)) if name == "wrist_roll"
        ));
        assert!(matches!(t.to_raw(&wrist, 0.0), Err(Error::MissingCalibration(_))));
        assert!(matches!(
            t.ensure_covers(&Roster::so101()),
            Err(Error::MissingCalibration(_))
        ));
    }

    #[test]
    fn test_rejects_inverted_range() {
        let mut entries = BTreeMap::new();
        entries.insert("shoulder_pan".to_string(), cal(0, 3000, 3000));
        assert!(matches!(
            CalibrationTable::new(entries),
            Err(Error::InvalidCalibration { .. })
        ));
    }

    #[test]
    fn test_parses_calibration_record() {
        let json = r#"{ "id": 6, "drive_mode": 0, "homing_offset": -1381,
                        "range_min": 2037, "range_max": 3459 }"#;
        let c: Calibration = serde_json::from_str(json).unwrap();
        assert_eq!(c.id, 6);
        assert_eq!(c.homing_offset, -1381);
        assert_eq!((c.range_min, c.range_max), (2037, 3459));
    }
}
