//! Ordered joint roster.
//!
//! Every frame's position vector is indexed by roster order, so the roster is
//! fixed for the lifetime of a [`Recorder`](crate::Recorder) and validated once
//! at construction.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};

/// Logical range a joint's normalized value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NormMode {
    /// Centered range, -100..=100.
    #[serde(rename = "range_m100_100")]
    RangeM100_100,
    /// One-sided range, 0..=100 (grippers).
    #[serde(rename = "range_0_100")]
    Range0_100,
}

impl NormMode {
    /// Lower and upper bound of the normalized range.
    pub fn bounds(self) -> (f64, f64) {
        match self {
            NormMode::RangeM100_100 => (-100.0, 100.0),
            NormMode::Range0_100 => (0.0, 100.0),
        }
    }
}

/// One actuator on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Joint {
    pub name: String,
    /// Servo ID on the bus.
    pub id: u8,
    pub norm_mode: NormMode,
}

impl Joint {
    pub fn new(name: impl Into<String>, id: u8, norm_mode: NormMode) -> Self {
        Self {
            name: name.into(),
            id,
            norm_mode,
        }
    }
}

/// SO-101 arm joint names, in roster order.
pub const SO101_JOINT_NAMES: &[&str] = &[
    "shoulder_pan",
    "shoulder_lift",
    "elbow_flex",
    "wrist_flex",
    "wrist_roll",
    "gripper",
];

/// Fixed, ordered list of joints shared by all frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    joints: Vec<Joint>,
}

impl Roster {
    /// Build a roster, rejecting empty lists and duplicate names or IDs.
    pub fn new(joints: Vec<Joint>) -> Result<Self> {
        if joints.is_empty() {
            return Err(Error::InvalidRoster("no joints".into()));
        }

        let mut names = HashSet::new();
        let mut ids = HashSet::new();
        for joint in &joints {
            if !names.insert(joint.name.as_str()) {
                return Err(Error::InvalidRoster(format!(
                    "duplicate joint name `{}`",
                    joint.name
                )));
            }
            if !ids.insert(joint.id) {
                return Err(Error::InvalidRoster(format!(
                    "duplicate servo id {} (joint `{}`)",
                    joint.id, joint.name
                )));
            }
        }

        Ok(Self { joints })
    }

    /// The six-joint SO-101 follower arm: servo IDs 1..=6, gripper one-sided.
    pub fn so101() -> Self {
        let joints = SO101_JOINT_NAMES
            .iter()
            .enumerate()
            .map(|(i, &name)| {
                let mode = if name == "gripper" {
                    NormMode::Range0_100
                } else {
                    NormMode::RangeM100_100
                };
                Joint::new(name, i as u8 + 1, mode)
            })
            .collect();
        Self { joints }
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Joint> {
        self.joints.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.joints.iter().map(|j| j.name.as_str())
    }

    /// Fail with `RosterMismatch` unless `positions` has one entry per joint.
    pub fn check_positions(&self, index: usize, positions: &[f64]) -> Result<()> {
        if positions.len() != self.joints.len() {
            return Err(Error::RosterMismatch {
                index,
                expected: self.joints.len(),
                found: positions.len(),
            });
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Roster {
    type Item = &'a Joint;
    type IntoIter = std::slice::Iter<'a, Joint>;

    fn into_iter(self) -> Self::IntoIter {
        self.joints.iter()
    }
}
