//! Arm configuration loader: reads arm.json for port, roster and recording defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::calibration::{Calibration, CalibrationTable};
use crate::motors::DEFAULT_BAUD_RATE;
use crate::roster::{Joint, Roster};

/// Top-level arm configuration, loaded from JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct ArmConfig {
    #[serde(default = "default_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_record_fps")]
    pub record_fps: f64,

    #[serde(default = "default_record_file")]
    pub record_file: PathBuf,

    /// Per-joint calibration; required for normalized recording and playback.
    #[serde(default)]
    pub calibration_file: Option<PathBuf>,

    /// Pause after enabling torque, before the first goal is sent.
    #[serde(default = "default_torque_settle_ms")]
    pub torque_settle_ms: u64,

    #[serde(default = "default_joints")]
    pub joints: Vec<Joint>,
}

fn default_port() -> String {
    "/dev/ttyACM0".to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_record_fps() -> f64 {
    30.0
}

fn default_record_file() -> PathBuf {
    PathBuf::from("recorded_trajectory.json")
}

fn default_torque_settle_ms() -> u64 {
    500
}

fn default_joints() -> Vec<Joint> {
    Roster::so101().iter().cloned().collect()
}

impl ArmConfig {
    /// Load configuration from a JSON file. Falls back to defaults if the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(path).context("Failed to read arm config file")?;

        let config: ArmConfig =
            serde_json::from_str(&contents).context("Failed to parse arm config JSON")?;

        Ok(config)
    }

    /// The configured joints as a validated roster.
    pub fn roster(&self) -> Result<Roster> {
        Roster::new(self.joints.clone()).context("Invalid joint list in arm config")
    }

    pub fn torque_settle(&self) -> Duration {
        Duration::from_millis(self.torque_settle_ms)
    }
}

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            record_fps: default_record_fps(),
            record_file: default_record_file(),
            calibration_file: None,
            torque_settle_ms: default_torque_settle_ms(),
            joints: default_joints(),
        }
    }
}

/// Load a calibration file: `{ "<joint>": { id, drive_mode, homing_offset, range_min, range_max } }`.
pub fn load_calibration(path: &Path) -> Result<CalibrationTable> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read calibration file {}", path.display()))?;

    let entries: BTreeMap<String, Calibration> = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse calibration file {}", path.display()))?;

    for (name, cal) in &entries {
        tracing::info!(
            joint = %name,
            range_min = cal.range_min,
            range_max = cal.range_max,
            "Loaded calibration"
        );
    }

    let table = CalibrationTable::new(entries)
        .with_context(|| format!("Invalid calibration in {}", path.display()))?;
    Ok(table)
}
