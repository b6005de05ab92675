//! Timestamped frames and their JSON persistence.
//!
//! The file is a bare JSON array of `{ "timestamp": f64, "positions": [f64] }`
//! records. It does not say whether positions are raw ticks or normalized
//! units; whoever replays a file must use the mode it was recorded in.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::roster::Roster;

/// One sample of every joint, in roster order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Seconds since capture start.
    pub timestamp: f64,
    pub positions: Vec<f64>,
}

/// Ordered frames of a recorded motion. Built once, then only read.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trajectory {
    frames: Vec<Frame>,
}

impl Trajectory {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Timestamp of the last frame, in seconds.
    pub fn duration(&self) -> f64 {
        self.frames.last().map_or(0.0, |f| f.timestamp)
    }

    /// True when no frame is timestamped before its predecessor.
    pub fn is_monotonic(&self) -> bool {
        self.frames
            .windows(2)
            .all(|w| w[1].timestamp >= w[0].timestamp)
    }

    /// Check every frame carries one position per roster joint.
    pub fn check_roster(&self, roster: &Roster) -> Result<()> {
        for (index, frame) in self.frames.iter().enumerate() {
            roster.check_positions(index, &frame.positions)?;
        }
        Ok(())
    }

    /// Write the trajectory as pretty-printed JSON.
    ///
    /// The file is written beside the destination and renamed into place, so
    /// a failed save never leaves a truncated trajectory behind.
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp = tmp_path(path);
        if let Err(source) = self.write_json(&tmp).and_then(|()| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::Io {
                path: path.to_path_buf(),
                source,
            });
        }

        tracing::info!(
            path = %path.display(),
            frames = self.len(),
            duration_s = self.duration(),
            "Trajectory saved"
        );
        Ok(())
    }

    fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()
    }

    /// Read a trajectory saved by [`save`](Self::save) and check it against
    /// `roster`. Any bad record fails the whole load.
    pub fn load(path: &Path, roster: &Roster) -> Result<Self> {
        let contents = fs::read(path).map_err(|e| Error::from_fs(path, e))?;
        let malformed = |reason: String| Error::MalformedData {
            path: path.to_path_buf(),
            reason,
        };

        let records: Vec<serde_json::Value> = serde_json::from_slice(&contents)
            .map_err(|e| malformed(format!("expected an array of frames: {}", e)))?;

        let mut frames = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let frame: Frame = serde_json::from_value(record)
                .map_err(|e| malformed(format!("record {}: {}", index, e)))?;

            if !(frame.timestamp.is_finite() && frame.timestamp >= 0.0) {
                return Err(malformed(format!(
                    "record {}: timestamp {} is not a non-negative number of seconds",
                    index, frame.timestamp
                )));
            }
            roster
                .check_positions(index, &frame.positions)
                .map_err(|e| malformed(format!("record {}: {}", index, e)))?;

            frames.push(frame);
        }

        let trajectory = Self { frames };
        if !trajectory.is_monotonic() {
            tracing::warn!(
                path = %path.display(),
                "Trajectory timestamps go backwards; playback will not wait on those steps"
            );
        }

        tracing::info!(
            path = %path.display(),
            frames = trajectory.len(),
            duration_s = trajectory.duration(),
            "Trajectory loaded"
        );
        Ok(trajectory)
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}
