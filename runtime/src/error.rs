//! Engine error type.
//!
//! Every failure the capture/playback engine can report is a variant of
//! [`Error`]. [`Error::kind`] groups them into the three classes a caller
//! actually branches on: the bus went away, the request was misconfigured,
//! or a trajectory file could not be read or written. Cancellation is not an
//! error and has no variant here.

use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    // ── Connectivity ──
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("bus transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("no response from servo {id}")]
    NoResponse { id: u8 },

    #[error("bad status packet from servo {id}: {reason}")]
    Protocol { id: u8, reason: String },

    // ── Configuration ──
    #[error("no calibration for joint `{0}`")]
    MissingCalibration(String),

    #[error("invalid calibration for joint `{joint}`: {reason}")]
    InvalidCalibration { joint: String, reason: String },

    #[error("invalid roster: {0}")]
    InvalidRoster(String),

    #[error("frame {index} has {found} positions, roster has {expected} joints")]
    RosterMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("got {found} positions, roster has {expected} joints")]
    PositionCount { expected: usize, found: usize },

    #[error("trajectory has no frames")]
    EmptyTrajectory,

    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    #[error("value {value} does not fit register {register}")]
    ValueOutOfRange { register: &'static str, value: f64 },

    // ── Persistence ──
    #[error("{} not found", path.display())]
    NotFound { path: PathBuf },

    #[error("malformed trajectory data in {}: {reason}", path.display())]
    MalformedData { path: PathBuf, reason: String },

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failure classes callers act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The bus failed mid-operation. The loop aborted.
    Connectivity,
    /// The request could not be served as configured. No bus I/O happened.
    Configuration,
    /// A trajectory file could not be read or written.
    Persistence,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Serial(_)
            | Error::Transport(_)
            | Error::NoResponse { .. }
            | Error::Protocol { .. } => ErrorKind::Connectivity,
            Error::MissingCalibration(_)
            | Error::InvalidCalibration { .. }
            | Error::InvalidRoster(_)
            | Error::RosterMismatch { .. }
            | Error::PositionCount { .. }
            | Error::EmptyTrajectory
            | Error::InvalidSettings(_)
            | Error::ValueOutOfRange { .. } => ErrorKind::Configuration,
            Error::NotFound { .. } | Error::MalformedData { .. } | Error::Io { .. } => {
                ErrorKind::Persistence
            }
        }
    }

    /// Wrap a filesystem error, keeping `NotFound` distinct.
    pub(crate) fn from_fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound { path }
        } else {
            Error::Io { path, source }
        }
    }
}
