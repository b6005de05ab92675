//! Kinesthetic: record a hand-guided arm motion and play it back.
//!
//! Torque is switched off while recording so the arm can be moved by hand;
//! joint positions are sampled at a fixed rate and saved as JSON. Playback
//! switches torque on and replays the frames with their recorded timing.
//!
//! Usage:
//!   kinesthetic [OPTIONS] record --duration 10 [--replay]
//!   kinesthetic [OPTIONS] replay
//!   kinesthetic [OPTIONS] positions
//!   kinesthetic [OPTIONS] torque off

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;

use kinesthetic::config::{load_calibration, ArmConfig};
use kinesthetic::{
    cancellation, CalibrationTable, CancelToken, CaptureSettings, FeetechBus, MotorBus, Recorder,
    Roster, SimBus, Termination, Trajectory, Wake,
};

/// Noise added to simulated position reads, in ticks.
const SIM_NOISE_TICKS: i32 = 2;
const BAR_LENGTH: usize = 20;
const MAX_RAW_TICK: f64 = 4095.0;

#[derive(Parser, Debug)]
#[command(name = "kinesthetic")]
#[command(about = "Record a hand-guided arm motion and replay it with the same timing")]
struct Args {
    /// Path to the arm configuration JSON file.
    #[arg(long, default_value = "~/.config/kinesthetic/arm.json")]
    config: PathBuf,

    /// Serial port for the Feetech servo bus (overrides the config file).
    #[arg(long)]
    port: Option<String>,

    /// Calibration file (overrides the config file).
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Record and replay in calibrated units instead of raw ticks.
    /// A trajectory must be replayed in the mode it was recorded in.
    #[arg(long)]
    normalized: bool,

    /// Use a simulated arm instead of the serial bus.
    #[arg(long)]
    sim: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Disable torque and record a motion.
    Record {
        /// Recording length in seconds.
        #[arg(short, long, default_value_t = 10.0)]
        duration: f64,

        /// Record until Ctrl+C instead of for a fixed duration.
        #[arg(long, conflicts_with = "duration")]
        unbounded: bool,

        /// Sampling rate in Hz (overrides the config file).
        #[arg(long)]
        fps: Option<f64>,

        /// Where to save the trajectory (overrides the config file).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Replay the motion right after recording it.
        #[arg(long)]
        replay: bool,
    },
    /// Enable torque and replay a saved motion.
    Replay {
        /// Trajectory file (defaults to the config's record file).
        #[arg(short, long)]
        input: Option<PathBuf>,
    },
    /// Print the current position of every joint.
    Positions,
    /// Switch holding torque on or off for every joint.
    Torque {
        #[arg(value_enum)]
        state: TorqueState,
    },
}

impl Command {
    /// Whether the command reads or writes joint positions, and so honours `--normalized`.
    fn moves_positions(&self) -> bool {
        !matches!(self, Command::Torque { .. })
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TorqueState {
    On,
    Off,
}

fn main() -> Result<()> {
    // Initialize structured JSON logging
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config_path = expand_home(&args.config);
    tracing::info!("Config: {}", config_path.display());
    let config = ArmConfig::load(&config_path).context("Failed to load arm config")?;
    let roster = config.roster()?;

    let calibration = match args.calibration.as_ref().or(config.calibration_file.as_ref()) {
        Some(path) => Some(load_calibration(&expand_home(path))?),
        None => None,
    };
    if args.normalized && args.command.moves_positions() && calibration.is_none() {
        anyhow::bail!(
            "--normalized needs a calibration file (pass --calibration or set calibration_file)"
        );
    }

    let bus = open_bus(&args, &config, &roster, calibration)?;
    let mut recorder = Recorder::new(bus, roster);

    // Ctrl+C ends capture or playback early instead of killing the process.
    let (handle, cancel) = cancellation();
    ctrlc::set_handler(move || handle.cancel()).context("Failed to install Ctrl+C handler")?;

    match args.command {
        Command::Record {
            duration,
            unbounded,
            fps,
            output,
            replay,
        } => {
            let duration = if unbounded {
                None
            } else {
                Some(
                    Duration::try_from_secs_f64(duration)
                        .context("--duration must be a positive number of seconds")?,
                )
            };
            let settings = CaptureSettings {
                sample_rate_hz: fps.unwrap_or(config.record_fps),
                duration,
                normalized: args.normalized,
            };
            let output = output
                .map(|p| expand_home(&p))
                .unwrap_or_else(|| config.record_file.clone());

            recorder.set_torque(false).context("Failed to disable torque")?;
            tracing::info!("Move the arm by hand; press Ctrl+C to stop early");

            let capture = recorder.capture(&settings, &cancel)?;
            if capture.termination == Termination::Cancelled {
                tracing::info!("Recording stopped by user");
            }
            if capture.trajectory.is_empty() {
                tracing::warn!("Nothing was recorded, not saving");
                return Ok(());
            }
            capture.trajectory.save(&output)?;

            if replay {
                cancel.reset();
                replay_trajectory(
                    &mut recorder,
                    &capture.trajectory,
                    args.normalized,
                    config.torque_settle(),
                    &cancel,
                )?;
            }
        }
        Command::Replay { input } => {
            let input = input
                .map(|p| expand_home(&p))
                .unwrap_or_else(|| config.record_file.clone());
            let trajectory = Trajectory::load(&input, recorder.roster())
                .context("Failed to load trajectory, record one first")?;

            replay_trajectory(
                &mut recorder,
                &trajectory,
                args.normalized,
                config.torque_settle(),
                &cancel,
            )?;
        }
        Command::Positions => {
            let positions = recorder.read_positions(args.normalized)?;
            print_positions(recorder.roster(), &positions, args.normalized);
        }
        Command::Torque { state } => {
            recorder.set_torque(matches!(state, TorqueState::On))?;
        }
    }

    Ok(())
}

fn open_bus(
    args: &Args,
    config: &ArmConfig,
    roster: &Roster,
    calibration: Option<CalibrationTable>,
) -> Result<Box<dyn MotorBus>> {
    if args.sim {
        tracing::info!("Using a simulated arm");
        let bus = SimBus::new(roster, calibration).with_noise(SIM_NOISE_TICKS, rand::random());
        return Ok(Box::new(bus));
    }

    let port = args.port.as_deref().unwrap_or(&config.port);
    let mut bus = FeetechBus::open(port, config.baud_rate, calibration)
        .with_context(|| format!("Failed to open servo bus on {}", port))?;

    if args.normalized {
        let mismatched = bus
            .verify_calibration(roster)
            .context("Failed to read calibration registers")?;
        if !mismatched.is_empty() {
            tracing::warn!(
                joints = ?mismatched,
                "Servos do not match the calibration file; normalized positions may be off"
            );
        }
    }

    Ok(Box::new(bus))
}

fn replay_trajectory<B: MotorBus>(
    recorder: &mut Recorder<B>,
    trajectory: &Trajectory,
    normalized: bool,
    settle: Duration,
    cancel: &CancelToken,
) -> Result<()> {
    recorder.set_torque(true).context("Failed to enable torque")?;
    if recorder.pause(settle, cancel) == Wake::Cancelled {
        tracing::info!("Playback cancelled before the first frame");
        return Ok(());
    }

    let report = recorder.play(trajectory, normalized, cancel)?;
    if report.termination == Termination::Cancelled {
        tracing::info!(
            "Playback stopped by user after {}/{} frames",
            report.frames_played,
            trajectory.len()
        );
    }
    Ok(())
}

fn print_positions(roster: &Roster, positions: &[f64], normalized: bool) {
    let unit = if normalized { "normalized" } else { "raw ticks" };
    println!("Current positions ({}):", unit);
    println!("{}", "-".repeat(40));
    for (joint, &pos) in roster.iter().zip(positions) {
        let (lo, hi) = if normalized {
            joint.norm_mode.bounds()
        } else {
            (0.0, MAX_RAW_TICK)
        };
        let fraction = ((pos - lo) / (hi - lo)).clamp(0.0, 1.0);
        let filled = (BAR_LENGTH as f64 * fraction) as usize;
        println!(
            "  {:15}: {:8.2}  [{}{}]",
            joint.name,
            pos,
            "█".repeat(filled),
            "░".repeat(BAR_LENGTH - filled)
        );
    }
    println!("{}", "-".repeat(40));
}

/// Expand `~` at the start of a path to the user's home directory.
fn expand_home(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if let Some(rest) = s.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
    }
    path.to_path_buf()
}
