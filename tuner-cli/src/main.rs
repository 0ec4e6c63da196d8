//! # Tuner - Terminal front-end
//!
//! Drives a [`CaptureSession`] from a fixed-rate ticker on the main thread and
//! prints each change of reading. Also exposes the reference pitches used by
//! tone playback.
//!
//! ## Architecture
//! - **Audio callback thread**: owned by CPAL, hands samples to the session
//! - **Main thread**: ticks the session at `--fps` and renders the cent meter

mod meter;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tuner_core::audio::{self, CpalDevice};
use tuner_core::instrument::Instrument;
use tuner_core::{CaptureError, CaptureSession, CaptureState, TunerConfig, notes};

/// Real-time guitar and bass tuner
#[derive(Parser)]
#[command(name = "tuner")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen to the microphone and show the detected note (default)
    Listen(ListenArgs),

    /// Print the reference frequency of a note, e.g. `tuner reference A4`
    Reference {
        /// Note name with octave (sharps or flats)
        note: String,
    },

    /// Print the open strings of an instrument in standard tuning
    Strings {
        /// guitar or bass
        instrument: Instrument,
    },

    /// Print the effective configuration as JSON
    Config {
        #[command(flatten)]
        overrides: ConfigArgs,

        /// Also write the configuration to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },

    /// List available input devices
    Devices,
}

#[derive(Args, Default)]
struct ConfigArgs {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Analysis window in samples (power of two)
    #[arg(long)]
    window: Option<usize>,

    /// How long to keep showing the last note across gaps, in milliseconds
    #[arg(long)]
    hold_ms: Option<u64>,

    /// Minimum clarity for a reading (0-1)
    #[arg(long)]
    clarity: Option<f64>,
}

#[derive(Args, Default)]
struct ListenArgs {
    #[command(flatten)]
    overrides: ConfigArgs,

    /// Input device name (default: system default input)
    #[arg(short, long)]
    device: Option<String>,

    /// Analysis frames per second
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<f64>,

    /// Show the closest open string of this instrument
    #[arg(short, long)]
    instrument: Option<Instrument>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let command = cli.command.unwrap_or_else(|| {
        Commands::Listen(ListenArgs {
            fps: 60,
            ..ListenArgs::default()
        })
    });
    match command {
        Commands::Listen(args) => listen(args),
        Commands::Reference { note } => {
            let freq = notes::note_to_frequency(&note)
                .with_context(|| format!("cannot resolve note '{note}'"))?;
            println!("{note}: {freq:.2} Hz");
            Ok(())
        }
        Commands::Strings { instrument } => {
            println!("{instrument} (standard tuning)");
            for (i, (name, freq)) in instrument.reference_frequencies().into_iter().enumerate() {
                println!("  {}: {name:<3} {freq:8.2} Hz", i + 1);
            }
            Ok(())
        }
        Commands::Config { overrides, save } => {
            let config = load_config(&overrides)?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            if let Some(path) = save {
                config
                    .save(&path)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                log::info!("Configuration saved to {}", path.display());
            }
            Ok(())
        }
        Commands::Devices => {
            for name in audio::input_device_names()? {
                println!("{name}");
            }
            Ok(())
        }
    }
}

/// Builds the configuration from an optional file plus command-line overrides.
fn load_config(args: &ConfigArgs) -> Result<TunerConfig> {
    let mut config = match args.config.as_deref() {
        Some(path) => read_config(path)?,
        None => TunerConfig::default(),
    };
    if let Some(window) = args.window {
        config.window_size = window;
    }
    if let Some(hold_ms) = args.hold_ms {
        config.hold_ms = hold_ms;
    }
    if let Some(clarity) = args.clarity {
        config.estimator.clarity_threshold = clarity;
    }
    config.validate().context("invalid tuner configuration")?;
    Ok(config)
}

fn read_config(path: &Path) -> Result<TunerConfig> {
    TunerConfig::load(path).with_context(|| format!("failed to load {}", path.display()))
}

/// Converts `--seconds` into a duration, rejecting negative, NaN and overflowing values.
fn run_duration(secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).with_context(|| format!("invalid --seconds value {secs}"))
}

fn listen(args: ListenArgs) -> Result<()> {
    let config = load_config(&args.overrides)?;
    let device = match args.device {
        Some(name) => CpalDevice::named(name),
        None => CpalDevice::default_input(),
    };

    let instrument = args.instrument;
    let mut last_line: Option<String> = None;
    let mut session = CaptureSession::new(device, config, move |reading| {
        let line = meter::render(reading.as_ref(), instrument);
        if last_line.as_deref() != Some(line.as_str()) {
            println!("{line}");
            last_line = Some(line);
        }
    })?;

    session.start().map_err(|err| match err {
        CaptureError::PermissionDenied => anyhow!(
            "microphone access was denied; allow this program to use the microphone and try again"
        ),
        other => anyhow!(other).context("could not open the audio input"),
    })?;

    let period = Duration::from_secs_f64(1.0 / args.fps.max(1) as f64);
    let deadline = args
        .seconds
        .map(run_duration)
        .transpose()?
        .and_then(|limit| Instant::now().checked_add(limit));
    let mut next_frame = Instant::now();

    log::info!("Listening; press Ctrl+C to quit");
    loop {
        match session.tick() {
            Ok(CaptureState::Listening) => {}
            Ok(state) => {
                log::info!("Session ended ({state:?})");
                break;
            }
            Err(err) => return Err(anyhow!(err).context("audio input stopped")),
        }

        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            session.stop();
            break;
        }

        next_frame += period;
        let now = Instant::now();
        if next_frame > now {
            thread::sleep(next_frame - now);
        } else {
            // Fell behind; skip the missed frames instead of bursting.
            next_frame = now;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_duration_accepts_finite_non_negative_values() {
        assert_eq!(run_duration(0.0).unwrap(), Duration::ZERO);
        assert_eq!(run_duration(2.5).unwrap(), Duration::from_millis(2500));
    }

    #[test]
    fn run_duration_rejects_values_that_would_panic() {
        for secs in [f64::NAN, f64::INFINITY, -1.0, 1e300] {
            let err = run_duration(secs).unwrap_err();
            assert!(err.to_string().contains("--seconds"), "{secs}: {err}");
        }
    }

    #[test]
    fn seconds_flag_parses_before_validation() {
        let cli = Cli::try_parse_from(["tuner", "listen", "--seconds", "inf"]).unwrap();
        let Some(Commands::Listen(args)) = cli.command else {
            panic!("expected listen");
        };
        assert!(run_duration(args.seconds.unwrap()).is_err());
    }
}
