// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

use std::error::Error;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::time::Duration;

use clap::{crate_version, Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use sliceplay::audio;
use sliceplay::clock::{ClockedEngine, TriggerClock};
use sliceplay::config::{parse_duration, InstanceState, PlayerConfig};
use sliceplay::controls::Controls;
use sliceplay::render;
use sliceplay::samples::{Engine, Instance, ReadMode, TrigMode};

/// How long the CLI waits for a sample to decode before giving up.
const LOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A sliced sample player."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available audio output devices.
    Devices {},
    /// Plays a sample through an audio device until Enter is pressed.
    Play {
        /// The sample to play.
        file: PathBuf,
        #[command(flatten)]
        playback: PlaybackArgs,
        /// The device name to play through.
        #[arg(short, long)]
        device: Option<String>,
        /// Where to restore and save the last path and modes.
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Renders the engine output to a WAV file.
    Render {
        /// The sample to play.
        file: PathBuf,
        /// The WAV file to write.
        out: PathBuf,
        /// Length of the render in seconds.
        #[arg(long, default_value_t = 5.0)]
        seconds: f64,
        #[command(flatten)]
        playback: PlaybackArgs,
    },
    /// Loads a sample and prints an overview of it.
    Inspect {
        /// The sample to inspect.
        file: PathBuf,
        /// Width of the overview in columns.
        #[arg(short, long, default_value_t = 80)]
        width: usize,
        /// The sample rate to decode at.
        #[arg(long)]
        sample_rate: Option<u32>,
    },
}

/// Playback options. Anything given here overrides the player config.
#[derive(Args)]
struct PlaybackArgs {
    /// The path to a player config.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Trigger mode: oneshot, gate or slice.
    #[arg(short, long)]
    trig_mode: Option<TrigMode>,
    /// Read mode: forward, backward or repeat.
    #[arg(short, long)]
    read_mode: Option<ReadMode>,
    /// Number of slices, 1 to 128.
    #[arg(long)]
    slices: Option<u32>,
    /// Playback speed, 0.2 to 10.
    #[arg(long)]
    speed: Option<f32>,
    /// Trigger clock interval, e.g. 500ms. Zero disables the clock.
    #[arg(short, long)]
    interval: Option<String>,
    /// Trigger clock gate length, e.g. 10ms.
    #[arg(long)]
    gate_length: Option<String>,
    /// Position input voltage, 0 to 10.
    #[arg(long)]
    position: Option<f32>,
    /// Target sample rate in Hz.
    #[arg(long)]
    sample_rate: Option<u32>,
}

/// Playback settings resolved from the command line and the player config.
struct Settings {
    config: PlayerConfig,
    trig_mode: Option<TrigMode>,
    read_mode: Option<ReadMode>,
    sample_rate: u32,
    interval: Duration,
    gate_length: Duration,
    controls: Controls,
}

impl Settings {
    fn resolve(args: PlaybackArgs) -> Result<Settings, Box<dyn Error>> {
        let config = match &args.config {
            Some(path) => PlayerConfig::deserialize(path)?,
            None => PlayerConfig::default(),
        };

        let trig_mode = match args.trig_mode {
            Some(mode) => Some(mode),
            None => config.explicit_trig_mode()?,
        };
        let read_mode = match args.read_mode {
            Some(mode) => Some(mode),
            None => config.explicit_read_mode()?,
        };
        let interval = match args.interval.as_deref() {
            Some(value) => parse_duration(Some(value), Duration::ZERO)?,
            None => config.interval()?,
        };
        let gate_length = match args.gate_length.as_deref() {
            Some(value) => parse_duration(Some(value), Duration::ZERO)?,
            None => config.gate_length()?,
        };

        let controls = Controls {
            slices: args.slices.unwrap_or_else(|| config.slices()) as f32,
            speed: args.speed.unwrap_or_else(|| config.speed()),
            position: args.position.or_else(|| config.position()),
            stereo_outputs: config.stereo_outputs(),
            ..Default::default()
        };

        Ok(Settings {
            sample_rate: args.sample_rate.unwrap_or_else(|| config.sample_rate()),
            config,
            trig_mode,
            read_mode,
            interval,
            gate_length,
            controls,
        })
    }

    /// Applies the configured modes, leaving any the settings don't name as they are.
    fn apply_modes(&self, engine: &mut Engine) {
        let trig_mode = self.trig_mode.unwrap_or(engine.cursor().trig_mode());
        let read_mode = self.read_mode.unwrap_or(engine.cursor().read_mode());
        engine.set_modes(trig_mode, read_mode);
    }

    fn clocked(&self, engine: Engine) -> ClockedEngine {
        let clock = TriggerClock::new(self.interval, self.gate_length, self.sample_rate);
        ClockedEngine::new(engine, clock, self.controls.clone(), self.sample_rate)
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices {} => {
            let devices = audio::cpal::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices.iter() {
                println!("- {}", device);
            }
        }
        Commands::Play {
            file,
            playback,
            device,
            state,
        } => {
            let settings = Settings::resolve(playback)?;
            let state_file = state.or_else(|| settings.config.state_file());

            let (instance, mut engine) = match state_file.as_deref().filter(|p| p.exists()) {
                Some(path) => {
                    info!(path = ?path, "Restoring state");
                    Instance::restore(settings.sample_rate, &InstanceState::load(path)?)?
                }
                None => Instance::new(settings.sample_rate)?,
            };
            settings.apply_modes(&mut engine);
            instance.load_and_wait(&file, LOAD_TIMEOUT)?;

            let device = device.or_else(|| settings.config.device().map(String::from));
            let stream = audio::cpal::start(
                device.as_deref(),
                settings.sample_rate,
                settings.clocked(engine),
            )?;

            println!(
                "Playing {} on {} at {} Hz. Press Enter to stop.",
                file.display(),
                stream.device_name(),
                stream.sample_rate()
            );
            let mut line = String::new();
            io::stdin().lock().read_line(&mut line)?;
            drop(stream);

            let snapshot = instance.inspector().snapshot();
            println!("{}", snapshot.overview(80));

            if let Some(path) = state_file {
                if let Err(e) = instance.state().save(&path) {
                    warn!(path = ?path, err = %e, "Unable to save state");
                } else {
                    info!(path = ?path, "Saved state");
                }
            }
        }
        Commands::Render {
            file,
            out,
            seconds,
            playback,
        } => {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(format!("invalid render length: {}", seconds).into());
            }
            let settings = Settings::resolve(playback)?;
            let (instance, mut engine) = Instance::new(settings.sample_rate)?;
            settings.apply_modes(&mut engine);
            instance.load_and_wait(&file, LOAD_TIMEOUT)?;

            let frames = (seconds * settings.sample_rate as f64).round() as usize;
            let mut clocked = settings.clocked(engine);
            let summary = render::render(&mut clocked, &out, settings.sample_rate, frames)?;
            println!(
                "Wrote {} frames to {} ({} cycles, peak {:.3}V).",
                summary.frames,
                out.display(),
                summary.cycles,
                summary.peak
            );
        }
        Commands::Inspect {
            file,
            width,
            sample_rate,
        } => {
            let sample_rate = sample_rate.unwrap_or_else(|| PlayerConfig::default().sample_rate());
            let (instance, _engine) = Instance::new(sample_rate)?;
            instance.load_and_wait(&file, LOAD_TIMEOUT)?;
            println!("{}", instance.inspector().snapshot().overview(width));
        }
    }

    Ok(())
}
