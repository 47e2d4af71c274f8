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
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use crate::samples::cursor::{ReadMode, TrigMode};

const DEFAULT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_GATE_LENGTH: Duration = Duration::from_millis(10);

/// The configuration for the sample player.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct PlayerConfig {
    /// The audio output device. The host default is used when unset.
    device: Option<String>,

    /// Target sample rate in Hz (default: 44100).
    sample_rate: Option<u32>,

    /// Initial trigger mode: oneshot, gate or slice.
    trig_mode: Option<String>,

    /// Initial read mode: forward, backward or repeat.
    read_mode: Option<String>,

    /// Slice count, 1 to 128.
    slices: Option<u32>,

    /// Playback speed, 0.2 to 10.
    speed: Option<f32>,

    /// How often the trigger clock fires, e.g. "500ms". Zero disables the clock.
    interval: Option<String>,

    /// How long each clock gate stays high.
    gate_length: Option<String>,

    /// Voltage for the position input. The input is unconnected when unset.
    position: Option<f32>,

    /// Keep stereo material stereo (default: true).
    stereo_outputs: Option<bool>,

    /// Where to persist the last path and modes.
    state_file: Option<String>,
}

impl PlayerConfig {
    /// Parse a player configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<PlayerConfig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<PlayerConfig>()?)
    }

    pub fn device(&self) -> Option<&str> {
        self.device.as_deref()
    }

    /// Returns the target sample rate (default: 44100)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE)
    }

    /// The trigger mode, if the config sets one.
    pub fn explicit_trig_mode(&self) -> Result<Option<TrigMode>, ConfigError> {
        Ok(self.trig_mode.as_deref().map(str::parse::<TrigMode>).transpose()?)
    }

    /// The read mode, if the config sets one.
    pub fn explicit_read_mode(&self) -> Result<Option<ReadMode>, ConfigError> {
        Ok(self.read_mode.as_deref().map(str::parse::<ReadMode>).transpose()?)
    }

    pub fn slices(&self) -> u32 {
        self.slices.unwrap_or(1)
    }

    pub fn speed(&self) -> f32 {
        self.speed.unwrap_or(1.0)
    }

    /// Returns the trigger clock interval (default: 500ms)
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(self.interval.as_deref(), DEFAULT_INTERVAL)
    }

    /// Returns the clock gate length (default: 10ms)
    pub fn gate_length(&self) -> Result<Duration, ConfigError> {
        parse_duration(self.gate_length.as_deref(), DEFAULT_GATE_LENGTH)
    }

    pub fn position(&self) -> Option<f32> {
        self.position
    }

    pub fn stereo_outputs(&self) -> bool {
        self.stereo_outputs.unwrap_or(true)
    }

    pub fn state_file(&self) -> Option<PathBuf> {
        self.state_file.as_ref().map(PathBuf::from)
    }
}

/// Parses a duration string such as "250ms" or "2s".
pub fn parse_duration(value: Option<&str>, default: Duration) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => Ok(DurationString::from_string(value.to_string())
            .map_err(|e| ConfigError::Duration(format!("{}: {}", value, e)))?
            .into()),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("player.yaml");
        std::fs::write(&path, contents).unwrap();
        (tempdir, path)
    }

    #[test]
    fn test_full_config() {
        let (_dir, path) = write_config(
            r#"
device: "UltraLite-mk5"
sample_rate: 48000
trig_mode: slice
read_mode: backward
slices: 16
speed: 1.5
interval: 250ms
gate_length: 5ms
position: 2.5
stereo_outputs: false
state_file: /tmp/sliceplay.json
"#,
        );
        let config = PlayerConfig::deserialize(&path).unwrap();
        assert_eq!(config.device(), Some("UltraLite-mk5"));
        assert_eq!(config.sample_rate(), 48000);
        assert_eq!(config.explicit_trig_mode().unwrap(), Some(TrigMode::Slice));
        assert_eq!(
            config.explicit_read_mode().unwrap(),
            Some(ReadMode::Backward)
        );
        assert_eq!(config.slices(), 16);
        assert_eq!(config.speed(), 1.5);
        assert_eq!(config.interval().unwrap(), Duration::from_millis(250));
        assert_eq!(config.gate_length().unwrap(), Duration::from_millis(5));
        assert_eq!(config.position(), Some(2.5));
        assert!(!config.stereo_outputs());
        assert_eq!(
            config.state_file(),
            Some(PathBuf::from("/tmp/sliceplay.json"))
        );
    }

    #[test]
    fn test_defaults() {
        let (_dir, path) = write_config("device: default\n");
        let config = PlayerConfig::deserialize(&path).unwrap();
        assert_eq!(config.sample_rate(), 44100);
        assert_eq!(config.explicit_trig_mode().unwrap(), None);
        assert_eq!(config.explicit_read_mode().unwrap(), None);
        assert_eq!(config.slices(), 1);
        assert_eq!(config.speed(), 1.0);
        assert_eq!(config.interval().unwrap(), DEFAULT_INTERVAL);
        assert_eq!(config.gate_length().unwrap(), DEFAULT_GATE_LENGTH);
        assert_eq!(config.position(), None);
        assert!(config.stereo_outputs());
        assert_eq!(config.state_file(), None);
    }

    #[test]
    fn test_invalid_values() {
        let (_dir, path) = write_config("trig_mode: sideways\ninterval: soon\n");
        let config = PlayerConfig::deserialize(&path).unwrap();
        assert!(matches!(
            config.explicit_trig_mode(),
            Err(ConfigError::InvalidMode(_))
        ));
        assert!(matches!(config.interval(), Err(ConfigError::Duration(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = PlayerConfig::deserialize(Path::new("/nonexistent/player.yaml"));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }
}
