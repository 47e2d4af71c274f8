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
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ConfigError;
use crate::samples::cursor::{ReadMode, TrigMode};

/// The persisted state of one player instance. Missing keys keep their defaults.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct InstanceState {
    /// The last loaded sample. Empty when nothing was loaded.
    last_path: String,
    trig_mode: i64,
    read_mode: i64,
}

impl InstanceState {
    pub fn new(last_path: Option<&Path>, trig_mode: TrigMode, read_mode: ReadMode) -> Self {
        InstanceState {
            last_path: last_path
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_default(),
            trig_mode: trig_mode.index(),
            read_mode: read_mode.index(),
        }
    }

    /// Reads state from a JSON file.
    pub fn load(path: &Path) -> Result<InstanceState, ConfigError> {
        let state = serde_json::from_str(&fs::read_to_string(path)?)?;
        debug!(path = ?path, "Loaded instance state");
        Ok(state)
    }

    /// Writes state to a JSON file.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!(path = ?path, "Saved instance state");
        Ok(())
    }

    /// The last loaded sample, if any.
    pub fn last_path(&self) -> Option<PathBuf> {
        if self.last_path.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.last_path))
        }
    }

    pub fn trig_mode(&self) -> Result<TrigMode, ConfigError> {
        Ok(TrigMode::try_from(self.trig_mode)?)
    }

    pub fn read_mode(&self) -> Result<ReadMode, ConfigError> {
        Ok(ReadMode::try_from(self.read_mode)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_keys() {
        let state = InstanceState::new(
            Some(Path::new("/samples/break.wav")),
            TrigMode::Slice,
            ReadMode::Repeat,
        );
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "lastPath": "/samples/break.wav",
                "trigMode": 2,
                "readMode": 2,
            })
        );
    }

    #[test]
    fn test_save_and_load() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("state.json");
        let state = InstanceState::new(
            Some(Path::new("/samples/vox.flac")),
            TrigMode::Gate,
            ReadMode::Backward,
        );
        state.save(&path).unwrap();

        let loaded = InstanceState::load(&path).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.last_path(), Some(PathBuf::from("/samples/vox.flac")));
        assert_eq!(loaded.trig_mode().unwrap(), TrigMode::Gate);
        assert_eq!(loaded.read_mode().unwrap(), ReadMode::Backward);
    }

    #[test]
    fn test_missing_keys_and_empty_path() {
        let state: InstanceState = serde_json::from_str(r#"{"lastPath": ""}"#).unwrap();
        assert_eq!(state.last_path(), None);
        assert_eq!(state.trig_mode().unwrap(), TrigMode::OneShot);
        assert_eq!(state.read_mode().unwrap(), ReadMode::Forward);
    }

    #[test]
    fn test_out_of_range_modes_rejected() {
        let state: InstanceState =
            serde_json::from_str(r#"{"lastPath": "", "trigMode": 3, "readMode": -1}"#).unwrap();
        assert!(matches!(state.trig_mode(), Err(ConfigError::InvalidMode(_))));
        assert!(matches!(state.read_mode(), Err(ConfigError::InvalidMode(_))));
    }

    #[test]
    fn test_load_errors() {
        let tempdir = tempfile::tempdir().unwrap();
        assert!(matches!(
            InstanceState::load(&tempdir.path().join("missing.json")),
            Err(ConfigError::Io(_))
        ));
        let path = tempdir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(InstanceState::load(&path), Err(ConfigError::Json(_))));
    }
}
