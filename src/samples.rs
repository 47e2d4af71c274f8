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

//! Sample playback.
//!
//! This module provides:
//! - A shared sample store, swapped wholesale by a background loader
//! - The playback cursor with its trigger and read modes
//! - The per-tick engine that runs on the audio thread
//! - An inspector for display off the audio thread

pub mod cursor;
pub mod engine;
pub mod inspector;
pub mod loader;
pub mod store;
pub mod trigger;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

pub use cursor::{ReadMode, TrigMode};
pub use engine::{Engine, TickArgs};
pub use inspector::{EngineStatus, Inspector, InspectorSnapshot};
pub use loader::{LoadError, LoadEvent, LoadOutcome, Loader, LoaderHandle, Reload};
pub use store::{SampleBuffer, SampleStore};

use crate::config::{ConfigError, InstanceState};

/// One player instance: the store, its loader and the status the engine publishes. The
/// engine itself is handed out separately so it can move to the audio thread.
pub struct Instance {
    store: Arc<SampleStore>,
    loader: Loader,
    status: Arc<EngineStatus>,
}

impl Instance {
    /// Creates an empty instance and its engine, decoding at `sample_rate`.
    pub fn new(sample_rate: u32) -> io::Result<(Instance, Engine)> {
        let store = Arc::new(SampleStore::new());
        let status = Arc::new(EngineStatus::new());
        let loader = Loader::new(store.clone(), sample_rate)?;
        let engine = Engine::new(store.clone(), loader.handle(), status.clone());
        Ok((
            Instance {
                store,
                loader,
                status,
            },
            engine,
        ))
    }

    /// Creates an instance from saved state, restoring the modes and loading the saved path.
    pub fn restore(
        sample_rate: u32,
        state: &InstanceState,
    ) -> Result<(Instance, Engine), ConfigError> {
        let trig_mode = state.trig_mode()?;
        let read_mode = state.read_mode()?;
        let (instance, mut engine) = Instance::new(sample_rate)?;
        engine.set_modes(trig_mode, read_mode);
        if let Some(path) = state.last_path() {
            info!(path = ?path, "Restoring sample");
            instance.load(path);
        }
        Ok((instance, engine))
    }

    /// Requests a new sample. An empty path is ignored.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> bool {
        self.loader.load(path)
    }

    /// Loads `path` and blocks until it has been decoded or has failed.
    pub fn load_and_wait(&self, path: &Path, timeout: Duration) -> Result<LoadOutcome, LoadError> {
        self.loader.load_and_wait(path, timeout)
    }

    pub fn is_loading(&self) -> bool {
        self.loader.is_loading()
    }

    /// Blocks until outstanding loads finish or the timeout passes.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.loader.wait_idle(timeout)
    }

    pub fn last_path(&self) -> Option<PathBuf> {
        self.loader.last_path()
    }

    pub fn loader(&self) -> &Loader {
        &self.loader
    }

    pub fn store(&self) -> Arc<SampleStore> {
        self.store.clone()
    }

    pub fn inspector(&self) -> Inspector {
        Inspector::new(self.store.clone(), self.status.clone(), self.loader.handle())
    }

    /// The state to persist: the last requested path and the engine's current modes.
    pub fn state(&self) -> InstanceState {
        let status = self.status.snapshot();
        InstanceState::new(
            self.last_path().as_deref(),
            status.trig_mode,
            status.read_mode,
        )
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("loader", &self.loader)
            .field("total_frames", &self.store.total_frames())
            .finish()
    }
}
