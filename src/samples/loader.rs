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

//! Background sample loading.
//!
//! Decoding runs on a dedicated worker thread into a local buffer, which is then swapped into
//! the [`SampleStore`] in one step. The audio thread never waits on a decode: it only polls
//! [`LoaderHandle::is_loading`] and skips playback while a load is outstanding.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::store::{SampleBuffer, SampleStore};
use crate::audio::decode;

/// Capacity of the request queue. Requests are coalesced, so this only bounds bursts.
const REQUEST_QUEUE_SIZE: usize = 64;

/// Capacity of the completion channel. Completions are dropped if nobody is listening.
const COMPLETION_QUEUE_SIZE: usize = 16;

pub(crate) enum LoadRequest {
    /// Decode a new path.
    Load(PathBuf),
    /// Decode the last requested path again at the current sample rate.
    Reload,
    Shutdown,
}

/// The result of a load, reported on the completion channel.
#[derive(Clone, Debug, PartialEq)]
pub enum LoadOutcome {
    Loaded {
        total_frames: usize,
        channel_count: u16,
    },
    /// The store already holds this path at this sample rate.
    Unchanged,
    /// Decoding failed and the store now holds an empty buffer.
    Failed(String),
}

/// A completed load.
#[derive(Clone, Debug)]
pub struct LoadEvent {
    pub path: PathBuf,
    pub outcome: LoadOutcome,
}

/// What [`LoaderHandle::reload_at`] did with a sample rate change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reload {
    /// A reload of the last path was queued.
    Queued,
    /// The rate was recorded and nothing needs decoding again: the rate is unchanged, no
    /// path has been loaded, or a load in flight will pick the new rate up.
    NotNeeded,
    /// The request queue was full. The rate was not recorded; try again later.
    Busy,
}

/// Why a blocking load did not produce a sample.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("unable to request load of {0}")]
    Rejected(PathBuf),

    #[error("timed out loading {0}")]
    Timeout(PathBuf),

    #[error("unable to load {path}: {reason}")]
    Failed { path: PathBuf, reason: String },

    #[error("no completion reported for {0}")]
    Unreported(PathBuf),
}

/// State shared between handles and the worker.
struct LoaderShared {
    store: Arc<SampleStore>,
    /// Number of requests sent but not yet processed. Loading is in progress while non-zero.
    pending: AtomicUsize,
    /// Bumped on every user-initiated load so the engine can reset its cursor.
    generation: AtomicU64,
    sample_rate: AtomicU32,
    last_path: Mutex<Option<PathBuf>>,
}

/// A cheap, cloneable handle for issuing load requests and observing loader state.
#[derive(Clone)]
pub struct LoaderHandle {
    tx: Sender<LoadRequest>,
    shared: Arc<LoaderShared>,
}

impl LoaderHandle {
    /// Requests that `path` be decoded and published. An empty path means "no file" and is
    /// ignored. Returns true if a request was queued.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> bool {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return false;
        }

        *self.shared.last_path.lock() = Some(path.to_path_buf());
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        if self.tx.send(LoadRequest::Load(path.to_path_buf())).is_err() {
            self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            warn!(path = ?path, "Loader worker is gone, dropping load request");
            return false;
        }
        true
    }

    /// Records a new output sample rate and, if a path has been loaded, asks for it to be
    /// decoded again at that rate. Safe to call from the audio thread: it neither blocks nor
    /// allocates.
    pub fn reload_at(&self, sample_rate: u32) -> Reload {
        let previous = self.shared.sample_rate.swap(sample_rate, Ordering::AcqRel);
        if previous == sample_rate {
            return Reload::NotNeeded;
        }
        // try_lock keeps the audio thread from waiting on a concurrent load() call; the
        // worker reads the new rate when it processes that load anyway.
        match self.shared.last_path.try_lock() {
            Some(last_path) if last_path.is_some() => {}
            _ => return Reload::NotNeeded,
        }

        self.shared.pending.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(LoadRequest::Reload) {
            Ok(()) => Reload::Queued,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
                let _ = self.shared.sample_rate.compare_exchange(
                    sample_rate,
                    previous,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                );
                Reload::Busy
            }
        }
    }

    /// True while any request is queued or being decoded.
    pub fn is_loading(&self) -> bool {
        self.shared.pending.load(Ordering::Acquire) > 0
    }

    /// Changes every time a new path is requested.
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    /// The most recently requested path, if any.
    pub fn last_path(&self) -> Option<PathBuf> {
        self.shared.last_path.lock().clone()
    }

    /// The sample rate loads are decoded at.
    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate.load(Ordering::Acquire)
    }
}

/// Owns the loader worker thread. Dropping the loader stops the worker once any in-flight
/// decode finishes.
pub struct Loader {
    handle: LoaderHandle,
    completed_rx: Receiver<LoadEvent>,
    worker: Option<JoinHandle<()>>,
}

impl Loader {
    /// Starts a loader that publishes into `store` and decodes at `sample_rate`.
    pub fn new(store: Arc<SampleStore>, sample_rate: u32) -> io::Result<Loader> {
        let (tx, rx) = crossbeam_channel::bounded(REQUEST_QUEUE_SIZE);
        let (completed_tx, completed_rx) = crossbeam_channel::bounded(COMPLETION_QUEUE_SIZE);
        let shared = Arc::new(LoaderShared {
            store,
            pending: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            sample_rate: AtomicU32::new(sample_rate),
            last_path: Mutex::new(None),
        });

        let worker = {
            let shared = shared.clone();
            thread::Builder::new()
                .name("sample-loader".to_string())
                .spawn(move || Worker::new(shared, rx, completed_tx).run())?
        };

        Ok(Loader {
            handle: LoaderHandle { tx, shared },
            completed_rx,
            worker: Some(worker),
        })
    }

    /// Returns a handle that can be shared with the engine and the UI.
    pub fn handle(&self) -> LoaderHandle {
        self.handle.clone()
    }

    /// Completion events, one per processed batch of requests.
    pub fn completions(&self) -> &Receiver<LoadEvent> {
        &self.completed_rx
    }

    /// Blocks until no load is pending or the timeout elapses. Returns true if idle.
    /// Completion events are left on [`Loader::completions`].
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        let mut tick = Duration::from_millis(1);
        let max_tick = Duration::from_millis(50);
        loop {
            if !self.handle.is_loading() {
                return true;
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return false;
            }
            thread::sleep(tick.min(timeout - elapsed));
            tick = (tick * 2).min(max_tick);
        }
    }

    /// Loads `path` and blocks until the loader has reported on it.
    ///
    /// Completions already queued are discarded first, so the outcome returned is the one
    /// for this request.
    pub fn load_and_wait(&self, path: &Path, timeout: Duration) -> Result<LoadOutcome, LoadError> {
        for _ in self.completed_rx.try_iter() {}

        if !self.handle.load(path) {
            return Err(LoadError::Rejected(path.to_path_buf()));
        }
        if !self.wait_idle(timeout) {
            return Err(LoadError::Timeout(path.to_path_buf()));
        }

        let outcome = self
            .completed_rx
            .try_iter()
            .filter(|event| event.path == path)
            .last()
            .map(|event| event.outcome);
        match outcome {
            Some(LoadOutcome::Failed(reason)) => Err(LoadError::Failed {
                path: path.to_path_buf(),
                reason,
            }),
            Some(outcome) => Ok(outcome),
            None => Err(LoadError::Unreported(path.to_path_buf())),
        }
    }
}

impl std::ops::Deref for Loader {
    type Target = LoaderHandle;

    fn deref(&self) -> &LoaderHandle {
        &self.handle
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        let _ = self.handle.tx.send(LoadRequest::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
impl LoaderHandle {
    /// A handle with no worker behind it. Requests stay in the returned queue, so anything
    /// loaded through the handle stays pending.
    pub(crate) fn detached(
        store: Arc<SampleStore>,
        sample_rate: u32,
        queue_size: usize,
    ) -> (LoaderHandle, Receiver<LoadRequest>) {
        let (tx, rx) = crossbeam_channel::bounded(queue_size);
        let shared = Arc::new(LoaderShared {
            store,
            pending: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            sample_rate: AtomicU32::new(sample_rate),
            last_path: Mutex::new(None),
        });
        (LoaderHandle { tx, shared }, rx)
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("loading", &self.handle.is_loading())
            .field("last_path", &self.handle.last_path())
            .field("sample_rate", &self.handle.sample_rate())
            .finish()
    }
}

/// The worker side of the loader.
struct Worker {
    shared: Arc<LoaderShared>,
    rx: Receiver<LoadRequest>,
    completed_tx: Sender<LoadEvent>,
    /// The path and rate currently published in the store, if the last decode succeeded.
    current: Option<(PathBuf, u32)>,
    /// The last path this worker was asked to decode.
    requested: Option<PathBuf>,
}

impl Worker {
    fn new(
        shared: Arc<LoaderShared>,
        rx: Receiver<LoadRequest>,
        completed_tx: Sender<LoadEvent>,
    ) -> Worker {
        Worker {
            shared,
            rx,
            completed_tx,
            current: None,
            requested: None,
        }
    }

    fn run(mut self) {
        while let Ok(first) = self.rx.recv() {
            // Coalesce everything queued behind the first request: only the newest path
            // matters, and a reload folds into a pending load.
            let mut batch = 0usize;
            let mut shutdown = false;
            let mut next = Some(first);
            while let Some(request) = next {
                match request {
                    LoadRequest::Load(path) => {
                        self.requested = Some(path);
                        batch += 1;
                    }
                    LoadRequest::Reload => batch += 1,
                    LoadRequest::Shutdown => shutdown = true,
                }
                next = self.rx.try_recv().ok();
            }

            if batch > 0 {
                if let Some(path) = self.requested.clone() {
                    let outcome = self.load(&path);
                    // Completion is queued before the pending count drops, so an idle loader
                    // has already reported every load.
                    let _ = self.completed_tx.try_send(LoadEvent { path, outcome });
                }
                self.shared.pending.fetch_sub(batch, Ordering::AcqRel);
            }

            if shutdown {
                break;
            }
        }
        debug!("Sample loader stopped");
    }

    fn load(&mut self, path: &Path) -> LoadOutcome {
        let sample_rate = self.shared.sample_rate.load(Ordering::Acquire);
        if self
            .current
            .as_ref()
            .is_some_and(|(p, rate)| p == path && *rate == sample_rate)
        {
            debug!(path = ?path, sample_rate, "Sample already loaded");
            return LoadOutcome::Unchanged;
        }

        info!(path = ?path, sample_rate, "Loading sample");
        let start = Instant::now();
        match decode::decode(path, sample_rate) {
            Ok(decoded) => {
                let total_frames = decoded.total_frames();
                let channel_count = decoded.channel_count;
                let source_rate = decoded.source_sample_rate;
                drop(self.shared.store.replace(SampleBuffer::from(decoded)));
                self.current = Some((path.to_path_buf(), sample_rate));
                info!(
                    path = ?path,
                    frames = total_frames,
                    channels = channel_count,
                    source_rate,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Sample loaded"
                );
                LoadOutcome::Loaded {
                    total_frames,
                    channel_count,
                }
            }
            Err(e) => {
                warn!(path = ?path, error = %e, "Failed to load sample");
                drop(self.shared.store.replace(SampleBuffer::empty()));
                self.current = None;
                LoadOutcome::Failed(e.to_string())
            }
        }
    }
}
