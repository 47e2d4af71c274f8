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

//! The shared sample buffer.
//!
//! One buffer is shared between the loader thread (writer), the audio callback (reader) and
//! any inspector (reader). Every access goes through a single mutex, and the only write is a
//! wholesale swap of an already-decoded buffer, so the critical sections are bounded by an
//! O(1) swap or a caller-side copy.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::audio::decode::DecodedSample;
use crate::audio::StereoFrame;

/// A decoded waveform and its metadata. Never mutated once published to the store.
#[derive(Clone, Debug, Default)]
pub struct SampleBuffer {
    frames: Vec<StereoFrame>,
    channel_count: u16,
    sample_rate: u32,
    file_name: String,
    extension: String,
}

impl SampleBuffer {
    /// A buffer with no frames. This is what a failed load publishes.
    pub fn empty() -> SampleBuffer {
        SampleBuffer::default()
    }

    /// Builds a buffer from frames and metadata.
    pub fn new(frames: Vec<StereoFrame>, channel_count: u16, sample_rate: u32) -> SampleBuffer {
        SampleBuffer {
            frames,
            channel_count,
            sample_rate,
            file_name: String::new(),
            extension: String::new(),
        }
    }

    pub fn frames(&self) -> &[StereoFrame] {
        &self.frames
    }

    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// 1 for mono material, 2 for stereo.
    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    /// The sample rate of the source file.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }
}

impl From<DecodedSample> for SampleBuffer {
    fn from(decoded: DecodedSample) -> Self {
        SampleBuffer {
            frames: decoded.frames,
            channel_count: decoded.channel_count,
            sample_rate: decoded.source_sample_rate,
            file_name: decoded.file_name,
            extension: decoded.extension,
        }
    }
}

/// Owns the current sample buffer behind a short-critical-section lock.
#[derive(Debug, Default)]
pub struct SampleStore {
    buffer: Mutex<SampleBuffer>,
    /// Mirror of the buffer length, readable without taking the lock.
    total_frames: AtomicUsize,
}

impl SampleStore {
    /// Creates an empty store.
    pub fn new() -> SampleStore {
        SampleStore::default()
    }

    /// Swaps in a new buffer and returns the old one. The caller drops the returned buffer
    /// after the lock has been released, so deallocation never happens under the lock.
    #[must_use = "drop the previous buffer outside the audio thread"]
    pub fn replace(&self, buffer: SampleBuffer) -> SampleBuffer {
        let mut guard = self.buffer.lock();
        let previous = std::mem::replace(&mut *guard, buffer);
        self.total_frames
            .store(guard.total_frames(), Ordering::Release);
        previous
    }

    /// Runs `f` with read access to the buffer while holding the lock. Copy out only what is
    /// needed; the audio thread waits on this lock.
    pub fn with_read_lock<R>(&self, f: impl FnOnce(&SampleBuffer) -> R) -> R {
        let guard = self.buffer.lock();
        f(&guard)
    }

    /// The frame count of the current buffer, without locking. May be one swap behind a
    /// concurrent replace; readers must still bounds-check under the lock.
    pub fn total_frames(&self) -> usize {
        self.total_frames.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn ramp(len: usize) -> Vec<StereoFrame> {
        (0..len)
            .map(|i| StereoFrame::new(i as f32, -(i as f32)))
            .collect()
    }

    #[test]
    fn test_store_starts_empty() {
        let store = SampleStore::new();
        assert_eq!(store.total_frames(), 0);
        assert!(store.with_read_lock(|b| b.is_empty()));
    }

    #[test]
    fn test_replace_then_read_back() {
        let store = SampleStore::new();
        let frames = ramp(16);
        let previous = store.replace(SampleBuffer::new(frames.clone(), 2, 48000));
        assert!(previous.is_empty());

        assert_eq!(store.total_frames(), 16);
        store.with_read_lock(|buffer| {
            assert_eq!(buffer.frames(), frames.as_slice());
            assert_eq!(buffer.channel_count(), 2);
            assert_eq!(buffer.sample_rate(), 48000);
        });
    }

    #[test]
    fn test_replace_returns_previous_buffer() {
        let store = SampleStore::new();
        let _ = store.replace(SampleBuffer::new(ramp(4), 1, 44100));
        let previous = store.replace(SampleBuffer::empty());
        assert_eq!(previous.total_frames(), 4);
        assert_eq!(store.total_frames(), 0);
    }

    #[test]
    fn test_readers_never_see_partial_buffers() {
        // Every buffer published holds frames whose left value equals its length, so a reader
        // that sees a mismatch has observed a torn write.
        let store = Arc::new(SampleStore::new());
        let writer = {
            let store = store.clone();
            thread::spawn(move || {
                for len in 1..200usize {
                    let frames = vec![StereoFrame::mono(len as f32); len];
                    drop(store.replace(SampleBuffer::new(frames, 1, 44100)));
                }
            })
        };

        for _ in 0..2000 {
            store.with_read_lock(|buffer| {
                let len = buffer.total_frames();
                assert!(buffer.frames().iter().all(|f| f.left == len as f32));
            });
        }
        writer.join().unwrap();
        assert_eq!(store.total_frames(), 199);
    }
}
