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

//! Read-only views of the engine for display.
//!
//! The inspector copies the channels out of the store under the lock and does all reduction
//! and formatting afterwards. Engine state is published through atomics so reading it never
//! touches the audio thread.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use super::cursor::{PlaybackCursor, ReadMode, TrigMode};
use super::loader::LoaderHandle;
use super::store::SampleStore;

/// Engine state published once per tick.
#[derive(Debug)]
pub struct EngineStatus {
    playing: AtomicBool,
    trig_mode: AtomicU8,
    read_mode: AtomicU8,
    slice_count: AtomicUsize,
    slice_length: AtomicUsize,
    /// -1 when no slice has been selected.
    slice_index: AtomicI64,
    speed: AtomicU32,
    position: AtomicU32,
}

impl Default for EngineStatus {
    fn default() -> Self {
        EngineStatus {
            playing: AtomicBool::new(false),
            trig_mode: AtomicU8::new(0),
            read_mode: AtomicU8::new(0),
            slice_count: AtomicUsize::new(1),
            slice_length: AtomicUsize::new(1),
            slice_index: AtomicI64::new(-1),
            speed: AtomicU32::new(1.0f32.to_bits()),
            position: AtomicU32::new(0.0f32.to_bits()),
        }
    }
}

impl EngineStatus {
    pub fn new() -> EngineStatus {
        EngineStatus::default()
    }

    /// Publishes the cursor. Relaxed stores: each field is independently meaningful and a
    /// display can tolerate fields from adjacent ticks.
    pub fn publish(&self, cursor: &PlaybackCursor) {
        self.playing.store(cursor.is_playing(), Ordering::Relaxed);
        self.trig_mode
            .store(cursor.trig_mode().index() as u8, Ordering::Relaxed);
        self.read_mode
            .store(cursor.read_mode().index() as u8, Ordering::Relaxed);
        self.slice_count
            .store(cursor.slice_count(), Ordering::Relaxed);
        self.slice_length
            .store(cursor.slice_length(), Ordering::Relaxed);
        self.slice_index.store(
            cursor.slice_index().map_or(-1, |i| i as i64),
            Ordering::Relaxed,
        );
        self.speed
            .store(cursor.speed().to_bits(), Ordering::Relaxed);
        self.position
            .store(cursor.position().to_bits(), Ordering::Relaxed);
    }

    /// Reads a copy of the published state.
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            playing: self.playing.load(Ordering::Relaxed),
            trig_mode: TrigMode::try_from(self.trig_mode.load(Ordering::Relaxed) as i64)
                .unwrap_or_default(),
            read_mode: ReadMode::try_from(self.read_mode.load(Ordering::Relaxed) as i64)
                .unwrap_or_default(),
            slice_count: self.slice_count.load(Ordering::Relaxed),
            slice_length: self.slice_length.load(Ordering::Relaxed),
            slice_index: usize::try_from(self.slice_index.load(Ordering::Relaxed)).ok(),
            speed: f32::from_bits(self.speed.load(Ordering::Relaxed)),
            position: f32::from_bits(self.position.load(Ordering::Relaxed)),
        }
    }
}

/// A copy of the engine state.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    pub playing: bool,
    pub trig_mode: TrigMode,
    pub read_mode: ReadMode,
    pub slice_count: usize,
    pub slice_length: usize,
    pub slice_index: Option<usize>,
    pub speed: f32,
    pub position: f32,
}

/// The minimum and maximum of a run of samples.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Peak {
    pub min: f32,
    pub max: f32,
}

/// Reduces `samples` to `columns` min/max pairs. Returns fewer columns than requested when
/// there are fewer samples than columns.
pub fn peaks(samples: &[f32], columns: usize) -> Vec<Peak> {
    if samples.is_empty() || columns == 0 {
        return Vec::new();
    }
    let chunk = samples.len().div_ceil(columns);
    samples
        .chunks(chunk)
        .map(|chunk| {
            chunk.iter().fold(
                Peak {
                    min: f32::INFINITY,
                    max: f32::NEG_INFINITY,
                },
                |peak, &s| Peak {
                    min: peak.min.min(s),
                    max: peak.max.max(s),
                },
            )
        })
        .collect()
}

/// Everything a display needs, copied out of the engine.
#[derive(Clone, Debug)]
pub struct InspectorSnapshot {
    pub file_name: String,
    pub extension: String,
    pub channel_count: u16,
    pub sample_rate: u32,
    pub loading: bool,
    /// Left channel, or the only channel for mono material.
    pub left: Vec<f32>,
    /// Right channel. A copy of the left channel for mono material.
    pub right: Vec<f32>,
    pub status: StatusSnapshot,
}

impl InspectorSnapshot {
    pub fn total_frames(&self) -> usize {
        self.left.len()
    }

    /// Frame indices where slices start, excluding the first. Empty outside slice mode.
    pub fn slice_boundaries(&self) -> Vec<usize> {
        if self.status.trig_mode != TrigMode::Slice {
            return Vec::new();
        }
        let total = self.total_frames();
        (1..self.status.slice_count)
            .map(|i| i * self.status.slice_length)
            .take_while(|&frame| frame < total)
            .collect()
    }

    /// A text overview of the buffer `width` columns wide: a header, one peak row per
    /// channel, and a marker row for the play-head and slice boundaries.
    pub fn overview(&self, width: usize) -> String {
        let mut out = String::new();
        let name = if self.extension.is_empty() {
            self.file_name.clone()
        } else {
            format!("{}.{}", self.file_name, self.extension)
        };
        let _ = write!(
            out,
            "{} {} {}",
            name, self.status.trig_mode, self.status.read_mode
        );
        if self.status.trig_mode == TrigMode::Slice {
            let _ = write!(out, " |{}|", self.status.slice_count);
        }
        let _ = writeln!(
            out,
            " speed {:.3} frames {} channels {} rate {}{}",
            self.status.speed,
            self.total_frames(),
            self.channel_count,
            self.sample_rate,
            if self.loading { " (loading)" } else { "" },
        );

        let width = width.max(1);
        for channel in [&self.left, &self.right] {
            out.extend(peaks(channel, width).iter().map(|p| level_char(*p)));
            out.push('\n');
        }

        let total = self.total_frames();
        if total > 0 {
            let columns = total.div_ceil(total.div_ceil(width));
            let column_of = |frame: f32| ((frame / total as f32) * columns as f32) as usize;
            let mut markers = vec![' '; columns];
            for boundary in self.slice_boundaries() {
                if let Some(m) = markers.get_mut(column_of(boundary as f32)) {
                    *m = '|';
                }
            }
            if self.status.playing {
                if let Some(m) = markers.get_mut(column_of(self.status.position)) {
                    *m = '^';
                }
            }
            out.extend(markers);
            out.push('\n');
        }
        out
    }
}

fn level_char(peak: Peak) -> char {
    const LEVELS: [char; 8] = [' ', '.', ':', '-', '=', '+', '#', '@'];
    let amplitude = peak.max.abs().max(peak.min.abs()).min(1.0);
    LEVELS[((amplitude * (LEVELS.len() - 1) as f32).round() as usize).min(LEVELS.len() - 1)]
}

/// Takes snapshots of a running engine.
#[derive(Clone)]
pub struct Inspector {
    store: Arc<SampleStore>,
    status: Arc<EngineStatus>,
    loader: LoaderHandle,
}

impl Inspector {
    pub fn new(store: Arc<SampleStore>, status: Arc<EngineStatus>, loader: LoaderHandle) -> Self {
        Inspector {
            store,
            status,
            loader,
        }
    }

    /// Copies the buffer and the engine state. The lock is held only for the copy.
    pub fn snapshot(&self) -> InspectorSnapshot {
        let loading = self.loader.is_loading();
        let (left, right, channel_count, sample_rate, file_name, extension) =
            self.store.with_read_lock(|buffer| {
                let left: Vec<f32> = buffer.frames().iter().map(|f| f.left).collect();
                let right: Vec<f32> = if buffer.channel_count() > 1 {
                    buffer.frames().iter().map(|f| f.right).collect()
                } else {
                    left.clone()
                };
                (
                    left,
                    right,
                    buffer.channel_count(),
                    buffer.sample_rate(),
                    buffer.file_name().to_string(),
                    buffer.extension().to_string(),
                )
            });

        InspectorSnapshot {
            file_name,
            extension,
            channel_count,
            sample_rate,
            loading,
            left,
            right,
            status: self.status.snapshot(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(total: usize, status: StatusSnapshot) -> InspectorSnapshot {
        let left: Vec<f32> = (0..total).map(|i| (i as f32 / total as f32) * 2.0 - 1.0).collect();
        InspectorSnapshot {
            file_name: "ramp".to_string(),
            extension: "wav".to_string(),
            channel_count: 1,
            sample_rate: 44100,
            loading: false,
            right: left.clone(),
            left,
            status,
        }
    }

    fn status(trig_mode: TrigMode, slice_count: usize, slice_length: usize) -> StatusSnapshot {
        StatusSnapshot {
            playing: false,
            trig_mode,
            read_mode: ReadMode::Forward,
            slice_count,
            slice_length,
            slice_index: None,
            speed: 1.0,
            position: 0.0,
        }
    }

    #[test]
    fn test_peaks() {
        let samples = [0.0, 0.5, -0.5, 1.0, -1.0, 0.25];
        let p = peaks(&samples, 3);
        assert_eq!(
            p,
            vec![
                Peak { min: 0.0, max: 0.5 },
                Peak { min: -0.5, max: 1.0 },
                Peak { min: -1.0, max: 0.25 },
            ]
        );
        assert_eq!(peaks(&samples, 100).len(), 6);
        assert!(peaks(&[], 10).is_empty());
    }

    #[test]
    fn test_slice_boundaries() {
        let snap = snapshot(10, status(TrigMode::Slice, 3, 3));
        assert_eq!(snap.slice_boundaries(), vec![3, 6]);

        // More slices than frames never reports boundaries past the end.
        let snap = snapshot(4, status(TrigMode::Slice, 128, 1));
        assert_eq!(snap.slice_boundaries(), vec![1, 2, 3]);

        let snap = snapshot(10, status(TrigMode::OneShot, 3, 3));
        assert!(snap.slice_boundaries().is_empty());
    }

    #[test]
    fn test_status_publish_round_trip() {
        let mut cursor = PlaybackCursor::new();
        cursor.set_trig_mode(TrigMode::Slice);
        cursor.set_read_mode(ReadMode::Backward);
        cursor.retune(4, 2.5, 100);
        cursor.trigger_slice(None, 100);

        let status = EngineStatus::new();
        assert_eq!(status.snapshot().slice_index, None);
        status.publish(&cursor);
        let snap = status.snapshot();
        assert!(snap.playing);
        assert_eq!(snap.trig_mode, TrigMode::Slice);
        assert_eq!(snap.read_mode, ReadMode::Backward);
        assert_eq!(snap.slice_count, 4);
        assert_eq!(snap.slice_length, 25);
        assert_eq!(snap.slice_index, Some(0));
        assert_eq!(snap.speed, 2.5);
        assert_eq!(snap.position, 24.0);
    }

    #[test]
    fn test_overview_layout() {
        let mut st = status(TrigMode::Slice, 2, 5);
        st.playing = true;
        st.position = 0.0;
        let text = snapshot(10, st).overview(10);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("ramp.wav SLICE > |2|"));
        assert_eq!(lines[1].chars().count(), 10);
        assert_eq!(lines[3].chars().nth(0), Some('^'));
        assert_eq!(lines[3].chars().nth(5), Some('|'));
    }
}
