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

//! The playback cursor and its trigger/read mode state machine.
//!
//! The cursor owns everything about *where* playback is: the fractional play-head, the active
//! slice and the play/stop state. It knows nothing about the sample data itself, only the
//! frame count it is told about each tick, so the whole boundary policy can be exercised
//! without a buffer.

use std::fmt;
use std::str::FromStr;

/// Highest slice count the slicer supports.
pub const MAX_SLICES: usize = 128;

/// Returned when a mode index or name does not name a mode.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid {kind} mode: {value}")]
pub struct InvalidMode {
    kind: &'static str,
    value: String,
}

/// How playback is started and stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TrigMode {
    /// A rising edge plays the buffer once.
    #[default]
    OneShot,
    /// Plays while the gate is high, with the play-head following the position input.
    Gate,
    /// A rising edge plays the next slice once.
    Slice,
}

impl TrigMode {
    /// The mode the trigger-mode button advances to.
    pub fn next(self) -> TrigMode {
        match self {
            TrigMode::OneShot => TrigMode::Gate,
            TrigMode::Gate => TrigMode::Slice,
            TrigMode::Slice => TrigMode::OneShot,
        }
    }

    /// The persisted index of the mode.
    pub fn index(self) -> i64 {
        match self {
            TrigMode::OneShot => 0,
            TrigMode::Gate => 1,
            TrigMode::Slice => 2,
        }
    }
}

impl TryFrom<i64> for TrigMode {
    type Error = InvalidMode;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TrigMode::OneShot),
            1 => Ok(TrigMode::Gate),
            2 => Ok(TrigMode::Slice),
            _ => Err(InvalidMode {
                kind: "trigger",
                value: value.to_string(),
            }),
        }
    }
}

impl FromStr for TrigMode {
    type Err = InvalidMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oneshot" | "one-shot" | "trig" | "0" => Ok(TrigMode::OneShot),
            "gate" | "1" => Ok(TrigMode::Gate),
            "slice" | "2" => Ok(TrigMode::Slice),
            _ => Err(InvalidMode {
                kind: "trigger",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for TrigMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TrigMode::OneShot => "TRIG",
            TrigMode::Gate => "GATE",
            TrigMode::Slice => "SLICE",
        })
    }
}

/// Direction of travel and what happens at the end of the range.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReadMode {
    #[default]
    Forward,
    Backward,
    /// Forward, restarting at the start of the range instead of stopping.
    Repeat,
}

impl ReadMode {
    /// The mode the read-mode button advances to.
    pub fn next(self) -> ReadMode {
        match self {
            ReadMode::Forward => ReadMode::Backward,
            ReadMode::Backward => ReadMode::Repeat,
            ReadMode::Repeat => ReadMode::Forward,
        }
    }

    pub fn index(self) -> i64 {
        match self {
            ReadMode::Forward => 0,
            ReadMode::Backward => 1,
            ReadMode::Repeat => 2,
        }
    }

    /// Selects a mode from a 0-10V control voltage: 0V is forward, 5V backward, 10V repeat.
    pub fn from_voltage(voltage: f32) -> ReadMode {
        match (voltage * 0.2).round() as i64 {
            i64::MIN..=0 => ReadMode::Forward,
            1 => ReadMode::Backward,
            _ => ReadMode::Repeat,
        }
    }
}

impl TryFrom<i64> for ReadMode {
    type Error = InvalidMode;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ReadMode::Forward),
            1 => Ok(ReadMode::Backward),
            2 => Ok(ReadMode::Repeat),
            _ => Err(InvalidMode {
                kind: "read",
                value: value.to_string(),
            }),
        }
    }
}

impl FromStr for ReadMode {
    type Err = InvalidMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" | "fwd" | "0" => Ok(ReadMode::Forward),
            "backward" | "reverse" | "rev" | "1" => Ok(ReadMode::Backward),
            "repeat" | "loop" | "2" => Ok(ReadMode::Repeat),
            _ => Err(InvalidMode {
                kind: "read",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ReadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReadMode::Forward => ">",
            ReadMode::Backward => "<",
            ReadMode::Repeat => ">>",
        })
    }
}

/// What happened to the cursor on an advance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Boundary {
    /// Still inside the active range.
    Continue,
    /// Left the active range and stopped.
    Stop,
    /// Left the active range and jumped back to the given position.
    Restart(f32),
}

/// Maps a 0-10V position voltage onto a frame position in `[0, total_frames - 1]`.
pub fn position_from_voltage(voltage: f32, total_frames: usize) -> f32 {
    let last = total_frames as f32 - 1.0;
    // The low bound wins for an empty buffer.
    (voltage * last * 0.1).min(last).max(0.0)
}

/// Playback position and mode state.
#[derive(Clone, Debug)]
pub struct PlaybackCursor {
    playing: bool,
    trig_mode: TrigMode,
    read_mode: ReadMode,
    position: f32,
    /// None until the first slice trigger after a load.
    slice_index: Option<usize>,
    slice_count: usize,
    slice_length: usize,
    speed: f32,
}

impl Default for PlaybackCursor {
    fn default() -> Self {
        PlaybackCursor::new()
    }
}

impl PlaybackCursor {
    pub fn new() -> PlaybackCursor {
        PlaybackCursor {
            playing: false,
            trig_mode: TrigMode::default(),
            read_mode: ReadMode::default(),
            position: 0.0,
            slice_index: None,
            slice_count: 1,
            slice_length: 1,
            speed: 1.0,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn trig_mode(&self) -> TrigMode {
        self.trig_mode
    }

    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn slice_index(&self) -> Option<usize> {
        self.slice_index
    }

    pub fn slice_count(&self) -> usize {
        self.slice_count
    }

    pub fn slice_length(&self) -> usize {
        self.slice_length
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn set_trig_mode(&mut self, mode: TrigMode) {
        self.trig_mode = mode;
    }

    pub fn set_read_mode(&mut self, mode: ReadMode) {
        self.read_mode = mode;
    }

    /// Forces the play-head. Used by hosts that drive the position directly.
    pub fn set_position(&mut self, position: f32) {
        self.position = position;
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.playing = playing;
    }

    /// Recomputes the slice layout and speed for a buffer of `total_frames`. The slice
    /// length is at least one frame and at most the whole buffer, and the current slice is
    /// pulled back inside the new slice count.
    pub fn retune(&mut self, slice_count: usize, speed: f32, total_frames: usize) {
        self.slice_count = slice_count.clamp(1, MAX_SLICES);
        self.slice_length = (total_frames / self.slice_count).min(total_frames).max(1);
        self.speed = speed;
        if let Some(index) = self.slice_index {
            self.slice_index = Some(index.min(self.slice_count - 1));
        }
    }

    /// Starts a one-shot from the position input if it is connected, otherwise from the
    /// start of the buffer (or its last frame when reading backward).
    pub fn trigger_one_shot(&mut self, position_voltage: Option<f32>, total_frames: usize) {
        self.playing = true;
        self.position = match position_voltage {
            Some(voltage) => position_from_voltage(voltage, total_frames),
            None if self.read_mode == ReadMode::Backward => {
                (total_frames as f32 - 1.0).max(0.0)
            }
            None => 0.0,
        };
    }

    /// Gate mode: plays while the gate is high, with the play-head pinned to the position
    /// input every tick.
    pub fn follow_gate(&mut self, gate_high: bool, position_voltage: f32, total_frames: usize) {
        self.playing = gate_high;
        self.position = position_from_voltage(position_voltage, total_frames);
    }

    /// Selects and starts a slice. With a position voltage the slice is chosen directly from
    /// 0-10V across the slice count, otherwise the next slice in turn is played.
    pub fn trigger_slice(&mut self, position_voltage: Option<f32>, total_frames: usize) {
        let count = self.slice_count;
        let index = match (position_voltage, self.slice_index) {
            (Some(voltage), _) => {
                ((voltage * count as f32 * 0.1) as i64).clamp(0, count as i64 - 1) as usize
            }
            (None, Some(index)) => (index + 1) % count,
            (None, None) => 0,
        };
        self.slice_index = Some(index);
        self.playing = true;

        let start = match self.read_mode {
            ReadMode::Forward | ReadMode::Repeat => index * self.slice_length,
            ReadMode::Backward => ((index + 1) * self.slice_length).saturating_sub(1),
        };
        self.position = clamp_to_buffer(start as f32, total_frames);
    }

    /// Reset edge: back to the first slice at the start of the buffer.
    pub fn reset(&mut self) {
        self.slice_index = Some(0);
        self.position = 0.0;
    }

    /// Called when a new sample is requested: the slice sequence starts over and the
    /// play-head returns to the start.
    pub fn clear_for_load(&mut self) {
        self.slice_index = None;
        self.position = 0.0;
    }

    /// The frame range playback is confined to: the current slice in slice mode, otherwise
    /// the whole buffer. The end is exclusive.
    pub fn active_range(&self, total_frames: usize) -> (usize, usize) {
        match self.trig_mode {
            TrigMode::Slice => {
                let index = self.slice_index.unwrap_or(0);
                let start = (index * self.slice_length).min(total_frames);
                let end = ((index + 1) * self.slice_length).min(total_frames);
                (start, end)
            }
            TrigMode::OneShot | TrigMode::Gate => (0, total_frames),
        }
    }

    /// Steps the play-head by one tick and applies the end-of-range policy. Gate mode does
    /// not advance on its own. `restart_voltage` is the position input, used when a
    /// one-shot in repeat mode wraps.
    pub fn advance(&mut self, total_frames: usize, restart_voltage: Option<f32>) -> Boundary {
        if !self.playing || self.trig_mode == TrigMode::Gate {
            return Boundary::Continue;
        }

        match self.read_mode {
            ReadMode::Forward | ReadMode::Repeat => self.position += self.speed,
            ReadMode::Backward => self.position -= self.speed,
        }

        let (start, end) = self.active_range(total_frames);
        let boundary = match (self.trig_mode, self.read_mode) {
            (_, ReadMode::Forward) if self.position >= end as f32 => Boundary::Stop,
            (_, ReadMode::Backward) if self.position <= start as f32 => Boundary::Stop,
            (TrigMode::Slice, ReadMode::Repeat) if self.position >= end as f32 => {
                Boundary::Restart(clamp_to_buffer(start as f32, total_frames))
            }
            (_, ReadMode::Repeat) if self.position >= end as f32 => Boundary::Restart(
                position_from_voltage(restart_voltage.unwrap_or(0.0), total_frames),
            ),
            _ => Boundary::Continue,
        };

        match boundary {
            Boundary::Stop => self.playing = false,
            Boundary::Restart(position) => self.position = position,
            Boundary::Continue => {}
        }
        boundary
    }
}

/// Clamps a frame position into `[0, total_frames - 1]`, with 0 winning for an empty buffer.
fn clamp_to_buffer(position: f32, total_frames: usize) -> f32 {
    position.min(total_frames as f32 - 1.0).max(0.0)
}
