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

//! The engine's control surface: the scalar inputs read each tick and the outputs written.
//!
//! Inputs follow modular voltage conventions: triggers and gates are 0-10V, the position
//! input spans the buffer over 0-10V. An input that is not connected is `None`, which
//! changes behavior for the position and read-mode inputs.

use crate::samples::cursor::MAX_SLICES;

/// A gate is high above this voltage.
pub const GATE_THRESHOLD: f32 = 0.1;

pub const MIN_SPEED: f32 = 0.2;
pub const MAX_SPEED: f32 = 10.0;

/// Output voltage for a full-scale sample.
pub const OUTPUT_FULL_SCALE: f32 = 5.0;

/// End-of-cycle pulse height and width.
pub const PULSE_VOLTAGE: f32 = 10.0;
pub const END_OF_CYCLE_PULSE: f32 = 1e-3;

/// Inputs for a single tick.
#[derive(Clone, Debug, PartialEq)]
pub struct Controls {
    /// Trigger (one-shot, slice) or gate input.
    pub gate: f32,
    /// Position input, if connected.
    pub position: Option<f32>,
    /// Trigger-mode button. Each press cycles the mode.
    pub trig_mode_button: f32,
    /// Read-mode button. Each press cycles the mode when the read-mode input is unconnected.
    pub read_mode_button: f32,
    /// Read-mode select input, if connected. Overrides the button.
    pub read_mode_cv: Option<f32>,
    pub slices: f32,
    pub slices_cv_amount: f32,
    pub slices_cv: f32,
    pub speed: f32,
    pub speed_cv_amount: f32,
    pub speed_cv: f32,
    /// Position reset trigger.
    pub reset: f32,
    /// True when both audio outputs are in use, so stereo material stays stereo.
    pub stereo_outputs: bool,
}

impl Default for Controls {
    fn default() -> Self {
        Controls {
            gate: 0.0,
            position: None,
            trig_mode_button: 0.0,
            read_mode_button: 0.0,
            read_mode_cv: None,
            slices: 1.0,
            slices_cv_amount: 0.0,
            slices_cv: 0.0,
            speed: 1.0,
            speed_cv_amount: 0.0,
            speed_cv: 0.0,
            reset: 0.0,
            stereo_outputs: true,
        }
    }
}

impl Controls {
    /// The slice count after CV, rounded and clamped to 1..=128.
    pub fn slice_count(&self) -> usize {
        let slices = (self.slices + self.slices_cv_amount * self.slices_cv).round();
        // NaN falls through to 1.
        if slices >= MAX_SLICES as f32 {
            MAX_SLICES
        } else if slices >= 1.0 {
            slices as usize
        } else {
            1
        }
    }

    /// The playback speed after CV, clamped to [0.2, 10].
    pub fn speed(&self) -> f32 {
        (self.speed + self.speed_cv_amount * self.speed_cv).clamp(MIN_SPEED, MAX_SPEED)
    }

    /// True if the gate input is above the gate threshold.
    pub fn gate_high(&self) -> bool {
        self.gate > GATE_THRESHOLD
    }

    /// The position voltage, reading an unconnected input as 0V.
    pub fn position_voltage(&self) -> f32 {
        self.position.unwrap_or(0.0)
    }
}

/// Outputs of a single tick, in volts.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Outputs {
    pub left: f32,
    pub right: f32,
    pub end_of_cycle: f32,
}
