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

//! Edge detection and pulse generation for control signals.

/// Detects rising edges with hysteresis. The trigger arms once the input reaches the high
/// threshold and disarms only after the input falls back to the low threshold, so a noisy
/// signal hovering near one threshold produces a single edge.
#[derive(Clone, Copy, Debug, Default)]
pub struct SchmittTrigger {
    high: bool,
}

impl SchmittTrigger {
    const LOW: f32 = 0.0;
    const HIGH: f32 = 1.0;

    pub fn new() -> SchmittTrigger {
        SchmittTrigger::default()
    }

    /// Feeds one input value. Returns true on the tick the input crosses the high threshold.
    pub fn process(&mut self, input: f32) -> bool {
        if self.high {
            if input <= Self::LOW {
                self.high = false;
            }
            false
        } else if input >= Self::HIGH {
            self.high = true;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn is_high(&self) -> bool {
        self.high
    }
}

/// A fixed-duration pulse that decays in real time.
#[derive(Clone, Copy, Debug, Default)]
pub struct PulseGenerator {
    remaining: f32,
}

impl PulseGenerator {
    pub fn new() -> PulseGenerator {
        PulseGenerator::default()
    }

    /// Starts a pulse of `duration` seconds. A pulse already running is extended, never
    /// shortened.
    pub fn trigger(&mut self, duration: f32) {
        if duration > self.remaining {
            self.remaining = duration;
        }
    }

    /// Advances time by `delta` seconds. Returns true if the pulse was high for this tick.
    pub fn process(&mut self, delta: f32) -> bool {
        if self.remaining > 0.0 {
            self.remaining -= delta;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.remaining = 0.0;
    }
}
