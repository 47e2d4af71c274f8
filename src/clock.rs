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

//! A sample-accurate gate clock for driving the engine's trigger input.

use std::time::Duration;

use crate::controls::{Controls, Outputs, PULSE_VOLTAGE};
use crate::samples::{Engine, TickArgs};

/// Emits a gate of `gate_length` every `interval`, counted in frames. The first gate starts
/// on the first frame.
#[derive(Clone, Debug)]
pub struct TriggerClock {
    interval: Duration,
    gate_length: Duration,
    interval_frames: u64,
    gate_frames: u64,
    frame: u64,
}

impl TriggerClock {
    /// A zero interval gives a clock that never fires.
    pub fn new(interval: Duration, gate_length: Duration, sample_rate: u32) -> TriggerClock {
        let mut clock = TriggerClock {
            interval,
            gate_length,
            interval_frames: 0,
            gate_frames: 0,
            frame: 0,
        };
        clock.set_sample_rate(sample_rate);
        clock
    }

    /// Recomputes frame counts for a new sample rate. The phase restarts.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        let to_frames = |d: Duration| (d.as_secs_f64() * sample_rate as f64).round() as u64;
        self.interval_frames = to_frames(self.interval);
        // At least one frame high, and at least one frame low between gates.
        self.gate_frames = to_frames(self.gate_length)
            .max(1)
            .min(self.interval_frames.saturating_sub(1).max(1));
        self.frame = 0;
    }

    /// The gate voltage for the next frame.
    pub fn next_voltage(&mut self) -> f32 {
        if self.interval_frames == 0 {
            return 0.0;
        }
        let high = self.frame < self.gate_frames;
        self.frame = (self.frame + 1) % self.interval_frames;
        if high {
            PULSE_VOLTAGE
        } else {
            0.0
        }
    }
}

/// An engine whose trigger input is driven by a [`TriggerClock`], with every other control
/// held at fixed values. This is what the output hosts run.
#[derive(Debug)]
pub struct ClockedEngine {
    engine: Engine,
    clock: TriggerClock,
    controls: Controls,
    args: TickArgs,
}

impl ClockedEngine {
    pub fn new(engine: Engine, clock: TriggerClock, controls: Controls, sample_rate: u32) -> Self {
        ClockedEngine {
            engine,
            clock,
            controls,
            args: TickArgs::new(sample_rate),
        }
    }

    /// Follows a host sample rate change. The engine sees the new rate on its next tick.
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        if sample_rate != self.args.sample_rate {
            self.args = TickArgs::new(sample_rate);
            self.clock.set_sample_rate(sample_rate);
        }
    }

    /// Runs the engine for one frame.
    pub fn next_frame(&mut self) -> Outputs {
        self.controls.gate = self.clock.next_voltage();
        self.engine.tick(&self.args, &self.controls)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn controls_mut(&mut self) -> &mut Controls {
        &mut self.controls
    }
}
