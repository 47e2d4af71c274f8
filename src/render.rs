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

//! Offline rendering of the engine output to a WAV file.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use hound::{SampleFormat, WavSpec, WavWriter};
use tracing::info;

use crate::clock::ClockedEngine;
use crate::controls::OUTPUT_FULL_SCALE;

/// What a render produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RenderSummary {
    pub frames: usize,
    /// Number of end-of-cycle pulses emitted.
    pub cycles: usize,
    /// Largest absolute output, in volts.
    pub peak: f32,
}

/// Runs `clocked` for `frames` frames and writes the audio outputs as a 32-bit float stereo
/// WAV, with the output full scale mapped back to 1.0.
pub fn render(
    clocked: &mut ClockedEngine,
    out: &Path,
    sample_rate: u32,
    frames: usize,
) -> Result<RenderSummary, hound::Error> {
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::new(BufWriter::new(File::create(out)?), spec)?;

    let mut summary = RenderSummary {
        frames,
        ..Default::default()
    };
    let mut pulse_high = false;
    for _ in 0..frames {
        let outputs = clocked.next_frame();
        writer.write_sample(outputs.left / OUTPUT_FULL_SCALE)?;
        writer.write_sample(outputs.right / OUTPUT_FULL_SCALE)?;

        summary.peak = summary.peak.max(outputs.left.abs()).max(outputs.right.abs());
        let high = outputs.end_of_cycle > 0.0;
        if high && !pulse_high {
            summary.cycles += 1;
        }
        pulse_high = high;
    }
    writer.finalize()?;

    info!(
        path = ?out,
        frames = summary.frames,
        cycles = summary.cycles,
        peak = summary.peak,
        "Rendered"
    );
    Ok(summary)
}
