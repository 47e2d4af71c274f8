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

//! The per-tick playback engine.
//!
//! [`Engine::tick`] runs once per output frame on the audio thread. It never allocates, never
//! logs and takes the store lock at most once, for the two frames it interpolates between.

use std::sync::Arc;

use super::cursor::{PlaybackCursor, ReadMode, TrigMode};
use super::inspector::EngineStatus;
use super::loader::{LoaderHandle, Reload};
use super::store::SampleStore;
use super::trigger::{PulseGenerator, SchmittTrigger};
use crate::audio::frame::lerp;
use crate::controls::{Controls, Outputs, END_OF_CYCLE_PULSE, OUTPUT_FULL_SCALE, PULSE_VOLTAGE};

/// Host timing for one tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickArgs {
    pub sample_rate: u32,
    /// Seconds per tick.
    pub sample_time: f32,
}

impl TickArgs {
    pub fn new(sample_rate: u32) -> TickArgs {
        TickArgs {
            sample_rate,
            sample_time: 1.0 / sample_rate.max(1) as f32,
        }
    }
}

/// Plays the sample in the store according to the controls.
pub struct Engine {
    store: Arc<SampleStore>,
    loader: LoaderHandle,
    status: Arc<EngineStatus>,
    cursor: PlaybackCursor,

    play_trigger: SchmittTrigger,
    trig_mode_trigger: SchmittTrigger,
    read_mode_trigger: SchmittTrigger,
    reset_trigger: SchmittTrigger,

    /// Playing state at the end of the previous tick, for end-of-cycle detection.
    was_playing: bool,
    end_of_cycle: PulseGenerator,
    /// Audio output of the previous tick, held while a load is in progress.
    held: Outputs,

    /// Loader generation the cursor was last reset for.
    generation: u64,
    sample_rate: u32,
}

impl Engine {
    pub fn new(store: Arc<SampleStore>, loader: LoaderHandle, status: Arc<EngineStatus>) -> Self {
        let generation = loader.generation();
        let sample_rate = loader.sample_rate();
        Engine {
            store,
            loader,
            status,
            cursor: PlaybackCursor::new(),
            play_trigger: SchmittTrigger::new(),
            trig_mode_trigger: SchmittTrigger::new(),
            read_mode_trigger: SchmittTrigger::new(),
            reset_trigger: SchmittTrigger::new(),
            was_playing: false,
            end_of_cycle: PulseGenerator::new(),
            held: Outputs::default(),
            generation,
            sample_rate,
        }
    }

    /// Sets both modes, as when restoring saved state.
    pub fn set_modes(&mut self, trig_mode: TrigMode, read_mode: ReadMode) {
        self.cursor.set_trig_mode(trig_mode);
        self.cursor.set_read_mode(read_mode);
        self.status.publish(&self.cursor);
    }

    pub fn cursor(&self) -> &PlaybackCursor {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut PlaybackCursor {
        &mut self.cursor
    }

    pub fn status(&self) -> Arc<EngineStatus> {
        self.status.clone()
    }

    /// Runs one frame.
    pub fn tick(&mut self, args: &TickArgs, controls: &Controls) -> Outputs {
        // A new sample was requested: start the slice sequence over.
        let generation = self.loader.generation();
        if generation != self.generation {
            self.generation = generation;
            self.cursor.clear_for_load();
        }

        // A busy loader leaves the rate unrecorded, so the change is retried next tick.
        if args.sample_rate != self.sample_rate
            && self.loader.reload_at(args.sample_rate) != Reload::Busy
        {
            self.sample_rate = args.sample_rate;
        }

        if self.loader.is_loading() {
            return Outputs {
                end_of_cycle: self.end_of_cycle_voltage(args.sample_time),
                ..self.held
            };
        }

        let total_frames = self.store.total_frames();
        self.update_modes(controls);
        self.cursor
            .retune(controls.slice_count(), controls.speed(), total_frames);

        let play_edge = self.play_trigger.process(controls.gate);
        match self.cursor.trig_mode() {
            TrigMode::OneShot if play_edge => {
                self.cursor.trigger_one_shot(controls.position, total_frames)
            }
            TrigMode::Gate => self.cursor.follow_gate(
                controls.gate_high(),
                controls.position_voltage(),
                total_frames,
            ),
            TrigMode::Slice if play_edge => {
                self.cursor.trigger_slice(controls.position, total_frames)
            }
            _ => {}
        }
        if self.reset_trigger.process(controls.reset) {
            self.cursor.reset();
        }

        let position = self.cursor.position();
        if self.cursor.is_playing() && !(position >= 0.0 && position < total_frames as f32) {
            self.cursor.set_playing(false);
        }

        let (left, right) = if self.cursor.is_playing() {
            self.read(position, controls.stereo_outputs)
                .unwrap_or((0.0, 0.0))
        } else {
            (0.0, 0.0)
        };
        self.cursor.advance(total_frames, controls.position);

        let playing = self.cursor.is_playing();
        if self.was_playing && !playing {
            self.end_of_cycle.reset();
            self.end_of_cycle.trigger(END_OF_CYCLE_PULSE);
        }
        self.was_playing = playing;

        self.held = Outputs {
            left,
            right,
            end_of_cycle: 0.0,
        };
        self.status.publish(&self.cursor);

        Outputs {
            left,
            right,
            end_of_cycle: self.end_of_cycle_voltage(args.sample_time),
        }
    }

    fn update_modes(&mut self, controls: &Controls) {
        if self
            .trig_mode_trigger
            .process(controls.trig_mode_button.round())
        {
            self.cursor.set_trig_mode(self.cursor.trig_mode().next());
        }

        match controls.read_mode_cv {
            Some(voltage) => self.cursor.set_read_mode(ReadMode::from_voltage(voltage)),
            None => {
                if self
                    .read_mode_trigger
                    .process(controls.read_mode_button.round())
                {
                    self.cursor.set_read_mode(self.cursor.read_mode().next());
                }
            }
        }
    }

    /// Reads the interpolated output at `position`, in volts. Returns None if the buffer
    /// changed underneath and the position is no longer valid.
    fn read(&self, position: f32, stereo_outputs: bool) -> Option<(f32, f32)> {
        let index = position as usize;
        let frac = position - index as f32;

        let (a, b, channel_count) = self.store.with_read_lock(|buffer| {
            let frames = buffer.frames();
            let a = *frames.get(index)?;
            let b = frames.get(index + 1).copied().unwrap_or(a);
            Some((a, b, buffer.channel_count()))
        })?;

        if channel_count < 2 {
            let out = OUTPUT_FULL_SCALE * lerp(a.left, b.left, frac);
            Some((out, out))
        } else if stereo_outputs {
            Some((
                OUTPUT_FULL_SCALE * lerp(a.left, b.left, frac),
                OUTPUT_FULL_SCALE * lerp(a.right, b.right, frac),
            ))
        } else {
            let out = OUTPUT_FULL_SCALE * lerp(a.mix(), b.mix(), frac);
            Some((out, out))
        }
    }

    fn end_of_cycle_voltage(&mut self, sample_time: f32) -> f32 {
        if self.end_of_cycle.process(sample_time) {
            PULSE_VOLTAGE
        } else {
            0.0
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("cursor", &self.cursor)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::audio::StereoFrame;
    use crate::samples::loader::{LoadRequest, Loader};
    use crate::samples::store::SampleBuffer;

    const RATE: u32 = 44100;

    struct Fixture {
        store: Arc<SampleStore>,
        // Keeps the loader thread alive for the engine's handle.
        loader: Loader,
        engine: Engine,
        args: TickArgs,
    }

    fn fixture(frames: Vec<StereoFrame>, channel_count: u16) -> Fixture {
        let store = Arc::new(SampleStore::new());
        drop(store.replace(SampleBuffer::new(frames, channel_count, RATE)));
        let loader = Loader::new(store.clone(), RATE).unwrap();
        let engine = Engine::new(store.clone(), loader.handle(), Arc::new(EngineStatus::new()));
        Fixture {
            store,
            loader,
            engine,
            args: TickArgs::new(RATE),
        }
    }

    /// Frames whose value is their own index, scaled down to stay in range.
    fn indexed(len: usize) -> Vec<StereoFrame> {
        (0..len).map(|i| StereoFrame::mono(i as f32 / 100.0)).collect()
    }

    fn gate_high() -> Controls {
        Controls {
            gate: 10.0,
            ..Default::default()
        }
    }

    /// Counts rising edges of the end-of-cycle output.
    fn pulse_edges(outputs: &[Outputs]) -> usize {
        let mut previous = 0.0;
        outputs
            .iter()
            .filter(|o| {
                let edge = o.end_of_cycle > 0.0 && previous == 0.0;
                previous = o.end_of_cycle;
                edge
            })
            .count()
    }

    #[test]
    fn test_forward_one_shot_plays_every_frame_once() {
        let n = 64;
        let mut f = fixture(indexed(n), 1);
        let controls = gate_high();

        let outputs: Vec<Outputs> = (0..n).map(|_| f.engine.tick(&f.args, &controls)).collect();
        assert!(!f.engine.cursor().is_playing());
        assert_eq!(pulse_edges(&outputs), 1);
        // The pulse fires on the tick playback stops.
        assert_eq!(outputs[n - 1].end_of_cycle, PULSE_VOLTAGE);
        assert_eq!(outputs[n - 2].end_of_cycle, 0.0);

        for (i, out) in outputs.iter().enumerate() {
            let expected = OUTPUT_FULL_SCALE * i as f32 / 100.0;
            assert!((out.left - expected).abs() < 1e-5, "frame {}", i);
            assert_eq!(out.left, out.right);
        }

        // The pulse decays after about a millisecond and is not retriggered.
        let mut all = outputs;
        all.extend((0..100).map(|_| f.engine.tick(&f.args, &controls)));
        assert_eq!(pulse_edges(&all), 1);
        assert_eq!(all.last(), Some(&Outputs::default()));
    }

    #[test]
    fn test_backward_one_shot_stops_at_start() {
        let n = 16;
        let mut f = fixture(indexed(n), 1);
        f.engine.set_modes(TrigMode::OneShot, ReadMode::Backward);
        let controls = gate_high();

        let first = f.engine.tick(&f.args, &controls);
        assert!((first.left - OUTPUT_FULL_SCALE * 0.15).abs() < 1e-5);

        let mut ticks = 1;
        while f.engine.cursor().is_playing() {
            f.engine.tick(&f.args, &controls);
            ticks += 1;
            assert!(ticks <= n, "never stopped");
        }
        assert_eq!(ticks, n - 1);
        assert!(f.engine.cursor().position() <= 0.0);
    }

    #[test]
    fn test_slice_scenario() {
        let mut f = fixture(indexed(10), 1);
        f.engine.set_modes(TrigMode::Slice, ReadMode::Forward);
        let high = Controls {
            gate: 10.0,
            slices: 2.0,
            ..Default::default()
        };
        let low = Controls {
            gate: 0.0,
            ..high.clone()
        };

        // Raises the gate once, then records frames until the slice ends.
        let played = |f: &mut Fixture| -> Vec<usize> {
            let mut frames = Vec::new();
            let mut controls = &high;
            loop {
                let out = f.engine.tick(&f.args, controls);
                controls = &low;
                frames.push((out.left / OUTPUT_FULL_SCALE * 100.0).round() as usize);
                if !f.engine.cursor().is_playing() || frames.len() > 10 {
                    break;
                }
            }
            frames
        };

        assert_eq!(played(&mut f), vec![0, 1, 2, 3, 4]);
        assert_eq!(f.engine.cursor().slice_index(), Some(0));
        assert_eq!(f.engine.cursor().slice_length(), 5);

        assert_eq!(played(&mut f), vec![5, 6, 7, 8, 9]);
        assert_eq!(f.engine.cursor().slice_index(), Some(1));
    }

    #[test]
    fn test_empty_buffer_never_plays() {
        let mut f = fixture(Vec::new(), 1);
        for mode in [TrigMode::OneShot, TrigMode::Gate, TrigMode::Slice] {
            f.engine.set_modes(mode, ReadMode::Forward);
            for tick in 0..32 {
                f.engine.cursor_mut().set_playing(true);
                let controls = Controls {
                    gate: if tick % 2 == 0 { 10.0 } else { 0.0 },
                    position: Some(5.0),
                    ..Default::default()
                };
                let out = f.engine.tick(&f.args, &controls);
                assert_eq!(out, Outputs::default());
                assert!(!f.engine.cursor().is_playing());
            }
        }
    }

    #[test]
    fn test_interpolates_between_frames() {
        let frames = vec![StereoFrame::mono(0.0), StereoFrame::mono(1.0)];
        let mut f = fixture(frames, 1);
        f.engine.set_modes(TrigMode::Gate, ReadMode::Forward);
        // 5V is halfway along a two-frame buffer.
        let controls = Controls {
            gate: 10.0,
            position: Some(5.0),
            ..Default::default()
        };
        let out = f.engine.tick(&f.args, &controls);
        assert!((f.engine.cursor().position() - 0.5).abs() < 1e-6);
        assert!((out.left - 0.5 * OUTPUT_FULL_SCALE).abs() < 1e-5);
        assert_eq!(out.left, out.right);
    }

    #[test]
    fn test_stereo_mixes_down_unless_both_outputs_connected() {
        let frames = vec![StereoFrame::new(1.0, 0.0); 8];
        let mut f = fixture(frames, 2);
        let stereo = gate_high();
        let out = f.engine.tick(&f.args, &stereo);
        assert_eq!((out.left, out.right), (OUTPUT_FULL_SCALE, 0.0));

        let mut f = fixture(vec![StereoFrame::new(1.0, 0.0); 8], 2);
        let mono = Controls {
            stereo_outputs: false,
            ..gate_high()
        };
        let out = f.engine.tick(&f.args, &mono);
        assert_eq!((out.left, out.right), (0.5 * OUTPUT_FULL_SCALE, 0.5 * OUTPUT_FULL_SCALE));
    }

    #[test]
    fn test_gate_mode_plays_while_high() {
        let mut f = fixture(vec![StereoFrame::mono(0.5); 32], 1);
        f.engine.set_modes(TrigMode::Gate, ReadMode::Forward);
        let mut controls = Controls {
            gate: 5.0,
            position: Some(2.0),
            ..Default::default()
        };
        for _ in 0..10 {
            let out = f.engine.tick(&f.args, &controls);
            assert_eq!(out.left, 0.5 * OUTPUT_FULL_SCALE);
        }
        // The play-head does not move on its own.
        assert!((f.engine.cursor().position() - 6.2).abs() < 1e-4);

        controls.gate = 0.0;
        let out = f.engine.tick(&f.args, &controls);
        assert_eq!(out.left, 0.0);
        assert_eq!(out.end_of_cycle, PULSE_VOLTAGE);
    }

    #[test]
    fn test_repeat_never_stops() {
        let mut f = fixture(indexed(8), 1);
        f.engine.set_modes(TrigMode::OneShot, ReadMode::Repeat);
        let controls = gate_high();
        let outputs: Vec<Outputs> = (0..100).map(|_| f.engine.tick(&f.args, &controls)).collect();
        assert!(f.engine.cursor().is_playing());
        assert_eq!(pulse_edges(&outputs), 0);
        // Wraps back to the start every 8 frames.
        assert!((outputs[8].left - outputs[0].left).abs() < 1e-6);
    }

    #[test]
    fn test_reset_edge_overrides_playback() {
        let mut f = fixture(indexed(40), 1);
        f.engine.set_modes(TrigMode::Slice, ReadMode::Forward);
        let mut controls = Controls {
            gate: 10.0,
            slices: 4.0,
            position: Some(10.0),
            ..Default::default()
        };
        f.engine.tick(&f.args, &controls);
        assert_eq!(f.engine.cursor().slice_index(), Some(3));

        controls.reset = 10.0;
        let out = f.engine.tick(&f.args, &controls);
        assert_eq!(f.engine.cursor().slice_index(), Some(0));
        assert_eq!(out.left, 0.0);
        assert_eq!(f.engine.cursor().position(), 1.0);
    }

    #[test]
    fn test_mode_buttons_cycle_on_press() {
        let mut f = fixture(indexed(8), 1);
        let mut controls = Controls::default();
        for expected in [TrigMode::Gate, TrigMode::Slice, TrigMode::OneShot] {
            controls.trig_mode_button = 1.0;
            f.engine.tick(&f.args, &controls);
            f.engine.tick(&f.args, &controls);
            assert_eq!(f.engine.cursor().trig_mode(), expected);
            controls.trig_mode_button = 0.0;
            f.engine.tick(&f.args, &controls);
        }

        controls.read_mode_button = 1.0;
        f.engine.tick(&f.args, &controls);
        assert_eq!(f.engine.cursor().read_mode(), ReadMode::Backward);

        // A connected read-mode input takes over from the button.
        controls.read_mode_cv = Some(10.0);
        f.engine.tick(&f.args, &controls);
        assert_eq!(f.engine.cursor().read_mode(), ReadMode::Repeat);
    }

    #[test]
    fn test_load_resets_slice_sequence() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("next.wav");
        crate::testutil::write_wav(path.clone(), vec![vec![0.25f32; 20]], RATE).unwrap();

        let mut f = fixture(indexed(10), 1);
        f.engine.set_modes(TrigMode::Slice, ReadMode::Forward);
        let high = Controls {
            gate: 10.0,
            slices: 2.0,
            ..Default::default()
        };
        f.engine.tick(&f.args, &high);
        assert_eq!(f.engine.cursor().slice_index(), Some(0));

        f.loader.load(&path);
        f.engine.tick(&f.args, &high);
        assert_eq!(f.engine.cursor().slice_index(), None);
        assert!(f.loader.wait_idle(Duration::from_secs(10)));
        assert_eq!(f.store.total_frames(), 20);

        let low = Controls {
            gate: 0.0,
            ..high.clone()
        };
        f.engine.tick(&f.args, &low);
        let out = f.engine.tick(&f.args, &high);
        assert_eq!(f.engine.cursor().slice_index(), Some(0));
        assert!((out.left - 0.25 * OUTPUT_FULL_SCALE).abs() < 1e-5);
    }

    #[test]
    fn test_sample_rate_change_reloads() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("rate.wav");
        crate::testutil::write_wav(path.clone(), vec![vec![0.1f32; 100]], RATE).unwrap();

        let mut f = fixture(Vec::new(), 1);
        f.loader.load(&path);
        assert!(f.loader.wait_idle(Duration::from_secs(10)));
        assert_eq!(f.store.total_frames(), 100);

        f.engine.tick(&TickArgs::new(2 * RATE), &Controls::default());
        assert_eq!(f.loader.sample_rate(), 2 * RATE);
        assert!(f.loader.wait_idle(Duration::from_secs(10)));
        assert_eq!(f.store.total_frames(), 200);
    }

    /// An engine whose loader never processes anything, so a load stays pending.
    fn stalled(
        frames: Vec<StereoFrame>,
    ) -> (
        LoaderHandle,
        crossbeam_channel::Receiver<LoadRequest>,
        Engine,
    ) {
        let store = Arc::new(SampleStore::new());
        drop(store.replace(SampleBuffer::new(frames, 1, RATE)));
        let (handle, queue) = LoaderHandle::detached(store.clone(), RATE, 4);
        let engine = Engine::new(store, handle.clone(), Arc::new(EngineStatus::new()));
        (handle, queue, engine)
    }

    #[test]
    fn test_no_new_playback_while_loading() {
        let (handle, _queue, mut engine) = stalled(indexed(10));
        let args = TickArgs::new(RATE);
        engine.tick(&args, &Controls::default());

        assert!(handle.load("next.wav"));
        assert!(handle.is_loading());
        for _ in 0..3 {
            let out = engine.tick(&args, &gate_high());
            assert_eq!(out, Outputs::default());
            assert!(!engine.cursor().is_playing());
            engine.tick(&args, &Controls::default());
        }
    }

    #[test]
    fn test_holds_last_output_while_loading() {
        let (handle, _queue, mut engine) = stalled(indexed(10));
        let args = TickArgs::new(RATE);
        let controls = Controls {
            gate: 10.0,
            position: Some(5.0),
            ..Default::default()
        };
        engine.set_modes(TrigMode::Gate, ReadMode::Forward);
        let before = engine.tick(&args, &controls);
        assert!(before.left > 0.0);

        assert!(handle.load("next.wav"));
        let idle = Controls {
            gate: 0.0,
            position: Some(0.0),
            ..Default::default()
        };
        for c in [&idle, &controls, &idle] {
            let out = engine.tick(&args, c);
            assert_eq!(out.left, before.left);
            assert_eq!(out.right, before.right);
        }
        assert_eq!(engine.cursor().position(), 0.0);
    }

    #[test]
    fn test_rate_change_retried_when_loader_busy() {
        let (handle, queue, mut engine) = stalled(indexed(10));
        // Something to reload, and no room left to queue the reload.
        for _ in 0..4 {
            assert!(handle.load("next.wav"));
        }

        let doubled = TickArgs::new(2 * RATE);
        engine.tick(&doubled, &Controls::default());
        assert_eq!(handle.sample_rate(), RATE);

        // The next tick after the queue drains picks the change up.
        while queue.try_recv().is_ok() {}
        engine.tick(&doubled, &Controls::default());
        assert_eq!(handle.sample_rate(), 2 * RATE);
        assert!(matches!(queue.try_recv(), Ok(LoadRequest::Reload)));
    }
}
