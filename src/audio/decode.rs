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

//! Whole-file decoding into stereo frames.
//!
//! Uses symphonia to decode WAV, FLAC, MP3, Ogg and the other formats it supports, then
//! converts the result to the target sample rate so the engine can play it one frame per tick.

use std::fs::File;
use std::path::Path;

use rubato::{
    SincFixedIn, SincInterpolationParameters, SincInterpolationType, VecResampler, WindowFunction,
};
use symphonia::core::audio::SampleBuffer as InterleavedBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::default::{get_codecs, get_probe};

use super::error::DecodeError;
use super::frame::StereoFrame;

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

/// The result of decoding a file.
#[derive(Clone, Debug, Default)]
pub struct DecodedSample {
    /// Frames at the target sample rate.
    pub frames: Vec<StereoFrame>,
    /// The file stem, for display.
    pub file_name: String,
    /// The file extension, for display.
    pub extension: String,
    /// 1 for mono sources, 2 for anything wider.
    pub channel_count: u16,
    /// The sample rate the file was encoded at.
    pub source_sample_rate: u32,
}

impl DecodedSample {
    pub fn total_frames(&self) -> usize {
        self.frames.len()
    }
}

/// Decodes the file at `path` and converts it to `target_sample_rate`. A target of 0 keeps
/// the file's own rate.
pub fn decode(path: &Path, target_sample_rate: u32) -> Result<DecodedSample, DecodeError> {
    let display = path.display().to_string();
    let file = File::open(path).map_err(|e| {
        DecodeError::IoError(std::io::Error::new(e.kind(), format!("{}: {}", display, e)))
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format_reader = probed.format;

    let track = format_reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::NoAudioTrack(display.clone()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();
    let source_sample_rate = params
        .sample_rate
        .ok_or_else(|| DecodeError::UnknownSampleRate(display.clone()))?;

    let mut decoder = get_codecs().make(&params, &DecoderOptions::default())?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut channels = params.channels.map(|c| c.count()).unwrap_or(0);
    while let Some((samples, decoded_channels)) =
        read_and_decode_next_packet(format_reader.as_mut(), decoder.as_mut(), track_id)?
    {
        channels = decoded_channels;
        interleaved.extend_from_slice(&samples);
    }

    let frames = to_stereo_frames(&interleaved, channels);
    let frames = if target_sample_rate == 0 || target_sample_rate == source_sample_rate {
        frames
    } else {
        resample(&frames, source_sample_rate, target_sample_rate)?
    };

    Ok(DecodedSample {
        frames,
        file_name: path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
        extension: path
            .extension()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default(),
        channel_count: if channels <= 1 { 1 } else { 2 },
        source_sample_rate,
    })
}

/// Reads the next packet. End of stream comes back as `Ok(None)`; some decoders report it as
/// a decode error rather than an unexpected EOF.
fn read_next_packet(format_reader: &mut dyn FormatReader) -> Result<Option<Packet>, DecodeError> {
    match format_reader.next_packet() {
        Ok(packet) => Ok(Some(packet)),
        Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            Ok(None)
        }
        Err(SymphoniaError::DecodeError(_)) => Ok(None),
        Err(e) => Err(DecodeError::AudioError(e)),
    }
}

/// Reads and decodes packets until one for `track_id` yields audio. Returns the interleaved
/// samples and the channel count observed in the decoded buffer.
fn read_and_decode_next_packet(
    format_reader: &mut dyn FormatReader,
    decoder: &mut dyn Decoder,
    track_id: u32,
) -> Result<Option<(Vec<f32>, usize)>, DecodeError> {
    loop {
        let packet = match read_next_packet(format_reader) {
            Ok(Some(packet)) => packet,
            Ok(None) => return Ok(None),
            Err(DecodeError::AudioError(SymphoniaError::ResetRequired)) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(e),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                decoder.decode(&packet)?
            }
            // A corrupt packet is skipped rather than failing the whole file.
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(DecodeError::AudioError(e)),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count();
        if decoded.frames() == 0 || channels == 0 {
            continue;
        }
        let mut buffer = InterleavedBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        return Ok(Some((buffer.samples().to_vec(), channels)));
    }
}

/// Folds interleaved samples into stereo frames. Mono is duplicated, anything wider than
/// stereo keeps its first two channels.
fn to_stereo_frames(samples: &[f32], channels: usize) -> Vec<StereoFrame> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().map(|&s| StereoFrame::mono(s)).collect(),
        n => samples
            .chunks_exact(n)
            .map(|c| StereoFrame::new(c[0], c[1]))
            .collect(),
    }
}

/// Converts between sample rates with a band-limited sinc resampler. The output is trimmed
/// of the resampler's delay, so frame `n` of the output lines up with time `n / target_rate`.
fn resample(
    frames: &[StereoFrame],
    source_rate: u32,
    target_rate: u32,
) -> Result<Vec<StereoFrame>, DecodeError> {
    if frames.is_empty() {
        return Ok(Vec::new());
    }

    let failed = || DecodeError::ResamplingFailed(source_rate, target_rate);
    let sinc_params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        oversampling_factor: 128,
        interpolation: SincInterpolationType::Linear,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = target_rate as f64 / source_rate as f64;
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.0, sinc_params, INPUT_BLOCK_SIZE, 2)
        .map_err(|_e| failed())?;

    let planar: Vec<Vec<f32>> = vec![
        frames.iter().map(|f| f.left).collect(),
        frames.iter().map(|f| f.right).collect(),
    ];
    let target_frames = (frames.len() as f64 * ratio).ceil() as usize;
    let delay = resampler.output_delay();
    let wanted = delay + target_frames;

    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); 2];
    let mut scratch = resampler.output_buffer_allocate(true);
    let mut chunk: Vec<Vec<f32>> = vec![Vec::with_capacity(INPUT_BLOCK_SIZE); 2];
    let mut read_pos = 0;

    // Full blocks first.
    loop {
        let needed = resampler.input_frames_next();
        if frames.len() - read_pos < needed {
            break;
        }
        for (ch, input) in chunk.iter_mut().zip(&planar) {
            ch.clear();
            ch.extend_from_slice(&input[read_pos..read_pos + needed]);
        }
        let (nbr_in, nbr_out) = resampler
            .process_into_buffer(&chunk, &mut scratch, None)
            .map_err(|_e| failed())?;
        read_pos += nbr_in;
        for (out, resampled) in output.iter_mut().zip(&scratch) {
            out.extend_from_slice(&resampled[..nbr_out]);
        }
    }

    // Then whatever is left, then silence until the delayed tail has come out.
    let mut remaining = Some(
        planar
            .iter()
            .map(|input| input[read_pos..].to_vec())
            .collect::<Vec<_>>(),
    );
    while output[0].len() < wanted {
        let (_nbr_in, nbr_out) = resampler
            .process_partial_into_buffer(remaining.as_deref(), &mut scratch, None)
            .map_err(|_e| failed())?;
        remaining = None;
        if nbr_out == 0 {
            break;
        }
        for (out, resampled) in output.iter_mut().zip(&scratch) {
            out.extend_from_slice(&resampled[..nbr_out]);
        }
    }

    let end = wanted.min(output[0].len());
    let start = delay.min(end);
    Ok(output[0][start..end]
        .iter()
        .zip(&output[1][start..end])
        .map(|(&left, &right)| StereoFrame::new(left, right))
        .collect())
}
