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

/// Error types for decoding a sample file.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("No audio track found in {0}")]
    NoAudioTrack(String),

    #[error("Sample rate not specified in {0}")]
    UnknownSampleRate(String),

    #[error("Unable to resample from {0}Hz to {1}Hz")]
    ResamplingFailed(u32, u32),

    #[error("Audio file error: {0}")]
    AudioError(#[from] symphonia::core::errors::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Error types for the cpal output host.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("no output device found with name {0}")]
    DeviceNotFound(String),

    #[error("no default output device")]
    NoDefaultDevice,

    #[error("unsupported sample format {0}")]
    UnsupportedFormat(String),

    #[error("host unavailable: {0}")]
    HostUnavailable(#[from] cpal::HostUnavailable),

    #[error("device error: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("supported configs error: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("device name error: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error("stream config error: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("stream build error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("stream play error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
