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
use std::fmt;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use tracing::{error, info, warn};

use super::error::HostError;
use super::thread_priority::{
    callback_thread_priority, configure_audio_thread_priority, rt_audio_enabled,
};
use crate::clock::ClockedEngine;
use crate::controls::{Outputs, OUTPUT_FULL_SCALE, PULSE_VOLTAGE};

/// An output device known to cpal.
#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub name: String,
    pub host: String,
    pub max_channels: u16,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (Channels={}) ({})",
            self.name, self.max_channels, self.host
        )
    }
}

/// Lists output devices across all available hosts.
pub fn list_devices() -> Result<Vec<DeviceInfo>, HostError> {
    // Suppress noisy output here.
    let _shh_stdout = shh::stdout()?;
    let _shh_stderr = shh::stderr()?;

    let mut devices = Vec::new();
    for host_id in cpal::available_hosts() {
        let host_devices = match cpal::host_from_id(host_id)?.devices() {
            Ok(host_devices) => host_devices,
            Err(e) => {
                error!(
                    err = e.to_string(),
                    host = host_id.name(),
                    "Unable to list devices for host"
                );
                continue;
            }
        };

        for device in host_devices {
            let Ok(output_configs) = device.supported_output_configs() else {
                continue;
            };
            let max_channels = output_configs.map(|c| c.channels()).max().unwrap_or(0);
            if max_channels > 0 {
                devices.push(DeviceInfo {
                    name: device.name()?,
                    host: host_id.name().to_string(),
                    max_channels,
                });
            }
        }
    }

    devices.sort_by_key(|device| device.name.to_string());
    Ok(devices)
}

/// Finds an output device by name on the default host, or the default device if no name is
/// given.
fn find_device(name: Option<&str>) -> Result<cpal::Device, HostError> {
    let host = cpal::default_host();
    match name {
        None => host.default_output_device().ok_or(HostError::NoDefaultDevice),
        Some(name) => {
            for device in host.output_devices()? {
                if device.name()?.trim() == name {
                    return Ok(device);
                }
            }
            Err(HostError::DeviceNotFound(name.to_string()))
        }
    }
}

/// A running output stream. The stream stops when this is dropped.
pub struct OutputStream {
    _stream: cpal::Stream,
    device_name: String,
    sample_rate: u32,
    channels: u16,
}

impl OutputStream {
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// The rate the device actually runs at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

impl fmt::Debug for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputStream")
            .field("device_name", &self.device_name)
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .finish()
    }
}

/// Starts an output stream that runs `clocked` once per frame. Channel 1 and 2 carry the
/// audio outputs and channel 3, when the device has one, the end-of-cycle pulse.
///
/// If the device does not support `sample_rate`, its default rate is used instead and the
/// engine is told about the change, which reloads the sample at the device rate.
pub fn start(
    device_name: Option<&str>,
    sample_rate: u32,
    mut clocked: ClockedEngine,
) -> Result<OutputStream, HostError> {
    let device = find_device(device_name)?;
    let name = device.name()?;
    let default_config = device.default_output_config()?;

    let supports_rate = device.supported_output_configs()?.any(|c| {
        c.sample_format() == default_config.sample_format()
            && c.min_sample_rate().0 <= sample_rate
            && sample_rate <= c.max_sample_rate().0
    });
    let sample_rate = if supports_rate {
        sample_rate
    } else {
        let fallback = default_config.sample_rate().0;
        warn!(
            device = name,
            requested = sample_rate,
            using = fallback,
            "Sample rate not supported by device"
        );
        fallback
    };
    clocked.set_sample_rate(sample_rate);

    let config = cpal::StreamConfig {
        channels: default_config.channels(),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match default_config.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, clocked)?,
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, clocked)?,
        cpal::SampleFormat::I32 => build_stream::<i32>(&device, &config, clocked)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, clocked)?,
        other => return Err(HostError::UnsupportedFormat(other.to_string())),
    };
    stream.play()?;
    info!(
        device = name,
        sample_rate,
        channels = config.channels,
        "Output stream started"
    );

    Ok(OutputStream {
        _stream: stream,
        device_name: name,
        sample_rate,
        channels: config.channels,
    })
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut clocked: ClockedEngine,
) -> Result<cpal::Stream, HostError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let priority = callback_thread_priority();
    let rt_audio = rt_audio_enabled();
    let mut priority_set = false;

    Ok(device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            configure_audio_thread_priority(priority, rt_audio, &mut priority_set);
            for frame in data.chunks_mut(channels) {
                let outputs = clocked.next_frame();
                for (channel, sample) in frame.iter_mut().enumerate() {
                    *sample = T::from_sample(channel_value(&outputs, channel));
                }
            }
        },
        |err| error!("CPAL output stream error: {}", err),
        None,
    )?)
}

/// The normalized value for an output channel.
fn channel_value(outputs: &Outputs, channel: usize) -> f32 {
    match channel {
        0 => outputs.left / OUTPUT_FULL_SCALE,
        1 => outputs.right / OUTPUT_FULL_SCALE,
        2 => outputs.end_of_cycle / PULSE_VOLTAGE,
        _ => 0.0,
    }
}
