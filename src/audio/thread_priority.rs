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
use thread_priority::{set_current_thread_priority, ThreadPriority, ThreadPriorityValue};
use tracing::{info, warn};

/// Default priority for the audio callback thread when SLICEPLAY_THREAD_PRIORITY is unset.
const DEFAULT_CALLBACK_THREAD_PRIORITY: u8 = 70;

/// Reads SLICEPLAY_THREAD_PRIORITY (0-99) once, before the stream is built, so the callback
/// never touches the environment.
pub fn callback_thread_priority() -> ThreadPriority {
    parse_priority(std::env::var("SLICEPLAY_THREAD_PRIORITY").ok().as_deref())
}

fn parse_priority(value: Option<&str>) -> ThreadPriority {
    let level = value
        .and_then(|v| v.trim().parse::<u8>().ok())
        .filter(|n| *n < 100)
        .unwrap_or(DEFAULT_CALLBACK_THREAD_PRIORITY);
    ThreadPriorityValue::try_from(level)
        .map(ThreadPriority::Crossplatform)
        .unwrap_or(ThreadPriority::Max)
}

fn is_truthy(value: &str) -> bool {
    value == "1"
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("yes")
        || value.eq_ignore_ascii_case("on")
}

/// Returns whether to attempt SCHED_FIFO for the audio callback thread. Enabled unless
/// SLICEPLAY_DISABLE_RT_AUDIO is set.
pub fn rt_audio_enabled() -> bool {
    !std::env::var("SLICEPLAY_DISABLE_RT_AUDIO")
        .map(|v| is_truthy(&v))
        .unwrap_or(false)
}

/// Raises the priority of the calling thread the first time it is called from a callback.
pub fn configure_audio_thread_priority(
    tp: ThreadPriority,
    rt_audio: bool,
    priority_set: &mut bool,
) {
    if *priority_set {
        return;
    }
    let _ = set_current_thread_priority(tp);

    #[cfg(unix)]
    if rt_audio {
        use thread_priority::unix::{
            set_thread_priority_and_policy, thread_native_id, RealtimeThreadSchedulePolicy,
            ThreadSchedulePolicy,
        };
        match set_thread_priority_and_policy(
            thread_native_id(),
            tp,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
        ) {
            Ok(()) => info!("Enabled RT SCHED_FIFO for the engine callback"),
            Err(e) => warn!(error = %e, "Failed to set RT SCHED_FIFO for the engine callback"),
        }
    }
    #[cfg(not(unix))]
    let _ = rt_audio;

    *priority_set = true;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_priority() {
        let level = |n: u8| ThreadPriority::Crossplatform(ThreadPriorityValue::try_from(n).unwrap());
        let default = level(DEFAULT_CALLBACK_THREAD_PRIORITY);
        assert_eq!(parse_priority(None), default);
        assert_eq!(parse_priority(Some("abc")), default);
        assert_eq!(parse_priority(Some("150")), default);
        assert_eq!(parse_priority(Some(" 42 ")), level(42));
    }

    #[test]
    fn test_truthy() {
        for v in ["1", "true", "YES", "On"] {
            assert!(is_truthy(v));
        }
        for v in ["0", "false", "", "off"] {
            assert!(!is_truthy(v));
        }
    }
}
