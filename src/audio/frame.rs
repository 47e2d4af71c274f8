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

/// One frame of decoded audio: a left and right sample in roughly [-1, 1].
/// Mono material stores the same value in both channels.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StereoFrame {
    pub left: f32,
    pub right: f32,
}

impl StereoFrame {
    pub fn new(left: f32, right: f32) -> StereoFrame {
        StereoFrame { left, right }
    }

    /// Builds a frame from a single mono sample.
    pub fn mono(sample: f32) -> StereoFrame {
        StereoFrame {
            left: sample,
            right: sample,
        }
    }

    /// Averages both channels.
    #[inline]
    pub fn mix(&self) -> f32 {
        0.5 * (self.left + self.right)
    }
}

/// Linear crossfade between `a` and `b` by `frac` in [0, 1].
#[inline]
pub fn lerp(a: f32, b: f32, frac: f32) -> f32 {
    a + (b - a) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lerp_midpoint() {
        assert_eq!(lerp(0.0, 1.0, 0.5), 0.5);
        assert_eq!(lerp(-1.0, 1.0, 0.25), -0.5);
    }

    #[test]
    fn test_lerp_endpoints() {
        assert_eq!(lerp(0.3, 0.9, 0.0), 0.3);
        assert!((lerp(0.3, 0.9, 1.0) - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn test_mix() {
        assert_eq!(StereoFrame::new(1.0, -1.0).mix(), 0.0);
        assert_eq!(StereoFrame::mono(0.4).mix(), 0.4);
    }
}
