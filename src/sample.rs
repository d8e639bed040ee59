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

//! Immutable instrument sample data and fixed-point position arithmetic.
//!
//! Playback positions and increments are fixed-point integers with
//! [`FRACTION_BITS`] fractional bits: the integer part indexes the PCM
//! buffer, the fraction selects interpolation weights. This keeps the inner
//! rendering loops free of floating point position bookkeeping.

use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Number of fractional bits in sample positions and increments.
pub const FRACTION_BITS: u32 = 12;

/// Mask extracting the fractional part of a fixed-point position.
pub const FRACTION_MASK: i64 = (1 << FRACTION_BITS) - 1;

/// A fixed-point increment of exactly 1.0 source frames per output frame.
pub const FIXED_ONE: i64 = 1 << FRACTION_BITS;

/// Converts a frame count to a fixed-point position.
#[inline]
pub fn to_fixed(frames: usize) -> i64 {
    (frames as i64) << FRACTION_BITS
}

/// Returns the integer frame index of a fixed-point position.
#[inline]
pub fn fixed_floor(pos: i64) -> i64 {
    pos >> FRACTION_BITS
}

/// Returns the fractional part of a fixed-point position in `[0, 1)`.
#[inline]
pub fn fixed_fract(pos: i64) -> f64 {
    (pos & FRACTION_MASK) as f64 / FIXED_ONE as f64
}

/// Frequency of a MIDI note in twelve-tone equal temperament, A4 = 440 Hz.
pub fn note_frequency(note: u8) -> f64 {
    440.0 * ((note as f64 - 69.0) / 12.0).exp2()
}

/// Global sample ID counter. IDs are the cache identity of a sample.
static NEXT_SAMPLE_ID: AtomicU64 = AtomicU64::new(1);

/// How playback behaves when a voice reaches the sample's loop end.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopMode {
    /// No loop: playback stops at the end of the data.
    None,
    /// Forward loop: the position wraps back to the loop start.
    Forward,
    /// Bidirectional loop: the position reflects off both loop boundaries.
    PingPong,
}

/// An immutable source PCM buffer with loop metadata.
///
/// Samples are created by the instrument loader before playback starts and
/// are never mutated afterwards; voices and the resample cache only ever
/// read them. Loop bounds are stored in frames and shifted into fixed point
/// where the driver needs them.
#[derive(Clone)]
pub struct Sample {
    /// Unique ID used as the cache identity of this sample.
    id: u64,
    /// The PCM data, 16-bit signed mono.
    data: Arc<[i16]>,
    /// First frame of the loop body.
    loop_start: usize,
    /// One past the last frame of the loop body.
    loop_end: usize,
    /// Native rate of the PCM data in Hz.
    sample_rate: u32,
    /// Frequency the sample plays at when read at its native rate, in Hz.
    root_freq: f64,
    /// Loop behavior.
    loop_mode: LoopMode,
}

impl Sample {
    /// Creates a new sample, validating and defensively bounding the loop.
    ///
    /// A degenerate loop (`start == end`) is widened to one frame rather
    /// than rejected, matching how malformed instrument files are handled
    /// everywhere else in the pipeline.
    pub fn new(
        data: Vec<i16>,
        sample_rate: u32,
        root_freq: f64,
        loop_mode: LoopMode,
        loop_start: usize,
        loop_end: usize,
    ) -> Result<Sample, Box<dyn Error>> {
        if data.is_empty() {
            return Err("sample data must not be empty".into());
        }
        if sample_rate == 0 {
            return Err("sample rate must be greater than 0".into());
        }
        if root_freq <= 0.0 {
            return Err("root frequency must be greater than 0".into());
        }

        let frames = data.len();
        let mut loop_end = loop_end.min(frames);
        let mut loop_start = loop_start.min(loop_end);
        if loop_mode != LoopMode::None && loop_end <= loop_start {
            // Bound degenerate loops to a minimum length of one frame.
            loop_end = (loop_start + 1).min(frames);
            loop_start = loop_end - 1;
        }

        Ok(Sample {
            id: NEXT_SAMPLE_ID.fetch_add(1, Ordering::SeqCst),
            data: data.into(),
            loop_start,
            loop_end,
            sample_rate,
            root_freq,
            loop_mode,
        })
    }

    /// Returns the cache identity of this sample.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the PCM data.
    pub fn data(&self) -> &[i16] {
        &self.data
    }

    /// Returns the total length in frames.
    pub fn frames(&self) -> usize {
        self.data.len()
    }

    /// Returns the first frame of the loop body.
    pub fn loop_start(&self) -> usize {
        self.loop_start
    }

    /// Returns one past the last frame of the loop body.
    pub fn loop_end(&self) -> usize {
        self.loop_end
    }

    /// Returns the loop length in frames.
    pub fn loop_frames(&self) -> usize {
        self.loop_end - self.loop_start
    }

    /// Returns the native rate of the PCM data in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the root frequency in Hz.
    pub fn root_freq(&self) -> f64 {
        self.root_freq
    }

    /// Returns the loop behavior.
    pub fn loop_mode(&self) -> LoopMode {
        self.loop_mode
    }

    /// Computes the fixed-point position increment that plays this sample at
    /// the pitch of `note` on an output running at `output_rate` Hz.
    pub fn increment_for_note(&self, note: u8, output_rate: u32) -> i64 {
        let ratio = self.sample_rate as f64 * note_frequency(note)
            / (self.root_freq * output_rate as f64);
        (ratio * FIXED_ONE as f64).round() as i64
    }
}

impl std::fmt::Debug for Sample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sample")
            .field("id", &self.id)
            .field("frames", &self.data.len())
            .field("loop_start", &self.loop_start)
            .field("loop_end", &self.loop_end)
            .field("sample_rate", &self.sample_rate)
            .field("root_freq", &self.root_freq)
            .field("loop_mode", &self.loop_mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_point_helpers() {
        assert_eq!(to_fixed(3), 3 << FRACTION_BITS);
        assert_eq!(fixed_floor(to_fixed(3) + 17), 3);
        assert_eq!(fixed_fract(to_fixed(5)), 0.0);
        assert!((fixed_fract(to_fixed(5) + FIXED_ONE / 2) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_note_frequency() {
        assert!((note_frequency(69) - 440.0).abs() < 1e-9);
        assert!((note_frequency(81) - 880.0).abs() < 1e-9);
        assert!((note_frequency(57) - 220.0).abs() < 1e-9);
    }

    #[test]
    fn test_sample_validation() {
        assert!(Sample::new(vec![], 44100, 440.0, LoopMode::None, 0, 0).is_err());
        assert!(Sample::new(vec![0; 8], 0, 440.0, LoopMode::None, 0, 8).is_err());
        assert!(Sample::new(vec![0; 8], 44100, 0.0, LoopMode::None, 0, 8).is_err());
    }

    #[test]
    fn test_degenerate_loop_is_bounded() {
        let sample = Sample::new(vec![0; 16], 44100, 440.0, LoopMode::Forward, 4, 4).unwrap();
        assert_eq!(sample.loop_frames(), 1);
        assert!(sample.loop_end() <= sample.frames());
    }

    #[test]
    fn test_loop_bounds_clamped_to_data() {
        let sample = Sample::new(vec![0; 16], 44100, 440.0, LoopMode::Forward, 8, 99).unwrap();
        assert_eq!(sample.loop_end(), 16);
        assert_eq!(sample.loop_start(), 8);
    }

    #[test]
    fn test_unity_increment_when_rates_match() {
        let sample = Sample::new(vec![0; 16], 44100, note_frequency(60), LoopMode::None, 0, 16)
            .unwrap();
        assert_eq!(sample.increment_for_note(60, 44100), FIXED_ONE);
    }

    #[test]
    fn test_half_increment_at_double_rate() {
        let sample = Sample::new(vec![0; 16], 22050, note_frequency(69), LoopMode::None, 0, 16)
            .unwrap();
        assert_eq!(sample.increment_for_note(69, 44100), FIXED_ONE / 2);
    }

    #[test]
    fn test_sample_ids_are_unique() {
        let a = Sample::new(vec![0; 4], 44100, 440.0, LoopMode::None, 0, 4).unwrap();
        let b = Sample::new(vec![0; 4], 44100, 440.0, LoopMode::None, 0, 4).unwrap();
        assert_ne!(a.id(), b.id());
    }
}
