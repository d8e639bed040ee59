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

//! The streaming driver: advances a voice through its sample.
//!
//! [`fill_block`] generates a block of output frames for one voice under
//! one of three regimes (no loop, forward loop, ping-pong loop), optionally
//! modulated by vibrato or portamento. All position arithmetic is fixed
//! point; the kernels only ever see in-bounds positions.

use crate::resample::kernel::{Interpolator, Source};
use crate::resample::voice::Voice;
use crate::sample::{to_fixed, LoopMode, Sample, FIXED_ONE, FRACTION_MASK};

/// Result of one [`fill_block`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FillStatus {
    /// Output frames actually generated. Short only when a non-looping
    /// voice ran off the end of its data.
    pub frames: usize,
    /// True when a non-looping voice has been exhausted.
    pub finished: bool,
}

/// Generates `out.len()` output frames for `voice`, advancing its position.
///
/// Returns a short frame count with `finished` set when a non-looping
/// sample ends mid-block. Looping voices always fill the whole block.
pub fn fill_block(
    voice: &mut Voice,
    sample: &Sample,
    interpolator: &Interpolator,
    out: &mut [i16],
) -> FillStatus {
    if voice.vibrato.is_some() || voice.portamento.is_some() {
        fill_modulated(voice, sample, interpolator, out)
    } else {
        fill_simple(voice, sample, interpolator, out)
    }
}

/// Modulated path: recompute the effective increment every control period
/// and delegate the audio generation to the plain path in between.
fn fill_modulated(
    voice: &mut Voice,
    sample: &Sample,
    interpolator: &Interpolator,
    out: &mut [i16],
) -> FillStatus {
    let mut written = 0;
    while written < out.len() {
        if voice.control_counter == 0 {
            // The glide is dropped one control period after it completes so
            // the final update restores the unmodulated base increment.
            let glide_cents = match voice.portamento {
                Some(mut portamento) => {
                    if portamento.active() {
                        let cents = portamento.tick();
                        voice.portamento = Some(portamento);
                        cents
                    } else {
                        voice.portamento = None;
                        0.0
                    }
                }
                None => 0.0,
            };
            let base = if glide_cents != 0.0 {
                (voice.base_increment as f64 * (glide_cents / 1200.0).exp2()).round() as i64
            } else {
                voice.base_increment
            };
            let keep_direction = voice.sample_increment < 0;
            let next = match voice.vibrato.as_mut() {
                Some(vibrato) => {
                    voice.control_counter = vibrato.control_ratio();
                    vibrato.next_increment(base)
                }
                None => {
                    // Portamento alone still updates on the vibrato control
                    // cadence default.
                    voice.control_counter = DEFAULT_CONTROL_RATIO;
                    base
                }
            };
            // Ping-pong playback may be moving backwards; modulation changes
            // the magnitude, never the direction.
            voice.sample_increment = if keep_direction { -next } else { next };
        }

        let chunk = (out.len() - written).min(voice.control_counter as usize);
        let status = fill_simple(
            voice,
            sample,
            interpolator,
            &mut out[written..written + chunk],
        );
        voice.control_counter -= status.frames as u32;
        written += status.frames;
        if status.finished {
            return FillStatus {
                frames: written,
                finished: true,
            };
        }
    }
    FillStatus {
        frames: written,
        finished: false,
    }
}

/// Output frames between modulation updates when only portamento is active.
const DEFAULT_CONTROL_RATIO: u32 = 64;

fn fill_simple(
    voice: &mut Voice,
    sample: &Sample,
    interpolator: &Interpolator,
    out: &mut [i16],
) -> FillStatus {
    match sample.loop_mode() {
        LoopMode::None => fill_plain(voice, sample, interpolator, out),
        LoopMode::Forward => fill_forward(voice, sample, interpolator, out),
        LoopMode::PingPong => fill_bidirectional(voice, sample, interpolator, out),
    }
}

/// No loop: stop at the end of the data and report a short count.
fn fill_plain(
    voice: &mut Voice,
    sample: &Sample,
    interpolator: &Interpolator,
    out: &mut [i16],
) -> FillStatus {
    let end = to_fixed(sample.frames());

    // Identity bypass: unity increment on frame boundaries reproduces the
    // source stream sample-for-sample regardless of kernel.
    if voice.sample_increment == FIXED_ONE && voice.sample_offset & FRACTION_MASK == 0 {
        let start = (voice.sample_offset >> crate::sample::FRACTION_BITS) as usize;
        let frames = out.len().min(sample.frames().saturating_sub(start));
        out[..frames].copy_from_slice(&sample.data()[start..start + frames]);
        voice.sample_offset += to_fixed(frames);
        return FillStatus {
            frames,
            finished: voice.sample_offset >= end,
        };
    }

    let src = Source::from_sample(sample);
    let mut frames = 0;
    for slot in out.iter_mut() {
        if voice.sample_offset >= end {
            return FillStatus {
                frames,
                finished: true,
            };
        }
        *slot = interpolator.interpolate(&src, voice.sample_offset, &mut voice.newton);
        voice.sample_offset += voice.sample_increment;
        frames += 1;
    }
    FillStatus {
        frames,
        finished: voice.sample_offset >= end,
    }
}

/// Forward loop: wrap back by the loop length on crossing the loop end.
fn fill_forward(
    voice: &mut Voice,
    sample: &Sample,
    interpolator: &Interpolator,
    out: &mut [i16],
) -> FillStatus {
    let loop_start = to_fixed(sample.loop_start());
    let loop_end = to_fixed(sample.loop_end());
    let loop_len = loop_end - loop_start;

    // Straight-copy fast path for exact unity rate on frame boundaries.
    if voice.sample_increment == FIXED_ONE && voice.sample_offset & FRACTION_MASK == 0 {
        let mut written = 0;
        while written < out.len() {
            let frame = (voice.sample_offset >> crate::sample::FRACTION_BITS) as usize;
            let run = (out.len() - written).min(sample.loop_end() - frame);
            out[written..written + run].copy_from_slice(&sample.data()[frame..frame + run]);
            written += run;
            voice.sample_offset += to_fixed(run);
            if voice.sample_offset >= loop_end {
                voice.sample_offset -= loop_len;
            }
        }
        return FillStatus {
            frames: out.len(),
            finished: false,
        };
    }

    let src = Source::from_sample(sample);
    for slot in out.iter_mut() {
        *slot = interpolator.interpolate(&src, voice.sample_offset, &mut voice.newton);
        voice.sample_offset += voice.sample_increment;
        if voice.sample_offset >= loop_end {
            voice.sample_offset -= loop_len;
            if voice.sample_offset >= loop_end {
                // Increment longer than the loop body; fold the remainder.
                voice.sample_offset = loop_start + (voice.sample_offset - loop_start) % loop_len;
            }
        }
    }
    FillStatus {
        frames: out.len(),
        finished: false,
    }
}

/// Bidirectional loop: reflect off both boundaries and flip the direction,
/// indefinitely.
fn fill_bidirectional(
    voice: &mut Voice,
    sample: &Sample,
    interpolator: &Interpolator,
    out: &mut [i16],
) -> FillStatus {
    let loop_start = to_fixed(sample.loop_start());
    let loop_end = to_fixed(sample.loop_end());

    let src = Source::from_sample(sample);
    for slot in out.iter_mut() {
        *slot = interpolator.interpolate(&src, voice.sample_offset, &mut voice.newton);
        voice.sample_offset += voice.sample_increment;
        // Exact boundary reflection, strict so a position landing exactly
        // on a boundary is read once there. A short loop may need both.
        while voice.sample_offset > loop_end || voice.sample_offset < loop_start {
            if voice.sample_offset > loop_end {
                voice.sample_offset = 2 * loop_end - voice.sample_offset;
            } else {
                voice.sample_offset = 2 * loop_start - voice.sample_offset;
            }
            voice.sample_increment = -voice.sample_increment;
        }
    }
    FillStatus {
        frames: out.len(),
        finished: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resample::kernel::{Interpolator, KernelKind};
    use crate::resample::voice::{Portamento, Vibrato, VibratoWaveform};
    use crate::sample::{fixed_floor, note_frequency, FIXED_ONE};

    fn linear_kernel() -> Interpolator {
        Interpolator::new(KernelKind::Linear, 0).unwrap()
    }

    fn ramp(frames: usize, mode: LoopMode, loop_start: usize, loop_end: usize) -> Sample {
        let data: Vec<i16> = (0..frames).map(|i| (i % 320) as i16 * 100).collect();
        Sample::new(data, 44100, note_frequency(69), mode, loop_start, loop_end).unwrap()
    }

    #[test]
    fn test_half_ratio_advance() {
        // 22050 Hz source on a 44100 Hz output: ratio 0.5, ten output
        // frames advance the source position by five frames.
        let data: Vec<i16> = (0..32).map(|i| i * 100).collect();
        let sample =
            Sample::new(data, 22050, note_frequency(69), LoopMode::None, 0, 32).unwrap();
        let mut voice = Voice::new(&sample, 69, 44100);
        assert_eq!(voice.increment(), FIXED_ONE / 2);

        let mut out = [0i16; 10];
        let status = fill_block(&mut voice, &sample, &linear_kernel(), &mut out);
        assert_eq!(status.frames, 10);
        assert!(!status.finished);
        assert_eq!(voice.offset(), to_fixed(5));
        // Interpolated midpoints between consecutive ramp values.
        assert_eq!(&out[..4], &[0, 50, 100, 150]);
    }

    #[test]
    fn test_plain_voice_reports_short_count_at_end() {
        let sample = ramp(8, LoopMode::None, 0, 8);
        let mut voice = Voice::new(&sample, 69, 44100);
        let mut out = [0i16; 16];
        let status = fill_block(&mut voice, &sample, &linear_kernel(), &mut out);
        assert_eq!(status.frames, 8);
        assert!(status.finished);
    }

    #[test]
    fn test_identity_bypass_reproduces_source() {
        let sample = ramp(64, LoopMode::None, 0, 64);
        let mut voice = Voice::new(&sample, 69, 44100);
        assert_eq!(voice.increment(), FIXED_ONE);
        let mut out = [0i16; 64];
        let status = fill_block(&mut voice, &sample, &linear_kernel(), &mut out);
        assert_eq!(status.frames, 64);
        assert_eq!(&out[..], sample.data());
    }

    #[test]
    fn test_forward_loop_fast_path_wraps() {
        let sample = ramp(16, LoopMode::Forward, 4, 16);
        let mut voice = Voice::new(&sample, 69, 44100);
        let mut out = [0i16; 40];
        let status = fill_block(&mut voice, &sample, &linear_kernel(), &mut out);
        assert_eq!(status.frames, 40);
        assert!(!status.finished);
        // 0..16, then loop body 4..16 repeating.
        assert_eq!(out[15], 1500);
        assert_eq!(out[16], 400);
        assert_eq!(out[27], 1500);
        assert_eq!(out[28], 400);
    }

    #[test]
    fn test_forward_loop_modular_position() {
        // After N frames from any legal offset, the position matches the
        // modular expectation within one fixed-point ULP.
        let sample = ramp(64, LoopMode::Forward, 16, 64);
        let mut voice = Voice::new(&sample, 81, 44100); // double rate
        let increment = voice.increment();
        let loop_len = to_fixed(64 - 16);

        let mut out = [0i16; 1000];
        fill_block(&mut voice, &sample, &linear_kernel(), &mut out);
        // Every wrap subtracts exactly one loop length, so the final offset
        // is congruent to start + N * increment modulo the loop length.
        let drift = (1000i64 * increment - voice.offset()).rem_euclid(loop_len);
        assert!(
            drift <= 1 || loop_len - drift <= 1,
            "drift {} at offset {}",
            drift,
            voice.offset()
        );
    }

    #[test]
    fn test_ping_pong_returns_to_start_each_period() {
        let sample = ramp(32, LoopMode::PingPong, 8, 24);
        let mut voice = Voice::new(&sample, 69, 44100);
        voice.sample_offset = to_fixed(8);
        let period = 2 * (24 - 8); // frames per full back-and-forth at unity

        let start = voice.offset();
        for _ in 0..3 {
            let mut out = vec![0i16; period];
            fill_block(&mut voice, &sample, &linear_kernel(), &mut out);
            assert_eq!(voice.offset(), start);
        }
    }

    #[test]
    fn test_ping_pong_direction_flips_at_boundaries() {
        let sample = ramp(32, LoopMode::PingPong, 8, 24);
        let mut voice = Voice::new(&sample, 69, 44100);
        voice.sample_offset = to_fixed(20);

        let mut out = [0i16; 8];
        fill_block(&mut voice, &sample, &linear_kernel(), &mut out);
        // 20 + 8 would pass the loop end at 24; direction must have flipped
        // and the position reflected inside the loop.
        assert!(voice.increment() < 0);
        assert!(voice.offset() >= to_fixed(8) && voice.offset() < to_fixed(24));
        assert_eq!(fixed_floor(voice.offset()), 20);
    }

    #[test]
    fn test_ping_pong_position_stays_in_bounds() {
        let sample = ramp(32, LoopMode::PingPong, 8, 12);
        let mut voice = Voice::new(&sample, 81, 44100); // increment 2.0
        voice.sample_offset = to_fixed(8);
        for _ in 0..50 {
            let mut out = [0i16; 7];
            fill_block(&mut voice, &sample, &linear_kernel(), &mut out);
            assert!(voice.offset() >= to_fixed(8));
            assert!(voice.offset() <= to_fixed(12));
        }
    }

    #[test]
    fn test_vibrato_modulates_increment_per_control_period() {
        let sample = ramp(6400, LoopMode::Forward, 0, 6400);
        let mut voice = Voice::new(&sample, 69, 44100);
        voice.set_vibrato(Vibrato::new(VibratoWaveform::Square, 100.0, 16, 0));

        let mut out = [0i16; 16];
        fill_block(&mut voice, &sample, &linear_kernel(), &mut out);
        let up = voice.increment();
        assert!(up > FIXED_ONE);

        // Half a cycle later the square wave bends down.
        for _ in 0..VIBRATO_HALF_CYCLE {
            fill_block(&mut voice, &sample, &linear_kernel(), &mut out);
        }
        assert!(voice.increment() < FIXED_ONE);
    }

    const VIBRATO_HALF_CYCLE: usize = crate::resample::voice::VIBRATO_PHASE_BUCKETS / 2;

    #[test]
    fn test_portamento_glide_converges_to_base_increment() {
        let sample = ramp(64000, LoopMode::Forward, 0, 64000);
        let mut voice = Voice::new(&sample, 69, 44100);
        voice.set_portamento(Portamento::new(-200.0, 25.0));
        assert!(voice.gliding());

        let mut out = [0i16; 64];
        fill_block(&mut voice, &sample, &linear_kernel(), &mut out);
        assert!(voice.increment() < FIXED_ONE);

        for _ in 0..32 {
            fill_block(&mut voice, &sample, &linear_kernel(), &mut out);
        }
        assert!(!voice.gliding());
        assert_eq!(voice.increment(), FIXED_ONE);
    }
}
