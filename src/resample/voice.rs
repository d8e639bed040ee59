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

//! Per-voice playback state: position, pitch modulation, and kernel session.

use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::resample::kernel::NewtonSession;
use crate::sample::{Sample, FIXED_ONE};

/// Number of discrete phase buckets in one vibrato cycle. Increments are
/// cached per bucket once the sweep-in completes.
pub const VIBRATO_PHASE_BUCKETS: usize = 32;

/// The vibrato oscillator shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VibratoWaveform {
    /// Half-sine: pitch bends up only, `sin(pi * x)` over the cycle.
    HalfSine,
    /// Descending ramp from +1 to -1.
    Ramp,
    /// Square wave alternating between +1 and -1.
    Square,
    /// A new random level in [-1, 1) each cycle.
    Random,
}

/// Vibrato oscillator state for one voice.
///
/// The driver re-derives the sample increment from this oscillator every
/// `control_ratio` output frames. A sweep-in envelope scales the depth from
/// zero to full over `sweep_frames`; once the sweep completes, increments
/// are cached per phase bucket so steady-state vibrato does no floating
/// point work.
pub struct Vibrato {
    waveform: VibratoWaveform,
    /// Pitch depth at full sweep, in cents.
    depth_cents: f64,
    /// Output frames between oscillator updates.
    control_ratio: u32,
    /// Frames over which the depth sweeps in from zero.
    sweep_frames: u64,
    /// Sweep progress in frames.
    swept_frames: u64,
    /// Current phase bucket.
    phase: usize,
    /// Cached fixed-point increments per phase bucket.
    cached: [Option<i64>; VIBRATO_PHASE_BUCKETS],
    /// Base increment the cache was computed for.
    cached_base: i64,
    /// Oscillator level table, one entry per phase bucket.
    table: [f64; VIBRATO_PHASE_BUCKETS],
    /// Level held for the current cycle of the random waveform.
    random_level: f64,
    rng: SmallRng,
}

impl Vibrato {
    /// Creates a vibrato oscillator.
    pub fn new(
        waveform: VibratoWaveform,
        depth_cents: f64,
        control_ratio: u32,
        sweep_frames: u64,
    ) -> Vibrato {
        let mut table = [0.0; VIBRATO_PHASE_BUCKETS];
        for (i, level) in table.iter_mut().enumerate() {
            let x = i as f64 / VIBRATO_PHASE_BUCKETS as f64;
            *level = match waveform {
                VibratoWaveform::HalfSine => (std::f64::consts::PI * x).sin(),
                VibratoWaveform::Ramp => 1.0 - 2.0 * x,
                VibratoWaveform::Square => {
                    if x < 0.5 {
                        1.0
                    } else {
                        -1.0
                    }
                }
                VibratoWaveform::Random => 0.0,
            };
        }
        Vibrato {
            waveform,
            depth_cents,
            control_ratio: control_ratio.max(1),
            sweep_frames,
            swept_frames: 0,
            phase: 0,
            cached: [None; VIBRATO_PHASE_BUCKETS],
            cached_base: 0,
            table,
            random_level: 0.0,
            rng: SmallRng::from_entropy(),
        }
    }

    /// Returns the output frames between oscillator updates.
    pub fn control_ratio(&self) -> u32 {
        self.control_ratio
    }

    /// Computes the effective increment for the next control period and
    /// advances the oscillator by one phase bucket.
    pub fn next_increment(&mut self, base_increment: i64) -> i64 {
        if base_increment != self.cached_base {
            self.cached = [None; VIBRATO_PHASE_BUCKETS];
            self.cached_base = base_increment;
        }

        let bucket = self.phase;
        self.phase = (self.phase + 1) % VIBRATO_PHASE_BUCKETS;
        if self.phase == 0 && self.waveform == VibratoWaveform::Random {
            self.random_level = self.rng.gen_range(-1.0..1.0);
        }

        let sweep = if self.sweep_frames == 0 {
            1.0
        } else {
            (self.swept_frames as f64 / self.sweep_frames as f64).min(1.0)
        };
        self.swept_frames = self.swept_frames.saturating_add(self.control_ratio as u64);

        let steady = sweep >= 1.0 && self.waveform != VibratoWaveform::Random;
        if steady {
            if let Some(increment) = self.cached[bucket] {
                return increment;
            }
        }

        let level = match self.waveform {
            VibratoWaveform::Random => self.random_level,
            _ => self.table[bucket],
        };
        let cents = self.depth_cents * level * sweep;
        let increment = (base_increment as f64 * (cents / 1200.0).exp2()).round() as i64;
        if steady {
            self.cached[bucket] = Some(increment);
        }
        increment
    }
}

/// Portamento glide state for one voice.
///
/// The voice starts `offset_cents` away from its target pitch and glides
/// toward it by `delta_cents` per control tick, snapping to the target once
/// within one delta of it.
#[derive(Clone, Copy, Debug)]
pub struct Portamento {
    /// Remaining pitch offset from the target, in cents.
    offset_cents: f64,
    /// Per-control-tick glide amount, in cents.
    delta_cents: f64,
}

impl Portamento {
    /// Creates a glide starting `offset_cents` away from the target pitch.
    pub fn new(offset_cents: f64, delta_cents: f64) -> Portamento {
        Portamento {
            offset_cents,
            delta_cents: delta_cents.abs().max(f64::EPSILON),
        }
    }

    /// Returns true while the glide has not reached the target.
    pub fn active(&self) -> bool {
        self.offset_cents != 0.0
    }

    /// Returns the current offset and advances the glide by one tick.
    pub fn tick(&mut self) -> f64 {
        let offset = self.offset_cents;
        if self.offset_cents.abs() <= self.delta_cents {
            self.offset_cents = 0.0;
        } else {
            self.offset_cents -= self.delta_cents.copysign(self.offset_cents);
        }
        offset
    }
}

/// One playing note instance.
///
/// Created on note-on and destroyed on decay or steal by the mixer layer.
/// The driver advances `sample_offset` by `sample_increment` per output
/// frame; both are fixed point.
pub struct Voice {
    /// Current fixed-point read position.
    pub(crate) sample_offset: i64,
    /// Current effective fixed-point increment (signed in ping-pong mode).
    pub(crate) sample_increment: i64,
    /// Increment for the target pitch, before any modulation.
    pub(crate) base_increment: i64,
    /// Vibrato oscillator, if the channel has vibrato.
    pub(crate) vibrato: Option<Vibrato>,
    /// Portamento glide, if the note was started gliding.
    pub(crate) portamento: Option<Portamento>,
    /// True when this voice reads a cache-derived sample at unity rate.
    cached: bool,
    /// Frames until the next modulation update.
    pub(crate) control_counter: u32,
    /// Newton coefficient session for this voice.
    pub(crate) newton: NewtonSession,
}

impl Voice {
    /// Creates a voice playing `sample` at the pitch of `note`, resampling
    /// live.
    pub fn new(sample: &Sample, note: u8, output_rate: u32) -> Voice {
        let increment = sample.increment_for_note(note, output_rate);
        Voice {
            sample_offset: 0,
            sample_increment: increment,
            base_increment: increment,
            vibrato: None,
            portamento: None,
            cached: false,
            control_counter: 0,
            newton: NewtonSession::new(),
        }
    }

    /// Creates a voice reading a cache-derived sample at unity rate.
    pub fn for_cached(_sample: &Sample) -> Voice {
        Voice {
            sample_offset: 0,
            sample_increment: FIXED_ONE,
            base_increment: FIXED_ONE,
            vibrato: None,
            portamento: None,
            cached: true,
            control_counter: 0,
            newton: NewtonSession::new(),
        }
    }

    /// Attaches a vibrato oscillator to this voice.
    pub fn set_vibrato(&mut self, vibrato: Vibrato) {
        self.control_counter = 0;
        self.vibrato = Some(vibrato);
    }

    /// Starts a portamento glide toward this voice's pitch.
    pub fn set_portamento(&mut self, portamento: Portamento) {
        self.control_counter = 0;
        self.portamento = Some(portamento);
    }

    /// Returns the current fixed-point read position.
    pub fn offset(&self) -> i64 {
        self.sample_offset
    }

    /// Returns the current effective fixed-point increment.
    pub fn increment(&self) -> i64 {
        self.sample_increment
    }

    /// Returns true when this voice reads pre-resampled cache data.
    pub fn is_cached(&self) -> bool {
        self.cached
    }

    /// Returns true while a portamento glide is in progress.
    pub fn gliding(&self) -> bool {
        self.portamento.map(|p| p.active()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{note_frequency, LoopMode, FIXED_ONE};

    #[test]
    fn test_voice_increment_from_note() {
        let sample =
            Sample::new(vec![0; 32], 22050, note_frequency(69), LoopMode::None, 0, 32).unwrap();
        let voice = Voice::new(&sample, 69, 44100);
        assert_eq!(voice.increment(), FIXED_ONE / 2);
        assert!(!voice.is_cached());
    }

    #[test]
    fn test_cached_voice_reads_at_unity_rate() {
        let sample =
            Sample::new(vec![0; 32], 44100, note_frequency(60), LoopMode::None, 0, 32).unwrap();
        let voice = Voice::for_cached(&sample);
        assert_eq!(voice.increment(), FIXED_ONE);
        assert!(voice.is_cached());
    }

    #[test]
    fn test_vibrato_sweep_scales_depth_in() {
        let mut vibrato = Vibrato::new(VibratoWaveform::Square, 100.0, 8, 1024);
        // First control period: sweep factor is zero, no modulation yet.
        assert_eq!(vibrato.next_increment(FIXED_ONE), FIXED_ONE);
        // Drain the sweep; modulation reaches full depth.
        let mut max = FIXED_ONE;
        for _ in 0..256 {
            max = max.max(vibrato.next_increment(FIXED_ONE));
        }
        let full = (FIXED_ONE as f64 * (100.0f64 / 1200.0).exp2()).round() as i64;
        assert_eq!(max, full);
    }

    #[test]
    fn test_vibrato_steady_state_increments_are_cached() {
        let mut vibrato = Vibrato::new(VibratoWaveform::HalfSine, 50.0, 8, 0);
        let first_cycle: Vec<i64> = (0..VIBRATO_PHASE_BUCKETS)
            .map(|_| vibrato.next_increment(FIXED_ONE))
            .collect();
        let second_cycle: Vec<i64> = (0..VIBRATO_PHASE_BUCKETS)
            .map(|_| vibrato.next_increment(FIXED_ONE))
            .collect();
        assert_eq!(first_cycle, second_cycle);
        assert!(vibrato.cached.iter().all(|c| c.is_some()));
    }

    #[test]
    fn test_vibrato_cache_invalidated_on_base_change() {
        let mut vibrato = Vibrato::new(VibratoWaveform::HalfSine, 50.0, 8, 0);
        for _ in 0..VIBRATO_PHASE_BUCKETS {
            vibrato.next_increment(FIXED_ONE);
        }
        let changed = vibrato.next_increment(FIXED_ONE * 2);
        assert!(changed >= FIXED_ONE * 2);
        assert_eq!(vibrato.cached_base, FIXED_ONE * 2);
    }

    #[test]
    fn test_half_sine_never_bends_down() {
        let mut vibrato = Vibrato::new(VibratoWaveform::HalfSine, 100.0, 8, 0);
        for _ in 0..128 {
            assert!(vibrato.next_increment(FIXED_ONE) >= FIXED_ONE);
        }
    }

    #[test]
    fn test_portamento_reaches_target_and_exits() {
        let mut portamento = Portamento::new(100.0, 30.0);
        let mut ticks = 0;
        while portamento.active() {
            portamento.tick();
            ticks += 1;
            assert!(ticks < 100, "glide never completed");
        }
        // 100 -> 70 -> 40 -> 10 -> snap to 0.
        assert_eq!(ticks, 4);
        assert_eq!(portamento.tick(), 0.0);
    }

    #[test]
    fn test_portamento_glides_up_from_below() {
        let mut portamento = Portamento::new(-90.0, 40.0);
        assert_eq!(portamento.tick(), -90.0);
        assert_eq!(portamento.tick(), -50.0);
        assert_eq!(portamento.tick(), -10.0);
        assert!(!portamento.active());
    }
}
