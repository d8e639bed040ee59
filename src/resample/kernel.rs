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

//! Interpolation kernels.
//!
//! Each kernel computes one output sample from a source buffer and a
//! fixed-point position. Kernels are stateless per call except for the
//! Newton coefficient session, which lives on the voice so that the
//! incremental-reuse fast path has an explicit owner and invalidation
//! point. Coefficient tables (Gauss taps) are built once when the
//! interpolator is constructed, never per call.

use std::error::Error;
use std::f64::consts::PI;
use std::str::FromStr;

use crate::sample::{fixed_fract, Sample, FRACTION_BITS};

/// Highest supported Newton polynomial order (odd orders only).
pub const MAX_NEWTON_ORDER: usize = 57;

/// Highest supported Gauss interpolation order.
pub const MAX_GAUSS_ORDER: usize = 34;

/// Default Newton polynomial order.
pub const DEFAULT_NEWTON_ORDER: usize = 11;

/// Default Gauss interpolation order.
pub const DEFAULT_GAUSS_ORDER: usize = 25;

/// Basis scale of the sin-windowed Lagrange taps used by Gauss
/// interpolation. Keeps all basis arguments well inside (0, pi/2).
const GAUSS_BASIS_SCALE: f64 = 1.0 / (4.0 * PI);

/// The interpolation kernel families selectable in configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelKind {
    /// Nearest-neighbor (no interpolation).
    Nearest,
    /// 2-point linear interpolation.
    Linear,
    /// 4-point cubic spline, falling back to linear near non-wrapping edges.
    CubicSpline,
    /// 4-point cubic Lagrange interpolation.
    Lagrange,
    /// Odd-order Newton polynomial interpolation.
    Newton,
    /// Windowed-Gauss table interpolation.
    Gauss,
}

impl FromStr for KernelKind {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        match s {
            "none" | "nearest" => Ok(KernelKind::Nearest),
            "linear" => Ok(KernelKind::Linear),
            "cspline" | "cubic" => Ok(KernelKind::CubicSpline),
            "lagrange" => Ok(KernelKind::Lagrange),
            "newton" => Ok(KernelKind::Newton),
            "gauss" => Ok(KernelKind::Gauss),
            _ => Err(format!("unknown interpolation kernel: {}", s).into()),
        }
    }
}

/// One voice's read-only view of the sample being interpolated.
///
/// Carries the loop geometry a kernel needs for edge decisions plus the
/// backing sample's identity, which validates per-voice session state.
#[derive(Clone, Copy)]
pub struct Source<'a> {
    /// The PCM data.
    pub data: &'a [i16],
    /// Identity of the backing sample.
    pub id: u64,
    /// First frame of the loop body.
    pub loop_start: usize,
    /// One past the last frame of the loop body.
    pub loop_end: usize,
    /// True when forward-loop wrapping may fold window taps across the seam.
    pub wrapping: bool,
}

impl<'a> Source<'a> {
    /// Builds a source view over a sample.
    pub fn from_sample(sample: &'a Sample) -> Source<'a> {
        Source {
            data: sample.data(),
            id: sample.id(),
            loop_start: sample.loop_start(),
            loop_end: sample.loop_end(),
            wrapping: sample.loop_mode() == crate::sample::LoopMode::Forward,
        }
    }

    /// Reads the tap at `index`, folding forward-loop reads that land past
    /// the loop end back into the loop body.
    #[inline]
    fn tap(&self, index: i64) -> f64 {
        let mut i = index;
        if self.wrapping {
            let end = self.loop_end as i64;
            let len = (self.loop_end - self.loop_start) as i64;
            while i >= end {
                i -= len;
            }
        }
        let i = i.clamp(0, self.data.len() as i64 - 1) as usize;
        self.data[i] as f64
    }
}

/// Per-voice Newton coefficient state.
///
/// Valid while the voice keeps stepping forward through the same buffer.
/// An unchanged interpolation window reuses the differences as they are, a
/// one-frame forward window move extends them incrementally, and anything
/// else rebuilds them from scratch.
#[derive(Clone, Debug)]
pub struct NewtonSession {
    /// Sample identity the coefficients were built against (0 = none).
    buffer_id: u64,
    /// Window start frame of the cached coefficients.
    start: i64,
    /// Order of the cached coefficients.
    order: usize,
    /// Forward differences of the window samples.
    diffs: Vec<f64>,
}

impl NewtonSession {
    /// Creates an empty session.
    pub fn new() -> NewtonSession {
        NewtonSession {
            buffer_id: 0,
            start: 0,
            order: 0,
            diffs: Vec::new(),
        }
    }

    /// Discards any cached coefficients.
    pub fn invalidate(&mut self) {
        self.buffer_id = 0;
    }

    fn matches(&self, buffer_id: u64, start: i64, order: usize) -> bool {
        self.buffer_id == buffer_id && self.start == start && self.order == order
    }

    fn shiftable(&self, buffer_id: u64, start: i64, order: usize) -> bool {
        self.buffer_id == buffer_id && self.order == order && start == self.start + 1
    }

    /// Slides the cached window one frame forward in O(order): each
    /// difference absorbs the next higher one, and only the top-order
    /// difference is rebuilt from the data.
    fn shift_forward(&mut self, data: &[i16]) {
        let order = self.order;
        for i in 0..order {
            self.diffs[i] += self.diffs[i + 1];
        }
        self.start += 1;

        // The top difference at the new start, by the alternating binomial
        // sum over the window samples.
        let mut top = 0.0;
        let mut coeff = 1.0f64;
        for j in 0..=order {
            let value = data[(self.start + j as i64) as usize] as f64;
            if (order - j) % 2 == 0 {
                top += coeff * value;
            } else {
                top -= coeff * value;
            }
            coeff = coeff * (order - j) as f64 / (j as f64 + 1.0);
        }
        self.diffs[order] = top;
    }
}

impl Default for NewtonSession {
    fn default() -> Self {
        NewtonSession::new()
    }
}

/// A configured interpolation kernel.
pub enum Interpolator {
    Nearest,
    Linear,
    CubicSpline,
    Lagrange,
    Newton {
        order: usize,
    },
    Gauss {
        order: usize,
        /// Per-fractional-offset taps: `1 << FRACTION_BITS` rows of
        /// `order + 1` entries each.
        taps: Vec<f32>,
    },
}

impl Interpolator {
    /// Builds an interpolator for the given kernel and order.
    ///
    /// The order applies to the Newton (odd, 1..=57) and Gauss (1..=34)
    /// kernels and is ignored by the rest. Gauss tap tables are computed
    /// here, once.
    pub fn new(kind: KernelKind, order: usize) -> Result<Interpolator, Box<dyn Error>> {
        match kind {
            KernelKind::Nearest => Ok(Interpolator::Nearest),
            KernelKind::Linear => Ok(Interpolator::Linear),
            KernelKind::CubicSpline => Ok(Interpolator::CubicSpline),
            KernelKind::Lagrange => Ok(Interpolator::Lagrange),
            KernelKind::Newton => {
                if order == 0 || order > MAX_NEWTON_ORDER || order % 2 == 0 {
                    return Err(format!(
                        "newton order must be odd and within 1..={}, got {}",
                        MAX_NEWTON_ORDER, order
                    )
                    .into());
                }
                Ok(Interpolator::Newton { order })
            }
            KernelKind::Gauss => {
                if order == 0 || order > MAX_GAUSS_ORDER {
                    return Err(format!(
                        "gauss order must be within 1..={}, got {}",
                        MAX_GAUSS_ORDER, order
                    )
                    .into());
                }
                Ok(Interpolator::Gauss {
                    order,
                    taps: build_gauss_table(order),
                })
            }
        }
    }

    /// Returns the kernel family of this interpolator.
    pub fn kind(&self) -> KernelKind {
        match self {
            Interpolator::Nearest => KernelKind::Nearest,
            Interpolator::Linear => KernelKind::Linear,
            Interpolator::CubicSpline => KernelKind::CubicSpline,
            Interpolator::Lagrange => KernelKind::Lagrange,
            Interpolator::Newton { .. } => KernelKind::Newton,
            Interpolator::Gauss { .. } => KernelKind::Gauss,
        }
    }

    /// Interpolates one output sample at the fixed-point position `pos`.
    ///
    /// The position's integer part must be a valid frame index; loop
    /// boundary arithmetic is the driver's job. Output saturates to the
    /// 16-bit range, never panics.
    pub fn interpolate(&self, src: &Source<'_>, pos: i64, session: &mut NewtonSession) -> i16 {
        match self {
            Interpolator::Nearest => nearest(src, pos),
            Interpolator::Linear => linear(src, pos),
            Interpolator::CubicSpline => cubic_spline(src, pos),
            Interpolator::Lagrange => lagrange(src, pos),
            Interpolator::Newton { order } => newton(src, pos, *order, session),
            Interpolator::Gauss { order, taps } => gauss(src, pos, *order, taps),
        }
    }
}

/// Saturates an interpolated value to the 16-bit sample range.
#[inline]
fn saturate(value: f64) -> i16 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16
}

/// Reduces an interpolation order so the point window fits the buffer.
///
/// Returns the largest order not exceeding `order` whose window, centered
/// on `index`, stays within `[0, frames)`. Shared by the Newton and Gauss
/// kernels so the edge behavior is identical for both.
fn reduce_order(order: usize, index: i64, frames: i64) -> usize {
    let left = index;
    let right = frames - 1 - index;
    if left < 1 || right < 1 {
        return 0;
    }
    let max_fit = (2 * left + 1).min(2 * right - 1).max(0) as usize;
    let mut reduced = order.min(max_fit);
    if reduced % 2 == 0 && reduced > 0 {
        reduced -= 1;
    }
    reduced
}

fn nearest(src: &Source<'_>, pos: i64) -> i16 {
    let index = (pos >> FRACTION_BITS).clamp(0, src.data.len() as i64 - 1) as usize;
    src.data[index]
}

fn linear(src: &Source<'_>, pos: i64) -> i16 {
    let index = (pos >> FRACTION_BITS).clamp(0, src.data.len() as i64 - 1);
    let frac = fixed_fract(pos);
    let v1 = src.data[index as usize] as f64;
    let v2 = src.tap(index + 1);
    saturate(v1 + frac * (v2 - v1))
}

fn cubic_spline(src: &Source<'_>, pos: i64) -> i16 {
    let index = pos >> FRACTION_BITS;
    let frames = src.data.len() as i64;
    // Within one sample of a non-wrapping edge the 4-point window does not
    // fit; fall back to linear.
    if index < 1 || (!src.wrapping && index + 2 >= frames) {
        return linear(src, pos);
    }
    let x = fixed_fract(pos);
    let v0 = src.tap(index - 1);
    let v1 = src.tap(index);
    let v2 = src.tap(index + 1);
    let v3 = src.tap(index + 2);
    let value = 0.5
        * (2.0 * v1
            + x * (v2 - v0)
            + x * x * (2.0 * v0 - 5.0 * v1 + 4.0 * v2 - v3)
            + x * x * x * (3.0 * (v1 - v2) + v3 - v0));
    saturate(value)
}

fn lagrange(src: &Source<'_>, pos: i64) -> i16 {
    let index = pos >> FRACTION_BITS;
    let frames = src.data.len() as i64;
    if index < 1 || (!src.wrapping && index + 2 >= frames) {
        return linear(src, pos);
    }
    let x = fixed_fract(pos);
    let v0 = src.tap(index - 1);
    let v1 = src.tap(index);
    let v2 = src.tap(index + 1);
    let v3 = src.tap(index + 2);
    // Third-order Lagrange basis over abscissae -1, 0, 1, 2.
    let value = v0 * (-x * (x - 1.0) * (x - 2.0) / 6.0)
        + v1 * ((x + 1.0) * (x - 1.0) * (x - 2.0) / 2.0)
        + v2 * (-(x + 1.0) * x * (x - 2.0) / 2.0)
        + v3 * ((x + 1.0) * x * (x - 1.0) / 6.0);
    saturate(value)
}

fn newton(src: &Source<'_>, pos: i64, order: usize, session: &mut NewtonSession) -> i16 {
    let index = pos >> FRACTION_BITS;
    let frames = src.data.len() as i64;
    let order = reduce_order(order, index, frames);
    if order < 3 {
        return linear(src, pos);
    }

    let start = index - (order as i64 - 1) / 2;
    if session.shiftable(src.id, start, order) {
        session.shift_forward(src.data);
    } else if !session.matches(src.id, start, order) {
        // Rebuild the forward differences for this window.
        session.diffs.clear();
        session
            .diffs
            .extend((0..=order).map(|k| src.data[(start + k as i64) as usize] as f64));
        for k in 1..=order {
            for i in (k..=order).rev() {
                session.diffs[i] = session.diffs[i] - session.diffs[i - 1];
            }
        }
        session.buffer_id = src.id;
        session.start = start;
        session.order = order;
    }

    // Newton forward-difference evaluation at t frames past the window start.
    let t = (index - start) as f64 + fixed_fract(pos);
    let mut value = 0.0;
    let mut term = 1.0;
    for (k, diff) in session.diffs.iter().enumerate() {
        value += diff * term;
        term *= (t - k as f64) / (k as f64 + 1.0);
    }
    saturate(value)
}

fn gauss(src: &Source<'_>, pos: i64, order: usize, taps: &[f32]) -> i16 {
    let index = pos >> FRACTION_BITS;
    let frames = src.data.len() as i64;
    let start = index - (order / 2) as i64;
    if start >= 0 && start + order as i64 + 1 <= frames {
        // Fast path: the precomputed row for this fractional offset.
        let row = (pos & ((1 << FRACTION_BITS) - 1)) as usize * (order + 1);
        let mut value = 0.0;
        for (k, tap) in taps[row..row + order + 1].iter().enumerate() {
            value += *tap as f64 * src.data[(start + k as i64) as usize] as f64;
        }
        return saturate(value);
    }

    // Edge: reduce the order to fit and compute the taps directly. The
    // table only covers the configured order.
    let reduced = reduce_order(order, index, frames);
    if reduced < 3 {
        return linear(src, pos);
    }
    let start = index - (reduced as i64 - 1) / 2;
    let u = (index - start) as f64 + fixed_fract(pos);
    let mut value = 0.0;
    for k in 0..=reduced {
        value += gauss_tap(reduced, k, u) * src.data[(start + k as i64) as usize] as f64;
    }
    saturate(value)
}

/// Computes the k-th sin-basis Lagrange tap of an `order`-point window
/// evaluated `u` frames past the window start.
fn gauss_tap(order: usize, k: usize, u: f64) -> f64 {
    let mut ck = 1.0;
    for i in 0..=order {
        if i == k {
            continue;
        }
        ck *= (GAUSS_BASIS_SCALE * (u - i as f64)).sin()
            / (GAUSS_BASIS_SCALE * (k as f64 - i as f64)).sin();
    }
    ck
}

/// Builds the per-fractional-offset Gauss tap table for the given order.
fn build_gauss_table(order: usize) -> Vec<f32> {
    let rows = 1usize << FRACTION_BITS;
    let width = order + 1;
    let mut taps = vec![0.0f32; rows * width];
    let center = (order / 2) as f64;
    for (m, row) in taps.chunks_mut(width).enumerate() {
        let u = center + m as f64 / rows as f64;
        for (k, tap) in row.iter_mut().enumerate() {
            *tap = gauss_tap(order, k, u) as f32;
        }
    }
    taps
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{to_fixed, FIXED_ONE, LoopMode};
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    fn ramp_sample(frames: usize) -> Sample {
        let data: Vec<i16> = (0..frames).map(|i| (i as i16) * 100).collect();
        Sample::new(data, 44100, 440.0, LoopMode::None, 0, frames).unwrap()
    }

    fn all_kernels() -> Vec<Interpolator> {
        vec![
            Interpolator::new(KernelKind::Nearest, 0).unwrap(),
            Interpolator::new(KernelKind::Linear, 0).unwrap(),
            Interpolator::new(KernelKind::CubicSpline, 0).unwrap(),
            Interpolator::new(KernelKind::Lagrange, 0).unwrap(),
            Interpolator::new(KernelKind::Newton, 11).unwrap(),
            Interpolator::new(KernelKind::Gauss, 9).unwrap(),
        ]
    }

    #[test]
    fn test_kernel_kind_parsing() {
        assert_eq!(KernelKind::from_str("none").unwrap(), KernelKind::Nearest);
        assert_eq!(KernelKind::from_str("linear").unwrap(), KernelKind::Linear);
        assert_eq!(
            KernelKind::from_str("cspline").unwrap(),
            KernelKind::CubicSpline
        );
        assert_eq!(
            KernelKind::from_str("lagrange").unwrap(),
            KernelKind::Lagrange
        );
        assert_eq!(KernelKind::from_str("newton").unwrap(), KernelKind::Newton);
        assert_eq!(KernelKind::from_str("gauss").unwrap(), KernelKind::Gauss);
        assert!(KernelKind::from_str("sinc").is_err());
    }

    #[test]
    fn test_order_validation() {
        assert!(Interpolator::new(KernelKind::Newton, 12).is_err());
        assert!(Interpolator::new(KernelKind::Newton, 0).is_err());
        assert!(Interpolator::new(KernelKind::Newton, 59).is_err());
        assert!(Interpolator::new(KernelKind::Newton, 57).is_ok());
        assert!(Interpolator::new(KernelKind::Gauss, 0).is_err());
        assert!(Interpolator::new(KernelKind::Gauss, 35).is_err());
        assert!(Interpolator::new(KernelKind::Gauss, 34).is_ok());
    }

    #[test]
    fn test_all_kernels_exact_at_integer_positions() {
        let sample = ramp_sample(64);
        let src = Source::from_sample(&sample);
        let mut session = NewtonSession::new();
        for kernel in all_kernels() {
            for frame in 0..64 {
                assert_eq!(
                    kernel.interpolate(&src, to_fixed(frame), &mut session),
                    sample.data()[frame],
                    "kernel {:?} at frame {}",
                    kernel.kind(),
                    frame
                );
            }
        }
    }

    #[test]
    fn test_linear_halfway() {
        let sample = ramp_sample(8);
        let src = Source::from_sample(&sample);
        let mut session = NewtonSession::new();
        let kernel = Interpolator::new(KernelKind::Linear, 0).unwrap();
        let halfway = to_fixed(2) + FIXED_ONE / 2;
        assert_eq!(kernel.interpolate(&src, halfway, &mut session), 250);
    }

    #[test]
    fn test_interior_output_bounded_by_sample_range() {
        let mut rng = SmallRng::seed_from_u64(7);
        let data: Vec<i16> = (0..256).map(|_| rng.gen_range(-20000..=20000)).collect();
        let min = *data.iter().min().unwrap() as f64;
        let max = *data.iter().max().unwrap() as f64;
        let sample = Sample::new(data, 44100, 440.0, LoopMode::None, 0, 256).unwrap();
        let src = Source::from_sample(&sample);
        let mut session = NewtonSession::new();

        // Polynomial kernels can overshoot the local neighborhood but must
        // stay within a modest factor of the overall sample bounds and
        // always within i16 after saturation.
        let slack = (max - min) * 0.5;
        for kernel in all_kernels() {
            for step in 0..1000 {
                let pos = to_fixed(16) + step * (FIXED_ONE / 5);
                let value = kernel.interpolate(&src, pos, &mut session) as f64;
                assert!(
                    value >= min - slack && value <= max + slack,
                    "kernel {:?} out of range at step {}: {}",
                    kernel.kind(),
                    step,
                    value
                );
            }
        }
    }

    #[test]
    fn test_saturation_never_panics_on_extremes() {
        let data = vec![i16::MAX; 64];
        let sample = Sample::new(data, 44100, 440.0, LoopMode::None, 0, 64).unwrap();
        let src = Source::from_sample(&sample);
        let mut session = NewtonSession::new();
        for kernel in all_kernels() {
            for frame in 0..63 {
                let pos = to_fixed(frame) + FIXED_ONE / 3;
                let value = kernel.interpolate(&src, pos, &mut session);
                // The sin-basis taps do not sum to exactly one off-node, so
                // allow a small dip; overshoot must clamp at i16::MAX.
                assert!(value >= 31500, "kernel {:?}: {}", kernel.kind(), value);
            }
        }
    }

    #[test]
    fn test_reduce_order_near_edges() {
        // At frame 1 of a long buffer only a 3-point window fits.
        assert_eq!(reduce_order(27, 1, 1000), 3);
        // Deep in the interior the requested order is kept.
        assert_eq!(reduce_order(27, 500, 1000), 27);
        // Near the end the window shrinks; it is right-heavy, so the last
        // usable frames drop to first order sooner.
        assert_eq!(reduce_order(27, 997, 1000), 3);
        assert_eq!(reduce_order(27, 998, 1000), 1);
        // At the very edges no window fits at all.
        assert_eq!(reduce_order(27, 0, 1000), 0);
        assert_eq!(reduce_order(27, 999, 1000), 0);
        // Reduction always lands on an odd order.
        for index in 1..20 {
            let reduced = reduce_order(27, index, 1000);
            assert!(reduced == 0 || reduced % 2 == 1);
        }
    }

    #[test]
    fn test_gauss_table_rows_are_interpolatory() {
        // At zero fractional offset the taps must form a unit impulse on
        // the center point.
        let order = 9;
        let taps = build_gauss_table(order);
        let row = &taps[0..order + 1];
        for (k, tap) in row.iter().enumerate() {
            if k == order / 2 {
                assert!((tap - 1.0).abs() < 1e-5);
            } else {
                assert!(tap.abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_newton_session_reuse_and_invalidation() {
        let sample = ramp_sample(64);
        let src = Source::from_sample(&sample);
        let kernel = Interpolator::new(KernelKind::Newton, 11).unwrap();
        let mut session = NewtonSession::new();

        // Two positions inside the same window reuse the coefficients.
        kernel.interpolate(&src, to_fixed(30), &mut session);
        let start = session.start;
        kernel.interpolate(&src, to_fixed(30) + FIXED_ONE / 2, &mut session);
        assert_eq!(session.start, start);

        // A different buffer invalidates the session.
        let other = ramp_sample(64);
        let other_src = Source::from_sample(&other);
        kernel.interpolate(&other_src, to_fixed(30), &mut session);
        assert_eq!(session.buffer_id, other.id());
    }

    #[test]
    fn test_newton_session_extends_on_forward_window_shift() {
        let mut rng = SmallRng::seed_from_u64(11);
        let data: Vec<i16> = (0..128).map(|_| rng.gen_range(-10000..=10000)).collect();
        let sample = Sample::new(data, 44100, 440.0, LoopMode::None, 0, 128).unwrap();
        let src = Source::from_sample(&sample);
        let kernel = Interpolator::new(KernelKind::Newton, 11).unwrap();

        // A downsampling voice moves the window start forward every output
        // frame. The persistent session, which extends its differences in
        // place on one-frame moves, must track a from-scratch rebuild.
        let mut session = NewtonSession::new();
        let mut pos = to_fixed(40);
        let step = FIXED_ONE + FIXED_ONE / 4;
        for i in 0..20 {
            let extended = kernel.interpolate(&src, pos, &mut session);
            let mut fresh = NewtonSession::new();
            let rebuilt = kernel.interpolate(&src, pos, &mut fresh);
            assert!(
                (extended as i32 - rebuilt as i32).abs() <= 1,
                "step {}: extended {} vs rebuilt {}",
                i,
                extended,
                rebuilt
            );
            assert_eq!(session.start, fresh.start);
            for (a, b) in session.diffs.iter().zip(fresh.diffs.iter()) {
                assert!((a - b).abs() <= 1e-6 * (1.0 + b.abs()), "{} vs {}", a, b);
            }
            pos += step;
        }
    }

    #[test]
    fn test_cubic_spline_edge_fallback_matches_linear() {
        let sample = ramp_sample(8);
        let src = Source::from_sample(&sample);
        let mut session = NewtonSession::new();
        let cubic = Interpolator::new(KernelKind::CubicSpline, 0).unwrap();
        let lin = Interpolator::new(KernelKind::Linear, 0).unwrap();
        let pos = FIXED_ONE / 4; // within one sample of the start
        assert_eq!(
            cubic.interpolate(&src, pos, &mut session),
            lin.interpolate(&src, pos, &mut session)
        );
    }

    #[test]
    fn test_forward_loop_taps_fold_across_seam() {
        // A looping ramp: taps past the loop end must read from the loop
        // body, not off the end of the data.
        let data: Vec<i16> = (0..16).map(|i| i * 1000).collect();
        let sample = Sample::new(data, 44100, 440.0, LoopMode::Forward, 4, 16).unwrap();
        let src = Source::from_sample(&sample);
        assert_eq!(src.tap(16), 4000.0);
        assert_eq!(src.tap(17), 5000.0);
    }
}
