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

//! The sample-accurate rendering and delivery core of a software wavetable
//! synthesizer.
//!
//! Three subsystems make up the core: the resampler (interpolation kernels
//! plus the voice-advance driver), a budgeted cache of pre-resampled
//! (sample, note) pairs, and a bucketed audio queue that feeds an abstract
//! output sink with bounded latency. Instrument loading, MIDI parsing, and
//! control surfaces are collaborators and live outside this crate.

pub mod cache;
pub mod config;
pub mod engine;
pub mod queue;
pub mod resample;
pub mod sample;
pub mod sink;

pub use engine::Engine;
