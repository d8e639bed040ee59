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

//! The resample cache.
//!
//! After scanning a file's note activations, (sample, note) pairs are
//! ranked by bytes served per byte spent and the best candidates are
//! resampled once into derived samples, so that voices can replay them at
//! unity rate instead of live-resampling per activation.
//!
//! Lifecycle: `Reset -> Scanning -> Ranking -> Materializing -> Ready`,
//! with ranking and materialization folded into [`ResampleCache::create`].

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::resample::{fill_block, Interpolator, Voice};
use crate::sample::{note_frequency, LoopMode, Sample, FIXED_ONE};

/// Number of hash buckets in the key table. Collisions chain.
const HASH_BUCKETS: usize = 256;

/// Minimum frame count a materialized loop body is extended to, by
/// replaying the source loop whole extra times. Keeps very short loops
/// from costing a wrap every handful of frames.
const MIN_LOOP_FRAMES: usize = 4096;

/// Length of the linear cross-fade applied at the new loop seam.
const SEAM_FADE_FRAMES: usize = 128;

/// Scan/playback lifecycle of the cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CacheState {
    /// Accumulating note activations.
    Scanning,
    /// Candidates ranked and materialized; lookups are live.
    Ready,
}

/// One (sample, note) key with its scan statistics and, once
/// materialized, the derived sample.
struct CacheEntry {
    sample: Arc<Sample>,
    note: u8,
    /// Output frames played under this key during the scan.
    hit_frames: u64,
    /// The pre-resampled sample, present only after materialization.
    resampled: Option<Arc<Sample>>,
}

/// A budget-constrained cache of pre-resampled (sample, note) pairs.
pub struct ResampleCache {
    output_rate: u32,
    /// Arena budget in bytes.
    budget_bytes: usize,
    /// Bytes of materialized sample data currently held.
    used_bytes: usize,
    state: CacheState,
    entries: Vec<CacheEntry>,
    /// Chained hash table mapping (sample id, note) to entry indices.
    buckets: Vec<Vec<usize>>,
    /// Open notes from the scan: (channel, note) -> (entry index, on time).
    active: HashMap<(u8, u8), (usize, u64)>,
}

impl ResampleCache {
    /// Creates an empty cache with the given byte budget.
    pub fn new(output_rate: u32, budget_bytes: usize) -> ResampleCache {
        ResampleCache {
            output_rate,
            budget_bytes,
            used_bytes: 0,
            state: CacheState::Scanning,
            entries: Vec::new(),
            buckets: vec![Vec::new(); HASH_BUCKETS],
            active: HashMap::new(),
        }
    }

    /// Clears the key table and all materialized data. Runs between files
    /// and on output-rate changes; calling it twice is the same as once.
    pub fn reset(&mut self) {
        self.entries.clear();
        for bucket in &mut self.buckets {
            bucket.clear();
        }
        self.active.clear();
        self.used_bytes = 0;
        self.state = CacheState::Scanning;
    }

    /// Changes the output rate. Cached entries are rate-specific, so this
    /// implies a reset.
    pub fn set_output_rate(&mut self, output_rate: u32) {
        if self.output_rate != output_rate {
            self.output_rate = output_rate;
            self.reset();
        }
    }

    /// Returns the current lifecycle state.
    pub fn state(&self) -> CacheState {
        self.state
    }

    /// Returns the bytes of materialized data currently held.
    pub fn used_bytes(&self) -> usize {
        self.used_bytes
    }

    fn bucket_of(sample_id: u64, note: u8) -> usize {
        let hash = sample_id.wrapping_mul(0x9e37_79b9_7f4a_7c15) ^ (note as u64);
        (hash % HASH_BUCKETS as u64) as usize
    }

    fn find(&self, sample_id: u64, note: u8) -> Option<usize> {
        self.buckets[Self::bucket_of(sample_id, note)]
            .iter()
            .copied()
            .find(|&i| self.entries[i].sample.id() == sample_id && self.entries[i].note == note)
    }

    /// Records a note activation during the scan pass.
    ///
    /// `time` is the activation timestamp in output frames. Keys that
    /// would gain nothing from caching are ignored: samples already read
    /// 1:1 at this rate, ping-pong loops, and vibrato-modulated channels.
    pub fn note_on(&mut self, channel: u8, note: u8, sample: &Arc<Sample>, time: u64, vibrato: bool) {
        if self.state != CacheState::Scanning {
            return;
        }
        if vibrato
            || sample.loop_mode() == LoopMode::PingPong
            || sample.increment_for_note(note, self.output_rate) == FIXED_ONE
        {
            return;
        }

        let index = match self.find(sample.id(), note) {
            Some(index) => index,
            None => {
                let index = self.entries.len();
                self.entries.push(CacheEntry {
                    sample: sample.clone(),
                    note,
                    hit_frames: 0,
                    resampled: None,
                });
                self.buckets[Self::bucket_of(sample.id(), note)].push(index);
                index
            }
        };

        // A retrigger before the matching note-off closes the open note.
        if let Some((open, on_time)) = self.active.insert((channel, note), (index, time)) {
            self.entries[open].hit_frames += time.saturating_sub(on_time);
        }
    }

    /// Records a note release during the scan pass.
    pub fn note_off(&mut self, channel: u8, note: u8, time: u64) {
        if let Some((index, on_time)) = self.active.remove(&(channel, note)) {
            self.entries[index].hit_frames += time.saturating_sub(on_time);
        }
    }

    /// Releases every open note on a channel.
    pub fn all_notes_off(&mut self, channel: u8, time: u64) {
        let keys: Vec<(u8, u8)> = self
            .active
            .keys()
            .filter(|(ch, _)| *ch == channel)
            .copied()
            .collect();
        for key in keys {
            if let Some((index, on_time)) = self.active.remove(&key) {
                self.entries[index].hit_frames += time.saturating_sub(on_time);
            }
        }
    }

    /// Computes the frame count a candidate would materialize to, without
    /// materializing it. Mirrors the layout `materialize_entry` produces.
    fn expected_frames(sample: &Sample, increment: i64) -> (usize, usize, usize) {
        let ratio = increment as f64 / FIXED_ONE as f64;
        if sample.loop_mode() == LoopMode::None {
            let frames = (sample.frames() as f64 / ratio).ceil() as usize;
            return (frames, 0, 0);
        }
        let new_start = (sample.loop_start() as f64 / ratio).round() as usize;
        let body = (((sample.loop_end() - sample.loop_start()) as f64) / ratio).round() as usize;
        let body = body.max(1);
        let replays = MIN_LOOP_FRAMES.div_ceil(body).max(1);
        (new_start + body * replays, new_start, body * replays)
    }

    /// Ranks the scanned candidates and materializes the best of them into
    /// the byte budget. Candidates that would not fit are skipped, never an
    /// error. Moves the cache to `Ready`.
    pub fn create(&mut self, interpolator: &Interpolator) {
        // Ranking: ascending resampled-length to hit-count ratio, i.e. the
        // cheapest bytes per frame actually served go first.
        let mut order: Vec<usize> = (0..self.entries.len())
            .filter(|&i| self.entries[i].hit_frames > 0 && self.entries[i].resampled.is_none())
            .collect();
        order.sort_by(|&a, &b| {
            let ra = Self::rank_ratio(&self.entries[a], self.output_rate);
            let rb = Self::rank_ratio(&self.entries[b], self.output_rate);
            ra.partial_cmp(&rb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut materialized = 0usize;
        for index in order {
            let entry = &self.entries[index];
            let increment = entry.sample.increment_for_note(entry.note, self.output_rate);
            let (frames, new_start, _) = Self::expected_frames(&entry.sample, increment);
            let bytes = frames * std::mem::size_of::<i16>();
            if self.used_bytes + bytes > self.budget_bytes {
                debug!(
                    note = entry.note,
                    bytes, "Candidate does not fit in cache budget, skipping."
                );
                continue;
            }
            let source = self.entries[index].sample.clone();
            let note = self.entries[index].note;
            match Self::materialize_entry(
                &source,
                note,
                increment,
                frames,
                new_start,
                self.output_rate,
                interpolator,
            ) {
                Ok(resampled) => {
                    // Published only once complete; voices never observe a
                    // partial buffer.
                    self.entries[index].resampled = Some(Arc::new(resampled));
                    self.used_bytes += bytes;
                    materialized += 1;
                }
                Err(e) => {
                    warn!(note, error = %e, "Unable to materialize cache entry.");
                }
            }
        }

        info!(
            candidates = self.entries.len(),
            materialized,
            used_bytes = self.used_bytes,
            budget_bytes = self.budget_bytes,
            "Resample cache ready."
        );
        self.state = CacheState::Ready;
    }

    fn rank_ratio(entry: &CacheEntry, output_rate: u32) -> f64 {
        let increment = entry.sample.increment_for_note(entry.note, output_rate);
        let (frames, _, _) = Self::expected_frames(&entry.sample, increment);
        frames as f64 / entry.hit_frames as f64
    }

    /// Runs the fixed-ratio resampling once over the whole sample,
    /// extending short loops and cross-fading the new seam.
    fn materialize_entry(
        sample: &Arc<Sample>,
        note: u8,
        increment: i64,
        frames: usize,
        new_start: usize,
        output_rate: u32,
        interpolator: &Interpolator,
    ) -> Result<Sample, Box<dyn std::error::Error>> {
        let mut data = vec![0i16; frames];
        let mut voice = Voice::new(sample, note, output_rate);
        debug_assert_eq!(voice.increment(), increment);
        let status = fill_block(&mut voice, sample, interpolator, &mut data);
        if status.frames < frames {
            data.truncate(status.frames);
        }

        let looping = sample.loop_mode() != LoopMode::None;
        if looping {
            Self::crossfade_seam(&mut data, new_start);
        }

        // The derived sample plays this note 1:1 at the output rate.
        let loop_mode = if looping {
            LoopMode::Forward
        } else {
            LoopMode::None
        };
        let frames = data.len();
        Sample::new(
            data,
            output_rate,
            note_frequency(note),
            loop_mode,
            new_start,
            frames,
        )
    }

    /// Linear cross-fade at the end of the materialized data so the wrap
    /// back to `loop_start` lands without a click.
    fn crossfade_seam(data: &mut [i16], loop_start: usize) {
        let fade = SEAM_FADE_FRAMES.min(loop_start).min(data.len() / 2);
        if fade == 0 {
            return;
        }
        let end = data.len();
        for i in 0..fade {
            let t = (i + 1) as f64 / (fade + 1) as f64;
            let tail = data[end - fade + i] as f64;
            let pre = data[loop_start - fade + i] as f64;
            data[end - fade + i] = (tail * (1.0 - t) + pre * t).round() as i16;
        }
    }

    /// Looks up the pre-resampled sample for a key, if one was
    /// materialized. O(1) average.
    pub fn fetch(&self, sample: &Sample, note: u8) -> Option<Arc<Sample>> {
        if self.state != CacheState::Ready {
            return None;
        }
        self.find(sample.id(), note)
            .and_then(|i| self.entries[i].resampled.clone())
    }
}
