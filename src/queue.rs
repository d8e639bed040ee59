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

//! The audio queue: buckets rendered PCM and feeds the output sink.
//!
//! Finished frames are copied into fixed-size buckets on a FIFO ring. Full
//! buckets are written to the sink as its fillable-capacity query allows,
//! after a configurable pre-roll has accumulated. When the ring overflows,
//! free-running mode synchronously flushes a bucket while interactive mode
//! yields back into the caller's event loop with a bounded cooperative
//! wait. Data is never silently dropped.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, warn};

use crate::sink::{OutputFormat, OutputSink, SinkError};

/// Upper bound on bucket size, bounding per-write latency regardless of
/// what fragment size the sink asks for.
const MAX_BUCKET_FRAMES: usize = 4096;

/// Fraction of the sink's queue depth an interactive-mode wait covers.
const BACKPRESSURE_FRACTION: f64 = 0.2;

/// Errors produced by the audio queue. Sink write failures are fatal to
/// the stream and propagate to the caller.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The sink failed.
    #[error(transparent)]
    Sink(#[from] SinkError),
}

/// Cooperative wait callback used wherever the queue must pause for the
/// sink to make progress. The default implementation sleeps; callers with
/// their own event loop substitute one that keeps event timing advancing
/// during the pause.
pub trait EventHook: Send {
    /// Waits approximately `duration` before the queue retries.
    fn wait(&mut self, duration: Duration);
}

/// The default hook: a precise sleep.
pub struct SleepHook;

impl EventHook for SleepHook {
    fn wait(&mut self, duration: Duration) {
        spin_sleep::sleep(duration);
    }
}

/// How [`AudioQueue::submit`] behaves when the ring is full.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitMode {
    /// Yield with a bounded wait and retry, keeping the caller's event
    /// loop responsive.
    Interactive,
    /// Synchronously flush one bucket to the sink before returning.
    FreeRunning,
}

impl std::str::FromStr for SubmitMode {
    /// Convert from string representation
    fn from_str(s: &str) -> Result<Self, Box<dyn std::error::Error>> {
        match s {
            "interactive" | "Interactive" => Ok(SubmitMode::Interactive),
            "free_running" | "FreeRunning" => Ok(SubmitMode::FreeRunning),
            _ => Err(format!("Unsupported submit mode: {}", s).into()),
        }
    }

    type Err = Box<dyn std::error::Error>;
}

/// Coarse queue state, derived rather than stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueState {
    /// Nothing buffered anywhere.
    Empty,
    /// Accumulating pre-roll; nothing sent to the sink yet.
    Filling,
    /// Output has started.
    Playing,
}

/// One fixed-size chunk of queued PCM, the unit handed to the sink.
struct Bucket {
    data: Vec<i16>,
    /// Frames written into the bucket.
    len: usize,
    /// Frames already handed to the sink, from the front.
    sent: usize,
}

impl Bucket {
    fn new(capacity: usize) -> Bucket {
        Bucket {
            data: vec![0; capacity],
            len: 0,
            sent: 0,
        }
    }

    fn is_full(&self) -> bool {
        self.len == self.data.len()
    }

    /// Copies as many frames as fit, returning the count taken.
    fn push(&mut self, frames: &[i16]) -> usize {
        let taken = frames.len().min(self.data.len() - self.len);
        self.data[self.len..self.len + taken].copy_from_slice(&frames[..taken]);
        self.len += taken;
        taken
    }

    /// Fills the remainder with silence.
    fn pad(&mut self) {
        self.data[self.len..].fill(0);
        self.len = self.data.len();
    }

    fn reset(&mut self) {
        self.len = 0;
        self.sent = 0;
    }
}

/// A bucketed soft buffer between the renderer and an output sink.
pub struct AudioQueue {
    sink: Box<dyn OutputSink>,
    hook: Box<dyn EventHook>,
    mode: SubmitMode,
    rate: u32,
    soft_buffer: Duration,
    fill_start: Duration,
    bucket_frames: usize,
    /// Ring depth in buckets. Zero disables the soft buffer entirely and
    /// submissions write straight through.
    nbuckets: usize,
    /// Frames that must accumulate before output starts.
    fill_start_frames: usize,
    /// In-flight buckets, strictly FIFO. Only the tail may be partial.
    ring: VecDeque<Bucket>,
    free: Vec<Bucket>,
    /// Whether the pre-roll threshold has been crossed.
    started: bool,
    /// Frames actually handed to the sink since the last reset.
    written_to_sink: u64,
    /// Sink play count at the last reset, subtracted from its reports.
    played_base: u64,
    /// Wall-clock origin of the play-position estimate, for sinks that
    /// cannot report a play count.
    estimate_start: Instant,
}

impl AudioQueue {
    /// Creates a queue around `sink`, opening it with `format`.
    ///
    /// `soft_buffer` sizes the ring; `fill_start` is the pre-roll
    /// accumulated before output begins. A zero soft buffer, or a
    /// non-streaming sink, disables bucketing and submissions pass
    /// straight through.
    pub fn new(
        mut sink: Box<dyn OutputSink>,
        mode: SubmitMode,
        soft_buffer: Duration,
        fill_start: Duration,
        format: &OutputFormat,
    ) -> Result<AudioQueue, QueueError> {
        sink.open(format)?;
        let mut queue = AudioQueue {
            sink,
            hook: Box::new(SleepHook),
            mode,
            rate: format.rate,
            soft_buffer,
            fill_start,
            bucket_frames: 0,
            nbuckets: 0,
            fill_start_frames: 0,
            ring: VecDeque::new(),
            free: Vec::new(),
            started: false,
            written_to_sink: 0,
            played_base: 0,
            estimate_start: Instant::now(),
        };
        queue.configure_geometry();
        Ok(queue)
    }

    /// Replaces the cooperative wait hook.
    pub fn set_event_hook(&mut self, hook: Box<dyn EventHook>) {
        self.hook = hook;
    }

    /// Derives the ring geometry from the configured durations and the
    /// sink's preferences. The ring must be empty.
    fn configure_geometry(&mut self) {
        self.bucket_frames = self
            .sink
            .preferred_fragment_frames()
            .clamp(1, MAX_BUCKET_FRAMES);
        let soft_frames = (self.soft_buffer.as_secs_f64() * self.rate as f64).round() as usize;
        self.nbuckets = if self.sink.is_streaming() {
            soft_frames.div_ceil(self.bucket_frames)
        } else {
            0
        };
        let capacity = self.nbuckets * self.bucket_frames;
        self.fill_start_frames =
            ((self.fill_start.as_secs_f64() * self.rate as f64).round() as usize).min(capacity);
        self.ring.clear();
        self.free = (0..self.nbuckets)
            .map(|_| Bucket::new(self.bucket_frames))
            .collect();
        debug!(
            bucket_frames = self.bucket_frames,
            nbuckets = self.nbuckets,
            fill_start_frames = self.fill_start_frames,
            "Configured audio queue."
        );
    }

    /// Bucket size in frames.
    pub fn bucket_frames(&self) -> usize {
        self.bucket_frames
    }

    /// Ring depth in buckets.
    pub fn nbuckets(&self) -> usize {
        self.nbuckets
    }

    /// Frames currently held in the ring.
    pub fn filled(&self) -> usize {
        self.ring.iter().map(|b| b.len - b.sent).sum()
    }

    /// Ring space left in frames. `filled() + fillable()` always equals
    /// the ring capacity.
    pub fn fillable(&self) -> usize {
        self.nbuckets * self.bucket_frames - self.filled()
    }

    /// Returns the derived queue state.
    pub fn state(&self) -> QueueState {
        if self.filled() == 0 && self.sink.filled_frames().unwrap_or(0) == 0 {
            QueueState::Empty
        } else if !self.started {
            QueueState::Filling
        } else {
            QueueState::Playing
        }
    }

    /// Frames played since the last reset.
    ///
    /// Prefers the sink's play counter; sinks that cannot report one get
    /// a wall-clock estimate clamped to what was actually written.
    pub fn played_frames(&self) -> u64 {
        match self.sink.played_frames() {
            Some(played) => played.saturating_sub(self.played_base),
            None => {
                if !self.started {
                    return 0;
                }
                let elapsed = self.estimate_start.elapsed().as_secs_f64();
                ((elapsed * self.rate as f64) as u64).min(self.written_to_sink)
            }
        }
    }

    /// Copies `frames` into the ring, splitting across buckets.
    ///
    /// With bucketing disabled the frames go straight to the sink. A full
    /// ring triggers the mode's backpressure behavior until space frees
    /// up; the frames are never dropped.
    pub fn submit(&mut self, frames: &[i16]) -> Result<(), QueueError> {
        if self.nbuckets == 0 {
            return self.write_through(frames);
        }

        let mut rest = frames;
        while !rest.is_empty() {
            if let Some(tail) = self.ring.back_mut() {
                if !tail.is_full() {
                    let taken = tail.push(rest);
                    rest = &rest[taken..];
                    continue;
                }
            }
            if let Some(mut bucket) = self.free.pop() {
                bucket.reset();
                self.ring.push_back(bucket);
                continue;
            }

            // Ring full. Push what the sink will take, then fall back to
            // the mode's backpressure behavior.
            self.fill_nonblocking()?;
            if !self.free.is_empty() {
                continue;
            }
            match self.mode {
                SubmitMode::FreeRunning => self.flush_head_bucket()?,
                SubmitMode::Interactive => {
                    let wait = self.backpressure_wait();
                    self.hook.wait(wait);
                }
            }
        }
        self.fill_nonblocking()
    }

    /// Writes as many full buckets as the sink's fillable capacity
    /// currently allows, without blocking.
    pub fn fill_nonblocking(&mut self) -> Result<(), QueueError> {
        if self.nbuckets == 0 {
            return Ok(());
        }
        if !self.started {
            if self.filled() < self.fill_start_frames {
                return Ok(());
            }
            self.mark_started();
        }
        loop {
            let room = self.sink.fillable_frames().unwrap_or(usize::MAX);
            let head = match self.ring.front_mut() {
                Some(head) if head.is_full() => head,
                _ => return Ok(()),
            };
            if room < head.len - head.sent {
                return Ok(());
            }
            let written = self.sink.write(&head.data[head.sent..head.len])?;
            head.sent += written;
            self.written_to_sink += written as u64;
            if head.sent == head.len {
                self.recycle_head();
            } else if written == 0 {
                return Ok(());
            }
        }
    }

    /// Synchronously writes the head bucket to the sink, waiting through
    /// the hook whenever the sink is full.
    fn flush_head_bucket(&mut self) -> Result<(), QueueError> {
        let mut head = match self.ring.pop_front() {
            Some(head) => head,
            None => return Ok(()),
        };
        if !self.started {
            self.mark_started();
        }
        while head.sent < head.len {
            let written = self.sink.write(&head.data[head.sent..head.len])?;
            head.sent += written;
            self.written_to_sink += written as u64;
            if written == 0 {
                let wait = self.backpressure_wait();
                self.hook.wait(wait);
            }
        }
        head.reset();
        self.free.push(head);
        Ok(())
    }

    /// Ends the stream.
    ///
    /// Discarding drops everything buffered here and sink-side without
    /// playing it, resetting the play-count baseline; it only resets
    /// pointers and never waits on the sink. Otherwise the last partial
    /// bucket is padded with silence and everything is drained, bounded
    /// by a timeout derived from the remaining buffered duration. A sink
    /// that cannot confirm the drain in time is treated as drained, with
    /// a warning.
    pub fn flush(&mut self, discard: bool) -> Result<(), QueueError> {
        if discard {
            self.sink.discard();
            while let Some(mut bucket) = self.ring.pop_front() {
                bucket.reset();
                self.free.push(bucket);
            }
            self.started = false;
            self.written_to_sink = 0;
            self.played_base = self.sink.played_frames().unwrap_or(0);
            self.estimate_start = Instant::now();
            return Ok(());
        }

        if self.nbuckets > 0 {
            if let Some(tail) = self.ring.back_mut() {
                if !tail.is_full() {
                    tail.pad();
                }
            }
            // Pre-roll no longer applies; everything buffered goes out.
            if !self.started && self.filled() > 0 {
                self.mark_started();
            }
            let deadline = Instant::now() + self.drain_timeout();
            while self.filled() > 0 {
                self.fill_nonblocking()?;
                if self.filled() == 0 {
                    break;
                }
                if Instant::now() >= deadline {
                    warn!(
                        remaining = self.filled(),
                        "Timed out draining the audio queue, continuing."
                    );
                    break;
                }
                let wait = self.backpressure_wait();
                self.hook.wait(wait);
            }
        }
        if let Err(e) = self.sink.drain() {
            warn!(error = %e, "Sink drain failed, continuing.");
        }
        Ok(())
    }

    /// Drops everything and rearms the pre-roll, ready for the next
    /// stream. Counters restart from zero.
    pub fn reset(&mut self) -> Result<(), QueueError> {
        self.flush(true)
    }

    /// Changes the output rate, discarding anything in flight and
    /// re-deriving the ring geometry.
    pub fn set_rate(&mut self, rate: u32) -> Result<(), QueueError> {
        self.flush(true)?;
        self.sink.set_rate(rate)?;
        self.rate = rate;
        self.configure_geometry();
        Ok(())
    }

    /// Closes the underlying sink.
    pub fn close(&mut self) {
        self.sink.close();
    }

    fn write_through(&mut self, frames: &[i16]) -> Result<(), QueueError> {
        let mut written = 0;
        while written < frames.len() {
            let accepted = self.sink.write(&frames[written..])?;
            written += accepted;
            self.written_to_sink += accepted as u64;
            if !self.started && accepted > 0 {
                self.mark_started();
            }
            if accepted == 0 {
                let wait = self.backpressure_wait();
                self.hook.wait(wait);
            }
        }
        Ok(())
    }

    fn mark_started(&mut self) {
        self.started = true;
        self.estimate_start = Instant::now();
    }

    fn backpressure_wait(&self) -> Duration {
        let frames = self.sink.queue_frames().max(self.bucket_frames).max(1);
        Duration::from_secs_f64(frames as f64 * BACKPRESSURE_FRACTION / self.rate as f64)
            .max(Duration::from_millis(1))
    }

    fn drain_timeout(&self) -> Duration {
        let buffered = self.filled() + self.sink.filled_frames().unwrap_or(0);
        Duration::from_secs_f64(buffered as f64 / self.rate as f64) * 2
            + Duration::from_millis(500)
    }

    fn recycle_head(&mut self) {
        if let Some(mut head) = self.ring.pop_front() {
            head.reset();
            self.free.push(head);
        }
    }
}
