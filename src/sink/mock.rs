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

//! A mock sink. Doesn't actually play anything.
//!
//! The device-side buffer is a frame counter that tests advance by hand
//! with [`MockSink::consume`], so queue scheduling can be stepped
//! deterministically. Every accepted frame is also captured for content
//! assertions.

use std::sync::Arc;

use parking_lot::Mutex;

use super::{OutputFormat, OutputSink, SinkError};

struct Inner {
    open: bool,
    format: OutputFormat,
    capacity_frames: usize,
    fragment_frames: usize,
    /// Frames sitting in the simulated device buffer.
    buffered: usize,
    /// Total frames the simulated device has played.
    played: u64,
    /// Every frame ever accepted, in order.
    captured: Vec<i16>,
    /// Consume writes immediately instead of buffering them.
    auto_consume: bool,
    /// Whether the play counter is reported. Off simulates backends that
    /// cannot say how far playback has advanced.
    report_played: bool,
    streaming: bool,
}

/// A mock sink handle. Clones share the same simulated device, so a test
/// can keep one handle while the queue owns the other.
#[derive(Clone)]
pub struct MockSink {
    inner: Arc<Mutex<Inner>>,
}

impl MockSink {
    /// Creates a streaming mock with the given device buffer capacity.
    pub fn new(capacity_frames: usize) -> MockSink {
        MockSink {
            inner: Arc::new(Mutex::new(Inner {
                open: false,
                format: OutputFormat::default(),
                capacity_frames,
                fragment_frames: 256,
                buffered: 0,
                played: 0,
                captured: Vec::new(),
                auto_consume: true,
                report_played: true,
                streaming: true,
            })),
        }
    }

    /// Creates a mock whose device buffer only advances when the test
    /// calls [`MockSink::consume`].
    pub fn manual(capacity_frames: usize) -> MockSink {
        let sink = MockSink::new(capacity_frames);
        sink.inner.lock().auto_consume = false;
        sink
    }

    /// Creates a non-streaming mock, the shape of a file writer: accepts
    /// everything immediately and reports no occupancy.
    pub fn non_streaming() -> MockSink {
        let sink = MockSink::new(usize::MAX / 2);
        let mut inner = sink.inner.lock();
        inner.streaming = false;
        inner.report_played = false;
        drop(inner);
        sink
    }

    /// Creates a mock that cannot report its play position.
    pub fn without_play_counter(capacity_frames: usize) -> MockSink {
        let sink = MockSink::manual(capacity_frames);
        sink.inner.lock().report_played = false;
        sink
    }

    /// Overrides the preferred fragment size.
    pub fn with_fragment_frames(self, fragment_frames: usize) -> MockSink {
        self.inner.lock().fragment_frames = fragment_frames;
        self
    }

    /// Plays `frames` frames out of the simulated device buffer.
    pub fn consume(&self, frames: usize) {
        let mut inner = self.inner.lock();
        let consumed = frames.min(inner.buffered);
        inner.buffered -= consumed;
        inner.played += consumed as u64;
    }

    /// Returns every frame accepted so far.
    pub fn captured(&self) -> Vec<i16> {
        self.inner.lock().captured.clone()
    }

    /// Returns the format the sink was last opened with.
    pub fn format(&self) -> OutputFormat {
        self.inner.lock().format.clone()
    }

    /// Returns whether the sink is currently open.
    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }
}

impl OutputSink for MockSink {
    fn open(&mut self, format: &OutputFormat) -> Result<(), SinkError> {
        let mut inner = self.inner.lock();
        inner.format = format.clone();
        inner.open = true;
        Ok(())
    }

    fn write(&mut self, frames: &[i16]) -> Result<usize, SinkError> {
        let mut inner = self.inner.lock();
        if !inner.open {
            return Err(SinkError::NotOpen);
        }
        let accepted = if inner.streaming {
            frames.len().min(inner.capacity_frames - inner.buffered)
        } else {
            frames.len()
        };
        inner.captured.extend_from_slice(&frames[..accepted]);
        if inner.auto_consume {
            inner.played += accepted as u64;
        } else {
            inner.buffered += accepted;
        }
        Ok(accepted)
    }

    fn close(&mut self) {
        self.inner.lock().open = false;
    }

    fn preferred_fragment_frames(&self) -> usize {
        self.inner.lock().fragment_frames
    }

    fn queue_frames(&self) -> usize {
        self.inner.lock().capacity_frames
    }

    fn fillable_frames(&self) -> Option<usize> {
        let inner = self.inner.lock();
        if !inner.streaming {
            return None;
        }
        Some(inner.capacity_frames - inner.buffered)
    }

    fn filled_frames(&self) -> Option<usize> {
        let inner = self.inner.lock();
        if !inner.streaming {
            return None;
        }
        Some(inner.buffered)
    }

    fn played_frames(&self) -> Option<u64> {
        let inner = self.inner.lock();
        if inner.report_played {
            Some(inner.played)
        } else {
            None
        }
    }

    fn discard(&mut self) {
        self.inner.lock().buffered = 0;
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        let mut inner = self.inner.lock();
        let buffered = inner.buffered;
        inner.buffered = 0;
        inner.played += buffered as u64;
        Ok(())
    }

    fn set_rate(&mut self, rate: u32) -> Result<(), SinkError> {
        if rate == 0 {
            return Err(SinkError::UnsupportedRate(rate));
        }
        let mut inner = self.inner.lock();
        inner.format.rate = rate;
        inner.buffered = 0;
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.inner.lock().streaming
    }
}
