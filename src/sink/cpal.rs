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

//! The cpal sink: plays queued frames through a system audio device.
//!
//! The producer side and the real-time callback meet at a condvar-guarded
//! frame ring; all cross-thread synchronization stays inside this adapter.
//! cpal streams are not `Send`, so the stream lives on a dedicated thread
//! that the sink starts on open and joins on close.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::FromSample;
use parking_lot::{Condvar, Mutex};
use tracing::{error, info, warn};

use super::{Encoding, OutputFormat, OutputSink, SinkError};

/// Device-side buffering, sized in output frames per second.
const RING_SECONDS: f64 = 0.1;

/// Frame ring between the producer and the callback thread.
struct Ring {
    buf: Vec<i16>,
    read: usize,
    len: usize,
}

impl Ring {
    fn new(capacity: usize) -> Ring {
        Ring {
            buf: vec![0; capacity],
            read: 0,
            len: 0,
        }
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }

    fn space(&self) -> usize {
        self.capacity() - self.len
    }

    /// Copies in as many frames as fit, returning the count taken.
    fn push(&mut self, frames: &[i16]) -> usize {
        let taken = frames.len().min(self.space());
        let capacity = self.capacity();
        let mut write = (self.read + self.len) % capacity;
        for &frame in &frames[..taken] {
            self.buf[write] = frame;
            write = (write + 1) % capacity;
        }
        self.len += taken;
        taken
    }

    /// Removes up to `out.len()` frames, returning the count removed.
    fn pop(&mut self, out: &mut [i16]) -> usize {
        let taken = out.len().min(self.len);
        let capacity = self.buf.len();
        for slot in out[..taken].iter_mut() {
            *slot = self.buf[self.read];
            self.read = (self.read + 1) % capacity;
        }
        self.len -= taken;
        taken
    }

    fn clear(&mut self) {
        self.read = 0;
        self.len = 0;
    }
}

/// State shared with the callback thread.
struct Shared {
    ring: Mutex<Ring>,
    /// Signaled by the callback whenever it frees ring space.
    space_freed: Condvar,
    /// Frames the callback has handed to the device.
    played: AtomicU64,
}

/// Fills one callback buffer from the ring, replicating each mono frame
/// across the device's channels and zero-filling any shortfall.
fn fill_callback_buffer<T: cpal::Sample + FromSample<i16>>(
    shared: &Shared,
    channels: usize,
    scratch: &mut Vec<i16>,
    data: &mut [T],
) {
    let frames = data.len() / channels.max(1);
    scratch.resize(frames, 0);
    let popped = {
        let mut ring = shared.ring.lock();
        ring.pop(scratch)
    };
    scratch[popped..frames].fill(0);

    for (chunk, &frame) in data.chunks_mut(channels.max(1)).zip(scratch.iter()) {
        let converted = T::from_sample(frame);
        for slot in chunk.iter_mut() {
            *slot = converted;
        }
    }
    shared.played.fetch_add(popped as u64, Ordering::Relaxed);
    shared.space_freed.notify_all();
}

fn create_callback<T: cpal::Sample + FromSample<i16>>(
    shared: Arc<Shared>,
    channels: usize,
) -> impl FnMut(&mut [T], &cpal::OutputCallbackInfo) + Send + 'static {
    let mut scratch: Vec<i16> = Vec::new();
    move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
        fill_callback_buffer(&shared, channels, &mut scratch, data);
    }
}

/// An [`OutputSink`] backed by the default cpal output device.
pub struct CpalSink {
    format: Option<OutputFormat>,
    shared: Option<Arc<Shared>>,
    shutdown: Arc<AtomicBool>,
    output_thread: Option<thread::JoinHandle<()>>,
    error_rx: Option<crossbeam_channel::Receiver<String>>,
    capacity_frames: usize,
    fragment_frames: usize,
}

impl CpalSink {
    /// Creates a sink for the default output device. Nothing touches the
    /// audio host until [`OutputSink::open`].
    pub fn new() -> CpalSink {
        CpalSink {
            format: None,
            shared: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            output_thread: None,
            error_rx: None,
            capacity_frames: 0,
            fragment_frames: 1024,
        }
    }

    /// Surfaces any error the stream reported asynchronously.
    fn check_stream_error(&self) -> Result<(), SinkError> {
        if let Some(error_rx) = &self.error_rx {
            if let Ok(message) = error_rx.try_recv() {
                return Err(SinkError::Device(message));
            }
        }
        Ok(())
    }

    fn shared(&self) -> Result<&Arc<Shared>, SinkError> {
        self.shared.as_ref().ok_or(SinkError::NotOpen)
    }
}

impl Default for CpalSink {
    fn default() -> Self {
        CpalSink::new()
    }
}

/// Owns the stream for its whole lifetime; cpal streams cannot move
/// across threads.
fn run_output_thread(
    device: cpal::Device,
    config: cpal::StreamConfig,
    encoding: Encoding,
    shared: Arc<Shared>,
    shutdown: Arc<AtomicBool>,
    error_tx: crossbeam_channel::Sender<String>,
    ready_tx: crossbeam_channel::Sender<Result<(), String>>,
) {
    let channels = config.channels as usize;
    let stream_error_tx = error_tx.clone();
    let error_callback = move |err: cpal::StreamError| {
        error!(err = err.to_string(), "cpal output stream error");
        let _ = stream_error_tx.send(err.to_string());
    };

    let stream_result = match encoding {
        Encoding::Int16 => device.build_output_stream(
            &config,
            create_callback::<i16>(shared, channels),
            error_callback,
            None,
        ),
        Encoding::Float32 => device.build_output_stream(
            &config,
            create_callback::<f32>(shared, channels),
            error_callback,
            None,
        ),
    };

    let stream = match stream_result {
        Ok(stream) => stream,
        Err(e) => {
            let _ = ready_tx.send(Err(e.to_string()));
            return;
        }
    };
    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(e.to_string()));
        return;
    }
    let _ = ready_tx.send(Ok(()));
    info!("cpal output stream started");

    while !shutdown.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(50));
    }
    // Dropping the stream here stops the callback.
}

impl OutputSink for CpalSink {
    fn open(&mut self, format: &OutputFormat) -> Result<(), SinkError> {
        if self.shared.is_some() {
            return Ok(());
        }
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| SinkError::Device("no default output device".to_string()))?;

        // Make sure some supported configuration covers the rate before
        // handing it to the backend.
        let supported = device
            .supported_output_configs()
            .map_err(|e| SinkError::Device(e.to_string()))?
            .any(|range| {
                range.min_sample_rate() <= format.rate && format.rate <= range.max_sample_rate()
            });
        if !supported {
            return Err(SinkError::UnsupportedRate(format.rate));
        }
        let channels = device
            .default_output_config()
            .map_err(|e| SinkError::Device(e.to_string()))?
            .channels();

        self.capacity_frames = ((format.rate as f64 * RING_SECONDS) as usize).max(1024);
        self.fragment_frames = (self.capacity_frames / 4).max(256);
        let shared = Arc::new(Shared {
            ring: Mutex::new(Ring::new(self.capacity_frames)),
            space_freed: Condvar::new(),
            played: AtomicU64::new(0),
        });
        let config = cpal::StreamConfig {
            channels,
            sample_rate: format.rate,
            buffer_size: cpal::BufferSize::Default,
        };

        let (error_tx, error_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        self.shutdown = Arc::new(AtomicBool::new(false));
        let thread_shared = shared.clone();
        let thread_shutdown = self.shutdown.clone();
        let encoding = format.encoding;
        let output_thread = thread::spawn(move || {
            run_output_thread(
                device,
                config,
                encoding,
                thread_shared,
                thread_shutdown,
                error_tx,
                ready_tx,
            );
        });

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {}
            Ok(Err(message)) => {
                let _ = output_thread.join();
                return Err(SinkError::Device(message));
            }
            Err(_) => {
                self.shutdown.store(true, Ordering::Relaxed);
                let _ = output_thread.join();
                return Err(SinkError::Device(
                    "timed out waiting for the output stream".to_string(),
                ));
            }
        }

        self.format = Some(format.clone());
        self.shared = Some(shared);
        self.output_thread = Some(output_thread);
        self.error_rx = Some(error_rx);
        Ok(())
    }

    fn write(&mut self, frames: &[i16]) -> Result<usize, SinkError> {
        self.check_stream_error()?;
        let shared = self.shared()?;
        let mut ring = shared.ring.lock();
        Ok(ring.push(frames))
    }

    fn close(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(output_thread) = self.output_thread.take() {
            let _ = output_thread.join();
        }
        self.shared = None;
        self.error_rx = None;
        self.format = None;
    }

    fn preferred_fragment_frames(&self) -> usize {
        self.fragment_frames
    }

    fn queue_frames(&self) -> usize {
        self.capacity_frames
    }

    fn fillable_frames(&self) -> Option<usize> {
        let shared = self.shared.as_ref()?;
        Some(shared.ring.lock().space())
    }

    fn filled_frames(&self) -> Option<usize> {
        let shared = self.shared.as_ref()?;
        Some(shared.ring.lock().len)
    }

    fn played_frames(&self) -> Option<u64> {
        let shared = self.shared.as_ref()?;
        Some(shared.played.load(Ordering::Relaxed))
    }

    /// Only resets ring pointers; safe to call from any context, even
    /// while the callback is mid-buffer.
    fn discard(&mut self) {
        if let Some(shared) = &self.shared {
            shared.ring.lock().clear();
        }
    }

    fn drain(&mut self) -> Result<(), SinkError> {
        let Some(shared) = self.shared.as_ref() else {
            return Ok(());
        };
        let format = self.format.clone().unwrap_or_default();
        let mut ring = shared.ring.lock();
        let deadline = Instant::now()
            + Duration::from_secs_f64(ring.len as f64 / format.rate as f64) * 2
            + Duration::from_millis(500);
        while ring.len > 0 {
            let timeout = shared
                .space_freed
                .wait_until(&mut ring, deadline)
                .timed_out();
            if timeout && ring.len > 0 {
                warn!(
                    remaining = ring.len,
                    "Timed out draining the output stream, continuing."
                );
                break;
            }
        }
        drop(ring);
        self.check_stream_error()
    }

    fn set_rate(&mut self, rate: u32) -> Result<(), SinkError> {
        let Some(mut format) = self.format.clone() else {
            return Err(SinkError::NotOpen);
        };
        if format.rate == rate {
            return Ok(());
        }
        format.rate = rate;
        self.close();
        self.open(&format)
    }
}
