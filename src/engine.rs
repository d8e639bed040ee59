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

//! The rendering engine: one object owning the interpolator, the resample
//! cache, and the audio queue.
//!
//! All state lives here rather than in globals, so several engines can
//! coexist. The lifecycle is `new` (open the sink, build the parts),
//! `reset` between files, and `shutdown` to drain and close.

use std::error::Error;
use std::sync::Arc;

use tracing::info;

use crate::cache::ResampleCache;
use crate::config::Config;
use crate::queue::{AudioQueue, QueueError};
use crate::resample::{fill_block, FillStatus, Interpolator, Voice};
use crate::sample::Sample;
use crate::sink::OutputSink;

/// A fully assembled rendering and delivery pipeline.
pub struct Engine {
    interpolator: Interpolator,
    cache: ResampleCache,
    queue: AudioQueue,
    output_rate: u32,
}

impl Engine {
    /// Builds an engine from a configuration, opening `sink` as the
    /// output destination.
    pub fn new(config: &Config, sink: Box<dyn OutputSink>) -> Result<Engine, Box<dyn Error>> {
        let audio = config.audio();
        let format = audio.format()?;
        let interpolator = config.resample().interpolator()?;
        let queue = AudioQueue::new(
            sink,
            audio.mode()?,
            audio.soft_buffer()?,
            audio.fill_start()?,
            &format,
        )?;
        let cache = ResampleCache::new(format.rate, config.cache().budget_bytes());
        info!(rate = format.rate, "Engine ready.");
        Ok(Engine {
            interpolator,
            cache,
            queue,
            output_rate: format.rate,
        })
    }

    /// Returns the configured interpolator.
    pub fn interpolator(&self) -> &Interpolator {
        &self.interpolator
    }

    /// Returns the resample cache, for the scan pass.
    pub fn cache(&mut self) -> &mut ResampleCache {
        &mut self.cache
    }

    /// Returns the audio queue.
    pub fn queue(&mut self) -> &mut AudioQueue {
        &mut self.queue
    }

    /// The current output rate in Hz.
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Ranks and materializes the cache candidates accumulated by the
    /// scan pass. Call once between scanning a file and rendering it.
    pub fn prepare(&mut self) {
        self.cache.create(&self.interpolator);
    }

    /// Starts a voice for `note`, preferring a pre-resampled sample when
    /// the cache holds one. Returns the voice and the sample it reads.
    pub fn voice_for_note(&self, sample: &Arc<Sample>, note: u8) -> (Voice, Arc<Sample>) {
        match self.cache.fetch(sample, note) {
            Some(cached) => (Voice::for_cached(&cached), cached),
            None => (Voice::new(sample, note, self.output_rate), sample.clone()),
        }
    }

    /// Renders one block of output frames from `voice`.
    pub fn render_block(
        &self,
        voice: &mut Voice,
        sample: &Sample,
        out: &mut [i16],
    ) -> FillStatus {
        fill_block(voice, sample, &self.interpolator, out)
    }

    /// Hands finished frames to the queue.
    pub fn submit(&mut self, frames: &[i16]) -> Result<(), QueueError> {
        self.queue.submit(frames)
    }

    /// Resets all three subsystems between files. Nothing carries over.
    pub fn reset(&mut self) -> Result<(), QueueError> {
        self.queue.reset()?;
        self.cache.reset();
        Ok(())
    }

    /// Changes the output rate. Cached material is rate-specific and is
    /// dropped.
    pub fn set_output_rate(&mut self, rate: u32) -> Result<(), QueueError> {
        self.queue.set_rate(rate)?;
        self.cache.set_output_rate(rate);
        self.output_rate = rate;
        Ok(())
    }

    /// Drains whatever is still queued and closes the sink.
    pub fn shutdown(&mut self) -> Result<(), QueueError> {
        self.queue.flush(false)?;
        self.queue.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::{note_frequency, LoopMode, FIXED_ONE};
    use crate::sink::mock::MockSink;

    fn test_config() -> Config {
        Config::from_yaml(
            r#"
audio:
  rate: 44100
  soft_buffer: 50ms
  fill_start: 0ms
resample:
  kernel: linear
"#,
        )
        .unwrap()
    }

    /// A 22050 Hz ramp; every output frame at 44.1kHz lands either on a
    /// source frame or exactly halfway between two.
    fn ramp_sample(frames: usize) -> Arc<Sample> {
        let data: Vec<i16> = (0..frames).map(|i| (i * 2) as i16).collect();
        Arc::new(
            Sample::new(data, 22050, note_frequency(69), LoopMode::None, 0, frames).unwrap(),
        )
    }

    fn render_all(engine: &mut Engine, sample: &Arc<Sample>, note: u8) -> usize {
        let (mut voice, source) = engine.voice_for_note(sample, note);
        let mut total = 0;
        loop {
            let mut block = [0i16; 512];
            let status = engine.render_block(&mut voice, &source, &mut block);
            engine.submit(&block[..status.frames]).unwrap();
            total += status.frames;
            if status.finished {
                return total;
            }
        }
    }

    #[test]
    fn test_end_to_end_render_and_flush() {
        crate::test::test::init_logging();
        let sink = MockSink::new(1 << 20);
        let handle = sink.clone();
        let mut engine = Engine::new(&test_config(), Box::new(sink)).unwrap();

        let sample = ramp_sample(1000);
        let total = render_all(&mut engine, &sample, 69);
        assert_eq!(total, 2000);
        engine.shutdown().unwrap();

        // Interpolating the half-rate ramp reproduces a unit ramp, padded
        // with silence to a whole bucket.
        let captured = handle.captured();
        assert_eq!(captured.len() % engine.queue().bucket_frames(), 0);
        for (i, &frame) in captured[..1999].iter().enumerate() {
            assert_eq!(frame, i as i16);
        }
        assert!(captured[2000..].iter().all(|&s| s == 0));
        assert!(!handle.is_open());
    }

    #[test]
    fn test_rendered_audio_survives_a_wav_round_trip() {
        let sink = MockSink::new(1 << 20);
        let handle = sink.clone();
        let mut engine = Engine::new(&test_config(), Box::new(sink)).unwrap();
        render_all(&mut engine, &ramp_sample(500), 69);
        engine.shutdown().unwrap();
        let captured = handle.captured();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("render.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &frame in &captured {
            writer.write_sample(frame).unwrap();
        }
        writer.finalize().unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, captured);
    }

    #[test]
    fn test_cache_feeds_unity_rate_voices() {
        let sink = MockSink::new(1 << 20);
        let mut engine = Engine::new(&test_config(), Box::new(sink)).unwrap();
        let sample = ramp_sample(1000);

        engine.cache().note_on(0, 69, &sample, 0, false);
        engine.cache().note_off(0, 69, 100_000);
        engine.prepare();

        let (voice, source) = engine.voice_for_note(&sample, 69);
        assert!(voice.is_cached());
        assert_eq!(voice.increment(), FIXED_ONE);
        assert_ne!(source.id(), sample.id());
        assert_eq!(source.frames(), 2000);
    }

    #[test]
    fn test_reset_clears_cache_and_queue() {
        let sink = MockSink::new(1 << 20);
        let mut engine = Engine::new(&test_config(), Box::new(sink)).unwrap();
        let sample = ramp_sample(1000);
        engine.cache().note_on(0, 69, &sample, 0, false);
        engine.cache().note_off(0, 69, 100_000);
        engine.prepare();
        engine.submit(&[1; 300]).unwrap();

        engine.reset().unwrap();
        assert_eq!(engine.queue().filled(), 0);
        assert_eq!(engine.queue().played_frames(), 0);
        assert!(!engine.voice_for_note(&sample, 69).0.is_cached());
        assert_eq!(engine.cache().used_bytes(), 0);
    }

    #[test]
    fn test_rate_change_drops_cached_material() {
        let sink = MockSink::new(1 << 20);
        let mut engine = Engine::new(&test_config(), Box::new(sink)).unwrap();
        let sample = ramp_sample(1000);
        engine.cache().note_on(0, 69, &sample, 0, false);
        engine.cache().note_off(0, 69, 100_000);
        engine.prepare();

        engine.set_output_rate(22050).unwrap();
        assert_eq!(engine.output_rate(), 22050);
        assert!(engine.cache().fetch(&sample, 69).is_none());
        // At the sample's native rate the voice reads 1:1 uncached.
        let (voice, _) = engine.voice_for_note(&sample, 69);
        assert!(!voice.is_cached());
        assert_eq!(voice.increment(), FIXED_ONE);
    }
}
