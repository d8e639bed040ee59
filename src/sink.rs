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

//! The output sink abstraction the audio queue writes into.
//!
//! A sink is anything that accepts blocks of rendered PCM: a live device
//! backed by the system audio API, a file writer, or a test capture. The
//! queue only ever talks to this trait.

use std::{error::Error, fmt, str::FromStr};

use thiserror::Error;

pub mod cpal;
pub mod mock;

/// Errors produced by output sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink has not been opened, or has been closed.
    #[error("sink is not open")]
    NotOpen,
    /// The backing device rejected the requested rate.
    #[error("unsupported output rate: {0} Hz")]
    UnsupportedRate(u32),
    /// The backing device failed.
    #[error("device error: {0}")]
    Device(String),
}

/// Encoding of samples handed to the backing device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// 16-bit signed integer samples.
    Int16,
    /// 32-bit floating point samples.
    Float32,
}

impl FromStr for Encoding {
    /// Convert from string representation
    fn from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        match s {
            "int16" | "Int16" => Ok(Encoding::Int16),
            "float32" | "Float32" => Ok(Encoding::Float32),
            _ => Err(format!("Unsupported encoding: {}", s).into()),
        }
    }

    type Err = Box<dyn Error>;
}

impl Encoding {
    /// Convert to string representation
    pub fn as_str(self) -> &'static str {
        match self {
            Encoding::Int16 => "int16",
            Encoding::Float32 => "float32",
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The format a sink is opened with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFormat {
    /// Output rate in Hz.
    pub rate: u32,
    /// Sample encoding at the device boundary. The rendering core always
    /// produces 16-bit integers; sinks convert on the way out if needed.
    pub encoding: Encoding,
}

impl OutputFormat {
    /// Creates a new output format.
    pub fn new(rate: u32, encoding: Encoding) -> Result<Self, Box<dyn Error>> {
        if rate == 0 {
            return Err("Output rate must be greater than 0".into());
        }
        Ok(OutputFormat { rate, encoding })
    }
}

impl Default for OutputFormat {
    /// Creates a default output format (44.1kHz, 16-bit integer)
    fn default() -> Self {
        OutputFormat {
            rate: 44100,
            encoding: Encoding::Int16,
        }
    }
}

/// An abstract destination for rendered audio frames.
///
/// `write` accepts as many frames as currently fit and returns the count
/// taken; it never blocks for longer than its own device buffer demands.
/// The occupancy queries feed the queue's scheduling decisions, each
/// returning `None` when the backend cannot report it.
pub trait OutputSink: Send {
    /// Opens the sink for the given format.
    fn open(&mut self, format: &OutputFormat) -> Result<(), SinkError>;

    /// Writes frames, returning how many were accepted.
    fn write(&mut self, frames: &[i16]) -> Result<usize, SinkError>;

    /// Closes the sink. Further writes fail with [`SinkError::NotOpen`].
    fn close(&mut self);

    /// The block size this sink prefers to be fed, in frames.
    fn preferred_fragment_frames(&self) -> usize;

    /// Total capacity of the device-side buffer, in frames.
    fn queue_frames(&self) -> usize;

    /// Frames that could be written right now without blocking.
    fn fillable_frames(&self) -> Option<usize>;

    /// Frames currently buffered device-side, not yet played.
    fn filled_frames(&self) -> Option<usize>;

    /// Total frames the device has actually played since open.
    fn played_frames(&self) -> Option<u64>;

    /// Drops everything buffered device-side without playing it.
    fn discard(&mut self);

    /// Blocks until everything buffered has been played.
    fn drain(&mut self) -> Result<(), SinkError>;

    /// Changes the output rate. Implies a discard on most backends.
    fn set_rate(&mut self, rate: u32) -> Result<(), SinkError>;

    /// Whether the sink consumes in real time. Non-streaming sinks (file
    /// writers) take writes at full speed and need no queue pacing.
    fn is_streaming(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_from_str() {
        assert_eq!(Encoding::from_str("int16").unwrap(), Encoding::Int16);
        assert_eq!(Encoding::from_str("Int16").unwrap(), Encoding::Int16);
        assert_eq!(Encoding::from_str("float32").unwrap(), Encoding::Float32);
        assert_eq!(Encoding::from_str("Float32").unwrap(), Encoding::Float32);
        assert!(Encoding::from_str("pcm").is_err());
        assert!(Encoding::from_str("").is_err());
    }

    #[test]
    fn test_encoding_round_trip() {
        for encoding in [Encoding::Int16, Encoding::Float32] {
            assert_eq!(Encoding::from_str(encoding.as_str()).unwrap(), encoding);
        }
    }

    #[test]
    fn test_output_format_validation() {
        assert!(OutputFormat::new(0, Encoding::Int16).is_err());
        let format = OutputFormat::new(48000, Encoding::Float32).unwrap();
        assert_eq!(format.rate, 48000);
        assert_eq!(format.encoding, Encoding::Float32);
    }

    #[test]
    fn test_output_format_default() {
        let format = OutputFormat::default();
        assert_eq!(format.rate, 44100);
        assert_eq!(format.encoding, Encoding::Int16);
    }
}
