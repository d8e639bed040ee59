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
use std::{error::Error, str::FromStr, time::Duration};

use duration_string::DurationString;
use serde::Deserialize;

use crate::queue::SubmitMode;
use crate::sink::{Encoding, OutputFormat};

const DEFAULT_SOFT_BUFFER: Duration = Duration::from_millis(300);
const DEFAULT_FILL_START: Duration = Duration::from_millis(100);

/// A YAML representation of the audio output configuration.
#[derive(Deserialize, Clone, Default)]
pub struct Audio {
    /// Output rate in Hz (default: 44100)
    rate: Option<u32>,

    /// Sample encoding at the device boundary (default: "int16")
    encoding: Option<String>,

    /// Queue behavior when the soft buffer is full (default: "free_running")
    mode: Option<String>,

    /// Soft buffer duration. Zero disables queue bucketing entirely.
    soft_buffer: Option<String>,

    /// Audio buffered before output starts.
    fill_start: Option<String>,
}

impl Audio {
    /// Returns the output rate (default: 44100)
    pub fn rate(&self) -> u32 {
        self.rate.unwrap_or(44100)
    }

    /// Returns the sample encoding (default: Int16)
    pub fn encoding(&self) -> Result<Encoding, Box<dyn Error>> {
        match self.encoding.as_deref() {
            Some(encoding) => Encoding::from_str(encoding),
            None => Ok(Encoding::Int16),
        }
    }

    /// Returns the submit mode (default: FreeRunning)
    pub fn mode(&self) -> Result<SubmitMode, Box<dyn Error>> {
        match self.mode.as_deref() {
            Some(mode) => SubmitMode::from_str(mode),
            None => Ok(SubmitMode::FreeRunning),
        }
    }

    /// Returns the soft buffer duration (default: 300ms)
    pub fn soft_buffer(&self) -> Result<Duration, Box<dyn Error>> {
        match &self.soft_buffer {
            Some(soft_buffer) => Ok(DurationString::from_string(soft_buffer.clone())?.into()),
            None => Ok(DEFAULT_SOFT_BUFFER),
        }
    }

    /// Returns the pre-roll duration (default: 100ms)
    pub fn fill_start(&self) -> Result<Duration, Box<dyn Error>> {
        match &self.fill_start {
            Some(fill_start) => Ok(DurationString::from_string(fill_start.clone())?.into()),
            None => Ok(DEFAULT_FILL_START),
        }
    }

    /// Returns the output format described by this configuration.
    pub fn format(&self) -> Result<OutputFormat, Box<dyn Error>> {
        OutputFormat::new(self.rate(), self.encoding()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let audio = Audio::default();
        assert_eq!(audio.rate(), 44100);
        assert_eq!(audio.encoding().unwrap(), Encoding::Int16);
        assert_eq!(audio.mode().unwrap(), SubmitMode::FreeRunning);
        assert_eq!(audio.soft_buffer().unwrap(), DEFAULT_SOFT_BUFFER);
        assert_eq!(audio.fill_start().unwrap(), DEFAULT_FILL_START);
    }

    #[test]
    fn test_invalid_values_surface_errors() {
        let audio: Audio =
            serde_yml::from_str("encoding: dsd\nmode: sideways\nsoft_buffer: never\n").unwrap();
        assert!(audio.encoding().is_err());
        assert!(audio.mode().is_err());
        assert!(audio.soft_buffer().is_err());
    }
}
