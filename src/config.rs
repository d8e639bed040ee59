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

//! YAML configuration for the rendering engine.

use std::error::Error;
use std::fs;
use std::path::Path;

use serde::Deserialize;

pub mod audio;
pub mod cache;
pub mod resample;

pub use audio::Audio;
pub use cache::Cache;
pub use resample::Resample;

/// A YAML representation of the engine configuration. Every section is
/// optional; an empty document yields a fully defaulted configuration.
#[derive(Deserialize, Clone, Default)]
pub struct Config {
    /// Output and queueing configuration.
    audio: Option<Audio>,

    /// Interpolation configuration.
    resample: Option<Resample>,

    /// Resample cache configuration.
    cache: Option<Cache>,
}

impl Config {
    /// Parses a configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Config, Box<dyn Error>> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Parses a configuration from a YAML file.
    pub fn from_file(path: &Path) -> Result<Config, Box<dyn Error>> {
        match Config::from_yaml(&fs::read_to_string(path)?) {
            Ok(config) => Ok(config),
            Err(e) => Err(format!("error parsing file {}: {}", path.display(), e).into()),
        }
    }

    /// Returns the audio configuration.
    pub fn audio(&self) -> Audio {
        self.audio.clone().unwrap_or_default()
    }

    /// Returns the resample configuration.
    pub fn resample(&self) -> Resample {
        self.resample.clone().unwrap_or_default()
    }

    /// Returns the cache configuration.
    pub fn cache(&self) -> Cache {
        self.cache.clone().unwrap_or_default()
    }
}
