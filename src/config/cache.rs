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
use serde::Deserialize;

const DEFAULT_BUDGET_BYTES: usize = 2 * 1024 * 1024;

/// A YAML representation of the resample cache configuration.
#[derive(Deserialize, Clone, Default)]
pub struct Cache {
    /// Byte budget for pre-resampled sample data (default: 2MiB). Zero
    /// disables the cache.
    budget_bytes: Option<usize>,
}

impl Cache {
    /// Returns the cache byte budget (default: 2MiB)
    pub fn budget_bytes(&self) -> usize {
        self.budget_bytes.unwrap_or(DEFAULT_BUDGET_BYTES)
    }
}
