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
use std::{error::Error, str::FromStr};

use serde::Deserialize;

use crate::resample::kernel::{DEFAULT_GAUSS_ORDER, DEFAULT_NEWTON_ORDER};
use crate::resample::{Interpolator, KernelKind};

/// A YAML representation of the interpolation configuration.
#[derive(Deserialize, Clone, Default)]
pub struct Resample {
    /// Interpolation kernel (default: "gauss")
    kernel: Option<String>,

    /// Polynomial order for the newton and gauss kernels. The other
    /// kernels have a fixed order and ignore this.
    order: Option<usize>,
}

impl Resample {
    /// Returns the interpolation kernel (default: Gauss)
    pub fn kernel(&self) -> Result<KernelKind, Box<dyn Error>> {
        match self.kernel.as_deref() {
            Some(kernel) => KernelKind::from_str(kernel),
            None => Ok(KernelKind::Gauss),
        }
    }

    /// Returns the polynomial order for the configured kernel.
    pub fn order(&self) -> Result<usize, Box<dyn Error>> {
        let default = match self.kernel()? {
            KernelKind::Newton => DEFAULT_NEWTON_ORDER,
            KernelKind::Gauss => DEFAULT_GAUSS_ORDER,
            _ => 0,
        };
        Ok(self.order.unwrap_or(default))
    }

    /// Builds the configured interpolator.
    pub fn interpolator(&self) -> Result<Interpolator, Box<dyn Error>> {
        Interpolator::new(self.kernel()?, self.order()?)
    }
}
