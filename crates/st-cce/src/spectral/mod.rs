// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Collocation grids and the operators the initial-data solvers lean on.
//!
//! Two independent bases are involved: the angular spin-weighted spherical
//! harmonic basis parametrised by the band limit `l_max`, and the radial
//! Legendre Gauss–Lobatto basis parametrised by the point count.  Operators
//! are built on demand and cached once per resolution; the cached tables are
//! immutable afterwards.

pub mod collocation;
pub mod swsh;
pub mod volume;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use collocation::{
    gauss_legendre, gauss_lobatto, indefinite_integral, indefinite_integral_matrix,
    interpolation_matrix, radial_collocation_points, Mesh2, Quadrature,
};
pub use swsh::{
    cached_grid, cached_transform, eth, ethbar, inverse_eth, number_of_swsh_collocation_points,
    number_of_swsh_phi_collocation_points, number_of_swsh_theta_collocation_points, resample,
    spin_weighted_ylm, CollocationPoint, SwshGrid, SwshInterpolator, SwshTransform,
};
pub use volume::resample_volume;

/// Smallest supported band limit (spin-2 fields need `l >= 2`).
pub const MIN_L_MAX: usize = 2;
/// Largest supported band limit for the explicit harmonic sums.
pub const MAX_L_MAX: usize = 48;
/// Fewest radial Gauss–Lobatto points that still contain both boundaries.
pub const MIN_RADIAL_POINTS: usize = 2;

/// Errors raised by the collocation and harmonic operators.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SpectralError {
    #[error("band limit {l_max} outside supported range {min}..={max}")]
    UnsupportedLMax { l_max: usize, min: usize, max: usize },
    #[error("radial collocation needs at least {min} points, got {got}")]
    TooFewRadialPoints { got: usize, min: usize },
    #[error("field has {got} samples, expected {expected}")]
    SizeMismatch { expected: usize, got: usize },
    #[error("mesh dimension {0} out of range for a two-dimensional mesh")]
    MeshDimension(usize),
    #[error("interpolation targets disagree: {thetas} polar angles vs {phis} azimuths")]
    TargetMismatch { thetas: usize, phis: usize },
    #[error("spin weight {spin} is not representable at band limit {l_max}")]
    UnsupportedSpin { spin: i32, l_max: usize },
}

/// Angular band limit paired with the radial point count of a volume grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub l_max: usize,
    pub number_of_radial_points: usize,
}

impl Resolution {
    pub fn new(l_max: usize, number_of_radial_points: usize) -> Result<Self, SpectralError> {
        let resolution = Self {
            l_max,
            number_of_radial_points,
        };
        resolution.validate()?;
        Ok(resolution)
    }

    pub fn validate(&self) -> Result<(), SpectralError> {
        check_l_max(self.l_max)?;
        if self.number_of_radial_points < MIN_RADIAL_POINTS {
            return Err(SpectralError::TooFewRadialPoints {
                got: self.number_of_radial_points,
                min: MIN_RADIAL_POINTS,
            });
        }
        Ok(())
    }

    pub fn number_of_angular_points(&self) -> usize {
        number_of_swsh_collocation_points(self.l_max)
    }

    pub fn number_of_volume_points(&self) -> usize {
        self.number_of_angular_points() * self.number_of_radial_points
    }
}

pub(crate) fn check_l_max(l_max: usize) -> Result<(), SpectralError> {
    if (MIN_L_MAX..=MAX_L_MAX).contains(&l_max) {
        Ok(())
    } else {
        Err(SpectralError::UnsupportedLMax {
            l_max,
            min: MIN_L_MAX,
            max: MAX_L_MAX,
        })
    }
}
