// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Caller-owned state of the first hypersurface and the hand-off into the
//! main evolution.

use num_complex::Complex64;
use tracing::{info, instrument};

use crate::error::CceResult;
use crate::field::SpinWeighted;
use crate::gauge::AngularCoordinates;
use crate::spectral::{resample, resample_volume, Resolution, SpectralError};
use crate::strategy::{BoundaryData, GenerationReport, InitialDataSources, InitialDataStrategy};

/// `J` on every radial shell plus the angular coordinate map, at one
/// resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct HypersurfaceState {
    resolution: Resolution,
    j: SpinWeighted<2>,
    coordinates: AngularCoordinates,
}

impl HypersurfaceState {
    /// Flat data (`J = 0`) on the native grid.
    pub fn new(resolution: Resolution) -> Result<Self, SpectralError> {
        resolution.validate()?;
        Ok(Self {
            resolution,
            j: SpinWeighted::zeros(resolution.number_of_volume_points()),
            coordinates: AngularCoordinates::native(resolution.l_max)?,
        })
    }

    /// Wraps an existing field and map, e.g. a state restored from disk.
    pub fn from_parts(
        resolution: Resolution,
        j: SpinWeighted<2>,
        coordinates: AngularCoordinates,
    ) -> Result<Self, SpectralError> {
        let mut state = Self::new(resolution)?;
        state.commit(j.into_vec(), coordinates)?;
        Ok(state)
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn j(&self) -> &SpinWeighted<2> {
        &self.j
    }

    /// The shell at radial index `index`; index 0 is the worldtube.
    pub fn shell(&self, index: usize) -> &[Complex64] {
        self.j.shell(index, self.resolution.number_of_angular_points())
    }

    pub fn coordinates(&self) -> &AngularCoordinates {
        &self.coordinates
    }

    /// Replaces `J` and the map together after checking their sizes.
    pub(crate) fn commit(
        &mut self,
        j: Vec<Complex64>,
        coordinates: AngularCoordinates,
    ) -> Result<(), SpectralError> {
        let expected = self.resolution.number_of_volume_points();
        if j.len() != expected {
            return Err(SpectralError::SizeMismatch {
                expected,
                got: j.len(),
            });
        }
        if coordinates.l_max() != self.resolution.l_max {
            return Err(SpectralError::SizeMismatch {
                expected: self.resolution.number_of_angular_points(),
                got: coordinates.len(),
            });
        }
        self.j = SpinWeighted::from_vec(j);
        self.coordinates = coordinates;
        Ok(())
    }
}

/// Runs `strategy` on `state`.  The state is only written when the strategy
/// succeeds.
#[instrument(skip_all, fields(strategy = strategy.name()))]
pub fn initialize_first_hypersurface(
    state: &mut HypersurfaceState,
    strategy: &InitialDataStrategy,
    boundary: &BoundaryData<'_>,
    sources: &InitialDataSources<'_>,
) -> CceResult<GenerationReport> {
    let report = strategy.generate(state, boundary, sources)?;
    info!(
        max_abs_j = state.j.max_abs(),
        angular_iterations = report.angular.as_ref().map_or(0, |a| a.iterations()),
        "first hypersurface ready"
    );
    Ok(report)
}

/// Moves an initialisation-resolution state onto the main-run resolution.
///
/// `J` is resampled in angle and interpolated in `y`; the Cartesian
/// components of the map are resampled as spin-0 fields, renormalised and
/// the angles re-derived from them.
pub fn hand_off_to_main_run(
    state: &HypersurfaceState,
    to: Resolution,
) -> CceResult<HypersurfaceState> {
    let from = state.resolution;
    to.validate()?;
    let j = resample_volume(state.j.data(), 2, from, to)?;

    let [x, y, z] = state.coordinates.cartesian().map(|component| {
        let values: Vec<Complex64> = component.iter().map(|&v| Complex64::new(v, 0.0)).collect();
        resample(&values, 0, from.l_max, to.l_max)
            .map(|resampled| resampled.into_iter().map(|v| v.re).collect::<Vec<f64>>())
    });
    let coordinates = AngularCoordinates::from_cartesian(to.l_max, x?, y?, z?)?;
    info!(
        from_l_max = from.l_max,
        to_l_max = to.l_max,
        to_radial = to.number_of_radial_points,
        "handed first hypersurface to main run"
    );
    Ok(HypersurfaceState {
        resolution: to,
        j: SpinWeighted::from_vec(j),
        coordinates,
    })
}
