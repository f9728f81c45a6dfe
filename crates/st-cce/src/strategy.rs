// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Initial-data generators for the first hypersurface.
//!
//! Every generator fills `J` on all radial shells of the hypersurface and
//! fixes the angular coordinate map:
//! - `inverse_cubic`: `J = A (1 - y) + B (1 - y)³` tuned so that `β` falls
//!   off asymptotically, on the native grid.
//! - `conformal_factor`: solve for a map with `Ω = exp(2β)` on the worldtube
//!   and continue `J` linearly in `1 - y`.
//! - `radial_psi0`: sample several worldtube archives, build ψ0 at the
//!   reference radius, integrate the ψ0 condition out to scri and then
//!   pick the map in which `J` vanishes at scri.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::angular_solver::{
    adjust_angular_coordinates_for_j, adjust_angular_coordinates_for_omega, AngularSolveReport,
    AngularSolverSettings,
};
use crate::archive::{
    read_in_worldtube_data, ArchiveError, MultiArchiveBuffers, ResampleReport, ResampledArchive,
    WorldtubeArchive,
};
use crate::error::CceResult;
use crate::field::SpinWeighted;
use crate::gauge::AngularCoordinates;
use crate::hypersurface::HypersurfaceState;
use crate::radial::{
    radial_evolve_psi0_condition, second_derivative_from_worldtubes, RadialReport, RadialSettings,
};
use crate::spectral::{radial_collocation_points, SpectralError};
use crate::weyl;

/// Reference-point value of `1 - y` at the worldtube.
const WORLDTUBE_ONE_MINUS_Y: f64 = 2.0;

/// Worldtube values at the active band limit, one sample per angular point.
#[derive(Clone, Copy, Debug)]
pub struct BoundaryData<'a> {
    pub j: &'a [Complex64],
    pub dr_j: &'a [Complex64],
    /// Bondi areal radius `R`.
    pub r: &'a [f64],
    pub beta: &'a [Complex64],
}

impl BoundaryData<'_> {
    pub fn validate(&self, angular: usize) -> Result<(), SpectralError> {
        for len in [self.j.len(), self.dr_j.len(), self.r.len(), self.beta.len()] {
            if len != angular {
                return Err(SpectralError::SizeMismatch {
                    expected: angular,
                    got: len,
                });
            }
        }
        Ok(())
    }
}

/// External data only some generators need.
#[derive(Clone, Copy, Default)]
pub struct InitialDataSources<'a> {
    pub archives: &'a [&'a dyn WorldtubeArchive],
}

/// Selectable initial-data generator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InitialDataStrategy {
    InverseCubic,
    ConformalFactor {
        #[serde(default)]
        solver: AngularSolverSettings,
    },
    RadialPsi0 {
        target_index: usize,
        target_time: f64,
        #[serde(default)]
        radial: RadialSettings,
        #[serde(default = "AngularSolverSettings::scri_strain")]
        solver: AngularSolverSettings,
    },
}

impl Default for InitialDataStrategy {
    fn default() -> Self {
        Self::InverseCubic
    }
}

/// What a generator did besides writing the hypersurface.
#[derive(Clone, Debug, Default)]
pub struct GenerationReport {
    pub angular: Option<AngularSolveReport>,
    pub radial: Option<RadialReport>,
    pub samples: Vec<ResampleReport>,
}

impl InitialDataStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::InverseCubic => "inverse_cubic",
            Self::ConformalFactor { .. } => "conformal_factor",
            Self::RadialPsi0 { .. } => "radial_psi0",
        }
    }

    /// Writes `J` and the coordinate map into `state`.  On error the state
    /// is left as it was.
    pub fn generate(
        &self,
        state: &mut HypersurfaceState,
        boundary: &BoundaryData<'_>,
        sources: &InitialDataSources<'_>,
    ) -> CceResult<GenerationReport> {
        let resolution = state.resolution();
        let angular = resolution.number_of_angular_points();
        info!(strategy = self.name(), l_max = resolution.l_max, "generating first hypersurface");
        match self {
            Self::InverseCubic => {
                boundary.validate(angular)?;
                let one_minus_y = one_minus_y(resolution.number_of_radial_points)?;
                let j = inverse_cubic(boundary.j, boundary.beta, &one_minus_y);
                state.commit(j, AngularCoordinates::native(resolution.l_max)?)?;
                Ok(GenerationReport::default())
            }
            Self::ConformalFactor { solver } => {
                boundary.validate(angular)?;
                let target: SpinWeighted<0> = boundary
                    .beta
                    .iter()
                    .map(|&beta| (2.0 * beta).exp())
                    .collect::<Vec<_>>()
                    .into();
                let mut shell = SpinWeighted::<2>::from_vec(boundary.j.to_vec());
                let report =
                    adjust_angular_coordinates_for_omega(&mut shell, &target, resolution.l_max, solver)?;
                let one_minus_y = one_minus_y(resolution.number_of_radial_points)?;
                let mut j = Vec::with_capacity(resolution.number_of_volume_points());
                for &factor in &one_minus_y {
                    j.extend(shell.data().iter().map(|&v| 0.5 * factor * v));
                }
                state.commit(j, report.coordinates.clone())?;
                Ok(GenerationReport {
                    angular: Some(report),
                    ..GenerationReport::default()
                })
            }
            Self::RadialPsi0 {
                target_index,
                target_time,
                radial,
                solver,
            } => {
                if sources.archives.len() < 2 {
                    return Err(ArchiveError::TooFewArchives {
                        got: sources.archives.len(),
                        min: 2,
                    }
                    .into());
                }
                let resampled: Vec<ResampledArchive<'_>> = sources
                    .archives
                    .iter()
                    .map(|archive| ResampledArchive::new(*archive, resolution.l_max))
                    .collect();
                let views: Vec<&dyn WorldtubeArchive> = resampled
                    .iter()
                    .map(|archive| archive as &dyn WorldtubeArchive)
                    .collect();
                let mut buffers = MultiArchiveBuffers::new(views.len(), resolution.l_max);
                read_in_worldtube_data(
                    &mut buffers,
                    &views,
                    resolution.l_max,
                    *target_index,
                    *target_time,
                )?;
                let dr_dr_j = second_derivative_from_worldtubes(
                    &buffers.dr_j,
                    &buffers.r,
                    angular,
                    *target_index,
                    radial.interpolation_order,
                )?;

                let j = buffers.j(*target_index);
                let dr_j = buffers.dr_j(*target_index);
                let r = buffers.r(*target_index);
                let dy_j: Vec<Complex64> =
                    dr_j.iter().zip(r).map(|(&d, &r)| 0.5 * r * d).collect();
                let dy_dy_j: Vec<Complex64> = dr_j
                    .iter()
                    .zip(&dr_dr_j)
                    .zip(r)
                    .map(|((&d, &dd), &r)| 0.5 * r * d + 0.25 * r * r * dd)
                    .collect();
                let psi0 = weyl::psi0(j, &dy_j, &dy_dy_j, r, WORLDTUBE_ONE_MINUS_Y)?;

                let mut volume = vec![Complex64::new(0.0, 0.0); resolution.number_of_volume_points()];
                let report = radial_evolve_psi0_condition(
                    &mut volume,
                    j,
                    dr_j,
                    &psi0,
                    r,
                    resolution.number_of_radial_points,
                    radial,
                )?;

                let mut volume = SpinWeighted::<2>::from_vec(volume);
                let scri = resolution.number_of_radial_points.saturating_sub(1);
                let surface = SpinWeighted::<2>::from_vec(volume.shell(scri, angular).to_vec());
                let angular_report =
                    adjust_angular_coordinates_for_j(&mut volume, &surface, resolution.l_max, solver)?;
                state.commit(volume.into_vec(), angular_report.coordinates.clone())?;
                Ok(GenerationReport {
                    angular: Some(angular_report),
                    radial: Some(report),
                    samples: buffers.samples,
                })
            }
        }
    }
}

fn one_minus_y(number_of_radial_points: usize) -> Result<Vec<f64>, SpectralError> {
    Ok(radial_collocation_points(number_of_radial_points)?
        .into_iter()
        .map(|y| 1.0 - y)
        .collect())
}

/// `A (1 - y) + B (1 - y)³` with `A = J √(-4β / |J|²)` and
/// `B = (J - 2A) / 8`, which matches `J` at the worldtube.
fn inverse_cubic(j: &[Complex64], beta: &[Complex64], one_minus_y: &[f64]) -> Vec<Complex64> {
    let coefficients: Vec<(Complex64, Complex64)> = j
        .iter()
        .zip(beta)
        .map(|(&j, &beta)| {
            let magnitude = j.norm_sqr();
            let linear = if magnitude > f64::MIN_POSITIVE {
                j * (-4.0 * beta / magnitude).sqrt()
            } else {
                0.5 * j
            };
            (linear, 0.125 * (j - 2.0 * linear))
        })
        .collect();
    let mut out = Vec::with_capacity(j.len() * one_minus_y.len());
    for &x in one_minus_y {
        out.extend(coefficients.iter().map(|&(a, b)| a * x + b * x.powi(3)));
    }
    out
}
