// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Fixed-point searches for angular coordinate maps.
//!
//! The conformal-factor search integrates the squared target along the
//! polar direction in each sweep, which fixes the polar angle of every
//! point through `1 - cos θ̂ = ∫ Ω² d(-cos θ)`, and then compares the
//! conformal factor of the resulting map with the target sampled at the
//! mapped positions.  The surface-strain search instead displaces the map
//! until a given `J` vanishes after the gauge transformation.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::field::SpinWeighted;
use crate::gauge::{dyad_component, AngularCoordinates, GaugeJacobian};
use crate::spectral::{cached_grid, indefinite_integral, inverse_eth, SpectralError};

/// Pointwise error beyond which the iteration is abandoned.
pub const DIVERGENCE_BOUND: f64 = 2.0;
/// Largest transformed surface strain `|Ĵ|` the scri solve tolerates.
pub const SCRI_DIVERGENCE_BOUND: f64 = 1.0;

/// Errors raised by the angular solve.
#[derive(Debug, Error)]
pub enum AngularSolveError {
    #[error(
        "angular coordinate solve diverged at iteration {iteration} (max error {max_error:e}); \
         a different initial-data strategy is required"
    )]
    Divergence { iteration: usize, max_error: f64 },
    #[error("angular coordinate solve stopped after {iterations} iterations with max error {max_error:e}")]
    NotConverged { iterations: usize, max_error: f64 },
    #[error(transparent)]
    Spectral(#[from] SpectralError),
}

/// Controls for [`adjust_angular_coordinates_for_omega`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AngularSolverSettings {
    pub tolerance: f64,
    /// The sweep count may exceed this by one before the solve stops.
    pub max_iterations: usize,
    /// Turn a capped, non-converged solve into [`AngularSolveError::NotConverged`].
    pub require_convergence: bool,
    /// Transform every radial shell of the field instead of the innermost one.
    pub adjust_volume_gauge: bool,
}

impl Default for AngularSolverSettings {
    fn default() -> Self {
        Self {
            tolerance: 1.0e-10,
            max_iterations: 100,
            require_convergence: false,
            adjust_volume_gauge: true,
        }
    }
}

impl AngularSolverSettings {
    /// Defaults of the surface-strain solve that follows the radial ψ0
    /// construction.
    pub fn scri_strain() -> Self {
        Self {
            tolerance: 1.0e-14,
            max_iterations: 1000,
            ..Self::default()
        }
    }
}

/// Error measurement of one sweep.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceRecord {
    pub iteration: usize,
    pub max_error: f64,
}

/// Outcome of a solve.
#[derive(Clone, Debug)]
pub struct AngularSolveReport {
    pub coordinates: AngularCoordinates,
    pub jacobian: GaugeJacobian,
    pub omega: SpinWeighted<0>,
    pub history: Vec<ConvergenceRecord>,
    pub converged: bool,
}

impl AngularSolveReport {
    pub fn iterations(&self) -> usize {
        self.history.len()
    }

    pub fn max_error(&self) -> f64 {
        self.history.last().map_or(0.0, |record| record.max_error)
    }
}

fn max_pointwise_error(a: &[Complex64], b: &[Complex64]) -> f64 {
    // NaN propagates into the bound check
    a.iter()
        .zip(b)
        .map(|(a, b)| (a - b).norm())
        .fold(0.0_f64, |acc, e| if e.is_nan() || acc.is_nan() { f64::NAN } else { acc.max(e) })
}

fn check_volume(volume_j: &SpinWeighted<2>, angular: usize) -> Result<(), SpectralError> {
    if volume_j.is_empty() || volume_j.len() % angular != 0 {
        return Err(SpectralError::SizeMismatch {
            expected: angular * volume_j.number_of_shells(angular).max(1),
            got: volume_j.len(),
        });
    }
    Ok(())
}

/// Searches for a map whose conformal factor matches `target_omega` and
/// gauge-transforms `volume_j` into it.
///
/// `volume_j` is radial-major; only its innermost shell is touched unless
/// `adjust_volume_gauge` is set.  The field is left unchanged on every
/// error path.
pub fn adjust_angular_coordinates_for_omega(
    volume_j: &mut SpinWeighted<2>,
    target_omega: &SpinWeighted<0>,
    l_max: usize,
    settings: &AngularSolverSettings,
) -> Result<AngularSolveReport, AngularSolveError> {
    let grid = cached_grid(l_max)?;
    let angular = grid.len();
    target_omega.expect_len(angular)?;
    check_volume(volume_j, angular)?;

    let mesh = grid.mesh();
    let mut coordinates = AngularCoordinates::native(l_max)?;
    let mut interpolated_target = target_omega.data().to_vec();
    let mut history = Vec::new();
    let mut converged = false;
    let (jacobian, omega) = loop {
        let iteration = history.len() + 1;
        let integrand: Vec<Complex64> = interpolated_target.iter().map(|w| w * w).collect();
        let integral = indefinite_integral(&integrand, mesh, 1)?;
        let theta: Vec<f64> = integral
            .iter()
            .map(|i| (1.0 - i.re).clamp(-1.0, 1.0).acos())
            .collect();
        coordinates.set_theta(&theta)?;

        let jacobian = GaugeJacobian::from_coordinates(&coordinates)?;
        let omega = jacobian.conformal_factor();
        interpolated_target = coordinates.interpolator()?.interpolate(target_omega.data(), 0)?;
        let max_error = max_pointwise_error(omega.data(), &interpolated_target);
        history.push(ConvergenceRecord {
            iteration,
            max_error,
        });
        debug!(iteration, max_error, "angular coordinate sweep");

        if !(max_error <= DIVERGENCE_BOUND) {
            return Err(AngularSolveError::Divergence {
                iteration,
                max_error,
            });
        }
        if max_error < settings.tolerance {
            converged = true;
            break (jacobian, omega);
        }
        if iteration > settings.max_iterations {
            break (jacobian, omega);
        }
    };

    finish(
        volume_j,
        Solved {
            coordinates,
            jacobian,
            omega,
            history,
            converged,
        },
        settings,
    )
}

/// Searches for a map in which `surface_j` (usually `J` at scri) vanishes
/// and gauge-transforms `volume_j` into it.
///
/// Each sweep measures the transformed surface field `Ĵ` and displaces the
/// map by the spin-1 field `ξ` with `ð ξ = Ĵ`, which cancels `Ĵ` to linear
/// order.  Shells, settings and error paths behave as in
/// [`adjust_angular_coordinates_for_omega`]; a residual above
/// [`SCRI_DIVERGENCE_BOUND`] is reported as divergence.
pub fn adjust_angular_coordinates_for_j(
    volume_j: &mut SpinWeighted<2>,
    surface_j: &SpinWeighted<2>,
    l_max: usize,
    settings: &AngularSolverSettings,
) -> Result<AngularSolveReport, AngularSolveError> {
    let angular = cached_grid(l_max)?.len();
    surface_j.expect_len(angular)?;
    check_volume(volume_j, angular)?;

    let zero = vec![Complex64::new(0.0, 0.0); angular];
    let mut coordinates = AngularCoordinates::native(l_max)?;
    let mut history = Vec::new();
    let mut converged = false;
    let (jacobian, omega) = loop {
        let iteration = history.len() + 1;
        let jacobian = GaugeJacobian::from_coordinates(&coordinates)?;
        let omega = jacobian.conformal_factor();
        let mapped = coordinates.interpolator()?.interpolate(surface_j.data(), 2)?;
        let residual = jacobian.gauge_transform_j(&mapped, &omega)?;
        let max_error = max_pointwise_error(&residual, &zero);
        history.push(ConvergenceRecord {
            iteration,
            max_error,
        });
        debug!(iteration, max_error, "scri strain sweep");

        if !(max_error <= SCRI_DIVERGENCE_BOUND) {
            return Err(AngularSolveError::Divergence {
                iteration,
                max_error,
            });
        }
        if max_error < settings.tolerance {
            converged = true;
            break (jacobian, omega);
        }
        if iteration > settings.max_iterations {
            break (jacobian, omega);
        }

        let xi = inverse_eth(&residual, 2, l_max)?;
        let [x, y, z] = coordinates.cartesian();
        let mut moved = [x.to_vec(), y.to_vec(), z.to_vec()];
        for (i, xi) in xi.iter().enumerate() {
            let (theta, phi) = (coordinates.theta()[i], coordinates.phi()[i]);
            for (axis, component) in moved.iter_mut().enumerate() {
                component[i] += (xi.conj() * dyad_component(axis, theta, phi)).re;
            }
        }
        let [x, y, z] = moved;
        coordinates = AngularCoordinates::from_cartesian(l_max, x, y, z)?;
    };

    finish(
        volume_j,
        Solved {
            coordinates,
            jacobian,
            omega,
            history,
            converged,
        },
        settings,
    )
}

struct Solved {
    coordinates: AngularCoordinates,
    jacobian: GaugeJacobian,
    omega: SpinWeighted<0>,
    history: Vec<ConvergenceRecord>,
    converged: bool,
}

/// Applies the convergence policy, then transforms the requested shells.
fn finish(
    volume_j: &mut SpinWeighted<2>,
    solved: Solved,
    settings: &AngularSolverSettings,
) -> Result<AngularSolveReport, AngularSolveError> {
    let Solved {
        coordinates,
        jacobian,
        omega,
        history,
        converged,
    } = solved;
    let max_error = history.last().map_or(0.0, |record| record.max_error);
    if converged {
        info!(
            iterations = history.len(),
            max_error, "angular coordinate solve converged"
        );
    } else {
        warn!(
            iterations = history.len(),
            max_error,
            tolerance = settings.tolerance,
            "angular coordinate solve did not reach tolerance"
        );
        if settings.require_convergence {
            return Err(AngularSolveError::NotConverged {
                iterations: history.len(),
                max_error,
            });
        }
    }

    let angular = coordinates.len();
    let interpolator = coordinates.interpolator()?;
    let shells = if settings.adjust_volume_gauge {
        volume_j.number_of_shells(angular)
    } else {
        1
    };
    let mut transformed = Vec::with_capacity(shells);
    for shell in 0..shells {
        let j = interpolator.interpolate(volume_j.shell(shell, angular), 2)?;
        transformed.push(jacobian.gauge_transform_j(&j, &omega)?);
    }
    for (shell, values) in transformed.into_iter().enumerate() {
        volume_j.shell_mut(shell, angular).copy_from_slice(&values);
    }

    Ok(AngularSolveReport {
        coordinates,
        jacobian,
        omega,
        history,
        converged,
    })
}
