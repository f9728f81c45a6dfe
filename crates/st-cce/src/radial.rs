// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Radial construction of `J` from a prescribed ψ0 on the first null
//! hypersurface.
//!
//! With `I = ∂y J` the ψ0 condition becomes a first-order system in the
//! compactified coordinate `y ∈ [-1, 1]`, integrated at every angular point
//! from the worldtube (`y = -1`) to scri (`y = 1`):
//!
//! ```text
//! ∂y J = I
//! ∂y I = ½ (ψ̄0 J² / (2 + J J̄ + 2 √(1 + J J̄)) + ψ0)
//!        - (1/16) ((Ī J)² + (J̄ I)² - 2 I Ī (2 + J J̄)) (4 J + I (1 - y)) / (1 + J J̄)
//! ```

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::field::transpose;
use crate::interpolation::{
    finite_difference_derivative, span_start, BarycentricRational, InterpolationError,
    DEFAULT_RATIONAL_ORDER,
};
use crate::ode::{DenseDopri5, IntegrationError, StepperSettings};
use crate::spectral::{radial_collocation_points, SpectralError, MIN_RADIAL_POINTS};

/// Scale below which `J` or `∂y J` is treated as vanishing when picking the
/// first step.
const SCALE_FLOOR: f64 = 1.0e-5;
const FALLBACK_INITIAL_STEP: f64 = 1.0e-6;

#[derive(Debug, Error)]
pub enum RadialError {
    #[error(
        "radial integration cannot reach collocation point y = {target}: \
         accepted step covers [{start}, {end}]"
    )]
    Bracketing { target: f64, start: f64, end: f64 },
    #[error("target archive index {index} out of range for {count} radii")]
    TargetIndex { index: usize, count: usize },
    #[error(transparent)]
    Integration(#[from] IntegrationError),
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
    #[error(transparent)]
    Spectral(#[from] SpectralError),
}

/// Integrator and interpolator controls of the radial construction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadialSettings {
    pub stepper: StepperSettings,
    /// Blending order of the rational fit used for `∂r² J`.
    pub interpolation_order: usize,
}

impl Default for RadialSettings {
    fn default() -> Self {
        Self {
            stepper: StepperSettings::default(),
            interpolation_order: DEFAULT_RATIONAL_ORDER,
        }
    }
}

/// Diagnostics of one radial construction.
#[derive(Clone, Debug, PartialEq)]
pub struct RadialReport {
    pub initial_step: f64,
    pub accepted_steps: usize,
    pub collocation_points: Vec<f64>,
}

/// First trial step `0.01 · max|J| / max|∂y J|`, or `1e-6` when either
/// scale is negligible.
pub fn initial_radial_step(j: &[Complex64], dy_j: &[Complex64]) -> f64 {
    let j_scale = j.iter().fold(0.0_f64, |acc, v| acc.max(v.norm()));
    let dy_j_scale = dy_j.iter().fold(0.0_f64, |acc, v| acc.max(v.norm()));
    if j_scale > SCALE_FLOOR && dy_j_scale > SCALE_FLOOR {
        0.01 * j_scale / dy_j_scale
    } else {
        FALLBACK_INITIAL_STEP
    }
}

fn psi0_condition(
    y: f64,
    state: &[Complex64],
    derivative: &mut [Complex64],
    psi0: &[Complex64],
) {
    let n = psi0.len();
    let (j, i) = state.split_at(n);
    let (dj, di) = derivative.split_at_mut(n);
    dj.copy_from_slice(i);
    for p in 0..n {
        let (j, i, psi) = (j[p], i[p], psi0[p]);
        let jj = j.norm_sqr();
        let source = 0.5 * (psi.conj() * j * j / (2.0 + jj + 2.0 * (1.0 + jj).sqrt()) + psi);
        let i_bar_j = i.conj() * j;
        let j_bar_i = j.conj() * i;
        let quadratic = i_bar_j * i_bar_j + j_bar_i * j_bar_i - 2.0 * i.norm_sqr() * (2.0 + jj);
        di[p] = source - 0.0625 * quadratic * (4.0 * j + i * (1.0 - y)) / (1.0 + jj);
    }
}

/// Integrates the ψ0 condition from the worldtube values and writes `J` at
/// every Gauss–Lobatto point into `volume_j` (radial-major, shell `k` at
/// offset `k * angular`).
///
/// `boundary_dr_j` is the areal-radius derivative; the seed is
/// `∂y J = ½ R ∂r J`.  `volume_j` is only written once every collocation
/// point has been reached.
pub fn radial_evolve_psi0_condition(
    volume_j: &mut [Complex64],
    boundary_j: &[Complex64],
    boundary_dr_j: &[Complex64],
    psi0: &[Complex64],
    r: &[f64],
    number_of_radial_points: usize,
    settings: &RadialSettings,
) -> Result<RadialReport, RadialError> {
    let angular = boundary_j.len();
    for len in [boundary_dr_j.len(), psi0.len(), r.len()] {
        if len != angular {
            return Err(SpectralError::SizeMismatch {
                expected: angular,
                got: len,
            }
            .into());
        }
    }
    if number_of_radial_points < MIN_RADIAL_POINTS {
        return Err(SpectralError::TooFewRadialPoints {
            got: number_of_radial_points,
            min: MIN_RADIAL_POINTS,
        }
        .into());
    }
    if volume_j.len() != angular * number_of_radial_points {
        return Err(SpectralError::SizeMismatch {
            expected: angular * number_of_radial_points,
            got: volume_j.len(),
        }
        .into());
    }

    let dy_j: Vec<Complex64> = boundary_dr_j
        .iter()
        .zip(r)
        .map(|(&dr_j, &r)| 0.5 * r * dr_j)
        .collect();
    let initial_step = initial_radial_step(boundary_j, &dy_j);
    let mut state = boundary_j.to_vec();
    state.extend_from_slice(&dy_j);

    let mut system = |y: f64, state: &[Complex64], derivative: &mut [Complex64]| {
        psi0_condition(y, state, derivative, psi0)
    };
    let mut stepper = DenseDopri5::new(settings.stepper);
    stepper.initialize(&mut system, -1.0, 1.0, state, initial_step)?;

    let targets = radial_collocation_points(number_of_radial_points)?;
    let mut profile = vec![Complex64::new(0.0, 0.0); volume_j.len()];
    let mut buffer = vec![Complex64::new(0.0, 0.0); 2 * angular];
    let mut accepted_steps = 0;
    let mut range = stepper.step_range();
    for (index, &target) in targets.iter().enumerate() {
        while range.1 < target {
            range = stepper.do_step(&mut system)?;
            accepted_steps += 1;
        }
        if !(range.0 <= target && target <= range.1) {
            return Err(RadialError::Bracketing {
                target,
                start: range.0,
                end: range.1,
            });
        }
        stepper.calc_state(target, &mut buffer)?;
        profile[index * angular..(index + 1) * angular].copy_from_slice(&buffer[..angular]);
    }
    volume_j.copy_from_slice(&profile);
    debug!(
        initial_step,
        accepted_steps,
        radial_points = number_of_radial_points,
        "radial psi0 integration finished"
    );

    Ok(RadialReport {
        initial_step,
        accepted_steps,
        collocation_points: targets,
    })
}

/// Estimates `∂r² J` at the radius of archive `target_index` from `∂r J`
/// sampled at every archive radius.
///
/// `dr_j` and `r` are archive-major (`archive * angular + point`).  At every
/// angular point the `order + 1` radii nearest the target (in radial order)
/// carry a Floater–Hormann rational fit in `r`, which is differentiated with
/// a sixth-order central difference; real and imaginary parts are handled
/// independently.
pub fn second_derivative_from_worldtubes(
    dr_j: &[Complex64],
    r: &[f64],
    angular: usize,
    target_index: usize,
    order: usize,
) -> Result<Vec<Complex64>, RadialError> {
    if angular == 0 || dr_j.len() % angular != 0 || r.len() != dr_j.len() {
        return Err(SpectralError::SizeMismatch {
            expected: dr_j.len(),
            got: r.len(),
        }
        .into());
    }
    let radii = dr_j.len() / angular;
    if target_index >= radii {
        return Err(RadialError::TargetIndex {
            index: target_index,
            count: radii,
        });
    }
    let r_by_point = transpose(r, angular, radii);
    let dr_j_by_point = transpose(dr_j, angular, radii);

    let mut out = Vec::with_capacity(angular);
    for point in 0..angular {
        let radius = &r_by_point[point * radii..(point + 1) * radii];
        let samples = &dr_j_by_point[point * radii..(point + 1) * radii];
        let mut sorted: Vec<usize> = (0..radii).collect();
        sorted.sort_by(|&a, &b| radius[a].total_cmp(&radius[b]));
        let position = sorted.iter().position(|&i| i == target_index).unwrap_or(0);
        let start = span_start(radii, position, order + 1);
        let span = &sorted[start..(start + order + 1).min(radii)];

        let nodes: Vec<f64> = span.iter().map(|&i| radius[i]).collect();
        let real: Vec<f64> = span.iter().map(|&i| samples[i].re).collect();
        let imag: Vec<f64> = span.iter().map(|&i| samples[i].im).collect();
        let real_fit = BarycentricRational::new(&nodes, &real, order)?;
        let imag_fit = BarycentricRational::new(&nodes, &imag, order)?;
        let at = radius[target_index];
        out.push(Complex64::new(
            finite_difference_derivative(|x| real_fit.evaluate(x), at),
            finite_difference_derivative(|x| imag_fit.evaluate(x), at),
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn constant_profile_without_sources() {
        let j = vec![Complex64::new(0.02, -0.01), Complex64::new(0.0, 0.03), Complex64::new(0.0, 0.0)];
        let zero = vec![Complex64::new(0.0, 0.0); 3];
        let r = vec![100.0; 3];
        let mut volume = vec![Complex64::new(9.0, 9.0); 3 * 5];
        let report = radial_evolve_psi0_condition(&mut volume, &j, &zero, &zero, &r, 5, &RadialSettings::default())
            .unwrap();
        assert_eq!(report.initial_step, FALLBACK_INITIAL_STEP);
        for shell in volume.chunks(3) {
            for (a, b) in shell.iter().zip(&j) {
                assert_abs_diff_eq!((a - b).norm(), 0.0, epsilon = 1e-13);
            }
        }
    }

    #[test]
    fn linear_profile_for_vanishing_j() {
        // J = c (1 + y) solves the system up to terms cubic in c
        let j = vec![Complex64::new(0.0, 0.0)];
        let dr_j = vec![Complex64::new(2.0e-9, 0.0)];
        let psi0 = vec![Complex64::new(0.0, 0.0)];
        let r = vec![1.0];
        let mut volume = vec![Complex64::new(0.0, 0.0); 4];
        radial_evolve_psi0_condition(&mut volume, &j, &dr_j, &psi0, &r, 4, &RadialSettings::default()).unwrap();
        let ys = radial_collocation_points(4).unwrap();
        for (value, y) in volume.iter().zip(&ys) {
            assert_abs_diff_eq!(value.re, 1.0e-9 * (y + 1.0), epsilon = 1e-15);
        }
    }

    #[test]
    fn initial_step_follows_scales() {
        let j = [Complex64::new(0.5, 0.0)];
        let dy = [Complex64::new(0.0, 2.0)];
        assert_abs_diff_eq!(initial_radial_step(&j, &dy), 0.0025, epsilon = 1e-16);
        assert_eq!(initial_radial_step(&j, &[Complex64::new(1e-7, 0.0)]), FALLBACK_INITIAL_STEP);
    }

    #[test]
    fn distant_worldtubes_do_not_enter_the_fit() {
        // ∂r J = r² near the target, wildly different at the outer radii
        let radii = [400.0, 60.0, 80.0, 100.0, 120.0, 140.0, 900.0, 2000.0];
        let r: Vec<f64> = radii.to_vec();
        let dr_j: Vec<Complex64> = radii
            .iter()
            .map(|&radius| {
                let value = if radius > 200.0 { 1.0e6 * radius.sin() } else { radius * radius };
                Complex64::new(value, -0.5 * value)
            })
            .collect();
        let second = second_derivative_from_worldtubes(&dr_j, &r, 1, 3, 4).unwrap();
        assert_abs_diff_eq!(second[0].re, 200.0, epsilon = 1e-7);
        assert_abs_diff_eq!(second[0].im, -100.0, epsilon = 1e-7);
    }

    #[test]
    fn second_derivative_of_polynomial_profile() {
        // ∂r J = a r² at three angular points, five radii
        let angular = 3;
        let radii = [80.0, 100.0, 120.0, 150.0, 200.0];
        let amplitude = [Complex64::new(1e-4, 2e-4), Complex64::new(-3e-4, 0.0), Complex64::new(0.0, 5e-5)];
        let mut r = Vec::new();
        let mut dr_j = Vec::new();
        for &radius in &radii {
            for a in &amplitude {
                r.push(radius);
                dr_j.push(*a * radius * radius);
            }
        }
        let second = second_derivative_from_worldtubes(&dr_j, &r, angular, 1, 4).unwrap();
        for (value, a) in second.iter().zip(&amplitude) {
            let expected = *a * 2.0 * 100.0;
            assert_abs_diff_eq!((value - expected).norm(), 0.0, epsilon = 1e-9);
        }
        assert!(matches!(
            second_derivative_from_worldtubes(&dr_j, &r, angular, 5, 4),
            Err(RadialError::TargetIndex { index: 5, count: 5 })
        ));
    }
}
