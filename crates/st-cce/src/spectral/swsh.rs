// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Spin-weighted spherical harmonics on the Gauss–Legendre × equiangular
//! collocation grid.
//!
//! Harmonics follow the Goldberg convention.  They are evaluated through
//! the Wigner `d` functions,
//! `sY_lm(θ, φ) = (-1)^l √((2l+1)/4π) d^l_{s,m}(π - θ) e^{imφ}`,
//! with the `d` functions advanced by their three-term recurrence in `l`
//! so that the explicit alternating sum never has to be formed.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use num_complex::Complex64;

use super::collocation::{gauss_legendre, Mesh2};
use super::{check_l_max, SpectralError};

pub fn number_of_swsh_theta_collocation_points(l_max: usize) -> usize {
    l_max + 1
}

pub fn number_of_swsh_phi_collocation_points(l_max: usize) -> usize {
    2 * l_max + 1
}

/// Total angular sample count at band limit `l_max`.
pub fn number_of_swsh_collocation_points(l_max: usize) -> usize {
    number_of_swsh_theta_collocation_points(l_max) * number_of_swsh_phi_collocation_points(l_max)
}

/// Number of `(l, m)` modes of spin `spin` with `|spin| <= l <= l_max`.
pub fn number_of_modes(l_max: usize, spin: i32) -> usize {
    let s = spin.unsigned_abs() as usize;
    (l_max + 1).pow(2).saturating_sub(s * s)
}

/// One angular collocation point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CollocationPoint {
    pub offset: usize,
    pub theta: f64,
    pub phi: f64,
}

/// Collocation metadata for one band limit.
///
/// Offsets run `phi_index + theta_index * n_phi`, so azimuth varies fastest.
#[derive(Clone, Debug)]
pub struct SwshGrid {
    l_max: usize,
    thetas: Vec<f64>,
    phis: Vec<f64>,
    theta_weights: Vec<f64>,
}

impl SwshGrid {
    pub fn new(l_max: usize) -> Result<Self, SpectralError> {
        check_l_max(l_max)?;
        let rule = gauss_legendre(number_of_swsh_theta_collocation_points(l_max));
        let thetas = rule.nodes.iter().map(|&xi| (-xi).acos()).collect();
        let n_phi = number_of_swsh_phi_collocation_points(l_max);
        let phis = (0..n_phi)
            .map(|k| 2.0 * PI * k as f64 / n_phi as f64)
            .collect();
        Ok(Self {
            l_max,
            thetas,
            phis,
            theta_weights: rule.weights,
        })
    }

    pub fn l_max(&self) -> usize {
        self.l_max
    }

    pub fn thetas(&self) -> &[f64] {
        &self.thetas
    }

    pub fn phis(&self) -> &[f64] {
        &self.phis
    }

    pub fn n_theta(&self) -> usize {
        self.thetas.len()
    }

    pub fn n_phi(&self) -> usize {
        self.phis.len()
    }

    pub fn len(&self) -> usize {
        self.n_theta() * self.n_phi()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The (φ, θ) mesh with φ as the contiguous dimension.
    pub fn mesh(&self) -> Mesh2 {
        Mesh2::new(self.n_phi(), self.n_theta())
    }

    pub fn point(&self, offset: usize) -> CollocationPoint {
        let n_phi = self.n_phi();
        CollocationPoint {
            offset,
            theta: self.thetas[offset / n_phi],
            phi: self.phis[offset % n_phi],
        }
    }

    pub fn points(&self) -> impl Iterator<Item = CollocationPoint> + '_ {
        (0..self.len()).map(move |offset| self.point(offset))
    }

    /// Quadrature weight of `offset` for integrals over the unit sphere.
    pub fn sphere_weight(&self, offset: usize) -> f64 {
        self.theta_weights[offset / self.n_phi()] * 2.0 * PI / self.n_phi() as f64
    }
}

static GRID_CACHE: OnceLock<Mutex<HashMap<usize, Arc<SwshGrid>>>> = OnceLock::new();
static TRANSFORM_CACHE: OnceLock<Mutex<HashMap<(usize, i32), Arc<SwshTransform>>>> =
    OnceLock::new();

/// Shared collocation grid for `l_max`, built on first use.
pub fn cached_grid(l_max: usize) -> Result<Arc<SwshGrid>, SpectralError> {
    let cache = GRID_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(grid) = guard.get(&l_max) {
        return Ok(Arc::clone(grid));
    }
    let grid = Arc::new(SwshGrid::new(l_max)?);
    guard.insert(l_max, Arc::clone(&grid));
    Ok(grid)
}

/// Shared transform for `(l_max, spin)`, built on first use.
pub fn cached_transform(l_max: usize, spin: i32) -> Result<Arc<SwshTransform>, SpectralError> {
    let cache = TRANSFORM_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    if let Some(transform) = cache
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .get(&(l_max, spin))
    {
        return Ok(Arc::clone(transform));
    }
    // built outside the lock; a concurrent duplicate build is harmless
    let transform = Arc::new(SwshTransform::new(l_max, spin)?);
    let mut guard = cache.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(Arc::clone(
        guard.entry((l_max, spin)).or_insert(transform),
    ))
}

fn ln_factorial(n: i64) -> f64 {
    (2..=n).map(|k| (k as f64).ln()).sum()
}

/// `d^j_{a,b}(β)` at `j = max(|a|, |b|)` from Wigner's explicit sum, which
/// has a single non-zero term at that degree.
fn wigner_d_seed(j: i64, a: i64, b: i64, cos_half: f64, sin_half: f64) -> f64 {
    let norm = 0.5 * (ln_factorial(j + a) + ln_factorial(j - a) + ln_factorial(j + b)
        + ln_factorial(j - b));
    let lower = 0.max(b - a);
    let upper = (j + b).min(j - a);
    let mut sum = 0.0;
    for sigma in lower..=upper {
        let log_term = norm
            - ln_factorial(j + b - sigma)
            - ln_factorial(sigma)
            - ln_factorial(a - b + sigma)
            - ln_factorial(j - a - sigma);
        let sign = if (a - b + sigma).rem_euclid(2) == 0 { 1.0 } else { -1.0 };
        sum += sign
            * log_term.exp()
            * cos_half.powi((2 * j + b - a - 2 * sigma) as i32)
            * sin_half.powi((a - b + 2 * sigma) as i32);
    }
    sum
}

/// Fills `out[l]` with `(-1)^l √((2l+1)/4π) d^l_{spin,m}(π - θ)` for
/// `l <= l_max`; entries below `max(|spin|, |m|)` are zero.
fn harmonic_column(spin: i32, m: i32, l_max: usize, theta: f64, out: &mut [f64]) {
    out.iter_mut().for_each(|v| *v = 0.0);
    let a = spin as i64;
    let b = m as i64;
    let j0 = a.abs().max(b.abs());
    if j0 as usize > l_max {
        return;
    }
    let beta = PI - theta;
    let cos_beta = beta.cos();
    let (sin_half, cos_half) = (0.5 * beta).sin_cos();

    let mut previous = 0.0;
    let mut current = wigner_d_seed(j0, a, b, cos_half, sin_half);
    let ab = (a * b) as f64;
    let (a2, b2) = ((a * a) as f64, (b * b) as f64);
    for l in j0..=(l_max as i64) {
        let lf = l as f64;
        let sign = if l % 2 == 0 { 1.0 } else { -1.0 };
        out[l as usize] = sign * ((2.0 * lf + 1.0) / (4.0 * PI)).sqrt() * current;
        if l == l_max as i64 {
            break;
        }
        let next_sq = (lf + 1.0) * (lf + 1.0);
        let scale = ((next_sq - a2) * (next_sq - b2)).sqrt();
        let shift = if l == 0 { 0.0 } else { ab / (lf * (lf + 1.0)) };
        let mut next = (lf + 1.0) * (2.0 * lf + 1.0) / scale * (cos_beta - shift) * current;
        if l > 0 {
            next -= (lf + 1.0) * ((lf * lf - a2) * (lf * lf - b2)).sqrt() / (lf * scale) * previous;
        }
        previous = current;
        current = next;
    }
}

/// Single spin-weighted harmonic `sY_lm(θ, φ)`; zero outside
/// `|s| <= l`, `|m| <= l`.
pub fn spin_weighted_ylm(spin: i32, l: usize, m: i32, theta: f64, phi: f64) -> Complex64 {
    if (spin.unsigned_abs() as usize) > l || (m.unsigned_abs() as usize) > l {
        return Complex64::new(0.0, 0.0);
    }
    let mut column = vec![0.0; l + 1];
    harmonic_column(spin, m, l, theta, &mut column);
    Complex64::from_polar(column[l], m as f64 * phi)
}

/// Forward and inverse spin-weighted transforms at one band limit.
///
/// Coefficients are stored at `l² - s² + (m + l)` for `|s| <= l <= l_max`.
#[derive(Clone, Debug)]
pub struct SwshTransform {
    grid: Arc<SwshGrid>,
    spin: i32,
    // harmonics[((i * n_m) + (m + L)) * (L + 1) + l]
    harmonics: Vec<f64>,
    // phases[(m + L) * n_phi + k] = e^{i m φ_k}
    phases: Vec<Complex64>,
}

impl SwshTransform {
    pub fn new(l_max: usize, spin: i32) -> Result<Self, SpectralError> {
        let grid = cached_grid(l_max)?;
        if spin.unsigned_abs() as usize > l_max {
            return Err(SpectralError::UnsupportedSpin { spin, l_max });
        }
        let n_m = 2 * l_max + 1;
        let mut harmonics = vec![0.0; grid.n_theta() * n_m * (l_max + 1)];
        for (i, &theta) in grid.thetas().iter().enumerate() {
            for (mi, chunk) in harmonics[i * n_m * (l_max + 1)..(i + 1) * n_m * (l_max + 1)]
                .chunks_mut(l_max + 1)
                .enumerate()
            {
                harmonic_column(spin, mi as i32 - l_max as i32, l_max, theta, chunk);
            }
        }
        let mut phases = Vec::with_capacity(n_m * grid.n_phi());
        for mi in 0..n_m {
            let m = mi as f64 - l_max as f64;
            phases.extend(grid.phis().iter().map(|&phi| Complex64::from_polar(1.0, m * phi)));
        }
        Ok(Self {
            grid,
            spin,
            harmonics,
            phases,
        })
    }

    pub fn l_max(&self) -> usize {
        self.grid.l_max()
    }

    pub fn spin(&self) -> i32 {
        self.spin
    }

    pub fn grid(&self) -> &SwshGrid {
        &self.grid
    }

    pub fn number_of_modes(&self) -> usize {
        number_of_modes(self.l_max(), self.spin)
    }

    fn l_min(&self, m: i32) -> usize {
        self.spin.unsigned_abs().max(m.unsigned_abs()) as usize
    }

    pub fn mode_index(&self, l: usize, m: i32) -> usize {
        let s = self.spin.unsigned_abs() as usize;
        (l * l - s * s) + (m + l as i32) as usize
    }

    fn column(&self, theta_index: usize, m: i32) -> &[f64] {
        let l_max = self.l_max();
        let n_m = 2 * l_max + 1;
        let start = ((theta_index * n_m) + (m + l_max as i32) as usize) * (l_max + 1);
        &self.harmonics[start..start + l_max + 1]
    }

    /// Spectral coefficients of collocation values.
    pub fn forward(&self, values: &[Complex64]) -> Result<Vec<Complex64>, SpectralError> {
        let grid = &self.grid;
        if values.len() != grid.len() {
            return Err(SpectralError::SizeMismatch {
                expected: grid.len(),
                got: values.len(),
            });
        }
        let l_max = self.l_max() as i32;
        let n_phi = grid.n_phi();
        let mut coefficients = vec![Complex64::new(0.0, 0.0); self.number_of_modes()];
        for i in 0..grid.n_theta() {
            let row = &values[i * n_phi..(i + 1) * n_phi];
            let weight = grid.sphere_weight(i * n_phi);
            for m in -l_max..=l_max {
                let phases = &self.phases[(m + l_max) as usize * n_phi..][..n_phi];
                let projected: Complex64 = row
                    .iter()
                    .zip(phases)
                    .map(|(v, phase)| v * phase.conj())
                    .sum::<Complex64>()
                    * weight;
                let column = self.column(i, m);
                for l in self.l_min(m)..=self.l_max() {
                    coefficients[self.mode_index(l, m)] += projected * column[l];
                }
            }
        }
        Ok(coefficients)
    }

    /// Collocation values of spectral coefficients.
    pub fn inverse(&self, coefficients: &[Complex64]) -> Result<Vec<Complex64>, SpectralError> {
        if coefficients.len() != self.number_of_modes() {
            return Err(SpectralError::SizeMismatch {
                expected: self.number_of_modes(),
                got: coefficients.len(),
            });
        }
        let grid = &self.grid;
        let l_max = self.l_max() as i32;
        let n_phi = grid.n_phi();
        let mut values = vec![Complex64::new(0.0, 0.0); grid.len()];
        for i in 0..grid.n_theta() {
            let row = &mut values[i * n_phi..(i + 1) * n_phi];
            for m in -l_max..=l_max {
                let column = self.column(i, m);
                let amplitude: Complex64 = (self.l_min(m)..=self.l_max())
                    .map(|l| coefficients[self.mode_index(l, m)] * column[l])
                    .sum();
                if amplitude == Complex64::new(0.0, 0.0) {
                    continue;
                }
                let phases = &self.phases[(m + l_max) as usize * n_phi..][..n_phi];
                for (v, phase) in row.iter_mut().zip(phases) {
                    *v += amplitude * phase;
                }
            }
        }
        Ok(values)
    }

    /// Evaluates the expansion `coefficients` at an arbitrary point.
    pub fn evaluate(&self, coefficients: &[Complex64], theta: f64, phi: f64) -> Complex64 {
        let mut column = vec![0.0; self.l_max() + 1];
        self.evaluate_with(coefficients, theta, phi, &mut column)
    }

    fn evaluate_with(
        &self,
        coefficients: &[Complex64],
        theta: f64,
        phi: f64,
        column: &mut [f64],
    ) -> Complex64 {
        let l_max = self.l_max() as i32;
        let mut total = Complex64::new(0.0, 0.0);
        for m in -l_max..=l_max {
            harmonic_column(self.spin, m, self.l_max(), theta, column);
            let amplitude: Complex64 = (self.l_min(m)..=self.l_max())
                .map(|l| coefficients[self.mode_index(l, m)] * column[l])
                .sum();
            total += amplitude * Complex64::from_polar(1.0, m as f64 * phi);
        }
        total
    }
}

/// Maps spin-`spin` coefficients at one band limit onto another, truncating
/// or zero-padding.
fn copy_modes(
    source: &SwshTransform,
    coefficients: &[Complex64],
    target: &SwshTransform,
) -> Vec<Complex64> {
    let mut out = vec![Complex64::new(0.0, 0.0); target.number_of_modes()];
    let l_top = source.l_max().min(target.l_max());
    let s = source.spin.unsigned_abs() as usize;
    for l in s..=l_top {
        for m in -(l as i32)..=(l as i32) {
            out[target.mode_index(l, m)] = coefficients[source.mode_index(l, m)];
        }
    }
    out
}

fn spin_raise(
    values: &[Complex64],
    spin: i32,
    l_max: usize,
    raise: bool,
) -> Result<Vec<Complex64>, SpectralError> {
    let source = cached_transform(l_max, spin)?;
    let target_spin = if raise { spin + 1 } else { spin - 1 };
    let target = cached_transform(l_max, target_spin)?;
    let coefficients = source.forward(values)?;
    let mut raised = vec![Complex64::new(0.0, 0.0); target.number_of_modes()];
    let s_min = spin.unsigned_abs().max(target_spin.unsigned_abs()) as usize;
    let s = spin as f64;
    for l in s_min..=l_max {
        let lf = l as f64;
        let factor = if raise {
            ((lf - s) * (lf + s + 1.0)).sqrt()
        } else {
            -((lf + s) * (lf - s + 1.0)).sqrt()
        };
        for m in -(l as i32)..=(l as i32) {
            raised[target.mode_index(l, m)] = coefficients[source.mode_index(l, m)] * factor;
        }
    }
    target.inverse(&raised)
}

/// Spin-raising derivative ð of a spin-`spin` field; the result has spin
/// `spin + 1`.  On spin-0 fields ð = -(∂θ + i cscθ ∂φ).
pub fn eth(values: &[Complex64], spin: i32, l_max: usize) -> Result<Vec<Complex64>, SpectralError> {
    spin_raise(values, spin, l_max, true)
}

/// Spin-lowering derivative ð̄; the result has spin `spin - 1`.
pub fn ethbar(
    values: &[Complex64],
    spin: i32,
    l_max: usize,
) -> Result<Vec<Complex64>, SpectralError> {
    spin_raise(values, spin, l_max, false)
}

/// Inverse of ð on spin-`spin` values: the spin-`spin - 1` field `ξ` with
/// `ð ξ` equal to `values`.  Modes that ð annihilates are set to zero.
pub fn inverse_eth(
    values: &[Complex64],
    spin: i32,
    l_max: usize,
) -> Result<Vec<Complex64>, SpectralError> {
    let source = cached_transform(l_max, spin)?;
    let target = cached_transform(l_max, spin - 1)?;
    let coefficients = source.forward(values)?;
    let mut lowered = vec![Complex64::new(0.0, 0.0); target.number_of_modes()];
    let s = (spin - 1) as f64;
    for l in source.spin.unsigned_abs() as usize..=l_max {
        let lf = l as f64;
        let factor = ((lf - s) * (lf + s + 1.0)).sqrt();
        if factor == 0.0 {
            continue;
        }
        for m in -(l as i32)..=(l as i32) {
            lowered[target.mode_index(l, m)] = coefficients[source.mode_index(l, m)] / factor;
        }
    }
    target.inverse(&lowered)
}

/// Resamples collocation values from one band limit to another.
pub fn resample(
    values: &[Complex64],
    spin: i32,
    l_from: usize,
    l_to: usize,
) -> Result<Vec<Complex64>, SpectralError> {
    let source = cached_transform(l_from, spin)?;
    if l_from == l_to {
        if values.len() != source.grid().len() {
            return Err(SpectralError::SizeMismatch {
                expected: source.grid().len(),
                got: values.len(),
            });
        }
        return Ok(values.to_vec());
    }
    let target = cached_transform(l_to, spin)?;
    let coefficients = source.forward(values)?;
    target.inverse(&copy_modes(&source, &coefficients, &target))
}

/// Spectral interpolation from the collocation grid to a fixed set of
/// target points.
#[derive(Clone, Debug)]
pub struct SwshInterpolator {
    l_max: usize,
    thetas: Vec<f64>,
    phis: Vec<f64>,
}

impl SwshInterpolator {
    pub fn new(thetas: &[f64], phis: &[f64], l_max: usize) -> Result<Self, SpectralError> {
        check_l_max(l_max)?;
        if thetas.len() != phis.len() {
            return Err(SpectralError::TargetMismatch {
                thetas: thetas.len(),
                phis: phis.len(),
            });
        }
        Ok(Self {
            l_max,
            thetas: thetas.to_vec(),
            phis: phis.to_vec(),
        })
    }

    pub fn l_max(&self) -> usize {
        self.l_max
    }

    pub fn number_of_targets(&self) -> usize {
        self.thetas.len()
    }

    /// Values of the band-limited expansion of `values` at the targets.
    pub fn interpolate(
        &self,
        values: &[Complex64],
        spin: i32,
    ) -> Result<Vec<Complex64>, SpectralError> {
        let transform = cached_transform(self.l_max, spin)?;
        let coefficients = transform.forward(values)?;
        let mut column = vec![0.0; self.l_max + 1];
        Ok(self
            .thetas
            .iter()
            .zip(&self.phis)
            .map(|(&theta, &phi)| transform.evaluate_with(&coefficients, theta, phi, &mut column))
            .collect())
    }
}
