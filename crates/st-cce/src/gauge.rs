// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Angular coordinate maps and the gauge quantities derived from them.
//!
//! A map assigns every native collocation point a new position on the unit
//! sphere.  The spin-2 factor `C` and spin-0 factor `D` are the angular
//! derivatives of that map projected on the dyad `m = e_θ + i e_φ`
//! evaluated at the mapped position:
//!
//! ```text
//! C = -(ð x^a) m_a,   D = -(ð̄ x^a) m_a,   Ω = ½ √(D D̄ - C C̄)
//! ```
//!
//! The identity map gives `C = 0`, `D = 2`, `Ω = 1`.

use std::f64::consts::PI;

use num_complex::Complex64;

use crate::field::SpinWeighted;
use crate::spectral::{cached_grid, eth, ethbar, SpectralError, SwshInterpolator};

/// Wraps an azimuth into `(-π, π]`.
pub fn normalize_phi(phi: f64) -> f64 {
    let wrapped = phi.sin().atan2(phi.cos());
    if wrapped <= -PI {
        PI
    } else {
        wrapped
    }
}

/// New angular positions of every native collocation point, kept in sync
/// with their Cartesian unit vectors.
#[derive(Clone, Debug, PartialEq)]
pub struct AngularCoordinates {
    l_max: usize,
    theta: Vec<f64>,
    phi: Vec<f64>,
    x: Vec<f64>,
    y: Vec<f64>,
    z: Vec<f64>,
}

impl AngularCoordinates {
    /// The identity map: every point sits at its own collocation position.
    pub fn native(l_max: usize) -> Result<Self, SpectralError> {
        let grid = cached_grid(l_max)?;
        let theta = grid.points().map(|p| p.theta).collect();
        let phi = grid.points().map(|p| p.phi).collect();
        Self::from_angles(l_max, theta, phi)
    }

    /// Builds a map from angles; the Cartesian vectors are derived.
    pub fn from_angles(l_max: usize, theta: Vec<f64>, phi: Vec<f64>) -> Result<Self, SpectralError> {
        let expected = cached_grid(l_max)?.len();
        for len in [theta.len(), phi.len()] {
            if len != expected {
                return Err(SpectralError::SizeMismatch { expected, got: len });
            }
        }
        let mut coordinates = Self {
            l_max,
            theta,
            phi,
            x: vec![0.0; expected],
            y: vec![0.0; expected],
            z: vec![0.0; expected],
        };
        coordinates.update_cartesian_from_angles();
        Ok(coordinates)
    }

    /// Builds a map from Cartesian vectors, renormalised to unit length;
    /// the angles are derived.
    pub fn from_cartesian(
        l_max: usize,
        x: Vec<f64>,
        y: Vec<f64>,
        z: Vec<f64>,
    ) -> Result<Self, SpectralError> {
        let expected = cached_grid(l_max)?.len();
        for len in [x.len(), y.len(), z.len()] {
            if len != expected {
                return Err(SpectralError::SizeMismatch { expected, got: len });
            }
        }
        let mut coordinates = Self {
            l_max,
            theta: vec![0.0; expected],
            phi: vec![0.0; expected],
            x,
            y,
            z,
        };
        coordinates.update_angles_from_cartesian();
        Ok(coordinates)
    }

    pub fn l_max(&self) -> usize {
        self.l_max
    }

    pub fn len(&self) -> usize {
        self.theta.len()
    }

    pub fn is_empty(&self) -> bool {
        self.theta.is_empty()
    }

    pub fn theta(&self) -> &[f64] {
        &self.theta
    }

    pub fn phi(&self) -> &[f64] {
        &self.phi
    }

    pub fn cartesian(&self) -> [&[f64]; 3] {
        [&self.x, &self.y, &self.z]
    }

    /// Replaces the polar angles and re-derives the Cartesian vectors.
    pub fn set_theta(&mut self, theta: &[f64]) -> Result<(), SpectralError> {
        if theta.len() != self.len() {
            return Err(SpectralError::SizeMismatch {
                expected: self.len(),
                got: theta.len(),
            });
        }
        self.theta.copy_from_slice(theta);
        self.update_cartesian_from_angles();
        Ok(())
    }

    /// Recomputes the unit vectors and wraps φ into `(-π, π]`.
    pub fn update_cartesian_from_angles(&mut self) {
        for i in 0..self.theta.len() {
            let (sin_theta, cos_theta) = self.theta[i].sin_cos();
            let (sin_phi, cos_phi) = self.phi[i].sin_cos();
            self.x[i] = sin_theta * cos_phi;
            self.y[i] = sin_theta * sin_phi;
            self.z[i] = cos_theta;
            self.phi[i] = normalize_phi(self.phi[i]);
        }
    }

    /// Normalises the Cartesian vectors and recomputes the angles.
    pub fn update_angles_from_cartesian(&mut self) {
        for i in 0..self.x.len() {
            let norm = (self.x[i].powi(2) + self.y[i].powi(2) + self.z[i].powi(2)).sqrt();
            if norm > 0.0 {
                self.x[i] /= norm;
                self.y[i] /= norm;
                self.z[i] /= norm;
            }
            self.theta[i] = self.z[i].clamp(-1.0, 1.0).acos();
            self.phi[i] = normalize_phi(self.y[i].atan2(self.x[i]));
        }
    }

    /// Interpolator from the native grid onto the mapped positions.
    pub fn interpolator(&self) -> Result<SwshInterpolator, SpectralError> {
        SwshInterpolator::new(&self.theta, &self.phi, self.l_max)
    }
}

/// The pair `(C, D)` of a coordinate map.
#[derive(Clone, Debug, PartialEq)]
pub struct GaugeJacobian {
    pub c: SpinWeighted<2>,
    pub d: SpinWeighted<0>,
}

impl GaugeJacobian {
    /// Derives `(C, D)` from the Cartesian components of the map.
    pub fn from_coordinates(coordinates: &AngularCoordinates) -> Result<Self, SpectralError> {
        let l_max = coordinates.l_max();
        let grid = cached_grid(l_max)?;
        let mut c = vec![Complex64::new(0.0, 0.0); grid.len()];
        let mut d = vec![Complex64::new(0.0, 0.0); grid.len()];
        for (axis, component) in coordinates.cartesian().into_iter().enumerate() {
            let values: Vec<Complex64> = component.iter().map(|&v| Complex64::new(v, 0.0)).collect();
            let raised = eth(&values, 0, l_max)?;
            let lowered = ethbar(&values, 0, l_max)?;
            for p in grid.points() {
                let dyad = dyad_component(
                    axis,
                    coordinates.theta[p.offset],
                    coordinates.phi[p.offset],
                );
                c[p.offset] -= raised[p.offset] * dyad;
                d[p.offset] -= lowered[p.offset] * dyad;
            }
        }
        Ok(Self {
            c: SpinWeighted::from_vec(c),
            d: SpinWeighted::from_vec(d),
        })
    }

    /// Builds a pair from already known samples.
    pub fn from_parts(c: SpinWeighted<2>, d: SpinWeighted<0>) -> Result<Self, SpectralError> {
        d.expect_len(c.len())?;
        Ok(Self { c, d })
    }

    pub fn len(&self) -> usize {
        self.c.len()
    }

    pub fn is_empty(&self) -> bool {
        self.c.is_empty()
    }

    /// `Ω = ½ √(D D̄ - C C̄)` evaluated as a complex root.
    pub fn conformal_factor(&self) -> SpinWeighted<0> {
        self.c
            .data()
            .iter()
            .zip(self.d.data())
            .map(|(c, d)| conformal_factor_at(*c, *d))
            .collect::<Vec<_>>()
            .into()
    }

    /// The pair of the inverse map: `(-C, D̄)`.
    pub fn inverse(&self) -> Self {
        Self {
            c: self.c.data().iter().map(|c| -c).collect::<Vec<_>>().into(),
            d: self.d.data().iter().map(|d| d.conj()).collect::<Vec<_>>().into(),
        }
    }

    /// Applies the gauge transformation to `J` already interpolated onto
    /// the mapped positions:
    /// `Ĵ = ¼ (D̄² J + C² J̄ + 2 C D̄ K) / Ω²` with `K = √(1 + J J̄)`.
    pub fn gauge_transform_j(
        &self,
        j: &[Complex64],
        omega: &SpinWeighted<0>,
    ) -> Result<Vec<Complex64>, SpectralError> {
        omega.expect_len(self.len())?;
        if j.len() != self.len() {
            return Err(SpectralError::SizeMismatch {
                expected: self.len(),
                got: j.len(),
            });
        }
        Ok(j.iter()
            .zip(self.c.data().iter().zip(self.d.data()))
            .zip(omega.data())
            .map(|((&j, (&c, &d)), &omega)| transform_j_at(j, c, d, omega))
            .collect())
    }
}

fn conformal_factor_at(c: Complex64, d: Complex64) -> Complex64 {
    0.5 * (d * d.conj() - c * c.conj()).sqrt()
}

fn transform_j_at(j: Complex64, c: Complex64, d: Complex64, omega: Complex64) -> Complex64 {
    let k = (1.0 + j.norm_sqr()).sqrt();
    let d_bar = d.conj();
    0.25 * (d_bar * d_bar * j + c * c * j.conj() + 2.0 * c * d_bar * k) / (omega * omega)
}

/// Cartesian component `axis` of `m = e_θ + i e_φ` at `(θ, φ)`.
pub(crate) fn dyad_component(axis: usize, theta: f64, phi: f64) -> Complex64 {
    let (sin_theta, cos_theta) = theta.sin_cos();
    let (sin_phi, cos_phi) = phi.sin_cos();
    match axis {
        0 => Complex64::new(cos_theta * cos_phi, -sin_phi),
        1 => Complex64::new(cos_theta * sin_phi, cos_phi),
        _ => Complex64::new(-sin_theta, 0.0),
    }
}
