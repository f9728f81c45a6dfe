// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Newman–Penrose Weyl scalar ψ0 in Bondi–Sachs variables.

use num_complex::Complex64;

use crate::spectral::SpectralError;

/// ψ0 at one point from `J`, its first two `y` derivatives, the areal radius
/// `R` and `1 - y`; `K = √(1 + J J̄)` is derived from `J`.
pub fn psi0_at(
    j: Complex64,
    dy_j: Complex64,
    dy_dy_j: Complex64,
    r: f64,
    one_minus_y: f64,
) -> Complex64 {
    let k = (1.0 + j.norm_sqr()).sqrt();
    let j_bar = j.conj();
    let dy_j_bar = dy_j.conj();
    let one_plus_k = 1.0 + k;

    let mixed = j * dy_j_bar + j_bar * dy_j;
    let dy_beta = 0.125 * one_minus_y * (dy_j * dy_j_bar - 0.25 * mixed * mixed / (k * k));

    let bracket = j_bar * (1.0 - k) * one_plus_k.powi(3) * dy_j * dy_j
        + j * dy_j * dy_j_bar
            * (-j * j_bar * (1.0 + 2.0 * k)
                + one_plus_k * (one_plus_k + 2.0 * k * k * (2.0 + k)))
        + 4.0 * k * k * one_plus_k * dy_beta * (one_plus_k * one_plus_k * dy_j - j * j * dy_j_bar)
        + one_plus_k
            * (-j * j * j * one_plus_k * dy_j_bar * dy_j_bar
                + dy_dy_j * (2.0 * (j * k) * (j * k) - 2.0 * (k * one_plus_k).powi(2)));

    one_minus_y.powi(4) / (64.0 * k.powi(3) * (one_plus_k * r).powi(2)) * bracket
}

/// Pointwise ψ0 over matching angular arrays.
pub fn psi0(
    j: &[Complex64],
    dy_j: &[Complex64],
    dy_dy_j: &[Complex64],
    r: &[f64],
    one_minus_y: f64,
) -> Result<Vec<Complex64>, SpectralError> {
    for len in [dy_j.len(), dy_dy_j.len(), r.len()] {
        if len != j.len() {
            return Err(SpectralError::SizeMismatch {
                expected: j.len(),
                got: len,
            });
        }
    }
    Ok((0..j.len())
        .map(|i| psi0_at(j[i], dy_j[i], dy_dy_j[i], r[i], one_minus_y))
        .collect())
}
