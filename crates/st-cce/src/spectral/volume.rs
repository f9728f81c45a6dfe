// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use num_complex::Complex64;

use super::collocation::{apply_along, gauss_lobatto, interpolation_matrix, Mesh2};
use super::swsh::resample;
use super::{Resolution, SpectralError};

/// Resamples a radial-major volume field between resolutions: every shell
/// is resampled in angle first, then every angular point is interpolated
/// along the Gauss–Lobatto radial direction.
pub fn resample_volume(
    values: &[Complex64],
    spin: i32,
    from: Resolution,
    to: Resolution,
) -> Result<Vec<Complex64>, SpectralError> {
    from.validate()?;
    to.validate()?;
    let expected = from.number_of_volume_points();
    if values.len() != expected {
        return Err(SpectralError::SizeMismatch {
            expected,
            got: values.len(),
        });
    }

    let angular_from = from.number_of_angular_points();
    let mut shells = Vec::with_capacity(to.number_of_angular_points() * from.number_of_radial_points);
    for shell in values.chunks(angular_from) {
        shells.extend(resample(shell, spin, from.l_max, to.l_max)?);
    }
    if from.number_of_radial_points == to.number_of_radial_points {
        return Ok(shells);
    }

    let source_nodes = gauss_lobatto(from.number_of_radial_points)?.nodes;
    let target_nodes = gauss_lobatto(to.number_of_radial_points)?.nodes;
    let matrix = interpolation_matrix(&source_nodes, &target_nodes);
    let mesh = Mesh2::new(to.number_of_angular_points(), from.number_of_radial_points);
    apply_along(&matrix, &shells, mesh, 1)
}
