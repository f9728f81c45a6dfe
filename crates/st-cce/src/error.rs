// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use thiserror::Error;

use crate::angular_solver::AngularSolveError;
use crate::archive::ArchiveError;
use crate::config::ConfigError;
use crate::interpolation::InterpolationError;
use crate::ode::IntegrationError;
use crate::radial::RadialError;
use crate::spectral::SpectralError;

/// Result alias used by the hypersurface assembly entry points.
pub type CceResult<T> = Result<T, CceError>;

/// Umbrella error for initial-data construction.
///
/// Every variant aborts the initialisation step; none of them is retried
/// because repeating the call with the same inputs fails the same way.
#[derive(Debug, Error)]
pub enum CceError {
    #[error(transparent)]
    Spectral(#[from] SpectralError),
    #[error(transparent)]
    AngularSolve(#[from] AngularSolveError),
    #[error(transparent)]
    Radial(#[from] RadialError),
    #[error(transparent)]
    Integration(#[from] IntegrationError),
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
    #[error(transparent)]
    Archive(#[from] ArchiveError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CceError {
    /// Whether this is the angular divergence that asks for a different
    /// initial-data strategy.
    pub fn is_divergence(&self) -> bool {
        matches!(
            self,
            CceError::AngularSolve(AngularSolveError::Divergence { .. })
        )
    }

    /// Whether the radial integrator failed to bracket a collocation point.
    pub fn is_bracketing(&self) -> bool {
        matches!(self, CceError::Radial(RadialError::Bracketing { .. }))
    }
}
