// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

// crates/st-cce/src/lib.rs
//! Initial data for the first null hypersurface of a Cauchy-characteristic
//! evolution.
//!
//! The crate exposes three numerical procedures and the glue that selects
//! between them:
//! - [`angular_solver`] adjusts the angular coordinate map until the conformal
//!   factor of the map matches a target field, or until `J` vanishes at scri.
//! - [`radial`] integrates the ψ0 condition from the worldtube out to scri to
//!   rebuild the radial profile of `J`.
//! - [`archive`] samples several worldtube archives at light-travel corrected
//!   times and lays the snapshots out contiguously.
//!
//! [`strategy`] and [`hypersurface`] wire these into the caller-owned
//! hypersurface state.  Spin-weighted harmonic machinery lives in
//! [`spectral`].

pub mod angular_solver;
pub mod archive;
pub mod config;
pub mod error;
pub mod field;
pub mod gauge;
pub mod hypersurface;
pub mod interpolation;
pub mod ode;
pub mod radial;
pub mod spectral;
pub mod strategy;
pub mod telemetry;
pub mod weyl;

pub use angular_solver::{
    adjust_angular_coordinates_for_j, adjust_angular_coordinates_for_omega, AngularSolveError,
    AngularSolveReport, AngularSolverSettings, ConvergenceRecord, DIVERGENCE_BOUND,
    SCRI_DIVERGENCE_BOUND,
};
pub use archive::{
    read_in_worldtube_data, ArchiveError, BoundarySnapshot, MultiArchiveBuffers,
    ResampleReport, ResampledArchive, TabulatedArchive, WorldtubeArchive,
};
pub use config::{ConfigError, ConfigLayers, InitialDataConfig};
pub use error::{CceError, CceResult};
pub use field::{transpose, SpinWeighted};
pub use gauge::{AngularCoordinates, GaugeJacobian};
pub use hypersurface::{hand_off_to_main_run, initialize_first_hypersurface, HypersurfaceState};
pub use radial::{RadialError, RadialReport, RadialSettings};
pub use spectral::{Resolution, SpectralError};
pub use strategy::{BoundaryData, GenerationReport, InitialDataSources, InitialDataStrategy};
pub use telemetry::init_tracing;
