// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Worldtube boundary archives and light-travel corrected multi-archive
//! sampling.
//!
//! Archive `i` at extraction radius `r_i` is queried at
//! `t_i = t_0 + (r_i - r_k)` where `k` is the reference archive, so every
//! snapshot lies on the same outgoing null cone.  Snapshots are laid out
//! archive-major in [`MultiArchiveBuffers`].

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::interpolation::{
    barycentric_coefficients, span_start, InterpolationError, DEFAULT_RATIONAL_ORDER,
};
use crate::spectral::{number_of_swsh_collocation_points, resample, SpectralError};

/// Recorded times entering one time interpolation.
pub const TIME_INTERPOLATION_POINTS: usize = 10;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive at radius {radius} has no data at t = {time} (recorded range [{start}, {end}])")]
    Missing {
        radius: f64,
        time: f64,
        start: f64,
        end: f64,
    },
    #[error("need at least {min} archives, got {got}")]
    TooFewArchives { got: usize, min: usize },
    #[error("reference archive index {index} out of range for {count} archives")]
    TargetIndex { index: usize, count: usize },
    #[error("archive {archive} delivered band limit {got}, expected {expected}")]
    ResolutionMismatch {
        archive: usize,
        expected: usize,
        got: usize,
    },
    #[error("archive times must be strictly increasing (entry {index})")]
    UnorderedTimes { index: usize },
    #[error("archive holds no entries")]
    Empty,
    #[error("failed to parse archive: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),
    #[error(transparent)]
    Spectral(#[from] SpectralError),
}

/// Worldtube data at one time on one extraction sphere.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundarySnapshot {
    pub extraction_radius: f64,
    pub l_max: usize,
    pub time: f64,
    pub j: Vec<Complex64>,
    pub dr_j: Vec<Complex64>,
    /// Bondi areal radius `R` per angular point.
    pub r: Vec<f64>,
}

impl BoundarySnapshot {
    /// Checks every array against the angular size of `l_max`.
    pub fn validate(&self) -> Result<(), SpectralError> {
        let expected = number_of_swsh_collocation_points(self.l_max);
        for len in [self.j.len(), self.dr_j.len(), self.r.len()] {
            if len != expected {
                return Err(SpectralError::SizeMismatch { expected, got: len });
            }
        }
        Ok(())
    }
}

/// Source of worldtube boundary data.
pub trait WorldtubeArchive {
    fn extraction_radius(&self) -> f64;

    /// Band limit of the snapshots this archive produces.
    fn l_max(&self) -> usize;

    fn sample(&self, time: f64) -> Result<BoundarySnapshot, ArchiveError>;
}

/// One recorded time of a [`TabulatedArchive`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TabulatedEntry {
    pub time: f64,
    pub j: Vec<Complex64>,
    pub dr_j: Vec<Complex64>,
    pub r: Vec<f64>,
}

/// In-memory archive.  Samples between recorded times come from a
/// Floater–Hormann interpolant over the (up to) ten nearest entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTabulatedArchive")]
pub struct TabulatedArchive {
    extraction_radius: f64,
    l_max: usize,
    entries: Vec<TabulatedEntry>,
}

#[derive(Deserialize)]
struct RawTabulatedArchive {
    extraction_radius: f64,
    l_max: usize,
    entries: Vec<TabulatedEntry>,
}

impl TryFrom<RawTabulatedArchive> for TabulatedArchive {
    type Error = ArchiveError;

    fn try_from(raw: RawTabulatedArchive) -> Result<Self, Self::Error> {
        Self::new(raw.extraction_radius, raw.l_max, raw.entries)
    }
}

impl TabulatedArchive {
    pub fn new(
        extraction_radius: f64,
        l_max: usize,
        entries: Vec<TabulatedEntry>,
    ) -> Result<Self, ArchiveError> {
        if entries.is_empty() {
            return Err(ArchiveError::Empty);
        }
        let expected = number_of_swsh_collocation_points(l_max);
        for (index, entry) in entries.iter().enumerate() {
            for len in [entry.j.len(), entry.dr_j.len(), entry.r.len()] {
                if len != expected {
                    return Err(SpectralError::SizeMismatch { expected, got: len }.into());
                }
            }
            if index > 0 && !(entries[index - 1].time < entry.time) {
                return Err(ArchiveError::UnorderedTimes { index });
            }
        }
        Ok(Self {
            extraction_radius,
            l_max,
            entries,
        })
    }

    pub fn from_json_str(json: &str) -> Result<Self, ArchiveError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn entries(&self) -> &[TabulatedEntry] {
        &self.entries
    }

    /// Recorded time range.
    pub fn time_range(&self) -> (f64, f64) {
        let first = self.entries.first().map_or(0.0, |e| e.time);
        let last = self.entries.last().map_or(0.0, |e| e.time);
        (first, last)
    }
}

fn combine<T>(
    coefficients: &[f64],
    entries: &[TabulatedEntry],
    field: impl Fn(&TabulatedEntry) -> &[T],
) -> Vec<T>
where
    T: Copy + Default + std::ops::Add<Output = T> + std::ops::Mul<f64, Output = T>,
{
    let mut out = vec![T::default(); field(&entries[0]).len()];
    for (&c, entry) in coefficients.iter().zip(entries) {
        for (o, &v) in out.iter_mut().zip(field(entry)) {
            *o = *o + v * c;
        }
    }
    out
}

impl WorldtubeArchive for TabulatedArchive {
    fn extraction_radius(&self) -> f64 {
        self.extraction_radius
    }

    fn l_max(&self) -> usize {
        self.l_max
    }

    fn sample(&self, time: f64) -> Result<BoundarySnapshot, ArchiveError> {
        let (start, end) = self.time_range();
        if !(start <= time && time <= end) {
            return Err(ArchiveError::Missing {
                radius: self.extraction_radius,
                time,
                start,
                end,
            });
        }
        let snapshot = |j, dr_j, r| BoundarySnapshot {
            extraction_radius: self.extraction_radius,
            l_max: self.l_max,
            time,
            j,
            dr_j,
            r,
        };
        let upper = self.entries.partition_point(|e| e.time < time);
        if let Some(exact) = self.entries.get(upper).filter(|e| e.time == time) {
            return Ok(snapshot(exact.j.clone(), exact.dr_j.clone(), exact.r.clone()));
        }

        let first = span_start(self.entries.len(), upper, TIME_INTERPOLATION_POINTS);
        let span = &self.entries[first..(first + TIME_INTERPOLATION_POINTS).min(self.entries.len())];
        let times: Vec<f64> = span.iter().map(|e| e.time).collect();
        let coefficients = barycentric_coefficients(&times, DEFAULT_RATIONAL_ORDER, time)?;
        Ok(snapshot(
            combine(&coefficients, span, |e| e.j.as_slice()),
            combine(&coefficients, span, |e| e.dr_j.as_slice()),
            combine(&coefficients, span, |e| e.r.as_slice()),
        ))
    }
}

/// Adapter presenting another archive at a different band limit.
pub struct ResampledArchive<'a> {
    inner: &'a dyn WorldtubeArchive,
    l_max: usize,
}

impl<'a> ResampledArchive<'a> {
    pub fn new(inner: &'a dyn WorldtubeArchive, l_max: usize) -> Self {
        Self { inner, l_max }
    }
}

impl WorldtubeArchive for ResampledArchive<'_> {
    fn extraction_radius(&self) -> f64 {
        self.inner.extraction_radius()
    }

    fn l_max(&self) -> usize {
        self.l_max
    }

    fn sample(&self, time: f64) -> Result<BoundarySnapshot, ArchiveError> {
        let snapshot = self.inner.sample(time)?;
        if snapshot.l_max == self.l_max {
            return Ok(snapshot);
        }
        let from = snapshot.l_max;
        let r: Vec<Complex64> = snapshot.r.iter().map(|&r| Complex64::new(r, 0.0)).collect();
        Ok(BoundarySnapshot {
            extraction_radius: snapshot.extraction_radius,
            l_max: self.l_max,
            time: snapshot.time,
            j: resample(&snapshot.j, 2, from, self.l_max)?,
            dr_j: resample(&snapshot.dr_j, 2, from, self.l_max)?,
            r: resample(&r, 0, from, self.l_max)?
                .into_iter()
                .map(|v| v.re)
                .collect(),
        })
    }
}

/// Where and when one archive was sampled.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResampleReport {
    pub archive: usize,
    pub extraction_radius: f64,
    pub corrected_time: f64,
}

/// Archive-major boundary data of several archives.
#[derive(Clone, Debug, PartialEq)]
pub struct MultiArchiveBuffers {
    pub angular: usize,
    pub j: Vec<Complex64>,
    pub dr_j: Vec<Complex64>,
    pub r: Vec<f64>,
    pub samples: Vec<ResampleReport>,
}

impl MultiArchiveBuffers {
    /// Zeroed storage for `number_of_archives` snapshots at band limit
    /// `l_max`.
    pub fn new(number_of_archives: usize, l_max: usize) -> Self {
        let angular = number_of_swsh_collocation_points(l_max);
        let len = angular * number_of_archives;
        Self {
            angular,
            j: vec![Complex64::new(0.0, 0.0); len],
            dr_j: vec![Complex64::new(0.0, 0.0); len],
            r: vec![0.0; len],
            samples: Vec::with_capacity(number_of_archives),
        }
    }

    pub fn number_of_archives(&self) -> usize {
        self.samples.len()
    }

    pub fn j(&self, archive: usize) -> &[Complex64] {
        &self.j[archive * self.angular..(archive + 1) * self.angular]
    }

    pub fn dr_j(&self, archive: usize) -> &[Complex64] {
        &self.dr_j[archive * self.angular..(archive + 1) * self.angular]
    }

    pub fn r(&self, archive: usize) -> &[f64] {
        &self.r[archive * self.angular..(archive + 1) * self.angular]
    }
}

/// Samples every archive on the null cone through the reference archive at
/// `target_time` and writes the snapshots by archive index into `buffers`,
/// which must have been sized for `archives.len()` archives at `l_max`.
///
/// Every archive is queried before anything is written, so a missing
/// sample leaves `buffers` untouched.
pub fn read_in_worldtube_data(
    buffers: &mut MultiArchiveBuffers,
    archives: &[&dyn WorldtubeArchive],
    l_max: usize,
    target_index: usize,
    target_time: f64,
) -> Result<(), ArchiveError> {
    if archives.is_empty() {
        return Err(ArchiveError::TooFewArchives { got: 0, min: 1 });
    }
    let target = archives
        .get(target_index)
        .ok_or(ArchiveError::TargetIndex {
            index: target_index,
            count: archives.len(),
        })?;
    let target_radius = target.extraction_radius();
    let angular = number_of_swsh_collocation_points(l_max);
    let expected = angular * archives.len();
    for len in [buffers.j.len(), buffers.dr_j.len(), buffers.r.len()] {
        if buffers.angular != angular || len != expected {
            return Err(SpectralError::SizeMismatch { expected, got: len }.into());
        }
    }

    let mut snapshots = Vec::with_capacity(archives.len());
    let mut samples = Vec::with_capacity(archives.len());
    for (index, archive) in archives.iter().enumerate() {
        let extraction_radius = archive.extraction_radius();
        let corrected_time = target_time + (extraction_radius - target_radius);
        let snapshot = archive.sample(corrected_time)?;
        if snapshot.l_max != l_max {
            return Err(ArchiveError::ResolutionMismatch {
                archive: index,
                expected: l_max,
                got: snapshot.l_max,
            });
        }
        snapshot.validate()?;
        debug!(archive = index, extraction_radius, corrected_time, "sampled worldtube archive");
        samples.push(ResampleReport {
            archive: index,
            extraction_radius,
            corrected_time,
        });
        snapshots.push(snapshot);
    }

    for (index, snapshot) in snapshots.into_iter().enumerate() {
        let slots = index * angular..(index + 1) * angular;
        buffers.j[slots.clone()].copy_from_slice(&snapshot.j);
        buffers.dr_j[slots.clone()].copy_from_slice(&snapshot.dr_j);
        buffers.r[slots].copy_from_slice(&snapshot.r);
    }
    buffers.samples = samples;
    Ok(())
}
