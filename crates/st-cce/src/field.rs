// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Spin-weighted complex sample arrays.
//!
//! Angular fields hold one sample per collocation point of the active band
//! limit.  Volume fields are radial-major: shell `i` occupies
//! `[i * angular, (i + 1) * angular)`.  Switching to an angular-major layout
//! goes through [`transpose`].

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::spectral::SpectralError;

/// Complex samples tagged with a spin weight `S`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpinWeighted<const S: i32> {
    data: Vec<Complex64>,
}

impl<const S: i32> SpinWeighted<S> {
    /// Zero-filled field with `len` samples.
    pub fn zeros(len: usize) -> Self {
        Self {
            data: vec![Complex64::new(0.0, 0.0); len],
        }
    }

    /// Field filled with a single value.
    pub fn filled(len: usize, value: Complex64) -> Self {
        Self {
            data: vec![value; len],
        }
    }

    pub fn from_vec(data: Vec<Complex64>) -> Self {
        Self { data }
    }

    /// Builds a field from real samples.
    pub fn from_real(values: &[f64]) -> Self {
        Self {
            data: values.iter().map(|&v| Complex64::new(v, 0.0)).collect(),
        }
    }

    pub const fn spin(&self) -> i32 {
        S
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &[Complex64] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [Complex64] {
        &mut self.data
    }

    pub fn into_vec(self) -> Vec<Complex64> {
        self.data
    }

    /// Number of angular shells when each shell holds `angular` samples.
    pub fn number_of_shells(&self, angular: usize) -> usize {
        if angular == 0 {
            0
        } else {
            self.data.len() / angular
        }
    }

    /// Borrowed view of radial shell `index`.
    pub fn shell(&self, index: usize, angular: usize) -> &[Complex64] {
        &self.data[index * angular..(index + 1) * angular]
    }

    /// Mutable view of radial shell `index`.
    pub fn shell_mut(&mut self, index: usize, angular: usize) -> &mut [Complex64] {
        &mut self.data[index * angular..(index + 1) * angular]
    }

    /// Checks the sample count against the expected size.
    pub fn expect_len(&self, expected: usize) -> Result<(), SpectralError> {
        if self.data.len() == expected {
            Ok(())
        } else {
            Err(SpectralError::SizeMismatch {
                expected,
                got: self.data.len(),
            })
        }
    }

    /// Largest modulus over all samples, `0` for an empty field.
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0_f64, |acc, v| acc.max(v.norm()))
    }
}

impl<const S: i32> From<Vec<Complex64>> for SpinWeighted<S> {
    fn from(data: Vec<Complex64>) -> Self {
        Self::from_vec(data)
    }
}

/// Swaps the fast and slow axes of a two-dimensional sample array.
///
/// `data` is read with `fast` as the contiguous extent, so element
/// `(f, s)` lives at `f + fast * s`; the result stores it at `s + slow * f`.
pub fn transpose<T: Copy>(data: &[T], fast: usize, slow: usize) -> Vec<T> {
    debug_assert_eq!(data.len(), fast * slow);
    let mut out = Vec::with_capacity(data.len());
    for f in 0..fast {
        for s in 0..slow {
            out.push(data[f + fast * s]);
        }
    }
    out
}
