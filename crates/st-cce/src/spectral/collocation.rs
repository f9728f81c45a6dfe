// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Legendre collocation on `[-1, 1]`: nodes, weights and the small dense
//! operators built from their Lagrange basis.

use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use nalgebra::DMatrix;
use num_complex::Complex64;

use super::SpectralError;

const NEWTON_TOLERANCE: f64 = 4.0 * f64::EPSILON;
const NEWTON_MAX_ITERATIONS: usize = 100;

/// Quadrature nodes in ascending order with their weights.
#[derive(Clone, Debug, PartialEq)]
pub struct Quadrature {
    pub nodes: Vec<f64>,
    pub weights: Vec<f64>,
}

impl Quadrature {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Quadrature sum of `f` over `[-1, 1]`.
    pub fn integrate(&self, f: impl Fn(f64) -> f64) -> f64 {
        self.nodes
            .iter()
            .zip(&self.weights)
            .map(|(&x, &w)| w * f(x))
            .sum()
    }
}

/// Evaluates `(P_n(x), P_{n-1}(x))` by the three-term recurrence.
fn legendre_pair(n: usize, x: f64) -> (f64, f64) {
    if n == 0 {
        return (1.0, 0.0);
    }
    let mut previous = 1.0;
    let mut current = x;
    for k in 2..=n {
        let k = k as f64;
        let next = ((2.0 * k - 1.0) * x * current - (k - 1.0) * previous) / k;
        previous = current;
        current = next;
    }
    (current, previous)
}

/// Legendre Gauss nodes and weights with `n` points.
pub fn gauss_legendre(n: usize) -> Quadrature {
    let mut nodes = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    let nf = n as f64;
    for i in 0..n {
        let mut x = (PI * (i as f64 + 0.75) / (nf + 0.5)).cos();
        for _ in 0..NEWTON_MAX_ITERATIONS {
            let (p, p_prev) = legendre_pair(n, x);
            let dx = p * (x * x - 1.0) / (nf * (x * p - p_prev));
            x -= dx;
            if dx.abs() <= NEWTON_TOLERANCE {
                break;
            }
        }
        // interior nodes only, so x² < 1
        let (p, p_prev) = legendre_pair(n, x);
        let derivative = nf * (x * p - p_prev) / (x * x - 1.0);
        nodes.push(x);
        weights.push(2.0 / ((1.0 - x * x) * derivative * derivative));
    }
    nodes.reverse();
    weights.reverse();
    Quadrature { nodes, weights }
}

/// Legendre Gauss–Lobatto nodes and weights with `n >= 2` points; the
/// first and last nodes are exactly `-1` and `1`.
pub fn gauss_lobatto(n: usize) -> Result<Quadrature, SpectralError> {
    if n < 2 {
        return Err(SpectralError::TooFewRadialPoints { got: n, min: 2 });
    }
    let order = n - 1;
    let nf = n as f64;
    let mut nodes: Vec<f64> = (0..n)
        .map(|i| (PI * i as f64 / order as f64).cos())
        .collect();
    for _ in 0..NEWTON_MAX_ITERATIONS {
        let mut change = 0.0_f64;
        for x in nodes.iter_mut() {
            let (p, p_prev) = legendre_pair(order, *x);
            let dx = (*x * p - p_prev) / (nf * p);
            *x -= dx;
            change = change.max(dx.abs());
        }
        if change <= NEWTON_TOLERANCE {
            break;
        }
    }
    nodes.reverse();
    nodes[0] = -1.0;
    nodes[order] = 1.0;
    let weights = nodes
        .iter()
        .map(|&x| {
            let (p, _) = legendre_pair(order, x);
            2.0 / (order as f64 * nf * p * p)
        })
        .collect();
    Ok(Quadrature { nodes, weights })
}

/// Gauss–Lobatto radial collocation points, ascending from the worldtube
/// (`-1`) to scri (`1`).
pub fn radial_collocation_points(n: usize) -> Result<Vec<f64>, SpectralError> {
    Ok(gauss_lobatto(n)?.nodes)
}

fn barycentric_weights(nodes: &[f64]) -> Vec<f64> {
    nodes
        .iter()
        .enumerate()
        .map(|(k, &xk)| {
            let product: f64 = nodes
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != k)
                .map(|(_, &xj)| xk - xj)
                .product();
            product.recip()
        })
        .collect()
}

/// Matrix `M[t, k] = l_k(targets[t])` of the Lagrange basis on `nodes`.
pub fn interpolation_matrix(nodes: &[f64], targets: &[f64]) -> DMatrix<f64> {
    let weights = barycentric_weights(nodes);
    let mut matrix = DMatrix::zeros(targets.len(), nodes.len());
    for (t, &x) in targets.iter().enumerate() {
        if let Some(k) = nodes.iter().position(|&node| node == x) {
            matrix[(t, k)] = 1.0;
            continue;
        }
        let terms: Vec<f64> = nodes
            .iter()
            .zip(&weights)
            .map(|(&node, &w)| w / (x - node))
            .collect();
        let denominator: f64 = terms.iter().sum();
        for (k, term) in terms.iter().enumerate() {
            matrix[(t, k)] = term / denominator;
        }
    }
    matrix
}

/// Matrix `I[j, k] = ∫_{-1}^{x_j} l_k(x) dx` for the Lagrange basis on
/// `nodes`.
pub fn indefinite_integral_matrix(nodes: &[f64]) -> DMatrix<f64> {
    let n = nodes.len();
    let rule = gauss_legendre(n.max(1));
    let mut matrix = DMatrix::zeros(n, n);
    for (j, &upper) in nodes.iter().enumerate() {
        let half = 0.5 * (upper + 1.0);
        let mapped: Vec<f64> = rule.nodes.iter().map(|&t| -1.0 + half * (t + 1.0)).collect();
        let basis = interpolation_matrix(nodes, &mapped);
        for k in 0..n {
            let mut sum = 0.0;
            for (q, &w) in rule.weights.iter().enumerate() {
                sum += w * basis[(q, k)];
            }
            matrix[(j, k)] = half * sum;
        }
    }
    matrix
}

static GAUSS_INTEGRAL_CACHE: OnceLock<Mutex<HashMap<usize, Arc<DMatrix<f64>>>>> = OnceLock::new();

fn cached_gauss_integral_matrix(n: usize) -> Arc<DMatrix<f64>> {
    let cache = GAUSS_INTEGRAL_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    let mut guard = cache.lock().unwrap_or_else(PoisonError::into_inner);
    guard
        .entry(n)
        .or_insert_with(|| Arc::new(indefinite_integral_matrix(&gauss_legendre(n).nodes)))
        .clone()
}

/// Extents of a two-dimensional sample mesh; dimension 0 is contiguous.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mesh2 {
    pub extents: [usize; 2],
}

impl Mesh2 {
    pub const fn new(fast: usize, slow: usize) -> Self {
        Self {
            extents: [fast, slow],
        }
    }

    pub const fn number_of_points(&self) -> usize {
        self.extents[0] * self.extents[1]
    }

    pub const fn offset(&self, i0: usize, i1: usize) -> usize {
        i0 + self.extents[0] * i1
    }
}

/// Applies a real matrix to every line of `data` along `dim`.
///
/// The result keeps the other extent and replaces the `dim` extent by the
/// number of matrix rows.
pub(crate) fn apply_along(
    matrix: &DMatrix<f64>,
    data: &[Complex64],
    mesh: Mesh2,
    dim: usize,
) -> Result<Vec<Complex64>, SpectralError> {
    if dim > 1 {
        return Err(SpectralError::MeshDimension(dim));
    }
    if data.len() != mesh.number_of_points() {
        return Err(SpectralError::SizeMismatch {
            expected: mesh.number_of_points(),
            got: data.len(),
        });
    }
    if matrix.ncols() != mesh.extents[dim] {
        return Err(SpectralError::SizeMismatch {
            expected: mesh.extents[dim],
            got: matrix.ncols(),
        });
    }
    let mut extents = mesh.extents;
    extents[dim] = matrix.nrows();
    let out_mesh = Mesh2 { extents };
    let mut out = vec![Complex64::new(0.0, 0.0); out_mesh.number_of_points()];
    let other = mesh.extents[1 - dim];
    for line in 0..other {
        for row in 0..matrix.nrows() {
            let mut sum = Complex64::new(0.0, 0.0);
            for col in 0..matrix.ncols() {
                let source = if dim == 0 {
                    mesh.offset(col, line)
                } else {
                    mesh.offset(line, col)
                };
                sum += data[source] * matrix[(row, col)];
            }
            let target = if dim == 0 {
                out_mesh.offset(row, line)
            } else {
                out_mesh.offset(line, row)
            };
            out[target] = sum;
        }
    }
    Ok(out)
}

/// Indefinite integral from `-1` along `dim` of a mesh whose `dim` axis is
/// sampled at Legendre Gauss nodes.
pub fn indefinite_integral(
    data: &[Complex64],
    mesh: Mesh2,
    dim: usize,
) -> Result<Vec<Complex64>, SpectralError> {
    if dim > 1 {
        return Err(SpectralError::MeshDimension(dim));
    }
    let matrix = cached_gauss_integral_matrix(mesh.extents[dim]);
    apply_along(&matrix, data, mesh, dim)
}
