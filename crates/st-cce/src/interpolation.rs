// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Scattered one-dimensional interpolation and numerical differentiation.

use thiserror::Error;

/// Default blending order of [`BarycentricRational`].
pub const DEFAULT_RATIONAL_ORDER: usize = 4;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum InterpolationError {
    #[error("rational interpolation needs at least 2 nodes, got {got}")]
    TooFewNodes { got: usize },
    #[error("{nodes} nodes but {values} values")]
    LengthMismatch { nodes: usize, values: usize },
    #[error("node {x} appears more than once")]
    DuplicateNode { x: f64 },
    #[error("non-finite node or value")]
    NonFinite,
}

/// Floater–Hormann barycentric rational interpolant.
///
/// Blends all local polynomial interpolants of degree `d` over consecutive
/// nodes; the result has no real poles for any node distribution.
#[derive(Clone, Debug)]
pub struct BarycentricRational {
    nodes: Vec<f64>,
    values: Vec<f64>,
    weights: Vec<f64>,
}

impl BarycentricRational {
    /// Builds the interpolant of degree `min(order, n - 1)`; nodes may be
    /// given in any order.
    pub fn new(nodes: &[f64], values: &[f64], order: usize) -> Result<Self, InterpolationError> {
        if nodes.len() != values.len() {
            return Err(InterpolationError::LengthMismatch {
                nodes: nodes.len(),
                values: values.len(),
            });
        }
        if nodes.len() < 2 {
            return Err(InterpolationError::TooFewNodes { got: nodes.len() });
        }
        if nodes.iter().chain(values).any(|v| !v.is_finite()) {
            return Err(InterpolationError::NonFinite);
        }
        let mut pairs: Vec<(f64, f64)> = nodes.iter().copied().zip(values.iter().copied()).collect();
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        if let Some(pair) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(InterpolationError::DuplicateNode { x: pair[0].0 });
        }
        let (nodes, values): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let weights = floater_hormann_weights(&nodes, order.min(nodes.len() - 1));
        Ok(Self {
            nodes,
            values,
            weights,
        })
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for ((&node, &value), &weight) in self.nodes.iter().zip(&self.values).zip(&self.weights) {
            if x == node {
                return value;
            }
            let term = weight / (x - node);
            numerator += term * value;
            denominator += term;
        }
        numerator / denominator
    }
}

/// Weights `c_k` with `Σ c_k v_k` equal to the Floater–Hormann interpolant
/// of the values `v_k` at `x`.  `nodes` must be strictly increasing.
pub fn barycentric_coefficients(
    nodes: &[f64],
    order: usize,
    x: f64,
) -> Result<Vec<f64>, InterpolationError> {
    if nodes.len() < 2 {
        return Err(InterpolationError::TooFewNodes { got: nodes.len() });
    }
    if nodes.iter().any(|v| !v.is_finite()) || !x.is_finite() {
        return Err(InterpolationError::NonFinite);
    }
    if let Some(pair) = nodes.windows(2).find(|w| !(w[0] < w[1])) {
        return Err(InterpolationError::DuplicateNode { x: pair[1] });
    }
    let mut out = vec![0.0; nodes.len()];
    if let Some(k) = nodes.iter().position(|&node| node == x) {
        out[k] = 1.0;
        return Ok(out);
    }
    let weights = floater_hormann_weights(nodes, order.min(nodes.len() - 1));
    let mut denominator = 0.0;
    for ((c, &node), &weight) in out.iter_mut().zip(nodes).zip(&weights) {
        *c = weight / (x - node);
        denominator += *c;
    }
    out.iter_mut().for_each(|c| *c /= denominator);
    Ok(out)
}

/// First index of a run of `size` consecutive entries out of `len` that is
/// centred on `position` as far as the ends allow.
pub fn span_start(len: usize, position: usize, size: usize) -> usize {
    let size = size.min(len);
    position.saturating_sub(size / 2).min(len - size)
}

fn floater_hormann_weights(nodes: &[f64], d: usize) -> Vec<f64> {
    let n = nodes.len();
    (0..n)
        .map(|k| {
            let lower = k.saturating_sub(d);
            let upper = k.min(n - 1 - d);
            let mut sum = 0.0;
            for i in lower..=upper {
                let mut product = 1.0;
                for j in i..=i + d {
                    if j != k {
                        product /= (nodes[k] - nodes[j]).abs();
                    }
                }
                sum += product;
            }
            if (k + d) % 2 == 0 {
                sum
            } else {
                -sum
            }
        })
        .collect()
}

/// Sixth-order central finite-difference derivative of `f` at `x`.
pub fn finite_difference_derivative(f: impl Fn(f64) -> f64, x: f64) -> f64 {
    let eps = f64::EPSILON;
    let mut h = (eps / 168.0).powf(1.0 / 7.0) * x.abs().max(1.0);
    // keep x ± h exactly representable
    h = (x + h) - x;
    let y1 = f(x + h) - f(x - h);
    let y2 = f(x - 2.0 * h) - f(x + 2.0 * h);
    let y3 = f(x + 3.0 * h) - f(x - 3.0 * h);
    (y3 + 9.0 * y2 + 45.0 * y1) / (60.0 * h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    #[test]
    fn reproduces_polynomials_up_to_the_blend_order() {
        let nodes = [4.0, 1.0, 2.5, 3.0, 5.5, 7.0];
        let f = |x: f64| 0.5 * x.powi(3) - x + 2.0;
        let values: Vec<f64> = nodes.iter().map(|&x| f(x)).collect();
        let rational = BarycentricRational::new(&nodes, &values, 4).unwrap();
        assert!(rational.nodes().windows(2).all(|w| w[0] < w[1]));
        for x in [1.5, 3.3, 6.1] {
            assert_relative_eq!(rational.evaluate(x), f(x), max_relative = 1e-12);
        }
        assert_eq!(rational.evaluate(2.5), f(2.5));
    }

    #[test]
    fn rejects_degenerate_input() {
        assert!(matches!(
            BarycentricRational::new(&[1.0], &[1.0], 4),
            Err(InterpolationError::TooFewNodes { got: 1 })
        ));
        assert!(matches!(
            BarycentricRational::new(&[1.0, 2.0, 1.0], &[0.0, 0.0, 0.0], 4),
            Err(InterpolationError::DuplicateNode { .. })
        ));
        assert!(matches!(
            BarycentricRational::new(&[1.0, 2.0], &[0.0], 4),
            Err(InterpolationError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn coefficients_agree_with_the_interpolant() {
        let nodes = [0.0, 0.5, 1.5, 2.0, 3.5];
        let values = [1.0, -2.0, 0.25, 4.0, 3.0];
        let rational = BarycentricRational::new(&nodes, &values, 3).unwrap();
        let coefficients = barycentric_coefficients(&nodes, 3, 1.1).unwrap();
        let combined: f64 = coefficients.iter().zip(&values).map(|(c, v)| c * v).sum();
        assert_relative_eq!(combined, rational.evaluate(1.1), max_relative = 1e-13);
        assert_eq!(barycentric_coefficients(&nodes, 3, 1.5).unwrap(), vec![0.0, 0.0, 1.0, 0.0, 0.0]);
        assert!(matches!(
            barycentric_coefficients(&[1.0, 0.0], 1, 0.5),
            Err(InterpolationError::DuplicateNode { .. })
        ));
    }

    #[test]
    fn spans_stay_inside_the_data() {
        assert_eq!(span_start(12, 0, 5), 0);
        assert_eq!(span_start(12, 6, 5), 4);
        assert_eq!(span_start(12, 11, 5), 7);
        assert_eq!(span_start(3, 1, 10), 0);
    }

    #[test]
    fn finite_difference_is_sixth_order_accurate() {
        assert_abs_diff_eq!(finite_difference_derivative(f64::sin, 0.7), 0.7_f64.cos(), epsilon = 1e-11);
        let cubic = |r: f64| 3.0 * r.powi(3);
        assert_relative_eq!(finite_difference_derivative(cubic, 120.0), 9.0 * 120.0_f64.powi(2), max_relative = 1e-10);
    }
}
