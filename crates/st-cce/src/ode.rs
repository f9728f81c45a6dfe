// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Dormand–Prince 5(4) stepper with continuous (dense) output.
//!
//! The stepper advances one accepted step per [`DenseDopri5::do_step`] call
//! and keeps the fifth-order interpolant of that step, so callers can read
//! the solution anywhere inside the last accepted interval through
//! [`DenseDopri5::calc_state`].  States are complex vectors; the error norm
//! treats real and imaginary parts as separate components.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const C2: f64 = 1.0 / 5.0;
const C3: f64 = 3.0 / 10.0;
const C4: f64 = 4.0 / 5.0;
const C5: f64 = 8.0 / 9.0;

const A21: f64 = 1.0 / 5.0;
const A31: f64 = 3.0 / 40.0;
const A32: f64 = 9.0 / 40.0;
const A41: f64 = 44.0 / 45.0;
const A42: f64 = -56.0 / 15.0;
const A43: f64 = 32.0 / 9.0;
const A51: f64 = 19372.0 / 6561.0;
const A52: f64 = -25360.0 / 2187.0;
const A53: f64 = 64448.0 / 6561.0;
const A54: f64 = -212.0 / 729.0;
const A61: f64 = 9017.0 / 3168.0;
const A62: f64 = -355.0 / 33.0;
const A63: f64 = 46732.0 / 5247.0;
const A64: f64 = 49.0 / 176.0;
const A65: f64 = -5103.0 / 18656.0;
const A71: f64 = 35.0 / 384.0;
const A73: f64 = 500.0 / 1113.0;
const A74: f64 = 125.0 / 192.0;
const A75: f64 = -2187.0 / 6784.0;
const A76: f64 = 11.0 / 84.0;

const E1: f64 = 71.0 / 57600.0;
const E3: f64 = -71.0 / 16695.0;
const E4: f64 = 71.0 / 1920.0;
const E5: f64 = -17253.0 / 339200.0;
const E6: f64 = 22.0 / 525.0;
const E7: f64 = -1.0 / 40.0;

const D1: f64 = -12715105075.0 / 11282082432.0;
const D3: f64 = 87487479700.0 / 32700410799.0;
const D4: f64 = -10690763975.0 / 1880347072.0;
const D5: f64 = 701980252875.0 / 199316789632.0;
const D6: f64 = -1453857185.0 / 822651844.0;
const D7: f64 = 69997945.0 / 29380423.0;

const SAFETY: f64 = 0.9;
const MIN_FACTOR: f64 = 0.2;
const MAX_FACTOR: f64 = 10.0;

/// Failures of the stepper.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum IntegrationError {
    #[error("stepper was used before initialize")]
    NotInitialized,
    #[error("exceeded {steps} step attempts at t = {time}")]
    MaxSteps { steps: usize, time: f64 },
    #[error("step size {step:e} fell below the minimum at t = {time}")]
    StepSizeUnderflow { step: f64, time: f64 },
    #[error("non-finite state encountered at t = {time}")]
    NonFinite { time: f64 },
    #[error("integration already reached t = {end}")]
    PastEnd { end: f64 },
    #[error("dense output requested at t = {time} outside the accepted step [{start}, {end}]")]
    OutsideStep { time: f64, start: f64, end: f64 },
    #[error("state has {got} components, expected {expected}")]
    Dimension { expected: usize, got: usize },
}

/// Tolerances and safeguards of the stepper.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepperSettings {
    pub absolute_tolerance: f64,
    pub relative_tolerance: f64,
    pub min_step: f64,
    pub max_steps: usize,
}

impl Default for StepperSettings {
    fn default() -> Self {
        Self {
            absolute_tolerance: 1.0e-14,
            relative_tolerance: 1.0e-14,
            min_step: 1.0e-14,
            max_steps: 1_000_000,
        }
    }
}

#[derive(Clone, Debug)]
struct DenseStep {
    start: f64,
    end: f64,
    step: f64,
    coefficients: [Vec<Complex64>; 5],
}

/// Adaptive Dormand–Prince stepper.
#[derive(Clone, Debug)]
pub struct DenseDopri5 {
    settings: StepperSettings,
    time: f64,
    end: f64,
    step: f64,
    state: Vec<Complex64>,
    derivative: Vec<Complex64>,
    dense: Option<DenseStep>,
    attempts: usize,
    last_rejected: bool,
    initialized: bool,
}

impl DenseDopri5 {
    pub fn new(settings: StepperSettings) -> Self {
        Self {
            settings,
            time: 0.0,
            end: 0.0,
            step: 0.0,
            state: Vec::new(),
            derivative: Vec::new(),
            dense: None,
            attempts: 0,
            last_rejected: false,
            initialized: false,
        }
    }

    /// Resets the stepper to `(start, state)` heading towards `end` with a
    /// first trial step `initial_step` (raised to the minimum step).
    pub fn initialize<F>(
        &mut self,
        system: &mut F,
        start: f64,
        end: f64,
        state: Vec<Complex64>,
        initial_step: f64,
    ) -> Result<(), IntegrationError>
    where
        F: FnMut(f64, &[Complex64], &mut [Complex64]),
    {
        let mut derivative = vec![Complex64::new(0.0, 0.0); state.len()];
        system(start, &state, &mut derivative);
        if !all_finite(&state) || !all_finite(&derivative) {
            return Err(IntegrationError::NonFinite { time: start });
        }
        self.time = start;
        self.end = end;
        self.step = initial_step.abs().max(self.settings.min_step);
        self.state = state;
        self.derivative = derivative;
        self.dense = None;
        self.attempts = 0;
        self.last_rejected = false;
        self.initialized = true;
        Ok(())
    }

    pub fn current_time(&self) -> f64 {
        self.time
    }

    pub fn current_state(&self) -> &[Complex64] {
        &self.state
    }

    /// Trial size of the next step.
    pub fn next_step(&self) -> f64 {
        self.step
    }

    /// Interval covered by the last accepted step; `(t, t)` before the
    /// first one.
    pub fn step_range(&self) -> (f64, f64) {
        match &self.dense {
            Some(dense) => (dense.start, dense.end),
            None => (self.time, self.time),
        }
    }

    /// Advances by one accepted step and returns its interval.
    pub fn do_step<F>(&mut self, system: &mut F) -> Result<(f64, f64), IntegrationError>
    where
        F: FnMut(f64, &[Complex64], &mut [Complex64]),
    {
        if !self.initialized {
            return Err(IntegrationError::NotInitialized);
        }
        if self.time >= self.end {
            return Err(IntegrationError::PastEnd { end: self.end });
        }
        let n = self.state.len();
        let zero = Complex64::new(0.0, 0.0);
        // k2 ..= k6
        let mut stages: [Vec<Complex64>; 5] = std::array::from_fn(|_| vec![zero; n]);
        let mut trial = vec![zero; n];
        let mut next = vec![zero; n];
        let mut next_derivative = vec![zero; n];

        loop {
            self.attempts += 1;
            if self.attempts > self.settings.max_steps {
                return Err(IntegrationError::MaxSteps {
                    steps: self.settings.max_steps,
                    time: self.time,
                });
            }
            if self.step < self.settings.min_step {
                return Err(IntegrationError::StepSizeUnderflow {
                    step: self.step,
                    time: self.time,
                });
            }
            let reaches_end = self.time + self.step >= self.end;
            let h = if reaches_end {
                self.end - self.time
            } else {
                self.step
            };
            let t = self.time;
            let y = &self.state;
            let k1 = &self.derivative;

            for i in 0..n {
                trial[i] = y[i] + h * A21 * k1[i];
            }
            system(t + C2 * h, &trial, &mut stages[0]);
            for i in 0..n {
                trial[i] = y[i] + h * (A31 * k1[i] + A32 * stages[0][i]);
            }
            system(t + C3 * h, &trial, &mut stages[1]);
            for i in 0..n {
                trial[i] = y[i] + h * (A41 * k1[i] + A42 * stages[0][i] + A43 * stages[1][i]);
            }
            system(t + C4 * h, &trial, &mut stages[2]);
            for i in 0..n {
                trial[i] = y[i]
                    + h * (A51 * k1[i] + A52 * stages[0][i] + A53 * stages[1][i]
                        + A54 * stages[2][i]);
            }
            system(t + C5 * h, &trial, &mut stages[3]);
            for i in 0..n {
                trial[i] = y[i]
                    + h * (A61 * k1[i]
                        + A62 * stages[0][i]
                        + A63 * stages[1][i]
                        + A64 * stages[2][i]
                        + A65 * stages[3][i]);
            }
            let t_new = if reaches_end { self.end } else { t + h };
            system(t_new, &trial, &mut stages[4]);
            for i in 0..n {
                next[i] = y[i]
                    + h * (A71 * k1[i]
                        + A73 * stages[1][i]
                        + A74 * stages[2][i]
                        + A75 * stages[3][i]
                        + A76 * stages[4][i]);
            }
            system(t_new, &next, &mut next_derivative);

            let mut sum = 0.0;
            for i in 0..n {
                let error = h
                    * (E1 * k1[i]
                        + E3 * stages[1][i]
                        + E4 * stages[2][i]
                        + E5 * stages[3][i]
                        + E6 * stages[4][i]
                        + E7 * next_derivative[i]);
                let scale_re = self.settings.absolute_tolerance
                    + self.settings.relative_tolerance * y[i].re.abs().max(next[i].re.abs());
                let scale_im = self.settings.absolute_tolerance
                    + self.settings.relative_tolerance * y[i].im.abs().max(next[i].im.abs());
                sum += (error.re / scale_re).powi(2) + (error.im / scale_im).powi(2);
            }
            let error_norm = if n == 0 { 0.0 } else { (sum / (2 * n) as f64).sqrt() };
            if !error_norm.is_finite() {
                return Err(IntegrationError::NonFinite { time: t });
            }

            let factor = if error_norm == 0.0 {
                MAX_FACTOR
            } else {
                (SAFETY * error_norm.powf(-0.2)).clamp(MIN_FACTOR, MAX_FACTOR)
            };
            if error_norm <= 1.0 {
                if !all_finite(&next) || !all_finite(&next_derivative) {
                    return Err(IntegrationError::NonFinite { time: t_new });
                }
                let mut coefficients: [Vec<Complex64>; 5] = std::array::from_fn(|_| vec![zero; n]);
                for i in 0..n {
                    let difference = next[i] - y[i];
                    let spline = h * k1[i] - difference;
                    coefficients[0][i] = y[i];
                    coefficients[1][i] = difference;
                    coefficients[2][i] = spline;
                    coefficients[3][i] = difference - h * next_derivative[i] - spline;
                    coefficients[4][i] = h
                        * (D1 * k1[i]
                            + D3 * stages[1][i]
                            + D4 * stages[2][i]
                            + D5 * stages[3][i]
                            + D6 * stages[4][i]
                            + D7 * next_derivative[i]);
                }
                self.dense = Some(DenseStep {
                    start: t,
                    end: t_new,
                    step: h,
                    coefficients,
                });
                self.time = t_new;
                std::mem::swap(&mut self.state, &mut next);
                std::mem::swap(&mut self.derivative, &mut next_derivative);
                let growth = if self.last_rejected { factor.min(1.0) } else { factor };
                // a clamped final step does not shrink the trial size
                self.step = self.step.max(h) * growth;
                self.last_rejected = false;
                return Ok((t, t_new));
            }
            self.step = h * factor.min(1.0);
            self.last_rejected = true;
        }
    }

    /// Dense-output state at `time` inside the last accepted step.
    pub fn calc_state(&self, time: f64, out: &mut [Complex64]) -> Result<(), IntegrationError> {
        if out.len() != self.state.len() {
            return Err(IntegrationError::Dimension {
                expected: self.state.len(),
                got: out.len(),
            });
        }
        let (start, end) = self.step_range();
        if !(start <= time && time <= end) {
            return Err(IntegrationError::OutsideStep { time, start, end });
        }
        let Some(dense) = &self.dense else {
            out.copy_from_slice(&self.state);
            return Ok(());
        };
        if time == end {
            out.copy_from_slice(&self.state);
            return Ok(());
        }
        let theta = (time - dense.start) / dense.step;
        let theta1 = 1.0 - theta;
        let [r1, r2, r3, r4, r5] = &dense.coefficients;
        for i in 0..out.len() {
            out[i] = r1[i] + theta * (r2[i] + theta1 * (r3[i] + theta * (r4[i] + theta1 * r5[i])));
        }
        Ok(())
    }
}

fn all_finite(values: &[Complex64]) -> bool {
    values.iter().all(|v| v.re.is_finite() && v.im.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn loose() -> StepperSettings {
        StepperSettings {
            absolute_tolerance: 1e-12,
            relative_tolerance: 1e-12,
            ..Default::default()
        }
    }

    #[test]
    fn exponential_growth_with_dense_output() {
        let mut system = |_t: f64, y: &[Complex64], dy: &mut [Complex64]| dy[0] = y[0];
        let mut stepper = DenseDopri5::new(loose());
        stepper
            .initialize(&mut system, 0.0, 1.0, vec![Complex64::new(1.0, 0.0)], 1e-3)
            .unwrap();
        let targets = [0.1, 0.37, 0.8, 1.0];
        let mut out = [Complex64::new(0.0, 0.0)];
        for &target in &targets {
            while stepper.step_range().1 < target {
                stepper.do_step(&mut system).unwrap();
            }
            stepper.calc_state(target, &mut out).unwrap();
            assert_relative_eq!(out[0].re, target.exp(), max_relative = 1e-9);
        }
        assert_eq!(stepper.current_time(), 1.0);
        assert!(matches!(
            stepper.do_step(&mut system),
            Err(IntegrationError::PastEnd { .. })
        ));
    }

    #[test]
    fn complex_rotation_keeps_modulus() {
        let omega = Complex64::new(0.0, 3.0);
        let mut system = |_t: f64, y: &[Complex64], dy: &mut [Complex64]| dy[0] = omega * y[0];
        let mut stepper = DenseDopri5::new(loose());
        stepper
            .initialize(&mut system, -1.0, 1.0, vec![Complex64::new(1.0, 0.0)], 1e-6)
            .unwrap();
        while stepper.current_time() < 1.0 {
            stepper.do_step(&mut system).unwrap();
        }
        let y = stepper.current_state()[0];
        assert_relative_eq!(y.re, 6.0_f64.cos(), epsilon = 1e-9);
        assert_relative_eq!(y.im, 6.0_f64.sin(), epsilon = 1e-9);
    }

    #[test]
    fn dense_output_outside_the_step_is_rejected() {
        let mut system = |_t: f64, _y: &[Complex64], dy: &mut [Complex64]| dy[0] = Complex64::new(1.0, 0.0);
        let mut stepper = DenseDopri5::new(loose());
        stepper
            .initialize(&mut system, 0.0, 1.0, vec![Complex64::new(0.0, 0.0)], 0.1)
            .unwrap();
        let (start, end) = stepper.do_step(&mut system).unwrap();
        let mut out = [Complex64::new(0.0, 0.0)];
        assert!(matches!(
            stepper.calc_state(end + 0.5, &mut out),
            Err(IntegrationError::OutsideStep { .. })
        ));
        stepper.calc_state(0.5 * (start + end), &mut out).unwrap();
        assert_relative_eq!(out[0].re, 0.5 * (start + end), epsilon = 1e-14);
    }

    #[test]
    fn step_budget_is_enforced() {
        let mut system = |_t: f64, y: &[Complex64], dy: &mut [Complex64]| dy[0] = y[0];
        let mut stepper = DenseDopri5::new(StepperSettings {
            max_steps: 2,
            ..loose()
        });
        stepper
            .initialize(&mut system, 0.0, 10.0, vec![Complex64::new(1.0, 0.0)], 1e-6)
            .unwrap();
        let mut result = Ok((0.0, 0.0));
        for _ in 0..3 {
            result = stepper.do_step(&mut system);
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(result, Err(IntegrationError::MaxSteps { steps: 2, .. })));
    }
}
