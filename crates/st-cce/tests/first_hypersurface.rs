// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use std::fs;

use approx::assert_abs_diff_eq;
use num_complex::Complex64;
use st_cce::archive::TabulatedEntry;
use st_cce::spectral::{cached_grid, radial_collocation_points, spin_weighted_ylm};
use st_cce::{
    hand_off_to_main_run, init_tracing, initialize_first_hypersurface, read_in_worldtube_data,
    AngularCoordinates, AngularSolverSettings, ArchiveError, BoundaryData, CceError, ConfigLayers,
    HypersurfaceState, InitialDataSources, InitialDataStrategy, MultiArchiveBuffers,
    RadialSettings, Resolution, SpinWeighted, TabulatedArchive, WorldtubeArchive,
};

fn shape(l_max: usize) -> Vec<Complex64> {
    cached_grid(l_max)
        .unwrap()
        .points()
        .map(|p| {
            Complex64::new(1e-3, 0.0) * spin_weighted_ylm(2, 2, 0, p.theta, p.phi)
                + Complex64::new(0.0, 4e-4) * spin_weighted_ylm(2, 3, 1, p.theta, p.phi)
        })
        .collect()
}

/// Archive at `radius` whose `∂r J` grows linearly with the areal radius.
fn archive(radius: f64, l_max: usize) -> TabulatedArchive {
    let base = shape(l_max);
    let entry = |time: f64| TabulatedEntry {
        time,
        j: base.clone(),
        dr_j: base.iter().map(|v| v * (2e-3 * radius)).collect(),
        r: vec![radius; base.len()],
    };
    TabulatedArchive::new(radius, l_max, vec![entry(0.0), entry(200.0)]).unwrap()
}

/// Archive at `radius` whose data drifts smoothly in time.
fn drifting_archive(radius: f64, l_max: usize) -> TabulatedArchive {
    let base = shape(l_max);
    let entries = (0..=20)
        .map(|step| {
            let time = 10.0 * step as f64;
            let scale = 1.0 + 0.01 * time + 0.05 * (0.03 * time).sin();
            TabulatedEntry {
                time,
                j: base.iter().map(|v| v * scale).collect(),
                dr_j: base.iter().map(|v| v * (1e-3 * radius * scale)).collect(),
                r: vec![radius + 1e-3 * time; base.len()],
            }
        })
        .collect();
    TabulatedArchive::new(radius, l_max, entries).unwrap()
}

fn flat_boundary(angular: usize) -> (Vec<Complex64>, Vec<f64>) {
    (vec![Complex64::new(0.0, 0.0); angular], vec![100.0; angular])
}

fn radial_psi0(target_index: usize, target_time: f64) -> InitialDataStrategy {
    InitialDataStrategy::RadialPsi0 {
        target_index,
        target_time,
        radial: RadialSettings::default(),
        solver: AngularSolverSettings {
            max_iterations: 30,
            ..AngularSolverSettings::scri_strain()
        },
    }
}

fn max_displacement(coordinates: &AngularCoordinates) -> f64 {
    let native = AngularCoordinates::native(coordinates.l_max()).unwrap();
    (0..3)
        .flat_map(|axis| {
            coordinates.cartesian()[axis]
                .iter()
                .zip(native.cartesian()[axis])
                .map(|(a, b)| (a - b).abs())
                .collect::<Vec<_>>()
        })
        .fold(0.0_f64, f64::max)
}

#[test]
fn radial_psi0_is_independent_of_archive_order() {
    let resolution = Resolution::new(6, 5).unwrap();
    let (zeros, r) = flat_boundary(resolution.number_of_angular_points());
    let boundary = BoundaryData {
        j: &zeros,
        dr_j: &zeros,
        r: &r,
        beta: &zeros,
    };
    let near = archive(100.0, 6);
    let far = archive(150.0, 6);

    let mut forward = HypersurfaceState::new(resolution).unwrap();
    let ordered: [&dyn WorldtubeArchive; 2] = [&near, &far];
    let report = initialize_first_hypersurface(
        &mut forward,
        &radial_psi0(0, 50.0),
        &boundary,
        &InitialDataSources { archives: &ordered },
    )
    .unwrap();
    let times: Vec<f64> = report.samples.iter().map(|s| s.corrected_time).collect();
    assert_eq!(times, vec![50.0, 100.0]);

    let mut reversed = HypersurfaceState::new(resolution).unwrap();
    let swapped: [&dyn WorldtubeArchive; 2] = [&far, &near];
    initialize_first_hypersurface(
        &mut reversed,
        &radial_psi0(1, 50.0),
        &boundary,
        &InitialDataSources { archives: &swapped },
    )
    .unwrap();

    for (a, b) in forward.j().data().iter().zip(reversed.j().data()) {
        assert_abs_diff_eq!((a - b).norm(), 0.0, epsilon = 1e-15);
    }
    for (a, b) in forward.coordinates().theta().iter().zip(reversed.coordinates().theta()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-15);
    }
    let angular = report.angular.expect("scri solve report");
    let first = angular.history[0].max_error;
    let last = angular.history.last().unwrap().max_error;
    assert!(last < 0.1 * first, "scri residual {last:e} from {first:e}");
    let scri_peak = forward.shell(4).iter().fold(0.0_f64, |m, v| m.max(v.norm()));
    assert_abs_diff_eq!(scri_peak, last, epsilon = 1e-15);
    assert!(max_displacement(forward.coordinates()) > 0.0);
    assert!(forward.shell(4) != forward.shell(0));
}

#[test]
fn constant_worldtube_data_gives_a_constant_profile() {
    let resolution = Resolution::new(4, 6).unwrap();
    let angular = resolution.number_of_angular_points();
    let j = shape(4);
    let zeros = vec![Complex64::new(0.0, 0.0); angular];
    let entry = |time| TabulatedEntry {
        time,
        j: j.clone(),
        dr_j: zeros.clone(),
        r: vec![80.0; angular],
    };
    let inner = TabulatedArchive::new(80.0, 4, vec![entry(0.0), entry(100.0)]).unwrap();
    let mut outer_entries = vec![entry(0.0), entry(100.0)];
    for e in &mut outer_entries {
        e.r = vec![120.0; angular];
    }
    let outer = TabulatedArchive::new(120.0, 4, outer_entries).unwrap();
    let archives: [&dyn WorldtubeArchive; 2] = [&inner, &outer];

    let r = vec![80.0; angular];
    let boundary = BoundaryData {
        j: &j,
        dr_j: &zeros,
        r: &r,
        beta: &zeros,
    };
    let mut state = HypersurfaceState::new(resolution).unwrap();
    let report = initialize_first_hypersurface(
        &mut state,
        &radial_psi0(0, 10.0),
        &boundary,
        &InitialDataSources { archives: &archives },
    )
    .unwrap();

    // the profile is J on every shell, so the scri solve sees J itself and
    // moves every shell by the same map
    let angular_report = report.angular.expect("scri solve report");
    let peak = j.iter().fold(0.0_f64, |m, v| m.max(v.norm()));
    assert_abs_diff_eq!(angular_report.history[0].max_error, peak, epsilon = 1e-13);
    let last = angular_report.history.last().unwrap().max_error;
    assert!(last < 0.1 * peak, "scri residual {last:e} from {peak:e}");
    for shell in 1..resolution.number_of_radial_points {
        for (a, b) in state.shell(shell).iter().zip(state.shell(0)) {
            assert_abs_diff_eq!((a - b).norm(), 0.0, epsilon = 1e-12);
        }
    }
    assert!(state.j().max_abs() < 0.1 * peak);
    assert!(max_displacement(state.coordinates()) > 1e-6);
}

#[test]
fn worldtube_buffers_follow_the_null_cone_in_either_order() {
    init_tracing();
    let l_max = 6;
    let near = drifting_archive(100.0, l_max);
    let far = drifting_archive(150.0, l_max);
    let near_at = near.sample(37.0).unwrap();
    let far_at = far.sample(87.0).unwrap();
    assert!(far_at.j != far.sample(37.0).unwrap().j);

    let ordered: [&dyn WorldtubeArchive; 2] = [&near, &far];
    let mut buffers = MultiArchiveBuffers::new(2, l_max);
    read_in_worldtube_data(&mut buffers, &ordered, l_max, 0, 37.0).unwrap();
    let times: Vec<f64> = buffers.samples.iter().map(|s| s.corrected_time).collect();
    assert_eq!(times, vec![37.0, 87.0]);
    assert_eq!(buffers.j(0), near_at.j.as_slice());
    assert_eq!(buffers.j(1), far_at.j.as_slice());
    assert_eq!(buffers.dr_j(1), far_at.dr_j.as_slice());
    assert_eq!(buffers.r(1), far_at.r.as_slice());

    let swapped: [&dyn WorldtubeArchive; 2] = [&far, &near];
    let mut reversed = MultiArchiveBuffers::new(2, l_max);
    read_in_worldtube_data(&mut reversed, &swapped, l_max, 1, 37.0).unwrap();
    let times: Vec<f64> = reversed.samples.iter().map(|s| s.corrected_time).collect();
    assert_eq!(times, vec![87.0, 37.0]);
    assert_eq!(reversed.j(0), far_at.j.as_slice());
    assert_eq!(reversed.j(1), near_at.j.as_slice());
    assert_eq!(reversed.dr_j(0), buffers.dr_j(1));
    assert_eq!(reversed.r(1), buffers.r(0));
}

#[test]
fn archives_at_other_band_limits_are_resampled() {
    let resolution = Resolution::new(8, 4).unwrap();
    let (zeros, r) = flat_boundary(resolution.number_of_angular_points());
    let boundary = BoundaryData {
        j: &zeros,
        dr_j: &zeros,
        r: &r,
        beta: &zeros,
    };
    let coarse = archive(100.0, 5);
    let fine = archive(150.0, 8);
    let mixed: [&dyn WorldtubeArchive; 2] = [&coarse, &fine];
    let mut state = HypersurfaceState::new(resolution).unwrap();
    initialize_first_hypersurface(
        &mut state,
        &radial_psi0(0, 20.0),
        &boundary,
        &InitialDataSources { archives: &mixed },
    )
    .unwrap();

    let native = archive(100.0, 8);
    let matched: [&dyn WorldtubeArchive; 2] = [&native, &fine];
    let mut expected = HypersurfaceState::new(resolution).unwrap();
    initialize_first_hypersurface(
        &mut expected,
        &radial_psi0(0, 20.0),
        &boundary,
        &InitialDataSources { archives: &matched },
    )
    .unwrap();
    for (a, b) in state.j().data().iter().zip(expected.j().data()) {
        assert_abs_diff_eq!((a - b).norm(), 0.0, epsilon = 1e-11);
    }
}

#[test]
fn missing_archive_time_leaves_the_state_alone() {
    let resolution = Resolution::new(4, 4).unwrap();
    let (zeros, r) = flat_boundary(resolution.number_of_angular_points());
    let boundary = BoundaryData {
        j: &zeros,
        dr_j: &zeros,
        r: &r,
        beta: &zeros,
    };
    let near = archive(100.0, 4);
    let far = archive(150.0, 4);
    let archives: [&dyn WorldtubeArchive; 2] = [&near, &far];
    let mut state = HypersurfaceState::new(resolution).unwrap();
    let before = state.clone();
    let err = initialize_first_hypersurface(
        &mut state,
        &radial_psi0(0, 180.0),
        &boundary,
        &InitialDataSources { archives: &archives },
    )
    .unwrap_err();
    assert!(matches!(err, CceError::Archive(ArchiveError::Missing { .. })));
    assert_eq!(state, before);
}

#[test]
fn conformal_factor_strategy_scales_the_gauge_transformed_shell() {
    let resolution = Resolution::new(8, 5).unwrap();
    let angular = resolution.number_of_angular_points();
    let j = shape(8);
    let beta = vec![Complex64::new(0.0, 0.0); angular];
    let r = vec![100.0; angular];
    let boundary = BoundaryData {
        j: &j,
        dr_j: &beta,
        r: &r,
        beta: &beta,
    };
    let mut state = HypersurfaceState::new(resolution).unwrap();
    let report = initialize_first_hypersurface(
        &mut state,
        &InitialDataStrategy::ConformalFactor {
            solver: AngularSolverSettings::default(),
        },
        &boundary,
        &InitialDataSources::default(),
    )
    .unwrap();
    assert!(report.angular.map_or(false, |a| a.converged));

    let one_minus_y: Vec<f64> = radial_collocation_points(5)
        .unwrap()
        .into_iter()
        .map(|y| 1.0 - y)
        .collect();
    for (shell, factor) in one_minus_y.iter().enumerate() {
        for (a, b) in state.shell(shell).iter().zip(&j) {
            assert_abs_diff_eq!((a - *b * (0.5 * factor)).norm(), 0.0, epsilon = 1e-10);
        }
    }
}

#[test]
fn hand_off_reproduces_band_limited_polynomial_fields() {
    let from = Resolution::new(6, 5).unwrap();
    let to = Resolution::new(10, 8).unwrap();
    let field = |resolution: Resolution| -> SpinWeighted<2> {
        let grid = cached_grid(resolution.l_max).unwrap();
        let ys = radial_collocation_points(resolution.number_of_radial_points).unwrap();
        let mut out = Vec::new();
        for y in ys {
            out.extend(grid.points().map(|p| {
                spin_weighted_ylm(2, 3, 1, p.theta, p.phi) * (1.0 + y).powi(2)
                    + spin_weighted_ylm(2, 2, -2, p.theta, p.phi) * y
            }));
        }
        out.into()
    };

    let state =
        HypersurfaceState::from_parts(from, field(from), AngularCoordinates::native(6).unwrap())
            .unwrap();
    let main = hand_off_to_main_run(&state, to).unwrap();
    assert_eq!(main.resolution(), to);
    for (a, b) in main.j().data().iter().zip(field(to).data()) {
        assert_abs_diff_eq!((a - b).norm(), 0.0, epsilon = 1e-11);
    }
    let native = AngularCoordinates::native(10).unwrap();
    for (a, b) in main.coordinates().theta().iter().zip(native.theta()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
    }
}

#[test]
fn hand_off_carries_a_solved_map() {
    let from = Resolution::new(12, 5).unwrap();
    let angular = from.number_of_angular_points();
    let grid = cached_grid(12).unwrap();
    let beta: Vec<Complex64> = grid
        .points()
        .map(|p| Complex64::new(0.5 * (1.0 - 0.1 * p.theta.cos()).ln() - 0.25 * (0.99_f64).ln(), 0.0))
        .collect();
    let zeros = vec![Complex64::new(0.0, 0.0); angular];
    let r = vec![100.0; angular];
    let boundary = BoundaryData {
        j: &zeros,
        dr_j: &zeros,
        r: &r,
        beta: &beta,
    };
    let mut state = HypersurfaceState::new(from).unwrap();
    initialize_first_hypersurface(
        &mut state,
        &InitialDataStrategy::ConformalFactor {
            solver: AngularSolverSettings {
                tolerance: 1e-8,
                ..AngularSolverSettings::default()
            },
        },
        &boundary,
        &InitialDataSources::default(),
    )
    .unwrap();

    let main = hand_off_to_main_run(&state, Resolution::new(16, 7).unwrap()).unwrap();
    let [x, y, z] = main.coordinates().cartesian();
    for i in 0..main.coordinates().len() {
        assert_abs_diff_eq!(x[i] * x[i] + y[i] * y[i] + z[i] * z[i], 1.0, epsilon = 1e-14);
    }
    let native = AngularCoordinates::native(16).unwrap();
    for (mapped, theta) in main.coordinates().theta().iter().zip(native.theta()) {
        let expected = (theta.cos() + 0.1) / (1.0 + 0.1 * theta.cos());
        assert_abs_diff_eq!(mapped.cos(), expected, epsilon = 1e-6);
    }
}

#[test]
fn layered_configuration_drives_initialisation() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().join("base.toml");
    fs::write(
        &base,
        r#"
        [initial_data.resolution]
        l_max = 6
        number_of_radial_points = 5

        [initial_data.main_resolution]
        l_max = 8
        number_of_radial_points = 7

        [initial_data.strategy]
        kind = "inverse_cubic"
        "#,
    )
    .unwrap();
    let run = dir.path().join("run.json");
    fs::write(
        &run,
        r#"{"initial_data":{"strategy":{"kind":"conformal_factor","solver":{"max_iterations":20}}}}"#,
    )
    .unwrap();

    let config = ConfigLayers::new().with(&base).with(&run).load().unwrap();
    assert_eq!(
        config.strategy,
        InitialDataStrategy::ConformalFactor {
            solver: AngularSolverSettings {
                max_iterations: 20,
                ..AngularSolverSettings::default()
            },
        }
    );

    let angular = config.resolution.number_of_angular_points();
    let zeros = vec![Complex64::new(0.0, 0.0); angular];
    let r = vec![100.0; angular];
    let boundary = BoundaryData {
        j: &zeros,
        dr_j: &zeros,
        r: &r,
        beta: &zeros,
    };
    let mut state = HypersurfaceState::new(config.resolution).unwrap();
    initialize_first_hypersurface(&mut state, &config.strategy, &boundary, &InitialDataSources::default())
        .unwrap();
    let main = hand_off_to_main_run(&state, config.main_resolution()).unwrap();
    assert_eq!(main.resolution(), Resolution::new(8, 7).unwrap());
}
