// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Typed initial-data configuration and its file loader.
//!
//! Files are merged in the order given, later ones overriding leaves of
//! earlier ones.  `.json` files are read as JSON and anything else as TOML.
//! The typed configuration lives under the `initial_data` table:
//!
//! ```toml
//! [initial_data.resolution]
//! l_max = 12
//! number_of_radial_points = 9
//!
//! [initial_data.strategy]
//! kind = "conformal_factor"
//! solver = { tolerance = 1e-10, max_iterations = 100 }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::angular_solver::AngularSolverSettings;
use crate::spectral::{Resolution, SpectralError};
use crate::strategy::InitialDataStrategy;

/// Key of the typed section inside the merged document.
pub const INITIAL_DATA_SECTION: &str = "initial_data";

/// Everything needed to build the first hypersurface.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InitialDataConfig {
    pub resolution: Resolution,
    /// Resolution of the main evolution; `None` keeps `resolution`.
    #[serde(default)]
    pub main_resolution: Option<Resolution>,
    #[serde(default)]
    pub strategy: InitialDataStrategy,
}

impl InitialDataConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resolution.validate()?;
        if let Some(main) = self.main_resolution {
            main.validate()?;
        }
        match &self.strategy {
            InitialDataStrategy::InverseCubic => Ok(()),
            InitialDataStrategy::ConformalFactor { solver } => check_solver(solver),
            InitialDataStrategy::RadialPsi0 {
                target_time,
                radial,
                solver,
                ..
            } => {
                if !target_time.is_finite() {
                    return Err(ConfigError::Invalid(format!(
                        "target time must be finite, got {target_time}"
                    )));
                }
                let stepper = &radial.stepper;
                for (name, value) in [
                    ("absolute_tolerance", stepper.absolute_tolerance),
                    ("relative_tolerance", stepper.relative_tolerance),
                    ("min_step", stepper.min_step),
                ] {
                    if !(value > 0.0 && value.is_finite()) {
                        return Err(ConfigError::Invalid(format!(
                            "{name} must be positive, got {value}"
                        )));
                    }
                }
                if radial.interpolation_order == 0 {
                    return Err(ConfigError::Invalid(
                        "interpolation order must be at least 1".into(),
                    ));
                }
                check_solver(solver)
            }
        }
    }

    pub fn main_resolution(&self) -> Resolution {
        self.main_resolution.unwrap_or(self.resolution)
    }
}

fn check_solver(solver: &AngularSolverSettings) -> Result<(), ConfigError> {
    if solver.tolerance > 0.0 && solver.tolerance.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "angular tolerance must be positive, got {}",
            solver.tolerance
        )))
    }
}

/// Ordered list of configuration files.
#[derive(Clone, Debug, Default)]
pub struct ConfigLayers {
    paths: Vec<PathBuf>,
}

impl ConfigLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a file that overrides every earlier one.
    pub fn with<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.paths.push(path.into());
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Merges every file, then deserialises and validates the
    /// `initial_data` section.
    pub fn load(&self) -> Result<InitialDataConfig, ConfigError> {
        let mut merged = Value::Object(Default::default());
        for path in &self.paths {
            let layer = read_layer(path)?;
            debug!(path = %path.display(), "merging config layer");
            overlay(&mut merged, layer);
        }
        let section = match merged {
            Value::Object(mut map) => map.remove(INITIAL_DATA_SECTION),
            _ => None,
        }
        .ok_or(ConfigError::MissingSection(INITIAL_DATA_SECTION))?;
        let config: InitialDataConfig =
            serde_json::from_value(section).map_err(|source| ConfigError::Section {
                section: INITIAL_DATA_SECTION,
                source,
            })?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse TOML {path:?}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("failed to parse JSON {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("section `{section}` is malformed: {source}")]
    Section {
        section: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("section `{0}` is missing from every file")]
    MissingSection(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error(transparent)]
    Spectral(#[from] SpectralError),
}

fn read_layer(path: &Path) -> Result<Value, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if path.extension().map_or(false, |ext| ext == "json") {
        return serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        });
    }
    let value: toml::Value = toml::from_str(&text).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::to_value(value).map_err(|source| ConfigError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Tables merge key by key; any other value replaces what was there.
fn overlay(dest: &mut Value, src: Value) {
    match (dest, src) {
        (Value::Object(dest_map), Value::Object(src_map)) => {
            for (key, value) in src_map {
                match dest_map.get_mut(&key) {
                    Some(existing) => overlay(existing, value),
                    None => {
                        dest_map.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn later_files_override_leaves() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(
            dir.path(),
            "base.toml",
            r#"
            [initial_data.resolution]
            l_max = 12
            number_of_radial_points = 9

            [initial_data.strategy]
            kind = "conformal_factor"

            [initial_data.strategy.solver]
            tolerance = 1e-10
            max_iterations = 100
            "#,
        );
        let site = write(
            dir.path(),
            "site.toml",
            r#"
            [initial_data.strategy.solver]
            max_iterations = 40
            "#,
        );
        let run = write(
            dir.path(),
            "run.json",
            r#"{"initial_data":{"strategy":{"solver":{"require_convergence":true}}}}"#,
        );

        let layers = ConfigLayers::new().with(base).with(site).with(run);
        assert_eq!(layers.paths().len(), 3);
        let config = layers.load().unwrap();
        assert_eq!(config.resolution, Resolution::new(12, 9).unwrap());
        assert_eq!(config.main_resolution(), config.resolution);
        assert_eq!(
            config.strategy,
            InitialDataStrategy::ConformalFactor {
                solver: AngularSolverSettings {
                    tolerance: 1e-10,
                    max_iterations: 40,
                    require_convergence: true,
                    adjust_volume_gauge: true,
                },
            }
        );
    }

    #[test]
    fn radial_strategy_defaults_to_the_scri_strain_solver() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(
            dir.path(),
            "base.json",
            r#"{"initial_data":{
                "resolution":{"l_max":6,"number_of_radial_points":5},
                "strategy":{"kind":"radial_psi0","target_index":0,"target_time":12.5}
            }}"#,
        );
        let config = ConfigLayers::new().with(base).load().unwrap();
        match config.strategy {
            InitialDataStrategy::RadialPsi0 { solver, .. } => {
                assert_eq!(solver, AngularSolverSettings::scri_strain());
            }
            other => panic!("unexpected strategy {other:?}"),
        }
    }

    #[test]
    fn missing_files_and_sections() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent.toml");
        let err = ConfigLayers::new().with(&absent).load().unwrap_err();
        assert!(matches!(err, ConfigError::Io { ref path, .. } if path == &absent));

        let empty = write(dir.path(), "empty.toml", "[other]\nvalue = 1\n");
        assert!(matches!(
            ConfigLayers::new().with(empty).load(),
            Err(ConfigError::MissingSection(INITIAL_DATA_SECTION))
        ));
        assert!(matches!(
            ConfigLayers::new().load(),
            Err(ConfigError::MissingSection(INITIAL_DATA_SECTION))
        ));
    }

    #[test]
    fn malformed_files_name_their_path() {
        let dir = tempfile::tempdir().unwrap();
        let base = write(dir.path(), "base.toml", "initial_data = [");
        let err = ConfigLayers::new().with(&base).load().unwrap_err();
        assert!(matches!(err, ConfigError::Toml { ref path, .. } if path == &base));

        let run = write(dir.path(), "run.json", "{");
        let err = ConfigLayers::new().with(&run).load().unwrap_err();
        assert!(matches!(err, ConfigError::Json { ref path, .. } if path == &run));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let config = InitialDataConfig {
            resolution: Resolution {
                l_max: 1,
                number_of_radial_points: 5,
            },
            main_resolution: None,
            strategy: InitialDataStrategy::InverseCubic,
        };
        assert!(matches!(config.validate(), Err(ConfigError::Spectral(_))));

        let config = InitialDataConfig {
            resolution: Resolution::new(4, 5).unwrap(),
            main_resolution: None,
            strategy: InitialDataStrategy::ConformalFactor {
                solver: AngularSolverSettings {
                    tolerance: -1.0,
                    ..AngularSolverSettings::default()
                },
            },
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let config = InitialDataConfig {
            strategy: InitialDataStrategy::ConformalFactor {
                solver: AngularSolverSettings {
                    max_iterations: 0,
                    ..AngularSolverSettings::default()
                },
            },
            ..config
        };
        assert!(config.validate().is_ok());
    }
}
