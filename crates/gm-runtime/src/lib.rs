#![forbid(unsafe_code)]

//! Explicit application configuration.
//!
//! An [`AppConfig`] is built once at startup (defaults rooted at an instance
//! directory, then an optional YAML file, then `GMVIEW_*` environment
//! overrides) and handed by reference to the dataset store and the request
//! handlers. Nothing reads configuration from global state.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_INSTANCE_DIR: &str = "instance";
pub const DEFAULT_DATASET_FILE: &str = "dataset.parquet";
pub const DEFAULT_LOCATIONS_FILE: &str = "locations.txt";
pub const DEFAULT_MEASURE: &str = "PGA";

pub const ENV_DATASET: &str = "GMVIEW_DATASET";
pub const ENV_LOCATIONS: &str = "GMVIEW_LOCATIONS";
pub const ENV_DEFAULT_MEASURE: &str = "GMVIEW_DEFAULT_MEASURE";
pub const ENV_MAX_EXPRESSION_LEN: &str = "GMVIEW_MAX_EXPRESSION_LEN";
pub const ENV_MAX_DEPTH: &str = "GMVIEW_MAX_DEPTH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("environment variable {key}={value:?} is not valid: {reason}")]
    InvalidEnv {
        key: String,
        value: String,
        reason: String,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Bounds applied to a filter expression before it is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalLimits {
    /// Longest accepted expression, in characters.
    pub max_expression_len: usize,
    /// Deepest accepted nesting of parentheses, operators and calls.
    pub max_depth: usize,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_expression_len: 4_096,
            max_depth: 64,
        }
    }
}

/// Names of the columns the application gives meaning to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnConfig {
    pub station: String,
    pub measure: String,
    pub latitude: String,
    pub longitude: String,
    pub marker_size: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            station: "station".to_owned(),
            measure: "imt".to_owned(),
            latitude: "lat".to_owned(),
            longitude: "lon".to_owned(),
            marker_size: "size".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub zoom: f64,
    /// Marker size used when the table has no marker-size column.
    pub default_marker_size: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            zoom: 5.0,
            default_marker_size: 8.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub dataset_path: PathBuf,
    pub locations_path: PathBuf,
    pub columns: ColumnConfig,
    pub default_measure: String,
    /// Text columns reported as categorical by the schema registry.
    /// The measure column is always categorical.
    pub categorical_columns: Vec<String>,
    pub limits: EvalLimits,
    pub map: MapConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_instance_dir(DEFAULT_INSTANCE_DIR)
    }
}

impl AppConfig {
    #[must_use]
    pub fn from_instance_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            dataset_path: dir.join(DEFAULT_DATASET_FILE),
            locations_path: dir.join(DEFAULT_LOCATIONS_FILE),
            columns: ColumnConfig::default(),
            default_measure: DEFAULT_MEASURE.to_owned(),
            categorical_columns: Vec::new(),
            limits: EvalLimits::default(),
            map: MapConfig::default(),
        }
    }

    pub fn from_yaml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML config file. Relative data paths inside it are resolved
    /// against the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_owned(),
            source,
        })?;
        let mut config = Self::from_yaml_str(&text)?;
        if let Some(base) = path.parent() {
            config.dataset_path = resolve(base, &config.dataset_path);
            config.locations_path = resolve(base, &config.locations_path);
        }
        Ok(config)
    }

    #[must_use]
    pub fn with_dataset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dataset_path = path.into();
        self
    }

    #[must_use]
    pub fn with_locations_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.locations_path = path.into();
        self
    }

    /// Apply `GMVIEW_*` overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(std::env::vars())
    }

    /// Apply `GMVIEW_*` overrides from `vars`; other keys are ignored.
    pub fn with_overrides<I, K, V>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let key = key.as_ref();
            match key {
                ENV_DATASET => self.dataset_path = PathBuf::from(value.into()),
                ENV_LOCATIONS => self.locations_path = PathBuf::from(value.into()),
                ENV_DEFAULT_MEASURE => self.default_measure = value.into(),
                ENV_MAX_EXPRESSION_LEN => {
                    self.limits.max_expression_len = parse_positive(key, value.into())?;
                }
                ENV_MAX_DEPTH => self.limits.max_depth = parse_positive(key, value.into())?,
                _ => {}
            }
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_measure.trim().is_empty() {
            return Err(ConfigError::Invalid("default_measure is empty".to_owned()));
        }
        if self.limits.max_expression_len == 0 || self.limits.max_depth == 0 {
            return Err(ConfigError::Invalid(
                "evaluation limits must be positive".to_owned(),
            ));
        }
        let columns = &self.columns;
        for (what, name) in [
            ("station", &columns.station),
            ("measure", &columns.measure),
            ("latitude", &columns.latitude),
            ("longitude", &columns.longitude),
        ] {
            if name.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{what} column name is empty")));
            }
        }
        if !(self.map.zoom.is_finite() && self.map.default_marker_size.is_finite()) {
            return Err(ConfigError::Invalid("map settings must be finite".to_owned()));
        }
        Ok(())
    }

    /// Categorical columns including the measure column, without duplicates.
    #[must_use]
    pub fn effective_categorical_columns(&self) -> Vec<String> {
        let mut out = vec![self.columns.measure.clone()];
        for name in &self.categorical_columns {
            if !out.contains(name) {
                out.push(name.clone());
            }
        }
        out
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_owned()
    } else {
        base.join(path)
    }
}

fn parse_positive(key: &str, value: String) -> Result<usize, ConfigError> {
    match value.trim().parse::<usize>() {
        Ok(parsed) if parsed > 0 => Ok(parsed),
        _ => Err(ConfigError::InvalidEnv {
            key: key.to_owned(),
            value,
            reason: "expected a positive integer".to_owned(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use super::{
        AppConfig, ConfigError, ENV_DATASET, ENV_MAX_DEPTH, EvalLimits, DEFAULT_MEASURE,
    };

    #[test]
    fn defaults_are_rooted_at_instance_dir() {
        let config = AppConfig::from_instance_dir("/srv/gm");
        assert_eq!(config.dataset_path, PathBuf::from("/srv/gm/dataset.parquet"));
        assert_eq!(config.locations_path, PathBuf::from("/srv/gm/locations.txt"));
        assert_eq!(config.default_measure, DEFAULT_MEASURE);
        assert_eq!(config.limits, EvalLimits::default());
        config.validate().expect("defaults validate");
    }

    #[test]
    fn yaml_fills_missing_fields_with_defaults() {
        let config = AppConfig::from_yaml_str(
            "dataset_path: data/readings.csv\ncolumns:\n  station: sta\nlimits:\n  max_depth: 16\n",
        )
        .expect("yaml");
        assert_eq!(config.dataset_path, PathBuf::from("data/readings.csv"));
        assert_eq!(config.columns.station, "sta");
        assert_eq!(config.columns.measure, "imt");
        assert_eq!(config.limits.max_depth, 16);
        assert_eq!(config.limits.max_expression_len, 4_096);
    }

    #[test]
    fn load_resolves_relative_paths_against_config_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gmview.yaml");
        let mut file = std::fs::File::create(&path).expect("create");
        writeln!(file, "dataset_path: readings.csv\nlocations_path: /abs/loc.txt").expect("write");

        let config = AppConfig::load(&path).expect("load");
        assert_eq!(config.dataset_path, dir.path().join("readings.csv"));
        assert_eq!(config.locations_path, PathBuf::from("/abs/loc.txt"));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = AppConfig::load(std::path::Path::new("/nonexistent/gmview.yaml"))
            .expect_err("missing");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn env_overrides_apply_and_validate() {
        let config = AppConfig::default()
            .with_overrides([(ENV_DATASET, "/data/x.csv"), (ENV_MAX_DEPTH, "8"), ("HOME", "/root")])
            .expect("overrides");
        assert_eq!(config.dataset_path, PathBuf::from("/data/x.csv"));
        assert_eq!(config.limits.max_depth, 8);

        let err = AppConfig::default()
            .with_overrides([(ENV_MAX_DEPTH, "0")])
            .expect_err("zero depth");
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }

    #[test]
    fn empty_default_measure_is_rejected() {
        let err = AppConfig::from_yaml_str("default_measure: ''\n").expect_err("empty measure");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn measure_column_is_always_categorical() {
        let mut config = AppConfig::default();
        config.categorical_columns = vec!["station".into(), "imt".into()];
        assert_eq!(
            config.effective_categorical_columns(),
            vec!["imt".to_owned(), "station".to_owned()]
        );
    }
}
