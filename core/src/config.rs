//! Filter configuration and its on-disk representations.
//!
//! Every field has a default so a configuration file only needs to list the values it changes.
//! Files can be JSON, YAML, or TOML; the format is chosen from the file extension. The same
//! [`save`] and [`load`] helpers serve the scenario configuration in [`crate::sim`].
//!
//! ```
//! use mcl::config::FilterConfig;
//! use mcl::particle::ResamplingStrategy;
//!
//! let cfg = FilterConfig {
//!     num_particles: 500,
//!     resampling: ResamplingStrategy::Systematic,
//!     ..Default::default()
//! };
//! assert!(cfg.validate().is_ok());
//! ```
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

use crate::error::{FilterError, Result, check_non_negative_std, check_positive_std};
use crate::motion::DEFAULT_YAW_RATE_THRESHOLD;
use crate::particle::{EstimateStrategy, ResamplingStrategy};

fn default_num_particles() -> usize {
    100
}
/// Default seed value for reproducible runs
fn default_seed() -> u64 {
    42
}
fn default_yaw_rate_threshold() -> f64 {
    DEFAULT_YAW_RATE_THRESHOLD
}
fn default_sensor_range() -> f64 {
    50.0
}
fn default_std_position() -> [f64; 3] {
    [0.3, 0.3, 0.01]
}
fn default_std_landmark() -> [f64; 2] {
    [0.3, 0.3]
}
fn default_delta_t() -> f64 {
    0.1
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Number of particles, fixed for the lifetime of the filter.
    #[serde(default = "default_num_particles")]
    pub num_particles: usize,

    /// Seed for the filter's random number generator.
    ///
    /// Initialization noise, process noise, and resampling all draw from one generator, so the
    /// same seed and inputs reproduce a run exactly.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Yaw rates below this magnitude (rad/s) are treated as straight-line motion.
    #[serde(default = "default_yaw_rate_threshold")]
    pub yaw_rate_threshold: f64,

    /// Maximum landmark detection range (m).
    #[serde(default = "default_sensor_range")]
    pub sensor_range: f64,

    /// GNSS / position uncertainty `[x (m), y (m), theta (rad)]`, used for initialization and as
    /// the default process noise.
    #[serde(default = "default_std_position")]
    pub std_position: [f64; 3],

    /// Landmark measurement uncertainty `[x (m), y (m)]`.
    #[serde(default = "default_std_landmark")]
    pub std_landmark: [f64; 2],

    /// Nominal time between control updates (s).
    #[serde(default = "default_delta_t")]
    pub delta_t: f64,

    #[serde(default)]
    pub resampling: ResamplingStrategy,

    #[serde(default)]
    pub estimate: EstimateStrategy,
}

impl Default for FilterConfig {
    fn default() -> Self {
        FilterConfig {
            num_particles: default_num_particles(),
            seed: default_seed(),
            yaw_rate_threshold: default_yaw_rate_threshold(),
            sensor_range: default_sensor_range(),
            std_position: default_std_position(),
            std_landmark: default_std_landmark(),
            delta_t: default_delta_t(),
            resampling: ResamplingStrategy::default(),
            estimate: EstimateStrategy::default(),
        }
    }
}

impl FilterConfig {
    /// Check every value against its valid domain.
    pub fn validate(&self) -> Result<()> {
        if self.num_particles == 0 {
            return Err(FilterError::InvalidConfiguration(
                "number of particles must be positive".to_string(),
            ));
        }
        if !(self.yaw_rate_threshold.is_finite() && self.yaw_rate_threshold >= 0.0) {
            return Err(FilterError::InvalidConfiguration(format!(
                "yaw rate threshold must be finite and non-negative, got {}",
                self.yaw_rate_threshold
            )));
        }
        if self.sensor_range.is_nan() || self.sensor_range <= 0.0 {
            return Err(FilterError::InvalidConfiguration(format!(
                "sensor range must be positive, got {}",
                self.sensor_range
            )));
        }
        if !(self.delta_t.is_finite() && self.delta_t > 0.0) {
            return Err(FilterError::InvalidConfiguration(format!(
                "time step must be positive, got {}",
                self.delta_t
            )));
        }
        check_non_negative_std("position", &self.std_position)?;
        check_positive_std("landmark", &self.std_landmark)?;
        Ok(())
    }

    /// Write the configuration; the format follows the extension (see [`ConfigFormat`]).
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        save(self, path)
    }

    /// Read a configuration written by hand or by [`Self::to_file`]. Missing fields take their
    /// defaults; the result is not validated until a filter is built from it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        load(path)
    }
}

/// Serialization formats accepted for configuration files.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// `.json`, `.yaml`/`.yml` or `.toml`, case-insensitive.
    pub fn from_path(path: &Path) -> io::Result<Self> {
        match extension(path).as_deref() {
            Some("json") => Ok(ConfigFormat::Json),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("toml") => Ok(ConfigFormat::Toml),
            _ => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "unsupported configuration file {}: expected .json, .yaml or .toml",
                    path.display()
                ),
            )),
        }
    }
}

/// Serialize `value` to `path` in the format named by its extension.
pub fn save<T: Serialize, P: AsRef<Path>>(value: &T, path: P) -> io::Result<()> {
    let path = path.as_ref();
    let text = match ConfigFormat::from_path(path)? {
        ConfigFormat::Json => serde_json::to_string_pretty(value).map_err(io::Error::other)?,
        ConfigFormat::Yaml => serde_yaml::to_string(value).map_err(io::Error::other)?,
        ConfigFormat::Toml => toml::to_string(value).map_err(io::Error::other)?,
    };
    fs::write(path, text)
}

/// Deserialize a value from `path` in the format named by its extension.
pub fn load<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> io::Result<T> {
    let path = path.as_ref();
    let format = ConfigFormat::from_path(path)?;
    let text = fs::read_to_string(path)?;
    let invalid = |e: String| io::Error::new(io::ErrorKind::InvalidData, e);
    match format {
        ConfigFormat::Json => serde_json::from_str(&text).map_err(|e| invalid(e.to_string())),
        ConfigFormat::Yaml => serde_yaml::from_str(&text).map_err(|e| invalid(e.to_string())),
        ConfigFormat::Toml => toml::from_str(&text).map_err(|e| invalid(e.to_string())),
    }
}

pub(crate) fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn custom() -> FilterConfig {
        FilterConfig {
            num_particles: 250,
            seed: 7,
            sensor_range: 30.0,
            std_landmark: [0.5, 0.4],
            resampling: ResamplingStrategy::Residual,
            estimate: EstimateStrategy::WeightedMean,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_is_valid() {
        let cfg = FilterConfig::default();
        assert_eq!(cfg.num_particles, 100);
        assert_eq!(cfg.resampling, ResamplingStrategy::Wheel);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad = [
            FilterConfig {
                num_particles: 0,
                ..Default::default()
            },
            FilterConfig {
                sensor_range: -1.0,
                ..Default::default()
            },
            FilterConfig {
                std_landmark: [0.3, 0.0],
                ..Default::default()
            },
            FilterConfig {
                std_position: [0.3, -0.3, 0.01],
                ..Default::default()
            },
            FilterConfig {
                delta_t: 0.0,
                ..Default::default()
            },
        ];
        for cfg in bad {
            assert!(
                matches!(cfg.validate(), Err(FilterError::InvalidConfiguration(_))),
                "{cfg:?}"
            );
        }
    }

    #[test]
    fn json_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("filter.json");
        custom().to_file(&path).unwrap();
        assert_eq!(FilterConfig::from_file(&path).unwrap(), custom());
    }

    #[test]
    fn yaml_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("filter.yml");
        custom().to_file(&path).unwrap();
        assert_eq!(FilterConfig::from_file(&path).unwrap(), custom());
    }

    #[test]
    fn toml_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("filter.TOML");
        custom().to_file(&path).unwrap();
        assert_eq!(FilterConfig::from_file(&path).unwrap(), custom());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let cfg: FilterConfig = toml::from_str("num_particles = 12\nresampling = \"systematic\"\n").unwrap();
        assert_eq!(cfg.num_particles, 12);
        assert_eq!(cfg.resampling, ResamplingStrategy::Systematic);
        assert_eq!(cfg.seed, 42);
        assert_eq!(cfg.std_landmark, [0.3, 0.3]);
    }

    #[test]
    fn unsupported_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("filter.ini");
        let err = custom().to_file(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(FilterConfig::from_file(&path).is_err());
    }

    #[test]
    fn malformed_file_is_invalid_data() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("filter.json");
        std::fs::write(&path, "{ \"num_particles\": \"many\" }").unwrap();
        let err = FilterConfig::from_file(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn partial_yaml_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("filter.yaml");
        std::fs::write(&path, "sensor_range: 25.0\nestimate: weighted_mean\n").unwrap();
        let cfg = FilterConfig::from_file(&path).unwrap();
        assert_eq!(cfg.sensor_range, 25.0);
        assert_eq!(cfg.estimate, EstimateStrategy::WeightedMean);
        assert_eq!(cfg.num_particles, 100);
    }

    #[test]
    fn format_from_path() {
        assert_eq!(
            ConfigFormat::from_path(Path::new("a/b.YML")).unwrap(),
            ConfigFormat::Yaml
        );
        assert!(ConfigFormat::from_path(Path::new("no_extension")).is_err());
    }
}
