//! Application configuration
//!
//! Every field has a default, so an empty TOML file (or none at all) yields a
//! working pipeline. Values are validated after parsing.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Longest accepted trailing window and outbreak flag lifetime (one year)
pub const MAX_WINDOW_SECS: u64 = 365 * 24 * 60 * 60;
/// Longest accepted cadence for a periodic activity (one day)
pub const MAX_INTERVAL_SECS: f64 = 24.0 * 60.0 * 60.0;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub window: WindowConfig,
    pub schedule: ScheduleConfig,
    pub training: TrainingConfig,
    pub alerts: AlertConfig,
    pub output: OutputConfig,
}

/// Trailing window settings for the aggregator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    /// Width of the trailing window, in seconds of event time
    pub duration_secs: u64,
    /// Average temperature reported for an empty window
    pub baseline_temperature: f64,
    /// Evict idle hospitals' cases as stream time advances before each analysis
    pub expire_idle: bool,
    /// Clear the outbreak flag after this long without a cluster case; unset keeps it forever
    pub outbreak_flag_ttl_secs: Option<u64>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            duration_secs: 60,
            baseline_temperature: 98.6,
            expire_idle: false,
            outbreak_flag_ttl_secs: None,
        }
    }
}

/// Cadences of the periodic activities, in wall-clock seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    pub analysis_interval_secs: f64,
    pub model_update_interval_secs: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            analysis_interval_secs: 8.0,
            model_update_interval_secs: 15.0,
        }
    }
}

impl ScheduleConfig {
    pub fn analysis_interval(&self) -> Duration {
        interval(self.analysis_interval_secs)
    }

    pub fn model_update_interval(&self) -> Duration {
        interval(self.model_update_interval_secs)
    }
}

/// Values that did not pass validation fall back to the longest cadence
fn interval(secs: f64) -> Duration {
    let longest = Duration::from_secs(MAX_INTERVAL_SECS as u64);
    Duration::try_from_secs_f64(secs)
        .map(|interval| interval.min(longest))
        .unwrap_or(longest)
}

/// When the classifier is fitted once enough examples exist
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TrainingPolicy {
    /// Fit the first time enough data exists, then keep that model
    #[default]
    TrainOnce,
    /// Refit on every model update cycle once enough data exists
    RetrainEveryCycle,
}

/// Training set and classifier settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingConfig {
    /// Updates a hospital needs before it contributes training examples
    pub min_cases: u64,
    /// Training set size required before the classifier is fitted
    pub min_examples: usize,
    pub policy: TrainingPolicy,
    /// Gradient descent passes over the training set
    pub iterations: usize,
    pub learning_rate: f64,
    /// Ridge penalty applied to feature weights
    pub l2_penalty: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            min_cases: 3,
            min_examples: 10,
            policy: TrainingPolicy::TrainOnce,
            iterations: 500,
            learning_rate: 0.5,
            l2_penalty: 1e-4,
        }
    }
}

/// Model-independent alert thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AlertConfig {
    /// Single-case temperature (°F) above which a critical alert fires
    pub critical_temperature: f64,
    /// Windowed case count at which a hospital becomes an outbreak candidate
    pub outbreak_min_velocity: usize,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            critical_temperature: 103.0,
            outbreak_min_velocity: 2,
        }
    }
}

/// How reports are written
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Human-readable lines through the logger
    #[default]
    Text,
    /// One JSON object per line on stdout
    Json,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: ReportFormat,
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// - `ConfigError::ReadError` if the file cannot be read
    /// - `ConfigError::TomlError` if it is not valid TOML for this schema
    /// - `ConfigError::ValidationError` if a value is out of range
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.duration_secs == 0 || self.window.duration_secs > MAX_WINDOW_SECS {
            return Err(ConfigError::ValidationError(format!(
                "window.duration_secs must be between 1 and {}, got {}",
                MAX_WINDOW_SECS, self.window.duration_secs
            )));
        }
        if !self.window.baseline_temperature.is_finite() {
            return Err(ConfigError::ValidationError(
                "window.baseline_temperature must be a finite number".to_string(),
            ));
        }
        if let Some(ttl) = self.window.outbreak_flag_ttl_secs {
            if ttl == 0 || ttl > MAX_WINDOW_SECS {
                return Err(ConfigError::ValidationError(format!(
                    "window.outbreak_flag_ttl_secs must be between 1 and {} when set, got {}",
                    MAX_WINDOW_SECS, ttl
                )));
            }
        }

        for (name, value) in [
            ("schedule.analysis_interval_secs", self.schedule.analysis_interval_secs),
            (
                "schedule.model_update_interval_secs",
                self.schedule.model_update_interval_secs,
            ),
        ] {
            if !value.is_finite() || value <= 0.0 || value > MAX_INTERVAL_SECS {
                return Err(ConfigError::ValidationError(format!(
                    "{} must be a positive number of seconds up to {}, got {}",
                    name, MAX_INTERVAL_SECS, value
                )));
            }
        }

        if self.training.min_examples == 0 {
            return Err(ConfigError::ValidationError(
                "training.min_examples must be greater than zero".to_string(),
            ));
        }
        if self.training.iterations == 0 {
            return Err(ConfigError::ValidationError(
                "training.iterations must be greater than zero".to_string(),
            ));
        }
        if !self.training.learning_rate.is_finite() || self.training.learning_rate <= 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "training.learning_rate must be positive, got {}",
                self.training.learning_rate
            )));
        }
        if !self.training.l2_penalty.is_finite() || self.training.l2_penalty < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "training.l2_penalty must be non-negative, got {}",
                self.training.l2_penalty
            )));
        }

        if !self.alerts.critical_temperature.is_finite() {
            return Err(ConfigError::ValidationError(
                "alerts.critical_temperature must be a finite number".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();

        assert_eq!(config.window.duration_secs, 60);
        assert_eq!(config.window.baseline_temperature, 98.6);
        assert!(!config.window.expire_idle);
        assert_eq!(config.window.outbreak_flag_ttl_secs, None);
        assert_eq!(config.schedule.analysis_interval(), Duration::from_secs(8));
        assert_eq!(config.schedule.model_update_interval(), Duration::from_secs(15));
        assert_eq!(config.training.min_cases, 3);
        assert_eq!(config.training.min_examples, 10);
        assert_eq!(config.training.policy, TrainingPolicy::TrainOnce);
        assert_eq!(config.alerts.critical_temperature, 103.0);
        assert_eq!(config.alerts.outbreak_min_velocity, 2);
        assert_eq!(config.output.format, ReportFormat::Text);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let config = Config::from_toml_str(
            r#"
            [window]
            duration_secs = 120
            outbreak_flag_ttl_secs = 600

            [training]
            policy = "retrain_every_cycle"

            [output]
            format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.window.duration_secs, 120);
        assert_eq!(config.window.baseline_temperature, 98.6);
        assert_eq!(config.window.outbreak_flag_ttl_secs, Some(600));
        assert_eq!(config.training.policy, TrainingPolicy::RetrainEveryCycle);
        assert_eq!(config.training.min_examples, 10);
        assert_eq!(config.output.format, ReportFormat::Json);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let result = Config::from_toml_str("[window]\nwidth = 5\n");
        assert!(matches!(result, Err(ConfigError::TomlError(_))));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let cases = [
            "[window]\nduration_secs = 0\n",
            "[window]\noutbreak_flag_ttl_secs = 0\n",
            "[schedule]\nanalysis_interval_secs = 0.0\n",
            "[schedule]\nmodel_update_interval_secs = -1.0\n",
            "[schedule]\nanalysis_interval_secs = 1e300\n",
            "[schedule]\nmodel_update_interval_secs = 86400.5\n",
            "[window]\nduration_secs = 10000000000000000\n",
            "[window]\noutbreak_flag_ttl_secs = 31536001\n",
            "[training]\nmin_examples = 0\n",
            "[training]\niterations = 0\n",
            "[training]\nlearning_rate = 0.0\n",
            "[training]\nl2_penalty = -0.1\n",
        ];

        for case in cases {
            let result = Config::from_toml_str(case);
            assert!(
                matches!(result, Err(ConfigError::ValidationError(_))),
                "expected validation error for {:?}, got {:?}",
                case,
                result
            );
        }
    }

    #[test]
    fn test_longest_accepted_values() {
        let config = Config::from_toml_str(
            "[window]\nduration_secs = 31536000\noutbreak_flag_ttl_secs = 31536000\n\
             [schedule]\nanalysis_interval_secs = 86400.0\nmodel_update_interval_secs = 86400.0\n",
        )
        .unwrap();
        assert_eq!(config.schedule.analysis_interval(), Duration::from_secs(86_400));
        assert_eq!(config.schedule.model_update_interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn test_unvalidated_intervals_do_not_panic() {
        let schedule = ScheduleConfig {
            analysis_interval_secs: 1e300,
            model_update_interval_secs: f64::NAN,
        };
        let longest = Duration::from_secs(86_400);
        assert_eq!(schedule.analysis_interval(), longest);
        assert_eq!(schedule.model_update_interval(), longest);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[alerts]\ncritical_temperature = 104.5").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.alerts.critical_temperature, 104.5);
    }

    #[test]
    fn test_from_missing_file() {
        let result = Config::from_file(Path::new("/nonexistent/outbreak-watch.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
