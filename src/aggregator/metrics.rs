//! Per-hospital feature snapshot derived from the trailing event window

use crate::events::Timestamp;
use serde::{Deserialize, Serialize};

/// Neutral body temperature reported for a hospital with no windowed cases
pub const BASELINE_TEMPERATURE: f64 = 98.6;

/// Rolling statistics for one hospital
///
/// Ratio and average fields only ever reflect events inside the trailing
/// window. When the window is empty the average falls back to the baseline
/// temperature and the severe ratio keeps its last computed value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HospitalMetrics {
    /// Number of cases inside the trailing window
    pub case_velocity: usize,
    /// Mean temperature of the windowed cases
    pub avg_temperature: f64,
    /// Number of distinct symptom presentations inside the window
    pub symptom_diversity: usize,
    /// Fraction of windowed cases that are severe or critical
    pub severe_case_ratio: f64,
    /// Number of updates ever applied to this hospital
    pub total_cases: u64,
    /// Timestamp of the most recent case applied
    pub last_update_time: Option<Timestamp>,
    /// Set once a cluster-flagged case arrives
    pub had_recent_outbreak: bool,
}

impl HospitalMetrics {
    /// Fresh metrics for a hospital that has not reported yet
    pub fn new(baseline_temperature: f64) -> Self {
        Self {
            case_velocity: 0,
            avg_temperature: baseline_temperature,
            symptom_diversity: 0,
            severe_case_ratio: 0.0,
            total_cases: 0,
            last_update_time: None,
            had_recent_outbreak: false,
        }
    }

    /// Model input built from the current snapshot
    pub fn feature_vector(&self) -> FeatureVector {
        FeatureVector::new(
            self.case_velocity as f64,
            self.avg_temperature,
            self.symptom_diversity as f64,
            self.severe_case_ratio,
        )
    }
}

impl Default for HospitalMetrics {
    fn default() -> Self {
        Self::new(BASELINE_TEMPERATURE)
    }
}

/// Classifier input: `[case_velocity, avg_temperature, symptom_diversity, severe_case_ratio]`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FeatureVector([f64; FeatureVector::LEN]);

impl FeatureVector {
    pub const LEN: usize = 4;

    pub fn new(
        case_velocity: f64,
        avg_temperature: f64,
        symptom_diversity: f64,
        severe_case_ratio: f64,
    ) -> Self {
        Self([
            case_velocity,
            avg_temperature,
            symptom_diversity,
            severe_case_ratio,
        ])
    }

    pub fn values(&self) -> &[f64; FeatureVector::LEN] {
        &self.0
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|value| value.is_finite())
    }
}

impl From<[f64; FeatureVector::LEN]> for FeatureVector {
    fn from(values: [f64; FeatureVector::LEN]) -> Self {
        Self(values)
    }
}
