//! Risk scoring and alert generation
//!
//! The scorer owns the risk score board. Scores only exist for hospitals the
//! trained classifier has seen; alert rules fire whether or not a model exists.

use crate::aggregator::HospitalMetrics;
use crate::alerts::reporter::{Report, RiskMarker};
use crate::config::AlertConfig;
use crate::error::PredictionError;
use crate::events::{Event, RiskClass, RiskTier, Timestamp};
use crate::model::{RiskClassifier, RiskDistribution};
use crate::rules::{CriticalFeverRule, OutbreakCandidateRule};
use chrono::Utc;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Latest model opinion about one hospital
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoredHospital {
    /// Probability of HIGH risk, as a percentage
    pub risk_score: f64,
    pub risk_tier: RiskTier,
    pub distribution: RiskDistribution,
    pub scored_at: Timestamp,
}

/// Risk scores by hospital; a hospital is absent until it has been scored
pub type RiskScoreBoard = BTreeMap<String, ScoredHospital>;

pub struct Scorer {
    board: RwLock<RiskScoreBoard>,
    critical_fever: CriticalFeverRule,
    outbreak_candidate: OutbreakCandidateRule,
}

impl Scorer {
    pub fn new(critical_fever: CriticalFeverRule, outbreak_candidate: OutbreakCandidateRule) -> Self {
        Self {
            board: RwLock::new(RiskScoreBoard::new()),
            critical_fever,
            outbreak_candidate,
        }
    }

    pub fn from_config(config: &AlertConfig) -> Self {
        Self::new(
            CriticalFeverRule::new(config.critical_temperature),
            OutbreakCandidateRule::new(config.outbreak_min_velocity),
        )
    }

    /// Score one hospital with the current model and record the result
    ///
    /// # Errors
    ///
    /// `PredictionError::NotTrained` if no model has been published yet and
    /// `PredictionError::NonFiniteDistribution` if the model cannot produce a
    /// usable distribution for these metrics. The board is left unchanged.
    pub fn score_and_alert(
        &self,
        hospital: &str,
        metrics: &HospitalMetrics,
        classifier: &RiskClassifier,
    ) -> Result<Report, PredictionError> {
        let features = metrics.feature_vector();
        let distribution = classifier.predict(&features)?;
        if !distribution.is_finite() {
            return Err(PredictionError::NonFiniteDistribution);
        }
        let risk_score = 100.0 * distribution.probability(RiskClass::High);
        let risk_tier = RiskTier::from_score(risk_score);

        self.board
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                hospital.to_string(),
                ScoredHospital {
                    risk_score,
                    risk_tier,
                    distribution,
                    scored_at: Utc::now(),
                },
            );
        debug!("Scored {} at {:.1} ({})", hospital, risk_score, risk_tier);

        Ok(Report::RiskPrediction {
            hospital: hospital.to_string(),
            distribution,
            risk_score,
            risk_tier,
            features,
        })
    }

    /// Per-event alerts: critical fever and producer-flagged clusters
    pub fn check_event(&self, event: &Event) -> Vec<Report> {
        let mut reports = Vec::new();
        if self.critical_fever.evaluate(event) {
            reports.push(Report::CriticalFever {
                hospital: event.hospital.clone(),
                patient_id: event.patient_id.clone(),
                temperature: event.temperature,
                timestamp: event.timestamp,
            });
        }
        if event.is_cluster {
            reports.push(Report::ClusterDetected {
                hospital: event.hospital.clone(),
                patient_id: event.patient_id.clone(),
                timestamp: event.timestamp,
            });
        }
        reports
    }

    /// Outbreak alert for a hospital if it is a candidate, with its score when one exists
    pub fn outbreak_alert(&self, hospital: &str, metrics: &HospitalMetrics) -> Option<Report> {
        if !self.outbreak_candidate.evaluate(metrics) {
            return None;
        }

        let scored = self.current_score(hospital);
        let risk_score = scored.as_ref().map(|s| s.risk_score);
        Some(Report::OutbreakAlert {
            hospital: hospital.to_string(),
            case_velocity: metrics.case_velocity,
            avg_temperature: metrics.avg_temperature,
            symptom_diversity: metrics.symptom_diversity,
            risk_score,
            risk_tier: scored.map(|s| s.risk_tier),
            marker: risk_score.and_then(RiskMarker::for_score),
        })
    }

    pub fn current_score(&self, hospital: &str) -> Option<ScoredHospital> {
        self.board
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(hospital)
            .cloned()
    }

    /// Copy of the whole score board
    pub fn board(&self) -> RiskScoreBoard {
        self.board
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for Scorer {
    fn default() -> Self {
        Self::new(
            CriticalFeverRule::with_defaults(),
            OutbreakCandidateRule::with_defaults(),
        )
    }
}
