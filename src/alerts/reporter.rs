//! Outbound reports and the sinks that deliver them
//!
//! Every alert, analysis summary and model lifecycle message leaves the
//! pipeline as a [`Report`]. Sinks decide how it is rendered: log lines for an
//! operator, JSON lines for downstream tooling, or an in-memory buffer.

use crate::aggregator::FeatureVector;
use crate::events::{RiskClass, RiskTier, Timestamp};
use crate::model::RiskDistribution;
use log::{error, info, warn};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

/// Score above which an outbreak alert carries the high predicted risk marker
pub const HIGH_RISK_SCORE: f64 = 75.0;
/// Score above which an outbreak alert carries the moderate predicted risk marker
pub const MODERATE_RISK_SCORE: f64 = 50.0;

/// Model opinion attached to an outbreak alert
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RiskMarker {
    HighPredictedRisk,
    ModeratePredictedRisk,
}

impl RiskMarker {
    pub fn for_score(score: f64) -> Option<Self> {
        if score > HIGH_RISK_SCORE {
            Some(RiskMarker::HighPredictedRisk)
        } else if score > MODERATE_RISK_SCORE {
            Some(RiskMarker::ModeratePredictedRisk)
        } else {
            None
        }
    }
}

/// Something the pipeline wants an operator or downstream system to know
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Report {
    CriticalFever {
        hospital: String,
        patient_id: String,
        temperature: f64,
        timestamp: Timestamp,
    },
    ClusterDetected {
        hospital: String,
        patient_id: String,
        timestamp: Timestamp,
    },
    OutbreakAlert {
        hospital: String,
        case_velocity: usize,
        avg_temperature: f64,
        symptom_diversity: usize,
        risk_score: Option<f64>,
        risk_tier: Option<RiskTier>,
        marker: Option<RiskMarker>,
    },
    AnalysisComplete {
        hospitals: usize,
        candidates: usize,
    },
    TrainingProgress {
        appended: usize,
        training_set_size: usize,
        label_counts: BTreeMap<RiskClass, usize>,
    },
    ModelTrained {
        examples: usize,
        accuracy: f64,
        first: bool,
    },
    TrainingDeferred {
        have: usize,
        need: usize,
    },
    RiskPrediction {
        hospital: String,
        distribution: RiskDistribution,
        risk_score: f64,
        risk_tier: RiskTier,
        features: FeatureVector,
    },
}

impl Report {
    /// Alerts are the reports an operator must act on
    pub fn is_alert(&self) -> bool {
        matches!(
            self,
            Report::CriticalFever { .. } | Report::ClusterDetected { .. } | Report::OutbreakAlert { .. }
        )
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::CriticalFever {
                hospital,
                patient_id,
                temperature,
                ..
            } => write!(
                f,
                "CRITICAL FEVER: {} - {:.1}°F (patient {})",
                hospital, temperature, patient_id
            ),
            Report::ClusterDetected {
                hospital,
                patient_id,
                ..
            } => write!(
                f,
                "OUTBREAK CLUSTER DETECTED: {} (patient {})",
                hospital, patient_id
            ),
            Report::OutbreakAlert {
                hospital,
                case_velocity,
                avg_temperature,
                symptom_diversity,
                risk_score,
                risk_tier,
                marker,
            } => {
                write!(
                    f,
                    "OUTBREAK ALERT: {} - velocity {} cases/window, avg temperature {:.1}°F, {} symptom patterns",
                    hospital, case_velocity, avg_temperature, symptom_diversity
                )?;
                if let (Some(score), Some(tier)) = (risk_score, risk_tier) {
                    write!(f, ", risk score {:.1}% ({})", score, tier)?;
                }
                match marker {
                    Some(RiskMarker::HighPredictedRisk) => write!(f, " - HIGH PREDICTED OUTBREAK RISK"),
                    Some(RiskMarker::ModeratePredictedRisk) => write!(f, " - moderate predicted risk"),
                    None => Ok(()),
                }
            }
            Report::AnalysisComplete {
                hospitals,
                candidates,
            } => write!(
                f,
                "Outbreak analysis complete: {} hospitals, {} outbreak candidates",
                hospitals, candidates
            ),
            Report::TrainingProgress {
                appended,
                training_set_size,
                label_counts,
            } => {
                let counts: Vec<String> = label_counts
                    .iter()
                    .map(|(class, count)| format!("{}={}", class, count))
                    .collect();
                write!(
                    f,
                    "Collected {} training examples ({} total; {})",
                    appended,
                    training_set_size,
                    counts.join(", ")
                )
            }
            Report::ModelTrained {
                examples,
                accuracy,
                first,
            } => write!(
                f,
                "{} on {} examples, training accuracy {:.2}%",
                if *first { "Model trained" } else { "Model retrained" },
                examples,
                accuracy * 100.0
            ),
            Report::TrainingDeferred { have, need } => write!(
                f,
                "Training deferred: {} of {} required examples",
                have, need
            ),
            Report::RiskPrediction {
                hospital,
                distribution,
                risk_score,
                risk_tier,
                features,
            } => {
                let [velocity, temperature, diversity, ratio] = *features.values();
                write!(
                    f,
                    "{}: {:.1}% outbreak risk ({}) [low {:.2}, medium {:.2}, high {:.2}] velocity {:.0}, temperature {:.1}°F, diversity {:.0}, severe ratio {:.2}",
                    hospital,
                    risk_score,
                    risk_tier,
                    distribution.low,
                    distribution.medium,
                    distribution.high,
                    velocity,
                    temperature,
                    diversity,
                    ratio
                )
            }
        }
    }
}

/// Destination for reports
#[cfg_attr(test, mockall::automock)]
pub trait ReportSink: Send + Sync {
    fn emit(&self, report: &Report);
}

/// Writes reports as human-readable lines through the `log` facade
///
/// Alerts are logged at warn level, everything else at info.
#[derive(Debug, Default)]
pub struct LogReporter;

impl ReportSink for LogReporter {
    fn emit(&self, report: &Report) {
        if report.is_alert() {
            warn!("{}", report);
        } else {
            info!("{}", report);
        }
    }
}

/// Writes one JSON object per report, one per line
pub struct JsonLinesReporter<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesReporter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the underlying writer
    pub fn into_inner(self) -> W {
        self.writer
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl JsonLinesReporter<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ReportSink for JsonLinesReporter<W> {
    fn emit(&self, report: &Report) {
        let line = match serde_json::to_string(report) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                return;
            }
        };

        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            error!("Failed to write report: {}", e);
        }
    }
}

/// Keeps every report in memory
#[derive(Debug, Default)]
pub struct MemoryReporter {
    reports: Mutex<Vec<Report>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every report received so far
    pub fn reports(&self) -> Vec<Report> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Remove and return every report received so far
    pub fn take(&self) -> Vec<Report> {
        std::mem::take(&mut *self.reports.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn len(&self) -> usize {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ReportSink for MemoryReporter {
    fn emit(&self, report: &Report) {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(report.clone());
    }
}
