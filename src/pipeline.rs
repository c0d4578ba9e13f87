//! The outbreak watch pipeline: decode, aggregate, alert, learn, score
//!
//! `Pipeline` owns every stateful component and is shared between the
//! ingestion loop and the model worker. Each component sits behind its own
//! lock and no activity holds more than one lock at a time, so model fitting
//! never blocks ingestion.

use crate::aggregator::{HospitalAggregator, HospitalMetrics};
use crate::alerts::{Report, ReportSink, Scorer};
use crate::collectors::decode;
use crate::config::Config;
use crate::error::{DecodeError, PredictionError, TrainingError};
use crate::events::{Event, RiskClass};
use crate::model::{RiskClassifier, TrainOutcome, TrainingAccumulator};
use crate::monitoring::{PipelineMonitor, TrainingTimer};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// What one model update cycle did
#[derive(Debug, Clone, PartialEq)]
pub struct ModelUpdateSummary {
    /// Examples appended to the training set this cycle
    pub appended: usize,
    /// Training set size after collection
    pub training_set_size: usize,
    pub training: Result<TrainOutcome, TrainingError>,
    /// Hospitals scored after training
    pub predictions: usize,
}

pub struct Pipeline {
    aggregator: RwLock<HospitalAggregator>,
    training: Mutex<TrainingAccumulator>,
    classifier: RiskClassifier,
    scorer: Scorer,
    sink: Arc<dyn ReportSink>,
    monitor: Arc<PipelineMonitor>,
    expire_idle: bool,
}

impl Pipeline {
    pub fn new(config: &Config, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            aggregator: RwLock::new(HospitalAggregator::from_config(&config.window)),
            training: Mutex::new(TrainingAccumulator::new(config.training.min_cases)),
            classifier: RiskClassifier::from_config(&config.training),
            scorer: Scorer::from_config(&config.alerts),
            sink,
            monitor: Arc::new(PipelineMonitor::new()),
            expire_idle: config.window.expire_idle,
        }
    }

    /// Share an existing monitor instead of the pipeline's own
    pub fn with_monitor(mut self, monitor: Arc<PipelineMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Decode and ingest one raw payload
    ///
    /// # Errors
    ///
    /// Returns the `DecodeError` for a payload that is not a case report. The
    /// payload is dropped and pipeline state is untouched; callers keep going.
    pub fn process_payload(&self, payload: &[u8]) -> Result<(), DecodeError> {
        self.monitor.record_payload();

        match decode(payload) {
            Ok(event) => {
                self.ingest_event(&event);
                Ok(())
            }
            Err(e) => {
                self.monitor.record_decode_failure();
                warn!("Skipping payload: {}", e);
                Err(e)
            }
        }
    }

    /// Fire per-event alerts, then fold the event into its hospital's window
    pub fn ingest_event(&self, event: &Event) -> HospitalMetrics {
        debug!(
            "{} - {} (temperature {:.1}°F, {:?})",
            event.hospital, event.symptoms, event.temperature, event.severity
        );

        for report in self.scorer.check_event(event) {
            if matches!(report, Report::CriticalFever { .. }) {
                self.monitor.record_critical_alert();
            }
            self.sink.emit(&report);
        }

        let metrics = self.write_aggregator().ingest(event).clone();
        self.monitor.record_event();
        metrics
    }

    /// Report every outbreak candidate, with its risk score when one exists
    ///
    /// Returns the number of candidates reported.
    pub fn run_outbreak_analysis(&self) -> usize {
        let snapshot = {
            let mut aggregator = self.write_aggregator();
            if self.expire_idle {
                if let Some(now) = aggregator.latest_timestamp() {
                    aggregator.expire(now);
                }
            }
            aggregator.snapshot()
        };

        let mut candidates = 0;
        for (hospital, metrics) in &snapshot {
            if let Some(report) = self.scorer.outbreak_alert(hospital, metrics) {
                candidates += 1;
                self.sink.emit(&report);
            }
        }

        self.sink.emit(&Report::AnalysisComplete {
            hospitals: snapshot.len(),
            candidates,
        });
        self.monitor.record_outbreak_alerts(candidates as u64);
        debug!(
            "Outbreak analysis: {} hospitals, {} candidates",
            snapshot.len(),
            candidates
        );
        candidates
    }

    /// Collect training examples, train if policy and data allow, then refresh risk scores
    pub fn run_model_update(&self) -> ModelUpdateSummary {
        let snapshot = self.read_aggregator().snapshot();

        let (appended, examples, label_counts) = {
            let mut training = self.training.lock().unwrap_or_else(PoisonError::into_inner);
            let appended = training.collect(snapshot.iter().map(|(_, metrics)| metrics));
            (appended, training.snapshot(), training.label_counts())
        };
        self.sink.emit(&Report::TrainingProgress {
            appended,
            training_set_size: examples.len(),
            label_counts,
        });

        let timer = TrainingTimer::start(Arc::clone(&self.monitor));
        let training = self.classifier.train(&examples);
        match &training {
            Ok(TrainOutcome::Trained {
                examples,
                accuracy,
                first,
            }) => {
                timer.finish();
                self.sink.emit(&Report::ModelTrained {
                    examples: *examples,
                    accuracy: *accuracy,
                    first: *first,
                });
            }
            Ok(TrainOutcome::AlreadyTrained) => {}
            Err(TrainingError::InsufficientData { have, need }) => {
                debug!("Not enough training data yet ({} of {})", have, need);
                self.sink.emit(&Report::TrainingDeferred {
                    have: *have,
                    need: *need,
                });
            }
        }

        let predictions = self.refresh_predictions();
        self.monitor.record_model_cycle();

        ModelUpdateSummary {
            appended,
            training_set_size: examples.len(),
            training,
            predictions,
        }
    }

    /// Score every hospital with the current model; nothing happens before training
    fn refresh_predictions(&self) -> usize {
        if !self.classifier.is_trained() {
            return 0;
        }

        let snapshot = self.read_aggregator().snapshot();
        let mut predictions = 0;
        for (hospital, metrics) in &snapshot {
            match self.scorer.score_and_alert(hospital, metrics, &self.classifier) {
                Ok(report) => {
                    predictions += 1;
                    self.sink.emit(&report);
                }
                Err(PredictionError::NotTrained) => {
                    debug!("Skipping prediction for {}: model not trained", hospital)
                }
                Err(e) => warn!("Skipping prediction for {}: {}", hospital, e),
            }
        }
        info!("Refreshed risk predictions for {} hospitals", predictions);
        predictions
    }

    pub fn metrics(&self, hospital: &str) -> Option<HospitalMetrics> {
        self.read_aggregator().metrics(hospital).cloned()
    }

    pub fn snapshot(&self) -> Vec<(String, HospitalMetrics)> {
        self.read_aggregator().snapshot()
    }

    pub fn training_set_size(&self) -> usize {
        self.training
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn label_counts(&self) -> BTreeMap<RiskClass, usize> {
        self.training
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .label_counts()
    }

    pub fn classifier(&self) -> &RiskClassifier {
        &self.classifier
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    pub fn monitor(&self) -> &Arc<PipelineMonitor> {
        &self.monitor
    }

    fn read_aggregator(&self) -> std::sync::RwLockReadGuard<'_, HospitalAggregator> {
        self.aggregator.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_aggregator(&self) -> std::sync::RwLockWriteGuard<'_, HospitalAggregator> {
        self.aggregator.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    /// A case report in the producer's wire format, `offset_secs` after a fixed epoch
    pub fn payload(
        hospital: &str,
        offset_secs: i64,
        temperature: f64,
        severity: &str,
        cluster: bool,
    ) -> Vec<u8> {
        format!(
            r#"{{"patientId":"PATIENT_{}","hospital":"{}","symptoms":"fever,cough","severity":"{}","temperature":{},"timestamp":{},"cluster":{}}}"#,
            offset_secs,
            hospital,
            severity,
            temperature,
            1_700_000_000_000i64 + offset_secs * 1000,
            cluster
        )
        .into_bytes()
    }
}
