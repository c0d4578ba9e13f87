//! Risk classifier with lock-free fitting and atomic model publication
//!
//! Readers clone an `Arc` to the published model and predict without holding
//! any lock. Training fits a new model on an owned copy of the training set and
//! then swaps it in with one short write, so a reader sees either the previous
//! model or the new one.

use crate::aggregator::FeatureVector;
use crate::config::{TrainingConfig, TrainingPolicy};
use crate::error::{PredictionError, TrainingError};
use crate::events::RiskClass;
use crate::model::softmax::{FitParams, RiskModel, SoftmaxRegression};
use crate::model::training::TrainingExample;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// Probability of each risk class; the components sum to 1
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RiskDistribution {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
}

impl RiskDistribution {
    pub fn probability(&self, class: RiskClass) -> f64 {
        match class {
            RiskClass::Low => self.low,
            RiskClass::Medium => self.medium,
            RiskClass::High => self.high,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.low.is_finite() && self.medium.is_finite() && self.high.is_finite()
    }

    pub fn most_likely(&self) -> RiskClass {
        let mut best = RiskClass::Low;
        for class in RiskClass::ALL {
            if self.probability(class) > self.probability(best) {
                best = class;
            }
        }
        best
    }
}

impl From<[f64; 3]> for RiskDistribution {
    fn from(probabilities: [f64; 3]) -> Self {
        Self {
            low: probabilities[RiskClass::Low.index()],
            medium: probabilities[RiskClass::Medium.index()],
            high: probabilities[RiskClass::High.index()],
        }
    }
}

/// Result of a successful call to [`RiskClassifier::train`]
#[derive(Debug, Clone, PartialEq)]
pub enum TrainOutcome {
    /// A new model was fitted and published
    Trained {
        examples: usize,
        /// Accuracy of the new model on its own training set
        accuracy: f64,
        /// Whether this was the first model ever published
        first: bool,
    },
    /// Policy keeps the existing model; nothing was fitted
    AlreadyTrained,
}

#[derive(Debug)]
struct PublishedModel {
    model: Box<dyn RiskModel>,
    examples: usize,
}

pub struct RiskClassifier {
    published: RwLock<Option<Arc<PublishedModel>>>,
    policy: TrainingPolicy,
    min_examples: usize,
    params: FitParams,
    generation: AtomicU64,
}

impl RiskClassifier {
    pub fn new(policy: TrainingPolicy, min_examples: usize, params: FitParams) -> Self {
        Self {
            published: RwLock::new(None),
            policy,
            min_examples,
            params,
            generation: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &TrainingConfig) -> Self {
        Self::new(config.policy, config.min_examples, FitParams::from(config))
    }

    /// Fit a model to `examples` and publish it
    ///
    /// # Errors
    ///
    /// `TrainingError::InsufficientData` when fewer than `min_examples` are
    /// available. The classifier keeps whatever model it had.
    pub fn train(&self, examples: &[TrainingExample]) -> Result<TrainOutcome, TrainingError> {
        let first = !self.is_trained();
        if !first && self.policy == TrainingPolicy::TrainOnce {
            debug!("Classifier already trained, keeping existing model");
            return Ok(TrainOutcome::AlreadyTrained);
        }

        if examples.len() < self.min_examples {
            return Err(TrainingError::InsufficientData {
                have: examples.len(),
                need: self.min_examples,
            });
        }

        let start = Instant::now();
        let model = SoftmaxRegression::fit(examples, &self.params);
        let accuracy = accuracy_of(&model, examples);

        {
            let mut published = self
                .published
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if published.is_some() && self.policy == TrainingPolicy::TrainOnce {
                return Ok(TrainOutcome::AlreadyTrained);
            }
            *published = Some(Arc::new(PublishedModel {
                model: Box::new(model),
                examples: examples.len(),
            }));
        }
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        info!(
            "Classifier fitted on {} examples in {:.1?} (generation {}, accuracy {:.1}%)",
            examples.len(),
            start.elapsed(),
            generation,
            accuracy * 100.0
        );

        Ok(TrainOutcome::Trained {
            examples: examples.len(),
            accuracy,
            first,
        })
    }

    /// Class probabilities for a feature vector
    ///
    /// # Errors
    ///
    /// `PredictionError::NotTrained` before the first successful training.
    pub fn predict(&self, features: &FeatureVector) -> Result<RiskDistribution, PredictionError> {
        let model = self.current().ok_or(PredictionError::NotTrained)?;
        Ok(RiskDistribution::from(model.model.predict_proba(features)))
    }

    /// Fraction of `examples` whose label the current model predicts
    pub fn training_accuracy(&self, examples: &[TrainingExample]) -> Result<f64, PredictionError> {
        let model = self.current().ok_or(PredictionError::NotTrained)?;
        Ok(accuracy_of(model.model.as_ref(), examples))
    }

    pub fn is_trained(&self) -> bool {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Number of models published so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Size of the training set behind the published model
    pub fn trained_examples(&self) -> Option<usize> {
        self.current().map(|model| model.examples)
    }

    pub fn policy(&self) -> TrainingPolicy {
        self.policy
    }

    fn current(&self) -> Option<Arc<PublishedModel>> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for RiskClassifier {
    fn default() -> Self {
        Self::from_config(&TrainingConfig::default())
    }
}

fn accuracy_of<M: RiskModel + ?Sized>(model: &M, examples: &[TrainingExample]) -> f64 {
    if examples.is_empty() {
        return 0.0;
    }
    let correct = examples
        .iter()
        .filter(|example| model.predict_class(&example.features) == example.label)
        .count();
    correct as f64 / examples.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn labeled_set(per_class: usize) -> Vec<TrainingExample> {
        let mut examples = Vec::new();
        for i in 0..per_class {
            let jitter = i as f64 * 0.05;
            examples.push(TrainingExample {
                features: FeatureVector::new(1.0, 98.8 + jitter, 1.0, 0.0),
                label: RiskClass::Low,
            });
            examples.push(TrainingExample {
                features: FeatureVector::new(3.0, 100.8 + jitter, 2.0, 0.2),
                label: RiskClass::Medium,
            });
            examples.push(TrainingExample {
                features: FeatureVector::new(7.0, 102.8 + jitter, 3.0, 0.6),
                label: RiskClass::High,
            });
        }
        examples
    }

    #[test]
    fn test_predict_before_training_fails() {
        let classifier = RiskClassifier::default();
        let result = classifier.predict(&FeatureVector::new(1.0, 99.0, 1.0, 0.0));

        assert_eq!(result, Err(PredictionError::NotTrained));
        assert!(!classifier.is_trained());
        assert_eq!(classifier.generation(), 0);
    }

    #[test]
    fn test_insufficient_data_keeps_untrained() {
        let classifier = RiskClassifier::default();
        let examples = labeled_set(3);

        let result = classifier.train(&examples[..9]);

        assert_eq!(
            result,
            Err(TrainingError::InsufficientData { have: 9, need: 10 })
        );
        assert!(!classifier.is_trained());
    }

    #[test]
    fn test_trained_distribution_sums_to_one() {
        let classifier = RiskClassifier::default();
        let examples = labeled_set(4);

        let outcome = classifier.train(&examples).unwrap();
        assert!(matches!(
            outcome,
            TrainOutcome::Trained { examples: 12, first: true, .. }
        ));

        let distribution = classifier
            .predict(&FeatureVector::new(8.0, 103.0, 3.0, 0.7))
            .unwrap();
        let total = distribution.low + distribution.medium + distribution.high;
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(distribution.most_likely(), RiskClass::High);
        assert_eq!(classifier.trained_examples(), Some(12));
    }

    #[test]
    fn test_train_once_policy_keeps_first_model() {
        let classifier = RiskClassifier::default();
        let examples = labeled_set(4);

        classifier.train(&examples).unwrap();
        let outcome = classifier.train(&labeled_set(8)).unwrap();

        assert_eq!(outcome, TrainOutcome::AlreadyTrained);
        assert_eq!(classifier.generation(), 1);
        assert_eq!(classifier.trained_examples(), Some(12));
    }

    #[test]
    fn test_retrain_every_cycle_policy_refits() {
        let classifier = RiskClassifier::new(
            TrainingPolicy::RetrainEveryCycle,
            10,
            FitParams::default(),
        );

        classifier.train(&labeled_set(4)).unwrap();
        let outcome = classifier.train(&labeled_set(8)).unwrap();

        assert!(matches!(
            outcome,
            TrainOutcome::Trained { examples: 24, first: false, .. }
        ));
        assert_eq!(classifier.generation(), 2);
        assert_eq!(classifier.trained_examples(), Some(24));
    }

    #[test]
    fn test_failed_retrain_keeps_previous_model() {
        let classifier = RiskClassifier::new(
            TrainingPolicy::RetrainEveryCycle,
            10,
            FitParams::default(),
        );
        classifier.train(&labeled_set(4)).unwrap();

        let result = classifier.train(&labeled_set(1));

        assert!(matches!(result, Err(TrainingError::InsufficientData { .. })));
        assert!(classifier.is_trained());
        assert!(classifier
            .predict(&FeatureVector::new(1.0, 99.0, 1.0, 0.0))
            .is_ok());
    }

    #[test]
    fn test_training_accuracy_on_separable_data() {
        let classifier = RiskClassifier::default();
        let examples = labeled_set(5);

        assert_eq!(
            classifier.training_accuracy(&examples),
            Err(PredictionError::NotTrained)
        );

        match classifier.train(&examples).unwrap() {
            TrainOutcome::Trained { accuracy, .. } => assert!(accuracy > 0.9),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(classifier.training_accuracy(&examples).unwrap() > 0.9);
    }

    #[test]
    fn test_identical_training_sets_give_identical_predictions() {
        let examples = labeled_set(4);
        let a = RiskClassifier::default();
        let b = RiskClassifier::default();
        a.train(&examples).unwrap();
        b.train(&examples).unwrap();

        let features = FeatureVector::new(4.0, 101.5, 2.0, 0.3);
        assert_eq!(a.predict(&features), b.predict(&features));
    }

    #[test]
    fn test_readers_during_training_never_see_partial_state() {
        let classifier = Arc::new(RiskClassifier::new(
            TrainingPolicy::RetrainEveryCycle,
            10,
            FitParams::default(),
        ));
        classifier.train(&labeled_set(4)).unwrap();

        let reader = {
            let classifier = Arc::clone(&classifier);
            thread::spawn(move || {
                for _ in 0..200 {
                    let distribution = classifier
                        .predict(&FeatureVector::new(2.0, 100.0, 1.0, 0.1))
                        .unwrap();
                    let total = distribution.low + distribution.medium + distribution.high;
                    assert!((total - 1.0).abs() < 1e-9);
                }
            })
        };

        for cycle in 0..3 {
            classifier.train(&labeled_set(4 + cycle)).unwrap();
        }
        reader.join().unwrap();
        assert_eq!(classifier.generation(), 4);
    }
}
