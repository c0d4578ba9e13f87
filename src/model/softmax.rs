//! Multinomial logistic regression over standardized features

use crate::aggregator::FeatureVector;
use crate::config::TrainingConfig;
use crate::events::RiskClass;
use crate::model::training::TrainingExample;
use std::fmt;

const FEATURES: usize = FeatureVector::LEN;
const CLASSES: usize = 3;

/// A fitted model that maps a feature vector to class probabilities
///
/// Probabilities are returned in [`RiskClass::ALL`] order and sum to 1.
pub trait RiskModel: Send + Sync + fmt::Debug {
    fn predict_proba(&self, features: &FeatureVector) -> [f64; CLASSES];

    /// Most probable class for the given features
    fn predict_class(&self, features: &FeatureVector) -> RiskClass {
        let probabilities = self.predict_proba(features);
        let mut best = 0;
        for (index, probability) in probabilities.iter().enumerate() {
            if *probability > probabilities[best] {
                best = index;
            }
        }
        RiskClass::ALL[best]
    }
}

/// Gradient descent settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitParams {
    pub iterations: usize,
    pub learning_rate: f64,
    pub l2_penalty: f64,
}

impl Default for FitParams {
    fn default() -> Self {
        Self {
            iterations: 500,
            learning_rate: 0.5,
            l2_penalty: 1e-4,
        }
    }
}

impl From<&TrainingConfig> for FitParams {
    fn from(config: &TrainingConfig) -> Self {
        Self {
            iterations: config.iterations,
            learning_rate: config.learning_rate,
            l2_penalty: config.l2_penalty,
        }
    }
}

/// Softmax regression with per-feature standardization
///
/// Fitting is full-batch gradient descent from zero weights, so the same
/// training set always yields the same parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftmaxRegression {
    mean: [f64; FEATURES],
    scale: [f64; FEATURES],
    weights: [[f64; FEATURES]; CLASSES],
    bias: [f64; CLASSES],
}

impl SoftmaxRegression {
    /// Fit a model to the given examples
    ///
    /// An empty training set yields a model that predicts the uniform distribution.
    pub fn fit(examples: &[TrainingExample], params: &FitParams) -> Self {
        let (mean, scale) = standardization(examples);
        let mut model = Self {
            mean,
            scale,
            weights: [[0.0; FEATURES]; CLASSES],
            bias: [0.0; CLASSES],
        };
        if examples.is_empty() {
            return model;
        }

        let inputs: Vec<[f64; FEATURES]> = examples
            .iter()
            .map(|example| model.standardize(&example.features))
            .collect();
        let n = examples.len() as f64;

        for _ in 0..params.iterations {
            let mut grad_w = [[0.0; FEATURES]; CLASSES];
            let mut grad_b = [0.0; CLASSES];

            for (x, example) in inputs.iter().zip(examples) {
                let probabilities = softmax(model.logits(x));
                let target = example.label.index();
                for class in 0..CLASSES {
                    let error = probabilities[class] - if class == target { 1.0 } else { 0.0 };
                    grad_b[class] += error;
                    for feature in 0..FEATURES {
                        grad_w[class][feature] += error * x[feature];
                    }
                }
            }

            for class in 0..CLASSES {
                model.bias[class] -= params.learning_rate * grad_b[class] / n;
                for feature in 0..FEATURES {
                    let gradient = grad_w[class][feature] / n
                        + params.l2_penalty * model.weights[class][feature];
                    model.weights[class][feature] -= params.learning_rate * gradient;
                }
            }
        }

        model
    }

    fn standardize(&self, features: &FeatureVector) -> [f64; FEATURES] {
        let mut x = [0.0; FEATURES];
        for (index, value) in features.values().iter().enumerate() {
            x[index] = (value - self.mean[index]) / self.scale[index];
        }
        x
    }

    fn logits(&self, x: &[f64; FEATURES]) -> [f64; CLASSES] {
        let mut z = self.bias;
        for (class, weights) in self.weights.iter().enumerate() {
            z[class] += weights.iter().zip(x).map(|(w, v)| w * v).sum::<f64>();
        }
        z
    }
}

impl RiskModel for SoftmaxRegression {
    fn predict_proba(&self, features: &FeatureVector) -> [f64; CLASSES] {
        softmax(self.logits(&self.standardize(features)))
    }
}

/// Per-feature mean and standard deviation; constant features get scale 1
fn standardization(examples: &[TrainingExample]) -> ([f64; FEATURES], [f64; FEATURES]) {
    let mut mean = [0.0; FEATURES];
    let mut scale = [1.0; FEATURES];
    if examples.is_empty() {
        return (mean, scale);
    }
    let n = examples.len() as f64;

    for example in examples {
        for (index, value) in example.features.values().iter().enumerate() {
            mean[index] += value / n;
        }
    }
    let mut variance = [0.0; FEATURES];
    for example in examples {
        for (index, value) in example.features.values().iter().enumerate() {
            variance[index] += (value - mean[index]).powi(2) / n;
        }
    }
    for index in 0..FEATURES {
        let deviation = variance[index].sqrt();
        if deviation > 1e-12 {
            scale[index] = deviation;
        }
    }
    (mean, scale)
}

/// Numerically stable softmax
fn softmax(logits: [f64; CLASSES]) -> [f64; CLASSES] {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mut exp = [0.0; CLASSES];
    let mut total = 0.0;
    for (index, logit) in logits.iter().enumerate() {
        exp[index] = (logit - max).exp();
        total += exp[index];
    }
    for value in exp.iter_mut() {
        *value /= total;
    }
    exp
}
