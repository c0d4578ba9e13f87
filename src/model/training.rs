//! Training set accumulation from periodic metric snapshots

use crate::aggregator::{FeatureVector, HospitalMetrics};
use crate::events::RiskClass;
use crate::rules::label_for;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One labeled observation of a hospital's windowed metrics
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TrainingExample {
    pub features: FeatureVector,
    pub label: RiskClass,
}

impl TrainingExample {
    /// Label a metrics snapshot with the heuristic rules
    pub fn from_metrics(metrics: &HospitalMetrics) -> Self {
        Self {
            features: metrics.feature_vector(),
            label: label_for(metrics),
        }
    }
}

/// Append-only set of labeled examples
///
/// The same hospital contributes a new example on every collection cycle, so
/// a hospital that stays busy is represented many times over.
#[derive(Debug, Clone)]
pub struct TrainingAccumulator {
    examples: Vec<TrainingExample>,
    min_cases: u64,
}

impl TrainingAccumulator {
    /// Create an accumulator that ignores hospitals with fewer than `min_cases` updates
    pub fn new(min_cases: u64) -> Self {
        Self {
            examples: Vec::new(),
            min_cases,
        }
    }

    /// Append one example per eligible hospital and return how many were appended
    ///
    /// Metrics whose feature vector is not finite are left out.
    pub fn collect<'a, I>(&mut self, snapshot: I) -> usize
    where
        I: IntoIterator<Item = &'a HospitalMetrics>,
    {
        let before = self.examples.len();
        let min_cases = self.min_cases;
        for metrics in snapshot {
            if metrics.total_cases < min_cases {
                continue;
            }
            let example = TrainingExample::from_metrics(metrics);
            if !example.features.is_finite() {
                warn!("Leaving non-finite features out of the training set: {:?}", example.features);
                continue;
            }
            self.examples.push(example);
        }
        self.examples.len() - before
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn min_cases(&self) -> u64 {
        self.min_cases
    }

    /// Owned copy of the training set, so fitting can run without holding a lock
    pub fn snapshot(&self) -> Vec<TrainingExample> {
        self.examples.clone()
    }

    /// Number of examples per label, with every label present
    pub fn label_counts(&self) -> BTreeMap<RiskClass, usize> {
        let mut counts: BTreeMap<RiskClass, usize> =
            RiskClass::ALL.iter().map(|class| (*class, 0)).collect();
        for example in &self.examples {
            *counts.entry(example.label).or_insert(0) += 1;
        }
        counts
    }
}

impl Default for TrainingAccumulator {
    fn default() -> Self {
        Self::new(3)
    }
}
