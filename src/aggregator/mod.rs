/// Per-hospital metrics snapshot and classifier features
pub mod metrics;

/// Windowed aggregator keyed by hospital
pub mod hospital_aggregator;

pub use hospital_aggregator::HospitalAggregator;
pub use metrics::{FeatureVector, HospitalMetrics, BASELINE_TEMPERATURE};
