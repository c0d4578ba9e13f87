//! Alert rules that fire without consulting the classifier

use crate::aggregator::HospitalMetrics;
use crate::events::Event;

/// Fires for any single case whose temperature exceeds the threshold
///
/// Evaluated at ingest, before and independent of any window or model state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CriticalFeverRule {
    /// Temperature (°F) that must be exceeded
    pub threshold: f64,
}

impl CriticalFeverRule {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// 103.0°F
    pub fn with_defaults() -> Self {
        Self::new(103.0)
    }

    pub fn evaluate(&self, event: &Event) -> bool {
        event.temperature > self.threshold
    }
}

/// Marks a hospital as an outbreak candidate once enough cases share its window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutbreakCandidateRule {
    /// Windowed case count that must be reached
    pub min_velocity: usize,
}

impl OutbreakCandidateRule {
    pub fn new(min_velocity: usize) -> Self {
        Self { min_velocity }
    }

    /// Two cases in the window
    pub fn with_defaults() -> Self {
        Self::new(2)
    }

    pub fn evaluate(&self, metrics: &HospitalMetrics) -> bool {
        metrics.case_velocity >= self.min_velocity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::hospital_aggregator::test_support::case_at;
    use crate::events::Severity;

    #[test]
    fn test_critical_fever_threshold_is_exclusive() {
        let rule = CriticalFeverRule::with_defaults();
        assert!(rule.evaluate(&case_at("A", 0, 104.0, Severity::Mild)));
        assert!(rule.evaluate(&case_at("A", 0, 103.1, Severity::Mild)));
        assert!(!rule.evaluate(&case_at("A", 0, 103.0, Severity::Critical)));
        assert!(!rule.evaluate(&case_at("A", 0, 98.6, Severity::Mild)));
    }

    #[test]
    fn test_outbreak_candidate_threshold_is_inclusive() {
        let rule = OutbreakCandidateRule::with_defaults();
        let metrics = |case_velocity| HospitalMetrics {
            case_velocity,
            ..HospitalMetrics::default()
        };

        assert!(!rule.evaluate(&metrics(0)));
        assert!(!rule.evaluate(&metrics(1)));
        assert!(rule.evaluate(&metrics(2)));
        assert!(rule.evaluate(&metrics(9)));
    }

    #[test]
    fn test_custom_thresholds() {
        assert!(!CriticalFeverRule::new(105.0).evaluate(&case_at("A", 0, 104.0, Severity::Mild)));
        assert!(!OutbreakCandidateRule::new(5).evaluate(&HospitalMetrics {
            case_velocity: 4,
            ..HospitalMetrics::default()
        }));
    }
}
