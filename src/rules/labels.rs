//! Heuristic risk labels used as training targets

use crate::aggregator::HospitalMetrics;
use crate::events::RiskClass;

/// Windowed case count above which a hospital is labeled HIGH
pub const HIGH_VELOCITY: usize = 4;
/// Average temperature (°F) above which a hospital is labeled HIGH
pub const HIGH_TEMPERATURE: f64 = 102.0;
/// Windowed case count above which a hospital is labeled MEDIUM
pub const MEDIUM_VELOCITY: usize = 2;
/// Average temperature (°F) above which a hospital is labeled MEDIUM
pub const MEDIUM_TEMPERATURE: f64 = 101.0;

/// Label a hospital's current metrics
///
/// HIGH conditions are checked first, so a hospital that meets both a HIGH
/// and a MEDIUM condition is HIGH.
pub fn label_for(metrics: &HospitalMetrics) -> RiskClass {
    if metrics.had_recent_outbreak
        || metrics.case_velocity > HIGH_VELOCITY
        || metrics.avg_temperature > HIGH_TEMPERATURE
    {
        RiskClass::High
    } else if metrics.case_velocity > MEDIUM_VELOCITY
        || metrics.avg_temperature > MEDIUM_TEMPERATURE
    {
        RiskClass::Medium
    } else {
        RiskClass::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::hospital_aggregator::test_support::case_at;
    use crate::aggregator::HospitalAggregator;
    use crate::events::Severity;

    fn metrics(case_velocity: usize, avg_temperature: f64, outbreak: bool) -> HospitalMetrics {
        HospitalMetrics {
            case_velocity,
            avg_temperature,
            had_recent_outbreak: outbreak,
            ..HospitalMetrics::default()
        }
    }

    #[test]
    fn test_velocity_alone_makes_high() {
        assert_eq!(label_for(&metrics(5, 99.0, false)), RiskClass::High);
    }

    #[test]
    fn test_outbreak_flag_makes_high() {
        assert_eq!(label_for(&metrics(0, 98.6, true)), RiskClass::High);
    }

    #[test]
    fn test_thresholds_are_strict() {
        assert_eq!(label_for(&metrics(4, 98.6, false)), RiskClass::Medium);
        assert_eq!(label_for(&metrics(0, 102.0, false)), RiskClass::Medium);
        assert_eq!(label_for(&metrics(0, 102.1, false)), RiskClass::High);
        assert_eq!(label_for(&metrics(2, 98.6, false)), RiskClass::Low);
        assert_eq!(label_for(&metrics(3, 98.6, false)), RiskClass::Medium);
        assert_eq!(label_for(&metrics(0, 101.0, false)), RiskClass::Low);
        assert_eq!(label_for(&metrics(0, 101.5, false)), RiskClass::Medium);
    }

    #[test]
    fn test_three_windowed_cases_cross_medium_velocity() {
        let mut aggregator = HospitalAggregator::default();
        aggregator.ingest(&case_at("A", 0, 99.0, Severity::Mild));
        aggregator.ingest(&case_at("A", 1, 100.0, Severity::Mild));
        let metrics = aggregator
            .ingest(&case_at("A", 2, 101.0, Severity::Moderate))
            .clone();

        assert_eq!(metrics.case_velocity, 3);
        assert!((metrics.avg_temperature - 100.0).abs() < 1e-9);
        assert_eq!(metrics.severe_case_ratio, 0.0);
        assert_eq!(label_for(&metrics), RiskClass::Medium);
    }

    #[test]
    fn test_quiet_hospital_is_low() {
        let mut aggregator = HospitalAggregator::default();
        aggregator.ingest(&case_at("A", 0, 99.0, Severity::Mild));
        let metrics = aggregator
            .ingest(&case_at("A", 1, 100.0, Severity::Mild))
            .clone();

        assert_eq!(label_for(&metrics), RiskClass::Low);
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    // Any HIGH condition wins regardless of the MEDIUM conditions
    #[quickcheck]
    fn prop_high_dominates_medium(velocity: u8, temp_tenths: u16, outbreak: bool) -> bool {
        let metrics = HospitalMetrics {
            case_velocity: velocity as usize,
            avg_temperature: 95.0 + (temp_tenths % 120) as f64 / 10.0,
            had_recent_outbreak: outbreak,
            ..HospitalMetrics::default()
        };

        let high = outbreak
            || metrics.case_velocity > HIGH_VELOCITY
            || metrics.avg_temperature > HIGH_TEMPERATURE;
        (label_for(&metrics) == RiskClass::High) == high
    }
}
