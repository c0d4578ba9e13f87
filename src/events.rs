//! Core event types and enums for the outbreak watch pipeline
//!
//! This module defines the fundamental data structures used throughout the application
//! for representing decoded case reports and the risk vocabulary shared by the
//! labeling, classification and scoring stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Timestamp type for consistent time handling across the application
pub type Timestamp = DateTime<Utc>;

/// A single patient case report, attributed to the hospital that filed it
///
/// Events are immutable once decoded; the aggregator copies what it needs
/// into its windowed history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Case identifier assigned by the reporting facility
    pub patient_id: String,
    /// Reporting hospital, the aggregation key
    pub hospital: String,
    /// Reported symptoms
    pub symptoms: SymptomSet,
    /// Clinical severity of the case
    pub severity: Severity,
    /// Body temperature in degrees Fahrenheit
    pub temperature: f64,
    /// When the case was reported
    pub timestamp: Timestamp,
    /// Whether the producer flagged this case as part of a correlated cluster
    pub is_cluster: bool,
}

/// Clinical severity of a reported case
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
    Critical,
}

impl Severity {
    /// Parse a severity token, ignoring case and surrounding whitespace
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mild" => Some(Severity::Mild),
            "moderate" => Some(Severity::Moderate),
            "severe" => Some(Severity::Severe),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Severe and critical cases count towards the severe case ratio
    pub fn is_severe(self) -> bool {
        matches!(self, Severity::Severe | Severity::Critical)
    }
}

/// Order-insensitive set of symptom tokens
///
/// `"fever,cough"` and `"cough, fever"` describe the same presentation and
/// compare equal, which is what symptom diversity counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct SymptomSet(BTreeSet<String>);

impl SymptomSet {
    /// Build a set from a comma-separated list such as `fever,cough,fatigue`
    pub fn from_csv(list: &str) -> Self {
        Self::from_tokens(list.split(','))
    }

    /// Build a set from individual tokens; blank tokens are dropped
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        SymptomSet(
            tokens
                .into_iter()
                .map(|token| token.as_ref().trim().to_string())
                .filter(|token| !token.is_empty())
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, symptom: &str) -> bool {
        self.0.contains(symptom)
    }
}

impl fmt::Display for SymptomSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.0.iter().map(String::as_str).collect();
        write!(f, "{}", joined.join(","))
    }
}

/// Coarse outbreak risk class, used both as training label and prediction target
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskClass {
    Low,
    Medium,
    High,
}

impl RiskClass {
    /// All classes in model output order
    pub const ALL: [RiskClass; 3] = [RiskClass::Low, RiskClass::Medium, RiskClass::High];

    /// Position of this class in model output vectors
    pub fn index(self) -> usize {
        match self {
            RiskClass::Low => 0,
            RiskClass::Medium => 1,
            RiskClass::High => 2,
        }
    }
}

impl fmt::Display for RiskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskClass::Low => "LOW",
            RiskClass::Medium => "MEDIUM",
            RiskClass::High => "HIGH",
        };
        f.write_str(label)
    }
}

/// Qualitative alert tier derived from a 0-100 risk score
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RiskTier {
    #[serde(rename = "LOW")]
    Low,
    #[serde(rename = "LOW-MEDIUM")]
    LowMedium,
    #[serde(rename = "MEDIUM")]
    Medium,
    #[serde(rename = "HIGH")]
    High,
}

impl RiskTier {
    /// Classify a risk score: >75 high, >50 medium, >25 low-medium, otherwise low
    pub fn from_score(score: f64) -> Self {
        if score > 75.0 {
            RiskTier::High
        } else if score > 50.0 {
            RiskTier::Medium
        } else if score > 25.0 {
            RiskTier::LowMedium
        } else {
            RiskTier::Low
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RiskTier::Low => "LOW",
            RiskTier::LowMedium => "LOW-MEDIUM",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
        };
        f.write_str(label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parse() {
        assert_eq!(Severity::parse("mild"), Some(Severity::Mild));
        assert_eq!(Severity::parse(" Severe "), Some(Severity::Severe));
        assert_eq!(Severity::parse("CRITICAL"), Some(Severity::Critical));
        assert_eq!(Severity::parse("unknown"), None);
        assert_eq!(Severity::parse(""), None);
    }

    #[test]
    fn test_severity_is_severe() {
        assert!(!Severity::Mild.is_severe());
        assert!(!Severity::Moderate.is_severe());
        assert!(Severity::Severe.is_severe());
        assert!(Severity::Critical.is_severe());
    }

    #[test]
    fn test_symptom_set_is_order_insensitive() {
        let a = SymptomSet::from_csv("fever,cough,fatigue");
        let b = SymptomSet::from_csv("fatigue, fever ,cough");
        assert_eq!(a, b);
        assert_eq!(a.len(), 3);
        assert!(a.contains("cough"));
    }

    #[test]
    fn test_symptom_set_drops_blank_tokens() {
        let set = SymptomSet::from_csv("fever,, ,cough,");
        assert_eq!(set.len(), 2);
        assert!(SymptomSet::from_csv("").is_empty());
    }

    #[test]
    fn test_symptom_set_display() {
        let set = SymptomSet::from_tokens(["cough", "fever"]);
        assert_eq!(set.to_string(), "cough,fever");
    }

    #[test]
    fn test_risk_class_index_matches_all() {
        for (position, class) in RiskClass::ALL.iter().enumerate() {
            assert_eq!(class.index(), position);
        }
    }

    #[test]
    fn test_risk_tier_boundaries() {
        assert_eq!(RiskTier::from_score(100.0), RiskTier::High);
        assert_eq!(RiskTier::from_score(75.1), RiskTier::High);
        assert_eq!(RiskTier::from_score(75.0), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(50.1), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(50.0), RiskTier::LowMedium);
        assert_eq!(RiskTier::from_score(25.1), RiskTier::LowMedium);
        assert_eq!(RiskTier::from_score(25.0), RiskTier::Low);
        assert_eq!(RiskTier::from_score(0.0), RiskTier::Low);
    }

    #[test]
    fn test_risk_tier_serialization() {
        assert_eq!(
            serde_json::to_string(&RiskTier::LowMedium).unwrap(),
            "\"LOW-MEDIUM\""
        );
        assert_eq!(serde_json::to_string(&RiskTier::High).unwrap(), "\"HIGH\"");
        assert_eq!(RiskTier::LowMedium.to_string(), "LOW-MEDIUM");
    }

    #[test]
    fn test_risk_class_serialization() {
        assert_eq!(serde_json::to_string(&RiskClass::Medium).unwrap(), "\"MEDIUM\"");
        assert_eq!(RiskClass::High.to_string(), "HIGH");
    }
}
