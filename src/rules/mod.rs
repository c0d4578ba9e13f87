//! Threshold rules shared by the training and alerting stages
//!
//! Labels come from a fixed heuristic over windowed metrics; alert rules fire
//! independently of any trained model.

pub mod alert_rules;
pub mod labels;

pub use alert_rules::{CriticalFeverRule, OutbreakCandidateRule};
pub use labels::label_for;
