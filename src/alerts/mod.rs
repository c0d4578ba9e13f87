/// Report types and sinks
pub mod reporter;
/// Risk scoring and alert generation
pub mod scorer;

pub use reporter::{JsonLinesReporter, LogReporter, MemoryReporter, Report, ReportSink, RiskMarker};
pub use scorer::{RiskScoreBoard, ScoredHospital, Scorer};
