/// Error types for the outbreak watch pipeline
pub mod error;

/// Case events and the shared risk vocabulary
pub mod events;

/// Payload decoding and payload sources
pub mod collectors;

/// Windowed per-hospital aggregation
pub mod aggregator;

/// Heuristic labels and model-independent alert rules
pub mod rules;

/// Training set, classifier and model
pub mod model;

/// Risk scoring, reports and report sinks
pub mod alerts;

/// Wall-clock cadences for periodic activities
pub mod scheduler;

/// The pipeline that ties the stages together
pub mod pipeline;

/// Ingestion loop and model worker threads
pub mod runtime;

/// Self-monitoring counters
pub mod monitoring;

/// Configuration management
pub mod config;

// Re-export commonly used types
pub use error::{ConfigError, DecodeError, PredictionError, SourceError, TrainingError};
pub use events::{Event, RiskClass, RiskTier, Severity, SymptomSet};
pub use pipeline::Pipeline;
pub use runtime::{LoopMessage, Runtime, StopReason};
