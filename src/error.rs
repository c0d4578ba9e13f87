use thiserror::Error;

/// Errors raised while turning a raw payload into an [`Event`](crate::events::Event)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Payload is not valid UTF-8: {0}")]
    NotUtf8(String),

    #[error("Payload is not a JSON object: {0}")]
    Malformed(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid value for field '{field}': {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Errors raised when the classifier cannot be fitted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TrainingError {
    #[error("Insufficient training data: have {have} examples, need {need}")]
    InsufficientData { have: usize, need: usize },
}

/// Errors raised when a prediction is requested
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PredictionError {
    #[error("Risk classifier has not been trained yet")]
    NotTrained,

    #[error("Risk model produced a non-finite distribution")]
    NonFiniteDistribution,
}

/// Errors raised by a payload source (the transport side of the pipeline)
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Payload source closed: {0}")]
    Closed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
