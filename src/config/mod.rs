/// Configuration schema, defaults and validation
pub mod settings;

pub use settings::{
    AlertConfig, Config, OutputConfig, ReportFormat, ScheduleConfig, TrainingConfig,
    TrainingPolicy, WindowConfig,
};
