/// Training set accumulation from metric snapshots
pub mod training;

/// Softmax regression and the model trait
pub mod softmax;

/// Classifier state and policy
pub mod classifier;

pub use classifier::{RiskClassifier, RiskDistribution, TrainOutcome};
pub use softmax::{FitParams, RiskModel, SoftmaxRegression};
pub use training::{TrainingAccumulator, TrainingExample};
