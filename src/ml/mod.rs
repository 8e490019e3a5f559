// Model artifact loading and price prediction

pub mod artifact;
pub mod predictor;
pub mod regressor;

// Expose key types and functions
pub use artifact::{LoadedModel, ModelArtifact, StandardScaler};
pub use predictor::{IntervalStrategy, Predictor};
pub use regressor::{DecisionTree, LinearModel, PriceModel, RandomForest, RawEstimate, Regressor, TreeNode};
