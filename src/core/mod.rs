pub mod error;
pub mod types;

pub use error::{ArtifactError, FieldViolation, ServiceError, ServiceResult, ValidationError};
pub use types::{
    BatchPredictionResponse, ConfidenceInterval, Feature, FeatureImportance, FeatureRecord,
    HealthResponse, HealthStatus, ModelInfo, ModelMetrics, PredictionResult,
};
