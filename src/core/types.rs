use serde::{Deserialize, Serialize};
use std::fmt;

/// Input features understood by the price model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Surface,
    Rooms,
    Age,
    LocationScore,
    Garage,
}

impl Feature {
    /// Canonical ordering, as produced by the training pipeline.
    pub const ALL: [Feature; 5] = [
        Feature::Surface,
        Feature::Rooms,
        Feature::Age,
        Feature::LocationScore,
        Feature::Garage,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::Surface => "surface",
            Feature::Rooms => "rooms",
            Feature::Age => "age",
            Feature::LocationScore => "location_score",
            Feature::Garage => "garage",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|feature| feature.name() == name)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A validated property description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// Living surface in m²
    pub surface: f64,
    /// Number of rooms
    pub rooms: u32,
    /// Age of the building in years
    pub age: f64,
    /// Location quality, 1 (poor) to 10 (excellent)
    pub location_score: f64,
    /// Whether the property has a garage
    pub garage: bool,
}

impl FeatureRecord {
    /// Numeric value fed to the model for `feature`.
    pub fn value_of(&self, feature: Feature) -> f64 {
        match feature {
            Feature::Surface => self.surface,
            Feature::Rooms => f64::from(self.rooms),
            Feature::Age => self.age,
            Feature::LocationScore => self.location_score,
            Feature::Garage => {
                if self.garage {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    pub fn contains(&self, value: f64) -> bool {
        self.lower <= value && value <= self.upper
    }
}

/// Price estimate returned for a single record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_price: f64,
    pub confidence_interval: ConfidenceInterval,
    pub model_version: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPredictionResponse {
    pub predictions: Vec<PredictionResult>,
}

/// Overall service health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Model loaded, predictions are served.
    Healthy,
    /// Process is up but no model is available.
    Degraded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub timestamp: String,
    pub model_loaded: bool,
}

/// Evaluation metrics recorded at training time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetrics {
    pub r2_score: f64,
    pub mae: f64,
    pub rmse: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mse: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Public description of the loaded model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_version: String,
    pub training_date: String,
    pub training_samples: u64,
    pub features: Vec<String>,
    pub metrics: ModelMetrics,
    pub feature_importance: Vec<FeatureImportance>,
}
