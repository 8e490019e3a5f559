use chrono::{DateTime, Utc};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::core::{
    ArtifactError, Feature, FeatureImportance, FeatureRecord, ModelInfo, ModelMetrics,
};
use crate::ml::regressor::{PriceModel, Regressor};

fn default_version() -> String {
    "1.0.0".to_string()
}

/// Standardization fitted at training time: `(x - mean) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn transform(&self, row: ArrayView1<f64>) -> Array1<f64> {
        let mean = ArrayView1::from(self.mean.as_slice());
        // Constant columns were fitted with a zero scale
        let scale: Array1<f64> = self
            .scale
            .iter()
            .map(|&s| if s == 0.0 { 1.0 } else { s })
            .collect();
        (&row - &mean) / &scale
    }

    fn check(&self, n_features: usize) -> Result<(), String> {
        if self.mean.len() != n_features || self.scale.len() != n_features {
            return Err(format!(
                "scaler has {} means and {} scales for {} features",
                self.mean.len(),
                self.scale.len(),
                n_features
            ));
        }
        if self
            .mean
            .iter()
            .chain(self.scale.iter())
            .any(|v| !v.is_finite())
        {
            return Err("scaler contains non-finite values".to_string());
        }
        if self.scale.iter().any(|s| *s < 0.0) {
            return Err("scaler contains a negative scale".to_string());
        }
        Ok(())
    }
}

/// On-disk model artifact, as written by the training pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    #[serde(default = "default_version")]
    pub version: String,
    pub training_date: String,
    pub training_samples: u64,
    pub features: Vec<String>,
    pub metrics: ModelMetrics,
    #[serde(default)]
    pub feature_importance: Vec<FeatureImportance>,
    pub scaler: StandardScaler,
    pub regressor: Regressor,
}

impl ModelArtifact {
    /// Check the artifact and resolve its feature ordering.
    pub fn validate(self) -> Result<LoadedModel, ArtifactError> {
        let ordering = self.feature_ordering()?;
        let n_features = ordering.len();

        self.scaler.check(n_features).map_err(ArtifactError::Invalid)?;
        self.regressor.check(n_features).map_err(ArtifactError::Invalid)?;

        let metrics = &self.metrics;
        let finite = [metrics.r2_score, metrics.mae, metrics.rmse]
            .iter()
            .chain(metrics.mse.iter())
            .all(|v| v.is_finite());
        if !finite {
            return Err(ArtifactError::Invalid("metrics contain non-finite values".to_string()));
        }
        if metrics.mae < 0.0 || metrics.rmse < 0.0 || metrics.mse.map_or(false, |mse| mse < 0.0) {
            return Err(ArtifactError::Invalid("error metrics must be non-negative".to_string()));
        }
        if self.version.trim().is_empty() {
            return Err(ArtifactError::Invalid("model version is empty".to_string()));
        }

        Ok(LoadedModel {
            artifact: self,
            ordering,
            source: None,
            loaded_at: Utc::now(),
        })
    }

    fn feature_ordering(&self) -> Result<Vec<Feature>, ArtifactError> {
        let mut seen = HashSet::new();
        let mut ordering = Vec::with_capacity(self.features.len());

        for name in &self.features {
            let feature = Feature::from_name(name)
                .ok_or_else(|| ArtifactError::Invalid(format!("unknown feature '{}'", name)))?;
            if !seen.insert(feature) {
                return Err(ArtifactError::Invalid(format!("duplicate feature '{}'", name)));
            }
            ordering.push(feature);
        }

        if ordering.len() != Feature::ALL.len() {
            let missing: Vec<&str> = Feature::ALL
                .iter()
                .filter(|feature| !seen.contains(*feature))
                .map(|feature| feature.name())
                .collect();
            return Err(ArtifactError::Invalid(format!(
                "missing features: {}",
                missing.join(", ")
            )));
        }
        Ok(ordering)
    }
}

/// A validated artifact ready to serve predictions
#[derive(Debug, Clone)]
pub struct LoadedModel {
    artifact: ModelArtifact,
    ordering: Vec<Feature>,
    source: Option<PathBuf>,
    loaded_at: DateTime<Utc>,
}

impl LoadedModel {
    /// Parse and validate an artifact from its JSON text
    pub fn from_json(content: &str) -> Result<Self, ArtifactError> {
        let artifact: ModelArtifact = serde_json::from_str(content)?;
        artifact.validate()
    }

    /// Read, parse and validate the artifact at `path`
    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        if !path.exists() {
            return Err(ArtifactError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|source| ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), bytes = content.len(), "read model artifact");

        let mut model = Self::from_json(&content)?;
        model.source = Some(path.to_path_buf());

        info!(
            path = %path.display(),
            version = %model.version(),
            kind = model.artifact.regressor.kind(),
            r2_score = model.artifact.metrics.r2_score,
            "model artifact loaded"
        );
        Ok(model)
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn version(&self) -> &str {
        &self.artifact.version
    }

    pub fn metrics(&self) -> &ModelMetrics {
        &self.artifact.metrics
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    /// Feature row in the model's ordering, before scaling
    pub fn feature_row(&self, record: &FeatureRecord) -> Array1<f64> {
        self.ordering
            .iter()
            .map(|feature| record.value_of(*feature))
            .collect()
    }

    /// Feature row in the model's ordering, scaled
    pub fn scaled_row(&self, record: &FeatureRecord) -> Array1<f64> {
        let row = self.feature_row(record);
        self.artifact.scaler.transform(row.view())
    }

    pub fn regressor(&self) -> &Regressor {
        &self.artifact.regressor
    }

    pub fn info(&self) -> ModelInfo {
        let artifact = &self.artifact;
        ModelInfo {
            model_version: artifact.version.clone(),
            training_date: artifact.training_date.clone(),
            training_samples: artifact.training_samples,
            features: artifact.features.clone(),
            metrics: artifact.metrics.clone(),
            feature_importance: artifact.feature_importance.clone(),
        }
    }
}
