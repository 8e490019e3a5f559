pub mod openapi;
pub mod server;

pub use server::{handle_rejection, routes, shutdown_signal, ApiError, PredictionServer};

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::ServiceConfig;
use crate::core::{
    ArtifactError, BatchPredictionResponse, HealthResponse, HealthStatus, ModelInfo,
    PredictionResult, ServiceError, ServiceResult,
};
use crate::ml::{LoadedModel, Predictor};
use crate::track_performance;
use crate::validation;

/// Holds the currently served model.
///
/// Readers take an `Arc` snapshot and never hold the lock while predicting,
/// so a reload never changes the model under an in-flight request.
pub struct ModelStore {
    current: RwLock<Option<Arc<LoadedModel>>>,
}

impl ModelStore {
    pub fn new(model: Option<LoadedModel>) -> Self {
        Self {
            current: RwLock::new(model.map(Arc::new)),
        }
    }

    pub async fn snapshot(&self) -> Option<Arc<LoadedModel>> {
        self.current.read().await.clone()
    }

    /// Swap in a new model, returning the one it replaces
    pub async fn replace(&self, model: LoadedModel) -> Option<Arc<LoadedModel>> {
        let mut current = self.current.write().await;
        current.replace(Arc::new(model))
    }

    pub async fn is_loaded(&self) -> bool {
        self.current.read().await.is_some()
    }
}

/// Process-wide state shared by all request handlers
pub struct ServiceContext {
    config: ServiceConfig,
    models: ModelStore,
}

impl ServiceContext {
    pub fn new(config: ServiceConfig, model: Option<LoadedModel>) -> Self {
        Self {
            config,
            models: ModelStore::new(model),
        }
    }

    /// Load the configured artifact once.
    ///
    /// A failed load is logged and the service starts without a model, so
    /// `/health` can report it.
    pub fn bootstrap(config: ServiceConfig) -> Self {
        let path = config.model.artifact_path.clone();
        let model = match LoadedModel::load(&path) {
            Ok(model) => {
                info!(
                    version = %model.version(),
                    r2_score = model.metrics().r2_score,
                    "Model ready"
                );
                Some(model)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "Unable to load model, serving without it");
                None
            }
        };
        Self::new(config, model)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn models(&self) -> &ModelStore {
        &self.models
    }

    /// Re-read the artifact. On failure the current model stays in place.
    pub async fn reload(&self) -> Result<(), ArtifactError> {
        let path = &self.config.model.artifact_path;
        match LoadedModel::load(path) {
            Ok(model) => {
                let version = model.version().to_string();
                let previous = self.models.replace(model).await;
                info!(
                    version = %version,
                    previous = previous.as_ref().map(|m| m.version()).unwrap_or("none"),
                    "Model reloaded"
                );
                Ok(())
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Model reload failed, keeping current model");
                Err(e)
            }
        }
    }

    async fn model(&self) -> ServiceResult<Arc<LoadedModel>> {
        self.models
            .snapshot()
            .await
            .ok_or(ServiceError::ModelUnavailable)
    }

    pub async fn health(&self) -> HealthResponse {
        let model_loaded = self.models.is_loaded().await;
        HealthResponse {
            status: if model_loaded {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            timestamp: Utc::now().to_rfc3339(),
            model_loaded,
        }
    }

    pub async fn model_info(&self) -> ServiceResult<ModelInfo> {
        Ok(self.model().await?.info())
    }

    /// Validate and score one record from a raw request body
    pub async fn predict(&self, body: &[u8]) -> ServiceResult<PredictionResult> {
        track_performance!("predict");
        let record = validation::validate_record(&validation::parse_body(body)?)?;
        let model = self.model().await?;

        let result = Predictor::new(&model, self.config.model.interval).predict(&record)?;
        info!(predicted_price = %format!("{:.0}", result.predicted_price), "Prediction served");
        Ok(result)
    }

    /// Validate the whole batch, then score every record in order
    pub async fn predict_batch(&self, body: &[u8]) -> ServiceResult<BatchPredictionResponse> {
        track_performance!("predict_batch");
        let records = validation::validate_batch(
            &validation::parse_body(body)?,
            self.config.model.max_batch_size,
        )?;
        let model = self.model().await?;

        let predictions =
            Predictor::new(&model, self.config.model.interval).predict_batch(&records)?;
        info!(count = predictions.len(), "Batch prediction served");
        Ok(BatchPredictionResponse { predictions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::artifact::tests::linear_artifact;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn loaded() -> ServiceContext {
        ServiceContext::new(
            ServiceConfig::default(),
            Some(linear_artifact().validate().unwrap()),
        )
    }

    fn example() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "surface": 85.0, "rooms": 4, "age": 10.0, "location_score": 7.5, "garage": true
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_health_reflects_model_state() {
        let empty = ServiceContext::new(ServiceConfig::default(), None);
        let health = empty.health().await;
        assert!(!health.model_loaded);
        assert_eq!(health.status, HealthStatus::Degraded);

        let health = loaded().health().await;
        assert!(health.model_loaded);
        assert_eq!(health.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_invalid_body_is_rejected_even_without_model() {
        let empty = ServiceContext::new(ServiceConfig::default(), None);

        let err = empty.predict(b"{\"surface\": -1").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let err = empty.predict_batch(b"[]").await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_valid_body_without_model_is_unavailable() {
        let empty = ServiceContext::new(ServiceConfig::default(), None);

        let err = empty.predict(&example()).await.unwrap_err();
        assert!(matches!(err, ServiceError::ModelUnavailable));

        let batch = [b"[".as_slice(), &example(), b"]"].concat();
        let err = empty.predict_batch(&batch).await.unwrap_err();
        assert!(matches!(err, ServiceError::ModelUnavailable));

        assert!(matches!(
            empty.model_info().await,
            Err(ServiceError::ModelUnavailable)
        ));
    }

    #[tokio::test]
    async fn test_predict_uses_configured_version() {
        let result = loaded().predict(&example()).await.unwrap();
        assert_eq!(result.model_version, "2.1.0");
        assert!(result.confidence_interval.contains(result.predicted_price));
    }

    #[tokio::test]
    async fn test_bootstrap_without_artifact_still_starts() {
        let mut config = ServiceConfig::default();
        config.model.artifact_path = "/nonexistent/housing_model.json".into();

        let context = ServiceContext::bootstrap(config);
        assert!(!context.health().await.model_loaded);
    }

    #[tokio::test]
    async fn test_reload_swaps_model_and_keeps_it_on_failure() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"not json").unwrap();

        let mut config = ServiceConfig::default();
        config.model.artifact_path = file.path().to_path_buf();
        let context = ServiceContext::bootstrap(config);
        assert!(!context.health().await.model_loaded);

        let json = serde_json::to_vec(&linear_artifact()).unwrap();
        std::fs::write(file.path(), json).unwrap();
        context.reload().await.unwrap();
        assert!(context.health().await.model_loaded);

        // A bad artifact leaves the previous snapshot in place
        std::fs::write(file.path(), b"{}").unwrap();
        assert!(context.reload().await.is_err());
        let info = context.model_info().await.unwrap();
        assert_eq!(info.model_version, "2.1.0");
    }

    #[tokio::test]
    async fn test_snapshot_survives_replace() {
        let store = ModelStore::new(Some(linear_artifact().validate().unwrap()));
        let before = store.snapshot().await.unwrap();

        let mut newer = linear_artifact();
        newer.version = "3.0.0".to_string();
        let previous = store.replace(newer.validate().unwrap()).await;

        assert_eq!(before.version(), "2.1.0");
        assert_eq!(previous.unwrap().version(), "2.1.0");
        assert_eq!(store.snapshot().await.unwrap().version(), "3.0.0");
    }
}
