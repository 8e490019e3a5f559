use housing_price_api::{
    api::{routes, ServiceContext},
    config::ServiceConfig,
    ml::{IntervalStrategy, LinearModel, LoadedModel, ModelArtifact, Regressor, StandardScaler},
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use warp::test::request;

/// Integration Test Suite for the Housing Price API
mod integration_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_artifact_path() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("models/housing_model.json")
    }

    fn config_with(path: PathBuf) -> ServiceConfig {
        let mut config = ServiceConfig::default();
        config.model.artifact_path = path;
        config
    }

    fn sample_context() -> Arc<ServiceContext> {
        Arc::new(ServiceContext::bootstrap(config_with(sample_artifact_path())))
    }

    fn example() -> Value {
        json!({
            "surface": 85.0,
            "rooms": 4,
            "age": 10.0,
            "location_score": 7.5,
            "garage": true,
        })
    }

    /// A model whose every prediction overflows, so any scored record yields a 500
    fn exploding_context() -> Arc<ServiceContext> {
        let artifact = ModelArtifact {
            version: "0.0.1".to_string(),
            training_date: "2025-01-01T00:00:00".to_string(),
            training_samples: 1,
            features: ["surface", "rooms", "age", "location_score", "garage"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            metrics: serde_json::from_value(json!({"r2_score": 0.0, "mae": 0.0, "rmse": 0.0})).unwrap(),
            feature_importance: vec![],
            scaler: StandardScaler {
                mean: vec![0.0; 5],
                scale: vec![1.0; 5],
            },
            regressor: Regressor::Linear(LinearModel {
                coefficients: vec![1e308, 0.0, 0.0, 0.0, 0.0],
                intercept: 0.0,
            }),
        };
        Arc::new(ServiceContext::new(
            ServiceConfig::default(),
            Some(artifact.validate().unwrap()),
        ))
    }

    async fn post(context: &Arc<ServiceContext>, path: &str, body: &Value) -> (u16, Value) {
        let filter = routes(Arc::clone(context));
        let resp = request().method("POST").path(path).json(body).reply(&filter).await;
        let json = serde_json::from_slice(resp.body()).unwrap();
        (resp.status().as_u16(), json)
    }

    async fn get(context: &Arc<ServiceContext>, path: &str) -> (u16, Value) {
        let filter = routes(Arc::clone(context));
        let resp = request().method("GET").path(path).reply(&filter).await;
        let json = serde_json::from_slice(resp.body()).unwrap();
        (resp.status().as_u16(), json)
    }

    #[tokio::test]
    async fn test_sample_artifact_loads() {
        let model = LoadedModel::load(&sample_artifact_path()).unwrap();
        assert_eq!(model.version(), "1.0.0");
        assert_eq!(model.regressor().kind(), "random_forest");
    }

    #[tokio::test]
    async fn test_health_before_and_after_load() {
        let missing = Arc::new(ServiceContext::bootstrap(config_with(PathBuf::from(
            "/nonexistent/housing_model.json",
        ))));
        let (status, body) = get(&missing, "/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["model_loaded"], false);

        let (status, body) = get(&sample_context(), "/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["model_loaded"], true);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_model_info() {
        let (status, body) = get(&sample_context(), "/model/info").await;

        assert_eq!(status, 200);
        assert_eq!(body["model_version"], "1.0.0");
        assert_eq!(body["training_date"], "2025-06-01T12:00:00");
        assert_eq!(body["training_samples"], 1600);
        assert_eq!(
            body["features"],
            json!(["surface", "rooms", "age", "location_score", "garage"])
        );
        assert_eq!(body["metrics"]["r2_score"], 0.874);
        assert_eq!(body["metrics"]["rmse"], 42180.0);
        assert_eq!(body["feature_importance"][0]["feature"], "surface");
    }

    #[tokio::test]
    async fn test_example_prediction() {
        let (status, body) = post(&sample_context(), "/predict", &example()).await;

        assert_eq!(status, 200);
        let price = body["predicted_price"].as_f64().unwrap();
        let lower = body["confidence_interval"]["lower"].as_f64().unwrap();
        let upper = body["confidence_interval"]["upper"].as_f64().unwrap();

        // Mean of the three leaves reached by the example record
        assert!((price - 327_666.67).abs() < 1.0, "unexpected price {}", price);
        assert!(lower < price && price < upper);
        assert!((upper - price - price * 0.10).abs() < 1e-6);
        assert_eq!(body["model_version"], "1.0.0");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_prediction_is_deterministic() {
        let context = sample_context();
        let (_, first) = post(&context, "/predict", &example()).await;
        for _ in 0..5 {
            let (_, again) = post(&context, "/predict", &example()).await;
            assert_eq!(again["predicted_price"], first["predicted_price"]);
            assert_eq!(again["confidence_interval"], first["confidence_interval"]);
        }
    }

    #[tokio::test]
    async fn test_interval_contains_price_for_valid_inputs() {
        let context = sample_context();
        for surface in [20.0, 60.0, 140.0, 500.0] {
            for age in [0.0, 35.0, 100.0] {
                for (location_score, garage) in [(1.0, false), (5.5, true), (10.0, true)] {
                    let record = json!({
                        "surface": surface,
                        "rooms": 3,
                        "age": age,
                        "location_score": location_score,
                        "garage": garage,
                    });
                    let (status, body) = post(&context, "/predict", &record).await;
                    assert_eq!(status, 200);

                    let price = body["predicted_price"].as_f64().unwrap();
                    let lower = body["confidence_interval"]["lower"].as_f64().unwrap();
                    let upper = body["confidence_interval"]["upper"].as_f64().unwrap();
                    assert!(lower <= price && price <= upper, "{}", body);
                }
            }
        }
    }

    #[tokio::test]
    async fn test_out_of_bounds_field_is_named() {
        let context = sample_context();
        let cases = [
            ("surface", json!(10.0)),
            ("surface", json!(501.0)),
            ("rooms", json!(0)),
            ("rooms", json!(16)),
            ("age", json!(-1.0)),
            ("age", json!(101.0)),
            ("location_score", json!(0.0)),
            ("location_score", json!(10.5)),
            ("garage", json!("true")),
        ];

        for (field, value) in cases {
            let mut record = example();
            record[field] = value;

            let (status, body) = post(&context, "/predict", &record).await;
            assert_eq!(status, 422, "{} should be rejected", field);
            assert_eq!(body["detail"][0]["field"], field);
        }
    }

    #[tokio::test]
    async fn test_invalid_data_is_422() {
        let invalid = json!({
            "surface": -10.0,
            "rooms": 0,
            "age": -5.0,
            "location_score": 15.0,
            "garage": true,
        });
        let (status, body) = post(&sample_context(), "/predict", &invalid).await;

        assert_eq!(status, 422);
        assert_eq!(body["detail"].as_array().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_batch_prediction_keeps_order() {
        let context = sample_context();
        let batch = json!([
            example(),
            {"surface": 120.0, "rooms": 5, "age": 5.0, "location_score": 9.0, "garage": true},
            example(),
        ]);

        let (status, body) = post(&context, "/predict/batch", &batch).await;
        assert_eq!(status, 200);

        let predictions = body["predictions"].as_array().unwrap();
        assert_eq!(predictions.len(), 3);

        let (_, single) = post(&context, "/predict", &example()).await;
        assert_eq!(predictions[0]["predicted_price"], single["predicted_price"]);
        assert_eq!(predictions[2]["predicted_price"], single["predicted_price"]);
        assert_ne!(predictions[1]["predicted_price"], single["predicted_price"]);
    }

    #[tokio::test]
    async fn test_batch_size_violations() {
        let context = sample_context();

        let (status, _) = post(&context, "/predict/batch", &json!([])).await;
        assert_eq!(status, 422);

        let full = Value::Array(vec![example(); 100]);
        let (status, body) = post(&context, "/predict/batch", &full).await;
        assert_eq!(status, 200);
        assert_eq!(body["predictions"].as_array().unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_oversized_batch_never_reaches_model() {
        let context = exploding_context();

        // Scoring anything with this model fails
        let (status, _) = post(&context, "/predict", &example()).await;
        assert_eq!(status, 500);

        let too_many = Value::Array(vec![example(); 101]);
        let (status, body) = post(&context, "/predict/batch", &too_many).await;
        assert_eq!(status, 422);
        assert_eq!(body["detail"][0]["field"], "body");
    }

    #[tokio::test]
    async fn test_one_invalid_item_rejects_whole_batch() {
        let context = exploding_context();
        let mut bad = example();
        bad["rooms"] = json!(40);
        let batch = json!([example(), bad, example()]);

        let (status, body) = post(&context, "/predict/batch", &batch).await;
        assert_eq!(status, 422);
        assert_eq!(body["detail"][0]["field"], "[1].rooms");
    }

    #[tokio::test]
    async fn test_invalid_body_without_model_is_422() {
        let missing = Arc::new(ServiceContext::bootstrap(config_with(PathBuf::from(
            "/nonexistent/housing_model.json",
        ))));
        let mut bad = example();
        bad["surface"] = json!(5.0);

        let (status, body) = post(&missing, "/predict", &bad).await;
        assert_eq!(status, 422);
        assert_eq!(body["detail"][0]["field"], "surface");

        let (status, body) = post(&missing, "/predict", &example()).await;
        assert_eq!(status, 503);
        assert_eq!(body["error"], "model_unavailable");
    }

    #[tokio::test]
    async fn test_openapi_document() {
        let (status, body) = get(&sample_context(), "/openapi.json").await;

        assert_eq!(status, 200);
        assert_eq!(body["info"]["title"], "Housing Price Prediction API");
        let record = &body["components"]["schemas"]["FeatureRecord"];
        assert_eq!(record["properties"]["location_score"]["minimum"], 1.0);
        assert_eq!(record["properties"]["location_score"]["maximum"], 10.0);
        assert!(body["paths"]["/predict"]["post"]["responses"]["422"].is_object());
    }

    #[tokio::test]
    async fn test_rmse_interval_strategy() {
        let mut config = config_with(sample_artifact_path());
        config.model.interval = IntervalStrategy::Rmse;
        let context = Arc::new(ServiceContext::bootstrap(config));

        let (status, body) = post(&context, "/predict", &example()).await;
        assert_eq!(status, 200);

        let price = body["predicted_price"].as_f64().unwrap();
        let upper = body["confidence_interval"]["upper"].as_f64().unwrap();
        assert!((upper - price - 42_180.0).abs() < 1e-6);
    }
}
