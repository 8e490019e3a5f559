//! OpenAPI 3 description of the HTTP surface, served at `/openapi.json`.

use serde_json::{json, Map, Value};

use crate::config::ServiceConfig;
use crate::validation::{
    Bounds, AGE_BOUNDS, LOCATION_SCORE_BOUNDS, ROOMS_BOUNDS, SURFACE_BOUNDS,
};

pub const API_TITLE: &str = "Housing Price Prediction API";

fn bounded(kind: &str, bounds: Bounds, description: &str) -> Value {
    json!({
        "type": kind,
        "minimum": bounds.min,
        "maximum": bounds.max,
        "description": description,
    })
}

fn error_response(description: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": {"schema": {"$ref": "#/components/schemas/ErrorBody"}}
        }
    })
}

fn json_response(description: &str, schema: &str) -> Value {
    json!({
        "description": description,
        "content": {
            "application/json": {"schema": {"$ref": format!("#/components/schemas/{}", schema)}}
        }
    })
}

/// Build the document. Bounds and batch size reflect the running configuration.
pub fn document(config: &ServiceConfig) -> Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": API_TITLE,
            "description": "Price estimates for residential properties from a pre-trained regression model",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "paths": paths(config.model.max_batch_size),
        "components": {"schemas": schemas()},
    })
}

fn paths(max_batch_size: usize) -> Value {
    let record_body = json!({
        "required": true,
        "content": {
            "application/json": {"schema": {"$ref": "#/components/schemas/FeatureRecord"}}
        }
    });
    let batch_body = json!({
        "required": true,
        "content": {
            "application/json": {
                "schema": {
                    "type": "array",
                    "minItems": 1,
                    "maxItems": max_batch_size,
                    "items": {"$ref": "#/components/schemas/FeatureRecord"}
                }
            }
        }
    });

    json!({
        "/health": {
            "get": {
                "summary": "Service health",
                "responses": {"200": json_response("Process is up", "HealthResponse")}
            }
        },
        "/model/info": {
            "get": {
                "summary": "Description of the loaded model",
                "responses": {
                    "200": json_response("Model metadata", "ModelInfo"),
                    "503": error_response("No model loaded"),
                }
            }
        },
        "/predict": {
            "post": {
                "summary": "Estimate the price of one property",
                "requestBody": record_body,
                "responses": {
                    "200": json_response("Price estimate", "PredictionResult"),
                    "422": error_response("Invalid input, every offending field is listed in detail"),
                    "503": error_response("No model loaded"),
                }
            }
        },
        "/predict/batch": {
            "post": {
                "summary": "Estimate prices for several properties, in input order",
                "requestBody": batch_body,
                "responses": {
                    "200": json_response("Price estimates", "BatchPredictionResponse"),
                    "422": error_response("Invalid batch, detail paths look like [i].field"),
                    "503": error_response("No model loaded"),
                }
            }
        }
    })
}

fn object(required: &[&str], properties: Value) -> Value {
    json!({
        "type": "object",
        "required": required,
        "properties": properties,
    })
}

fn schemas() -> Map<String, Value> {
    let mut schemas = Map::new();

    let mut record = object(
        &["surface", "rooms", "age", "location_score", "garage"],
        json!({
            "surface": bounded("number", SURFACE_BOUNDS, "Living surface in m²"),
            "rooms": bounded("integer", ROOMS_BOUNDS, "Number of rooms"),
            "age": bounded("number", AGE_BOUNDS, "Age of the building in years"),
            "location_score": bounded(
                "number",
                LOCATION_SCORE_BOUNDS,
                "Location quality, 1 (poor) to 10 (excellent)"
            ),
            "garage": {"type": "boolean", "description": "Whether the property has a garage"},
        }),
    );
    record["example"] = json!({
        "surface": 85.0,
        "rooms": 4,
        "age": 10.0,
        "location_score": 7.5,
        "garage": true,
    });
    schemas.insert("FeatureRecord".to_string(), record);

    schemas.insert(
        "ConfidenceInterval".to_string(),
        object(
            &["lower", "upper"],
            json!({"lower": {"type": "number"}, "upper": {"type": "number"}}),
        ),
    );
    schemas.insert(
        "PredictionResult".to_string(),
        object(
            &["predicted_price", "confidence_interval", "model_version", "timestamp"],
            json!({
                "predicted_price": {"type": "number"},
                "confidence_interval": {"$ref": "#/components/schemas/ConfidenceInterval"},
                "model_version": {"type": "string"},
                "timestamp": {"type": "string", "format": "date-time"},
            }),
        ),
    );
    schemas.insert(
        "BatchPredictionResponse".to_string(),
        object(
            &["predictions"],
            json!({
                "predictions": {
                    "type": "array",
                    "items": {"$ref": "#/components/schemas/PredictionResult"}
                }
            }),
        ),
    );
    schemas.insert(
        "HealthResponse".to_string(),
        object(
            &["status", "timestamp", "model_loaded"],
            json!({
                "status": {"type": "string", "enum": ["healthy", "degraded"]},
                "timestamp": {"type": "string", "format": "date-time"},
                "model_loaded": {"type": "boolean"},
            }),
        ),
    );

    let metrics = object(
        &["r2_score", "mae", "rmse"],
        json!({
            "r2_score": {"type": "number"},
            "mae": {"type": "number"},
            "rmse": {"type": "number"},
            "mse": {"type": "number"},
        }),
    );
    let importance = object(
        &["feature", "importance"],
        json!({"feature": {"type": "string"}, "importance": {"type": "number"}}),
    );
    schemas.insert(
        "ModelInfo".to_string(),
        object(
            &[
                "model_version",
                "training_date",
                "training_samples",
                "features",
                "metrics",
                "feature_importance",
            ],
            json!({
                "model_version": {"type": "string"},
                "training_date": {"type": "string"},
                "training_samples": {"type": "integer"},
                "features": {"type": "array", "items": {"type": "string"}},
                "metrics": metrics,
                "feature_importance": {"type": "array", "items": importance},
            }),
        ),
    );

    let violation = object(
        &["field", "message"],
        json!({"field": {"type": "string"}, "message": {"type": "string"}}),
    );
    schemas.insert(
        "ErrorBody".to_string(),
        object(
            &["error", "message"],
            json!({
                "error": {
                    "type": "string",
                    "description": "Machine readable kind, e.g. validation_error or model_unavailable"
                },
                "message": {"type": "string"},
                "detail": {"type": "array", "items": violation},
            }),
        ),
    );

    schemas
}
