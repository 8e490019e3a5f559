//! Housing price prediction service.
//!
//! Loads a fitted regression artifact at startup and serves price estimates
//! over HTTP. Request bodies are validated against the feature bounds before
//! they reach the model; the model snapshot is shared read-only between
//! requests.

pub mod api;
pub mod config;
pub mod core;
pub mod ml;
pub mod monitoring;
pub mod validation;

pub use crate::api::{PredictionServer, ServiceContext};
pub use crate::config::ServiceConfig;
pub use crate::core::{FeatureRecord, PredictionResult, ServiceError};
