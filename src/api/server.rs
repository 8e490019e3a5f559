use anyhow::{Context, Result};
use serde::Serialize;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};
use warp::http::StatusCode;
use warp::hyper::body::Bytes;
use warp::{Filter, Rejection, Reply};

use crate::api::{openapi, ServiceContext};
use crate::core::{FieldViolation, ServiceError};

/// HTTP front end of the prediction service
pub struct PredictionServer {
    context: Arc<ServiceContext>,
}

impl PredictionServer {
    pub fn new(context: Arc<ServiceContext>) -> Self {
        Self { context }
    }

    /// Serve until `shutdown` resolves
    pub async fn start<S>(&self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()> + Send + 'static,
    {
        let addr = self.context.config().socket_addr()?;
        let routes = routes(Arc::clone(&self.context));

        let (bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .with_context(|| format!("Failed to bind {}", addr))?;

        info!("Starting Housing Price API on {}", bound);
        server.await;
        info!("Server stopped");

        Ok(())
    }
}

/// Build the full route tree, including error recovery, CORS and request logging
pub fn routes(
    context: Arc<ServiceContext>,
) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let server_config = &context.config().server;
    let cors = cors(&server_config.allowed_origins);
    let body_limit = server_config.body_limit_bytes;

    // GET /health
    let health = warp::path!("health")
        .and(warp::get())
        .and(with_context(Arc::clone(&context)))
        .and_then(|context: Arc<ServiceContext>| async move {
            Ok::<_, Rejection>(warp::reply::json(&context.health().await))
        });

    // GET /model/info
    let model_info = warp::path!("model" / "info")
        .and(warp::get())
        .and(with_context(Arc::clone(&context)))
        .and_then(|context: Arc<ServiceContext>| async move {
            let info = context.model_info().await.map_err(reject)?;
            Ok::<_, Rejection>(warp::reply::json(&info))
        });

    // GET /openapi.json
    let api_document = openapi::document(context.config());
    let openapi = warp::path!("openapi.json")
        .and(warp::get())
        .map(move || warp::reply::json(&api_document));

    // POST /predict
    let predict = warp::path!("predict")
        .and(warp::post())
        .and(warp::body::content_length_limit(body_limit))
        .and(warp::body::bytes())
        .and(with_context(Arc::clone(&context)))
        .and_then(|body: Bytes, context: Arc<ServiceContext>| async move {
            let result = context.predict(&body).await.map_err(reject)?;
            Ok::<_, Rejection>(warp::reply::json(&result))
        });

    // POST /predict/batch
    let predict_batch = warp::path!("predict" / "batch")
        .and(warp::post())
        .and(warp::body::content_length_limit(body_limit))
        .and(warp::body::bytes())
        .and(with_context(Arc::clone(&context)))
        .and_then(|body: Bytes, context: Arc<ServiceContext>| async move {
            let response = context.predict_batch(&body).await.map_err(reject)?;
            Ok::<_, Rejection>(warp::reply::json(&response))
        });

    health
        .or(model_info)
        .or(openapi)
        .or(predict)
        .or(predict_batch)
        .recover(handle_rejection)
        .with(cors)
        .with(warp::log::custom(|request| {
            info!(
                method = %request.method(),
                path = %request.path(),
                status = request.status().as_u16(),
                elapsed_ms = %format!("{:.3}", request.elapsed().as_secs_f64() * 1000.0),
                "request"
            );
        }))
}

fn with_context(
    context: Arc<ServiceContext>,
) -> impl Filter<Extract = (Arc<ServiceContext>,), Error = Infallible> + Clone {
    warp::any().map(move || Arc::clone(&context))
}

fn cors(allowed_origins: &[String]) -> warp::cors::Builder {
    let builder = warp::cors()
        .allow_methods(vec!["GET", "POST"])
        .allow_headers(vec!["Content-Type", "Authorization"]);

    if allowed_origins.is_empty() {
        builder.allow_any_origin()
    } else {
        builder.allow_origins(allowed_origins.iter().map(String::as_str))
    }
}

/// Service error carried through warp's rejection system
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl warp::reject::Reject for ApiError {}

fn reject(err: ServiceError) -> Rejection {
    warp::reject::custom(ApiError(err))
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<Vec<FieldViolation>>,
}

impl ErrorBody {
    fn new(error: &'static str, message: impl Into<String>) -> Self {
        Self {
            error,
            message: message.into(),
            detail: None,
        }
    }
}

fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Serialization(_) | ServiceError::Prediction(_) | ServiceError::Config(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Global error handler, turns every rejection into a JSON error body
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, body) = if let Some(ApiError(service_error)) = err.find::<ApiError>() {
        let status = status_for(service_error);
        let mut body = ErrorBody::new(service_error.kind(), service_error.to_string());
        if let ServiceError::Validation(validation) = service_error {
            body.detail = Some(validation.violations.clone());
        }
        if status.is_server_error() {
            error!(error = %service_error, "Request failed");
        }
        (status, body)
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, ErrorBody::new("not_found", "Not Found"))
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            ErrorBody::new("payload_too_large", "Request body too large"),
        )
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (
            StatusCode::LENGTH_REQUIRED,
            ErrorBody::new("length_required", "Content-Length header required"),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            ErrorBody::new("method_not_allowed", "Method Not Allowed"),
        )
    } else {
        error!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new("internal_error", "Internal Server Error"),
        )
    };

    Ok(warp::reply::with_status(warp::reply::json(&body), status))
}

/// Resolves on Ctrl-C, or SIGTERM on unix
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
