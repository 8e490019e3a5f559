pub mod parser;

pub use parser::{ConfigFormat, ConfigParser, ConfigSource, EnvConfigSource, FileConfigSource};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use warp::http::Uri;

use crate::core::ServiceError;
use crate::ml::IntervalStrategy;
use crate::validation::MAX_BATCH_SIZE;

/// Prefix of environment variables overriding the configuration
pub const ENV_PREFIX: &str = "HOUSING_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body
    pub body_limit_bytes: u64,
    /// CORS origins; empty allows any origin
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            body_limit_bytes: 64 * 1024,
            allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub artifact_path: PathBuf,
    pub max_batch_size: usize,
    pub interval: IntervalStrategy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from("models/housing_model.json"),
            max_batch_size: MAX_BATCH_SIZE,
            interval: IntervalStrategy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `housing_price_api=debug,warp=info`
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ServiceConfig {
    /// Defaults, then the config file (if any), then `HOUSING_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let sources: Vec<Box<dyn ConfigSource>> = match path {
            Some(path) => vec![
                Box::new(FileConfigSource {
                    path: path.to_path_buf(),
                    required: true,
                }),
                Box::new(EnvConfigSource::new(ENV_PREFIX)),
            ],
            None => vec![Box::new(EnvConfigSource::new(ENV_PREFIX))],
        };
        Self::from_sources(&sources)
    }

    pub fn from_sources(sources: &[Box<dyn ConfigSource>]) -> Result<Self> {
        let mut merged =
            serde_json::to_value(Self::default()).context("Failed to serialize defaults")?;
        for source in sources {
            if let Some(overlay) = source.load_config()? {
                ConfigParser::merge_values(&mut merged, &overlay);
            }
        }

        let config: Self =
            serde_json::from_value(merged).context("Invalid service configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        self.server
            .host
            .parse::<IpAddr>()
            .map_err(|_| ServiceError::Config(format!("invalid host address '{}'", self.server.host)))?;
        if self.server.port == 0 {
            return Err(ServiceError::Config("port must not be 0".to_string()));
        }
        if self.server.body_limit_bytes == 0 {
            return Err(ServiceError::Config("body_limit_bytes must be positive".to_string()));
        }
        for origin in &self.server.allowed_origins {
            check_origin(origin)?;
        }
        if !(1..=MAX_BATCH_SIZE).contains(&self.model.max_batch_size) {
            return Err(ServiceError::Config(format!(
                "max_batch_size must be within 1..={}, got {}",
                MAX_BATCH_SIZE, self.model.max_batch_size
            )));
        }
        self.model.interval.validate().map_err(ServiceError::Config)?;
        EnvFilter::try_new(&self.logging.level).map_err(|e| {
            ServiceError::Config(format!("invalid log level '{}': {}", self.logging.level, e))
        })?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip = self
            .server
            .host
            .parse::<IpAddr>()
            .with_context(|| format!("Invalid server address '{}'", self.server.host))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }
}

/// CORS origins must be `scheme://host[:port]`, anything else is refused by warp.
fn check_origin(origin: &str) -> Result<(), ServiceError> {
    let invalid = |reason: &str| {
        ServiceError::Config(format!("invalid allowed origin '{}': {}", origin, reason))
    };

    let uri = origin
        .parse::<Uri>()
        .map_err(|e| invalid(&e.to_string()))?;
    if uri.scheme().is_none() || uri.authority().is_none() {
        return Err(invalid("expected scheme://host[:port]"));
    }
    Ok(())
}
