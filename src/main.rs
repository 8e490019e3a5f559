use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use housing_price_api::api::{shutdown_signal, PredictionServer, ServiceContext};
use housing_price_api::config::ServiceConfig;
use housing_price_api::ml::LoadedModel;
use housing_price_api::monitoring::init_tracing;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the prediction API
    Serve {
        /// Configuration file (toml, yaml, json or json5)
        #[arg(short, long, env = "HOUSING_CONFIG")]
        config: Option<PathBuf>,
        /// Address to bind
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
        /// Path of the model artifact
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
    /// Load a model artifact and print its description
    Inspect {
        /// Path of the model artifact
        #[arg(short, long)]
        model: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            model,
        } => {
            let mut settings = ServiceConfig::load(config.as_deref())?;
            if let Some(host) = host {
                settings.server.host = host;
            }
            if let Some(port) = port {
                settings.server.port = port;
            }
            if let Some(model) = model {
                settings.model.artifact_path = model;
            }
            settings.validate()?;

            init_tracing(&settings.logging)?;
            info!("Housing Price API starting up...");

            let context = Arc::new(ServiceContext::bootstrap(settings));

            #[cfg(unix)]
            reload_on_hangup(Arc::clone(&context))?;

            PredictionServer::new(context)
                .start(shutdown_signal())
                .await?;
        }
        Commands::Inspect { model } => {
            let loaded = LoadedModel::load(&model)
                .with_context(|| format!("Failed to load model from {}", model.display()))?;

            let mut description = serde_json::to_value(loaded.info())?;
            description["regressor"] = loaded.regressor().kind().into();
            println!("{}", serde_json::to_string_pretty(&description)?);
        }
    }

    Ok(())
}

/// Reload the model artifact whenever SIGHUP arrives
#[cfg(unix)]
fn reload_on_hangup(context: Arc<ServiceContext>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup =
        signal(SignalKind::hangup()).context("Failed to install SIGHUP handler")?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!("Received SIGHUP, reloading model");
            // Failures are logged by reload and the current model stays active
            let _ = context.reload().await;
        }
    });
    Ok(())
}
