//! Inference Server - loads a local model and serves an OpenAI-compatible API.

use std::env;
use std::sync::Arc;

use inference_server::{app, AppState, CandleEngine, Config};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    println!("inference-server {}", VERSION);
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle --version / -V
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        print_version();
        return Ok(());
    }

    // Load configuration
    let config = Config::load().map_err(|e| {
        format!(
            "Failed to load configuration: {}. \
             Check config.toml and INFERENCE__SECTION__KEY environment variables.",
            e
        )
    })?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting inference-server {}", VERSION);

    // Model load failure is fatal
    let model_config = config.model.clone();
    let engine = tokio::task::spawn_blocking(move || CandleEngine::load(&model_config))
        .await?
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to load model at startup");
            e
        })?;
    tracing::info!(
        architecture = %engine.architecture(),
        model = %config.model.served_name(),
        "Model loaded successfully"
    );

    let state = Arc::new(AppState::new(config.clone(), Arc::new(engine)));

    // Start server
    let addr = format!("{}:{}", config.api.host, config.api.port);
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
