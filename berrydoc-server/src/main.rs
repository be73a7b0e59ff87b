// BerryDoc server entry point

use anyhow::Context;
use berrydoc_server::config::LoggingConfig;
use berrydoc_server::{create_router, AppState, CliArgs, ServerConfig};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is normal
    let dotenv = dotenvy::dotenv();

    let cli = CliArgs::parse();
    let mut config = ServerConfig::load(&cli).context("Failed to load configuration")?;
    init_logging(&config.logging);

    if let Ok(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }
    info!("🍓 Starting BerryDoc v{}", env!("CARGO_PKG_VERSION"));

    if config.session.ensure_secret() {
        warn!("SECRET_KEY is not set; using a random secret, sessions will not survive a restart");
    }
    config.validate().context("Invalid configuration")?;

    let addr = config.network.socket_addr()?;
    // Model loading reads and optimises the ONNX graph
    let state = tokio::task::spawn_blocking(move || AppState::from_config(config))
        .await
        .context("Startup worker failed")??;

    if !state.detection.is_available() {
        warn!("Detection routes will answer 503 until a model is available");
    }
    if !state.assistant.is_configured() {
        warn!("Chatbot has no API key configured");
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("🌐 Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown())
        .await
        .context("HTTP server failed")?;

    info!("BerryDoc stopped");
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("🛑 Shutdown signal received");
}
