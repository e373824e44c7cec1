use anyhow::{anyhow, Context, Result};
use clap::Parser;
use crisis_voice::{
    create_router, AppState, Config, DeepgramProvider, EventPublisher, SessionManager,
};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "crisis-voice", about = "Emergency-call voice transcription service")]
struct Cli {
    /// Config file path (extension optional)
    #[arg(long, default_value = "config/crisis-voice")]
    config: String,

    /// Override the HTTP port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();
    let mut cfg = Config::load(&cli.config)?;
    if let Some(port) = cli.port {
        cfg.service.http.port = port;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));

    // A missing credential disables voice routes only
    let voice = match DeepgramProvider::from_config(&cfg.deepgram) {
        Ok(provider) => {
            let publisher = EventPublisher::new(cfg.voice.event_buffer, cfg.voice.stream_keepalive());
            let manager = SessionManager::new(
                Arc::new(provider),
                publisher,
                cfg.voice.session_config(),
            );
            Some(Arc::new(manager))
        }
        Err(e) => {
            warn!("Voice transcription disabled: {}", e);
            None
        }
    };

    let state = AppState::new(voice.clone()).with_service_name(cfg.service.name.clone());
    let app = create_router(state);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if let Some(manager) = voice {
        manager.shutdown().await;
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
