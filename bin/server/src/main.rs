use atelier_server::config::ServerConfig;
use atelier_server::error::StartupError;
use atelier_server::state::AppState;
use rootcause::Report;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Report<StartupError>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env().map_err(|e| StartupError::Config {
        reason: e.to_string(),
    })?;
    tracing::info!("Loaded configuration");

    let state = Arc::new(AppState::from_config(&config)?);
    let app = atelier_server::router(state, config.static_dir.as_deref());
    if let Some(dir) = &config.static_dir {
        tracing::info!(static_dir = %dir.display(), "serving UI bundle");
    }

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| StartupError::Bind {
            addr: config.bind_addr.clone(),
            reason: e.to_string(),
        })?;

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StartupError::Serve {
            reason: e.to_string(),
        })?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::warn!(%error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
