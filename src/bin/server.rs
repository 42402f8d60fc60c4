//! Coachline server: telephony gateway plus the background sweeps.
//!
//! Usage: `coachline-server [config.toml]`. Without an argument the config
//! path comes from `COACHLINE_CONFIG`, else the platform config directory.
//! Environment variables (and a `.env` file) override file values.

use std::path::PathBuf;

use coachline::{CoachConfig, GatewayServer, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("coachline=info")),
        )
        .init();

    if let Err(e) = dotenv
        && !e.not_found()
    {
        tracing::warn!("ignoring unreadable .env: {e}");
    }

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("COACHLINE_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(coachline::app_dirs::config_file);
    let config = CoachConfig::load(&config_path)?;
    config.validate()?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        public_url = %config.server.public_url,
        "coachline starting"
    );

    let services = Services::from_config(&config)?;
    let sweeps = if config.sweeps.enabled {
        Some(services.sweeper.clone().run())
    } else {
        tracing::info!("background sweeps disabled");
        None
    };

    let server = GatewayServer::start(
        services.gateway.clone(),
        &config.server.host,
        config.server.port,
    )
    .await?;

    tokio::select! {
        () = server.join() => {
            tracing::warn!("gateway stopped");
        }
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::error!("failed to listen for shutdown signal: {e}");
            }
            tracing::info!("shutting down");
        }
    }

    services.shutdown.cancel();
    if let Some(handle) = sweeps
        && let Err(e) = handle.await
    {
        tracing::warn!("sweep task ended abnormally: {e}");
    }
    tracing::info!("coachline shut down cleanly");
    Ok(())
}
