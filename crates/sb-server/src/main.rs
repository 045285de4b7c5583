use anyhow::Context;
use sb_agents::EchoModel;
use sb_core::{load_config, CancellationToken};
use sb_server::{app_with_state, state::AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SWITCHBOARD_CONFIG_FILE").ok())
        .map(PathBuf::from);
    let config = Arc::new(load_config(path.as_deref()).context("loading configuration")?);

    let state = AppState::from_config(Arc::clone(&config), Arc::new(EchoModel));
    let shutdown = CancellationToken::new();
    let sweeper = state.manager.spawn_sweeper(shutdown.clone());

    let addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "switchboard listening");

    let signal = shutdown.clone();
    axum::serve(listener, app_with_state(state.clone()))
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("shutdown requested"),
                _ = signal.cancelled() => {}
            }
        })
        .await?;

    shutdown.cancel();
    sweeper.await?;
    state.manager.shutdown().await;
    Ok(())
}
