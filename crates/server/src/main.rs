//! haven-gateway entry point.
//!
//! Boots the offline cache worker (install, then activate) and serves the
//! HTTP gateway that routes every inbound request through it.

use std::sync::Arc;

use anyhow::{Context, Result};
use haven_core::config::AppConfig;
use haven_core::CacheDb;
use haven_worker::net::HttpNetwork;
use haven_worker::sync::LogPresenter;
use haven_worker::WorkerHost;
use tracing_subscriber::EnvFilter;

mod connectivity;
mod proxy;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::load().context("failed to load configuration")?;
    tracing::info!(
        version = %config.version,
        origin = %config.origin,
        db = %config.db_path.display(),
        "starting haven gateway"
    );

    let cache = CacheDb::open(&config.db_path)
        .await
        .context("failed to open cache database")?;
    let network = Arc::new(HttpNetwork::new(&config)?);
    let host = Arc::new(WorkerHost::new(
        cache,
        &config,
        network,
        Arc::new(LogPresenter),
    )?);

    host.install().await.context("install failed")?;
    host.activate().await.context("activate failed")?;
    tracing::info!(state = %host.state().await, "worker ready");

    tokio::spawn(connectivity::probe_loop(host.clone(), config.clone()));

    let app = proxy::router(host, &config)?;
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "gateway listening");

    axum::serve(listener, app).await?;

    Ok(())
}
