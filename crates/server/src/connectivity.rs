//! Connectivity prober.
//!
//! Periodically probes the origin; when it comes back after being
//! unreachable, a sync event is dispatched so clients learn that content
//! is flowing again.

use std::sync::Arc;

use haven_core::config::AppConfig;
use haven_worker::WorkerHost;
use tokio::time::MissedTickBehavior;

const SYNC_TAG: &str = "connectivity-restored";

/// Fires only on the offline-to-online edge, never while connectivity
/// holds steady in either direction.
fn regained(was_online: bool, is_online: bool) -> bool {
    !was_online && is_online
}

pub async fn probe_loop(host: Arc<WorkerHost>, config: AppConfig) {
    let client = match reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout())
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "probe client build failed; connectivity sync disabled");
            return;
        }
    };

    let mut online = true;
    let mut ticker = tokio::time::interval(config.probe_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let now_online = probe(&client, &config.origin).await;

        if now_online != online {
            tracing::info!(online = now_online, "connectivity changed");
        }
        if regained(online, now_online) {
            host.sync(SYNC_TAG).await;
        }

        online = now_online;
    }
}

async fn probe(client: &reqwest::Client, origin: &str) -> bool {
    match client.head(origin).send().await {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(error = %e, "probe failed");
            false
        }
    }
}
