mod analyzer;
mod api;
mod config;
mod error;
mod loader;
mod middleware;
mod refresh;
mod reporter;
mod state;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::error::Result;
use crate::middleware::RateLimiter;
use crate::refresh::{refresh_snapshots, SnapshotRefresher};
use crate::state::SnapshotStore;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Initial snapshot load ---
    let store = SnapshotStore::new();
    match refresh_snapshots(&cfg, &store) {
        Ok(()) if store.product_count() == 0 => warn!(
            "starting with an empty dataset — trend routes serve empty results until a snapshot lands in {}",
            cfg.data_dir.display(),
        ),
        Ok(()) => info!("loaded {} product snapshots", store.product_count()),
        Err(e) => warn!("initial snapshot load failed: {e}"),
    }

    // --- Shared components ---
    let limiter = Arc::new(RateLimiter::new(cfg.rate_limits.clone()));
    let latency = Arc::new(LatencyStats::new());
    info!(
        whitelisted = cfg.rate_limits.whitelist_ips.len(),
        blacklisted = cfg.rate_limits.blacklist_ips.len(),
        "rate limiter ready",
    );

    // --- Background snapshot refresh ---
    let refresher = SnapshotRefresher::new(cfg.clone(), Arc::clone(&store));
    tokio::spawn(async move { refresher.run().await });

    // --- HTTP API server ---
    let api_state = ApiState {
        store,
        limiter,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
