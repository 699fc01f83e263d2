use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};

use crate::analyzer;
use crate::config::{Config, CATEGORY_TOP_N, DEFAULT_TOP_N, SNAPSHOT_REFRESH_INTERVAL_SECS};
use crate::error::Result;
use crate::loader;
use crate::reporter;
use crate::state::SnapshotStore;

/// Background task that re-reads the newest snapshot file on a fixed
/// interval and regenerates the Markdown report from it.
pub struct SnapshotRefresher {
    cfg: Config,
    store: Arc<SnapshotStore>,
}

impl SnapshotRefresher {
    pub fn new(cfg: Config, store: Arc<SnapshotStore>) -> Self {
        Self { cfg, store }
    }

    pub async fn run(self) {
        let mut ticker = interval(Duration::from_secs(SNAPSHOT_REFRESH_INTERVAL_SECS));
        ticker.tick().await; // skip immediate first tick — startup already loaded

        loop {
            ticker.tick().await;
            if let Err(e) = refresh_snapshots(&self.cfg, &self.store) {
                error!("Snapshot refresh failed: {e}");
            }
        }
    }
}

/// Load the newest snapshot into the store and rewrite the report.
/// When no snapshot files exist the previous dataset is kept in place.
pub fn refresh_snapshots(cfg: &Config, store: &SnapshotStore) -> Result<()> {
    let rows = loader::load_latest(&cfg.data_dir)?;
    if rows.is_empty() {
        warn!(
            "no snapshot data in {} — keeping the current dataset ({} products)",
            cfg.data_dir.display(),
            store.product_count(),
        );
        return Ok(());
    }

    let count = rows.len();
    store.replace(rows);

    let rows = store.rows();
    let trends = analyzer::rank_top(&rows, DEFAULT_TOP_N);
    let category_trends = analyzer::top_by_category(&rows, CATEGORY_TOP_N);
    let report_path = reporter::write_markdown_report(&cfg.reports_dir, &trends, &category_trends)?;

    info!(
        products = count,
        report = %report_path.display(),
        "snapshot refresh complete",
    );
    Ok(())
}
