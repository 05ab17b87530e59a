//! Single-writer tracker for the rolling stats row.
//!
//! The latest stats row is one logical mutable resource; every
//! read-modify-write goes through this tracker's mutex so concurrent
//! stages cannot interleave and lose counts.
//!
//! Averages use two-sample smoothing — `round((old + new) / 2)` — which
//! halves the distance to each new observation. Lossy, but it follows
//! recent trends, which is the property callers rely on.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::warn;

use crate::model::StatsPatch;
use crate::store::Storage;

pub struct StatsTracker {
    store: Arc<dyn Storage>,
    write_lock: Mutex<()>,
}

/// Two-sample smoothed average, rounded half-up.
fn smooth(old: i64, new: i64) -> i64 {
    (old + new + 1) / 2
}

impl StatsTracker {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Count one ingested content item. A missing stats row or a storage
    /// failure degrades to a logged no-op — ingestion is never blocked on
    /// bookkeeping.
    pub async fn record_ingested(&self) {
        let _guard = self.write_lock.lock().await;
        let latest = match self.store.latest_stats().await {
            Ok(Some(stats)) => stats,
            Ok(None) => {
                warn!("No stats row present, skipping total-content update");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stats, skipping total-content update");
                return;
            }
        };

        let patch = StatsPatch {
            total_content: Some(latest.total_content + 1),
            ..Default::default()
        };
        if let Err(e) = self.store.update_stats(latest.id, &patch).await {
            warn!(error = %e, "Failed to update total-content stat");
        }
    }

    /// Fold one classification outcome into the rolling counters.
    pub async fn record_analysis(&self, flagged: bool, confidence: u8, latency_ms: i64) {
        let _guard = self.write_lock.lock().await;
        let latest = match self.store.latest_stats().await {
            Ok(Some(stats)) => stats,
            Ok(None) => {
                warn!("No stats row present, skipping analysis stats update");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read stats, skipping analysis stats update");
                return;
            }
        };

        let patch = StatsPatch {
            flagged_content: flagged.then(|| latest.flagged_content + 1),
            avg_confidence: Some(
                smooth(latest.avg_confidence as i64, confidence as i64).clamp(0, 100) as u8,
            ),
            avg_latency_ms: Some(smooth(latest.avg_latency_ms, latency_ms.max(0))),
            ..Default::default()
        };
        if let Err(e) = self.store.update_stats(latest.id, &patch).await {
            warn!(error = %e, "Failed to update analysis stats");
        }
    }
}
