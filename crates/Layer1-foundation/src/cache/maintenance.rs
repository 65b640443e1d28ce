//! Cache maintenance
//!
//! Helpers behind the health-check and cleanup entry points.

use super::store::{CacheStats, CacheStore};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Shortest period the background sweeper accepts
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Overall cache condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

/// Health classification with the numbers it was derived from
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheHealth {
    pub status: HealthStatus,
    /// valid / total
    pub ratio: f64,
    pub threshold: f64,
    pub stats: CacheStats,
}

impl CacheHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// Outcome of an on-demand sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub before: CacheStats,
    pub after: CacheStats,
    pub removed: usize,
}

/// `valid / total`, `0.0` for an empty cache
pub fn hit_ratio(stats: &CacheStats) -> f64 {
    if stats.total_entries > 0 {
        stats.valid_entries as f64 / stats.total_entries as f64
    } else {
        0.0
    }
}

/// Degraded when expired entries outnumber valid ones or the ratio is under
/// `threshold`. An empty cache is healthy.
pub fn classify_health(stats: CacheStats, threshold: f64) -> CacheHealth {
    let ratio = hit_ratio(&stats);
    let degraded = stats.expired_entries > stats.valid_entries
        || (stats.total_entries > 0 && ratio < threshold);

    CacheHealth {
        status: if degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        },
        ratio,
        threshold,
        stats,
    }
}

/// Health of `cache` against its configured threshold
pub fn check_health(cache: &CacheStore) -> CacheHealth {
    classify_health(cache.get_cache_stats(), cache.settings().health_threshold)
}

/// Run `clear_expired` and report the stats on either side
pub fn sweep(cache: &CacheStore) -> SweepReport {
    let before = cache.get_cache_stats();
    cache.clear_expired();
    let after = cache.get_cache_stats();

    SweepReport {
        before,
        after,
        removed: before.total_entries.saturating_sub(after.total_entries),
    }
}

/// Sweep `cache` every `interval` until the handle is aborted
///
/// Intervals under [`MIN_SWEEP_INTERVAL`] are raised to it.
pub fn spawn_sweeper(cache: Arc<CacheStore>, interval: Duration) -> JoinHandle<()> {
    let interval = if interval < MIN_SWEEP_INTERVAL {
        warn!(
            requested_ms = interval.as_millis() as u64,
            "Sweep interval too short, using minimum"
        );
        MIN_SWEEP_INTERVAL
    } else {
        interval
    };

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick fires immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let report = sweep(&cache);
            if report.removed > 0 {
                info!(
                    removed = report.removed,
                    remaining = report.after.total_entries,
                    "Cache sweep"
                );
            } else {
                debug!("Cache sweep found nothing to remove");
            }
        }
    })
}
