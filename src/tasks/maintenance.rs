//! Store Maintenance Task
//!
//! Background task that periodically sweeps crash debris and re-enforces
//! capacity, so a store shared by many writers converges even when no new
//! results are being stored.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::MemoCache;

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Stale temp files removed
    pub temp_removed: usize,
    /// Entries evicted
    pub evicted: usize,
    /// Entries left afterwards
    pub remaining: usize,
}

/// Runs a single sweep + eviction pass.
pub fn run_maintenance_pass(cache: &MemoCache, temp_max_age: Duration) -> MaintenanceReport {
    let temp_removed = match cache.store().sweep_temp_files(temp_max_age) {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "Temp file sweep failed. Ignoring.");
            0
        }
    };
    let eviction = cache.enforce();

    MaintenanceReport {
        temp_removed,
        evicted: eviction.evicted.len(),
        remaining: eviction.remaining,
    }
}

/// Spawns a background task that periodically maintains the cache store.
///
/// Store I/O is blocking, so each pass runs on the blocking pool.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
///
/// # Example
/// ```ignore
/// let cache = open_store("lru_cache_dir", 4096)?;
/// let handle = spawn_maintenance_task(cache.clone(), 60, Duration::from_secs(3600));
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_maintenance_task(
    cache: MemoCache,
    interval_secs: u64,
    temp_max_age: Duration,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        info!(
            "Starting cache maintenance task with interval of {} seconds",
            interval_secs
        );

        loop {
            tokio::time::sleep(interval).await;

            let pass_cache = cache.clone();
            let report = match tokio::task::spawn_blocking(move || {
                run_maintenance_pass(&pass_cache, temp_max_age)
            })
            .await
            {
                Ok(report) => report,
                Err(e) => {
                    warn!(error = %e, "Maintenance pass panicked");
                    continue;
                }
            };

            if report.temp_removed > 0 || report.evicted > 0 {
                info!(
                    "Cache maintenance: removed {} temp files, evicted {} entries, {} remaining",
                    report.temp_removed, report.evicted, report.remaining
                );
            } else {
                debug!("Cache maintenance: nothing to do");
            }
        }
    })
}
