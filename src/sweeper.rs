//! Expiry sweeper: the periodic background evictor.
//!
//! One long-lived task per process. Each tick scans the retention ledger for
//! expired files (remove the file, then unregister — a missing file is logged
//! and tolerated) and the index registry for sessions past their eviction
//! deadline. When no files remain, the on-disk index store is reclaimed
//! wholesale, best-effort.
//!
//! Sweeps never overlap: the task awaits each sweep before the next tick, and
//! `MissedTickBehavior::Skip` drops ticks that fire while a sweep is still
//! running instead of queueing them. A failed teardown of one entry never
//! aborts the rest of the sweep or the next tick.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::ledger::RetentionLedger;
use crate::registry::IndexRegistry;

/// What a single sweep evicted.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub files_evicted: usize,
    pub sessions_evicted: usize,
    pub store_cleaned: bool,
}

/// Run one sweep at the given instant. Exposed separately from the periodic
/// task so expiry behavior is testable with a synthetic clock.
pub fn sweep_once(
    ledger: &RetentionLedger,
    registry: &IndexRegistry,
    upload_dir: &Path,
    now: DateTime<Utc>,
) -> SweepStats {
    let mut stats = SweepStats::default();

    for id in ledger.expired_ids(now) {
        let path = upload_dir.join(&id);
        match std::fs::remove_file(&path) {
            Ok(()) => info!(file = %id, "auto-deleted expired file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = %id, "expired file already gone")
            }
            Err(e) => warn!(file = %id, error = %e, "failed to remove expired file"),
        }
        // Unregister regardless of removal outcome so the entry cannot wedge.
        ledger.unregister(&id);
        stats.files_evicted += 1;
    }

    for session_id in registry.due_for_eviction(now) {
        if registry.evict_now(&session_id) {
            stats.sessions_evicted += 1;
        }
    }

    if ledger.is_empty() {
        stats.store_cleaned = registry.cleanup_index_store();
    }

    stats
}

/// Spawn the periodic sweeper. Stops when `shutdown` flips to `true` or its
/// sender is dropped.
pub fn spawn(
    ledger: Arc<RetentionLedger>,
    registry: Arc<IndexRegistry>,
    upload_dir: PathBuf,
    interval: std::time::Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // Consume the immediate first tick; the first real sweep runs one
        // interval after startup.
        ticker.tick().await;

        debug!(interval_secs = interval.as_secs(), "sweeper started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let stats = sweep_once(&ledger, &registry, &upload_dir, Utc::now());
                    if stats.files_evicted > 0 || stats.sessions_evicted > 0 {
                        info!(
                            files = stats.files_evicted,
                            sessions = stats.sessions_evicted,
                            "sweep complete"
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("sweeper stopped");
    })
}
