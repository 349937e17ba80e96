//! Derived-index registry: session-keyed lifecycle for short-lived search
//! indexes.
//!
//! Each query session owns at most one [`SessionIndex`]. Construction is
//! build-once per session id: concurrent callers for the same session share a
//! single build, and a failed build leaves no entry behind. Eviction is
//! idempotent and can be triggered three ways — a scheduled post-response
//! deadline, proactive invalidation when the corpus changes (`evict_all`), or
//! the unscheduled-session age ceiling applied by the sweeper.
//!
//! The registry's map is guarded by one mutex; the lock is held for map
//! operations only. Index construction (embedding calls, file reads) runs
//! outside the lock so a slow build never blocks other sessions or the
//! sweeper.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::error::{DocdropError, Result};
use crate::index::SessionIndex;

struct SessionEntry {
    cell: Arc<OnceCell<Arc<SessionIndex>>>,
    created_at: DateTime<Utc>,
    /// Set by `schedule_eviction`; `None` until a response has been produced.
    evict_at: Option<DateTime<Utc>>,
}

pub struct IndexRegistry {
    index_dir: PathBuf,
    /// Ceiling for sessions whose eviction was never scheduled.
    max_age: Duration,
    entries: Mutex<HashMap<String, SessionEntry>>,
}

impl IndexRegistry {
    pub fn new(index_dir: PathBuf, max_age: Duration) -> Self {
        Self {
            index_dir,
            max_age,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch or build the index for `session_id`.
    ///
    /// `build` is invoked at most once per live session id; concurrent calls
    /// for the same id wait on the in-flight build and share its result. On
    /// build failure the entry is removed — no partial state is stored — and
    /// a later call may try again.
    pub async fn create<F, Fut>(&self, session_id: &str, build: F) -> Result<Arc<SessionIndex>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<SessionIndex>>,
    {
        let cell = {
            let mut entries = self.entries.lock().unwrap();
            entries
                .entry(session_id.to_string())
                .or_insert_with(|| SessionEntry {
                    cell: Arc::new(OnceCell::new()),
                    created_at: Utc::now(),
                    evict_at: None,
                })
                .cell
                .clone()
        };

        let built = cell
            .get_or_try_init(|| async {
                let index = build().await?;
                // Spill is best-effort; the in-memory index is authoritative.
                if let Err(e) = index.persist(&self.index_dir) {
                    debug!(session_id, error = %e, "failed to spill index vectors");
                }
                Ok::<_, DocdropError>(Arc::new(index))
            })
            .await;

        match built {
            Ok(index) => Ok(index.clone()),
            Err(e) => {
                let mut entries = self.entries.lock().unwrap();
                // Only drop the entry if it is still ours and never completed;
                // a concurrent re-create may have replaced it.
                if let Some(entry) = entries.get(session_id) {
                    if Arc::ptr_eq(&entry.cell, &cell) && entry.cell.get().is_none() {
                        entries.remove(session_id);
                    }
                }
                Err(e)
            }
        }
    }

    /// The built index for `session_id`, if live and ready.
    pub fn get(&self, session_id: &str) -> Option<Arc<SessionIndex>> {
        self.entries
            .lock()
            .unwrap()
            .get(session_id)
            .and_then(|entry| entry.cell.get().cloned())
    }

    /// Mark the session for removal once `delay` has elapsed. The actual
    /// teardown is performed by the sweeper, never in the request path.
    /// No-op if the session is already gone.
    pub fn schedule_eviction(&self, session_id: &str, delay: Duration) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(session_id) {
            let deadline = Utc::now() + delay;
            entry.evict_at = Some(deadline);
            debug!(session_id, %deadline, "scheduled index eviction");
        }
    }

    /// Tear the session down immediately: drop the in-memory index and remove
    /// its spill file. Idempotent; returns whether an entry existed.
    pub fn evict_now(&self, session_id: &str) -> bool {
        let removed = self.entries.lock().unwrap().remove(session_id).is_some();
        self.remove_spill(session_id);
        if removed {
            debug!(session_id, "evicted derived index");
        }
        removed
    }

    /// Evict every live session. Used when a new upload invalidates all
    /// derived indexes. Returns the number evicted.
    pub fn evict_all(&self) -> usize {
        let drained: Vec<String> = {
            let mut entries = self.entries.lock().unwrap();
            entries.drain().map(|(id, _)| id).collect()
        };
        for id in &drained {
            self.remove_spill(id);
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "invalidated all derived indexes");
        }
        drained.len()
    }

    /// Sessions due for teardown as of `now`: past their scheduled deadline,
    /// or never scheduled and older than the age ceiling.
    pub fn due_for_eviction(&self, now: DateTime<Utc>) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, entry)| match entry.evict_at {
                Some(deadline) => now >= deadline,
                None => now - entry.created_at > self.max_age,
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Number of live sessions (building or ready).
    pub fn active_sessions(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Best-effort removal of the whole on-disk index store. Used at startup
    /// and by the sweeper once no files remain. Returns whether the store
    /// directory was present.
    pub fn cleanup_index_store(&self) -> bool {
        if !self.index_dir.exists() {
            return false;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.index_dir) {
            warn!(dir = %self.index_dir.display(), error = %e, "index store cleanup failed");
        }
        true
    }

    fn remove_spill(&self, session_id: &str) {
        let path = SessionIndex::spill_path(&self.index_dir, session_id);
        if let Err(e) = std::fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(session_id, error = %e, "failed to remove index spill file");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry(dir: &std::path::Path) -> IndexRegistry {
        IndexRegistry::new(dir.to_path_buf(), Duration::seconds(600))
    }

    fn empty_index(session_id: &str) -> SessionIndex {
        SessionIndex::new(session_id, vec!["a.pdf".to_string()], vec![])
    }

    #[tokio::test]
    async fn test_create_builds_once_per_session() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(tmp.path());
        let builds = AtomicUsize::new(0);

        let build = || async {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(empty_index("s1"))
        };
        let (a, b) = tokio::join!(registry.create("s1", build), registry.create("s1", build));
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(registry.get("s1").is_some());
    }

    #[tokio::test]
    async fn test_failed_build_stores_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(tmp.path());

        let result = registry
            .create("s1", || async {
                Err(DocdropError::Build("empty source".to_string()))
            })
            .await;
        assert!(matches!(result, Err(DocdropError::Build(_))));
        assert!(registry.get("s1").is_none());
        assert_eq!(registry.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_evict_now_idempotent() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(tmp.path());
        registry
            .create("s1", || async { Ok(empty_index("s1")) })
            .await
            .unwrap();
        assert!(registry.evict_now("s1"));
        assert!(!registry.evict_now("s1"));
        assert!(registry.get("s1").is_none());
    }

    #[tokio::test]
    async fn test_evict_all_counts_and_clears() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(tmp.path());
        for id in ["s1", "s2", "s3"] {
            registry
                .create(id, || async { Ok(empty_index(id)) })
                .await
                .unwrap();
        }
        assert_eq!(registry.evict_all(), 3);
        assert_eq!(registry.active_sessions(), 0);
        assert_eq!(registry.evict_all(), 0);
    }

    #[tokio::test]
    async fn test_scheduled_eviction_becomes_due() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(tmp.path());
        registry
            .create("s1", || async { Ok(empty_index("s1")) })
            .await
            .unwrap();
        registry.schedule_eviction("s1", Duration::seconds(60));

        let now = Utc::now();
        assert!(registry.due_for_eviction(now).is_empty());
        let due = registry.due_for_eviction(now + Duration::seconds(61));
        assert_eq!(due, vec!["s1"]);
    }

    #[tokio::test]
    async fn test_unscheduled_session_hits_age_ceiling() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(tmp.path());
        registry
            .create("s1", || async { Ok(empty_index("s1")) })
            .await
            .unwrap();

        let now = Utc::now();
        assert!(registry.due_for_eviction(now).is_empty());
        let due = registry.due_for_eviction(now + Duration::seconds(601));
        assert_eq!(due, vec!["s1"]);
    }

    #[tokio::test]
    async fn test_schedule_on_absent_session_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(tmp.path());
        registry.schedule_eviction("ghost", Duration::seconds(60));
        assert_eq!(registry.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_evict_removes_spill_file() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry(tmp.path());
        let index = SessionIndex::new(
            "s1",
            vec![],
            vec![crate::models::IndexedChunk {
                text: "x".to_string(),
                source: "a.pdf".to_string(),
                vector: vec![1.0],
            }],
        );
        registry.create("s1", || async { Ok(index) }).await.unwrap();
        let spill = SessionIndex::spill_path(tmp.path(), "s1");
        assert!(spill.exists());
        registry.evict_now("s1");
        assert!(!spill.exists());
    }
}
