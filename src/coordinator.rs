//! Resource coordinator: the façade request handlers talk to.
//!
//! [`AppContext`] owns all process-wide mutable state — the retention ledger,
//! the index registry, and the sweeper task — and is constructed once at
//! startup and passed explicitly to the HTTP layer. Tests construct a fresh
//! context per case, which is why nothing here is a global.
//!
//! Invariants enforced here:
//! - files are written before they are registered, so a registered entry
//!   always refers to an existing file;
//! - a new upload proactively evicts every live derived index (the corpus
//!   changed beneath them);
//! - a query that fails after its index was created evicts that index before
//!   the error propagates — no orphaned session state on the error path;
//! - index construction and QA calls run without holding either map lock.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{Duration, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::chunk::chunk_text;
use crate::config::Config;
use crate::error::{DocdropError, Result};
use crate::extract;
use crate::index::SessionIndex;
use crate::ledger::RetentionLedger;
use crate::models::{Answer, FileStatus, IndexedChunk, Resource, SourceExcerpt, StatusSnapshot};
use crate::qa::QaBackend;
use crate::registry::IndexRegistry;
use crate::sweeper;

/// Owned application context. Construct with [`AppContext::new`] inside a
/// tokio runtime (the sweeper task is spawned immediately); stop with
/// [`AppContext::shutdown`].
pub struct AppContext {
    pub config: Arc<Config>,
    pub ledger: Arc<RetentionLedger>,
    pub registry: Arc<IndexRegistry>,
    /// QA backend, or the configuration error recorded at startup. The error
    /// is surfaced on every dependent request rather than crashing.
    backend: std::result::Result<Arc<dyn QaBackend>, String>,
    shutdown_tx: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl AppContext {
    /// Build the context: create the upload directory, wipe any leftover
    /// on-disk index store from a previous run, and start the sweeper.
    pub fn new(
        config: Config,
        backend: std::result::Result<Arc<dyn QaBackend>, String>,
    ) -> anyhow::Result<Arc<Self>> {
        std::fs::create_dir_all(&config.storage.upload_dir).map_err(|e| {
            anyhow::anyhow!(
                "failed to create upload directory {}: {}",
                config.storage.upload_dir.display(),
                e
            )
        })?;

        let config = Arc::new(config);
        let ledger = Arc::new(RetentionLedger::new(Duration::seconds(
            config.retention.file_ttl_secs as i64,
        )));
        let registry = Arc::new(IndexRegistry::new(
            config.storage.index_dir.clone(),
            Duration::seconds(config.retention.session_max_age_secs as i64),
        ));

        // A previous process may have died with spilled vectors on disk.
        if registry.cleanup_index_store() {
            info!("wiped leftover index store from previous run");
        }

        if let Err(msg) = &backend {
            warn!(error = %msg, "QA backend unavailable; /api/ask will return a configuration error");
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = sweeper::spawn(
            ledger.clone(),
            registry.clone(),
            config.storage.upload_dir.clone(),
            std::time::Duration::from_secs(config.retention.sweep_interval_secs),
            shutdown_rx,
        );

        Ok(Arc::new(Self {
            config,
            ledger,
            registry,
            backend,
            shutdown_tx,
            sweeper: Mutex::new(Some(handle)),
        }))
    }

    fn file_path(&self, id: &str) -> PathBuf {
        self.config.storage.upload_dir.join(id)
    }

    /// Store a validated upload. Writes the file, registers it, and
    /// invalidates every live derived index — they all reference a stale
    /// source set once the corpus grows.
    ///
    /// Input validation (extension, size, sanitization) is the caller's job;
    /// this contract begins after validation passes.
    pub async fn upload(&self, id: &str, bytes: &[u8]) -> Result<Resource> {
        tokio::fs::write(self.file_path(id), bytes).await?;
        let resource = self.ledger.register(id, bytes.len() as u64);

        let invalidated = self.registry.evict_all();
        info!(
            file = %id,
            size = resource.size,
            invalidated_sessions = invalidated,
            "registered upload"
        );
        Ok(resource)
    }

    /// Remove a file and its ledger entry. Idempotent: deleting an unknown id
    /// returns `Ok(false)`, never an error. Live derived indexes are left
    /// untouched; they age out within their own short ttl.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let file_removed = match tokio::fs::remove_file(self.file_path(id)).await {
            Ok(()) => true,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
            Err(e) => return Err(e.into()),
        };
        let unregistered = self.ledger.unregister(id);
        if file_removed || unregistered {
            info!(file = %id, "deleted file");
        }
        Ok(file_removed || unregistered)
    }

    /// Answer a question against the currently-retained files.
    ///
    /// Observes a snapshot of the live file set at entry; uploads or deletes
    /// racing past that point are not reflected. Builds (or joins) the
    /// session's derived index, runs retrieval and generation, and on success
    /// schedules the index's delayed eviction. Any failure after the index
    /// exists evicts it immediately.
    pub async fn query(&self, session_id: &str, question: &str) -> Result<Answer> {
        let backend = match &self.backend {
            Ok(b) => b.clone(),
            Err(msg) => return Err(DocdropError::Configuration(msg.clone())),
        };

        let snapshot = self.ledger.list();
        if snapshot.is_empty() {
            return Err(DocdropError::validation(
                "No documents found. Please upload at least one PDF first.",
            ));
        }
        let snapshot_ids: Vec<String> = snapshot.iter().map(|r| r.id.clone()).collect();

        let chunks = self.assemble_chunks(snapshot_ids.clone()).await?;
        if chunks.is_empty() {
            return Err(DocdropError::validation(
                "No text content could be extracted from the uploaded files.",
            ));
        }

        // Build once per session; the embedding calls run outside the
        // registry lock. A failed build stores nothing.
        let build_backend = backend.clone();
        let sid = session_id.to_string();
        let index = self
            .registry
            .create(session_id, move || async move {
                let texts: Vec<String> = chunks.iter().map(|(text, _)| text.clone()).collect();
                let vectors = build_backend
                    .embed(&texts)
                    .await
                    .map_err(|e| DocdropError::Build(e.to_string()))?;
                let indexed = chunks
                    .into_iter()
                    .zip(vectors)
                    .map(|((text, source), vector)| IndexedChunk {
                        text,
                        source,
                        vector,
                    })
                    .collect();
                Ok(SessionIndex::new(sid, snapshot_ids, indexed))
            })
            .await?;

        match self.retrieve_and_answer(&backend, &index, question).await {
            Ok((answer, sources)) => {
                self.registry.schedule_eviction(
                    session_id,
                    Duration::seconds(self.config.retention.session_ttl_secs as i64),
                );
                Ok(Answer {
                    answer,
                    sources,
                    question: question.to_string(),
                    session_id: session_id.to_string(),
                })
            }
            Err(e) => {
                self.registry.evict_now(session_id);
                Err(e)
            }
        }
    }

    /// Extract and chunk every file in the snapshot. Unreadable files are
    /// skipped with a warning; extraction is CPU-bound so it runs on the
    /// blocking pool.
    async fn assemble_chunks(&self, ids: Vec<String>) -> Result<Vec<(String, String)>> {
        let upload_dir = self.config.storage.upload_dir.clone();
        let chunking = self.config.chunking.clone();

        tokio::task::spawn_blocking(move || {
            let mut chunks = Vec::new();
            for id in &ids {
                match extract::extract_file(&upload_dir.join(id)) {
                    Ok(text) => {
                        for piece in chunk_text(&text, chunking.chunk_chars, chunking.overlap_chars)
                        {
                            chunks.push((piece, id.clone()));
                        }
                    }
                    Err(e) => warn!(file = %id, error = %e, "skipping unreadable file"),
                }
            }
            chunks
        })
        .await
        .map_err(|e| DocdropError::Build(e.to_string()))
    }

    async fn retrieve_and_answer(
        &self,
        backend: &Arc<dyn QaBackend>,
        index: &SessionIndex,
        question: &str,
    ) -> Result<(String, Vec<SourceExcerpt>)> {
        let question_vec = backend
            .embed(&[question.to_string()])
            .await
            .map_err(|e| DocdropError::Upstream(e.to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| DocdropError::Upstream("empty embedding response".to_string()))?;

        let hits = index.top_k(&question_vec, self.config.qa.top_k);
        let excerpt_texts: Vec<String> = hits.iter().map(|c| c.text.clone()).collect();

        let answer = backend
            .answer(question, &excerpt_texts)
            .await
            .map_err(|e| DocdropError::Upstream(e.to_string()))?;

        let sources = hits
            .iter()
            .map(|c| SourceExcerpt {
                content: truncate_excerpt(&c.text, self.config.qa.excerpt_chars),
                source: c.source.clone(),
            })
            .collect();

        Ok((answer, sources))
    }

    /// Read-only observability snapshot; mutates nothing.
    pub fn status(&self) -> StatusSnapshot {
        let now = Utc::now();
        let mut files: Vec<FileStatus> = self
            .ledger
            .list()
            .into_iter()
            .map(|r| FileStatus {
                filename: r.id.clone(),
                uploaded_at: r.acquired_at.to_rfc3339(),
                minutes_remaining: r
                    .time_remaining(now)
                    .map(|d| d.num_minutes())
                    .unwrap_or(0)
                    .max(0),
            })
            .collect();
        files.sort_by(|a, b| a.filename.cmp(&b.filename));

        StatusSnapshot {
            cleanup_interval: self.config.retention.file_ttl_secs as i64 / 60,
            total_files: files.len(),
            files,
            active_sessions: self.registry.active_sessions(),
        }
    }

    /// Stop the sweeper and evict all remaining derived indexes,
    /// best-effort. Needed for clean test teardown as much as for SIGINT.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.sweeper.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        let evicted = self.registry.evict_all();
        info!(evicted_sessions = evicted, "context shut down");
    }
}

/// Truncate an excerpt to `max_chars` characters, appending an ellipsis when
/// anything was cut.
fn truncate_excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}
