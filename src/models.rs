//! Core data models used throughout docdrop.
//!
//! These types represent the retained files, derived-index chunks, and query
//! answers that flow through the retention and question-answering pipeline.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// A retained source file plus its retention metadata.
///
/// Immutable once created; re-uploading the same filename replaces the whole
/// record with a fresh `acquired_at`.
#[derive(Debug, Clone)]
pub struct Resource {
    /// Sanitized filename, unique among currently-live resources.
    pub id: String,
    /// Registration time.
    pub acquired_at: DateTime<Utc>,
    /// Window after which the resource is eligible for eviction.
    pub ttl: Duration,
    /// Byte length of the stored file, informational only.
    pub size: u64,
}

impl Resource {
    /// True once `now - acquired_at >= ttl`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.acquired_at >= self.ttl
    }

    /// Time left before expiry, or `None` if already expired.
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Option<Duration> {
        let remaining = self.ttl - (now - self.acquired_at);
        if remaining > Duration::zero() {
            Some(remaining)
        } else {
            None
        }
    }
}

/// A chunk of extracted document text plus its embedding vector, as stored in
/// a session's derived index.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    /// Chunk text (plain UTF-8).
    pub text: String,
    /// Filename the chunk was extracted from.
    pub source: String,
    /// Embedding vector.
    pub vector: Vec<f32>,
}

/// One supporting excerpt returned alongside an answer.
#[derive(Debug, Clone, Serialize)]
pub struct SourceExcerpt {
    /// Chunk text, truncated to the configured excerpt length.
    pub content: String,
    /// Filename the excerpt came from.
    pub source: String,
}

/// Response to a question, produced by [`crate::coordinator::AppContext::query`].
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// Generated answer text.
    pub answer: String,
    /// Up to `top_k` supporting excerpts.
    pub sources: Vec<SourceExcerpt>,
    /// The question as asked.
    pub question: String,
    /// Session id that keyed the derived index for this query.
    pub session_id: String,
}

/// Per-file entry in the observability snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    pub filename: String,
    pub uploaded_at: String,
    pub minutes_remaining: i64,
}

/// Read-only aggregate of ledger and registry state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    /// File TTL expressed in minutes.
    pub cleanup_interval: i64,
    pub total_files: usize,
    pub files: Vec<FileStatus>,
    /// Number of live derived indexes.
    pub active_sessions: usize,
}
