//! Session-scoped derived index: an in-memory vector index over the chunks of
//! the currently-retained files.
//!
//! Retrieval is brute-force cosine similarity — corpora are a handful of
//! short-lived PDFs, not a persistent store. On build the vectors are spilled
//! to `<index_dir>/<session_id>.vec` (little-endian f32 blobs) so eviction has
//! a physical artifact to reclaim and a crashed process leaves nothing behind
//! that the next startup wipe cannot find.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::models::IndexedChunk;

/// Immutable search structure built for a single query session.
pub struct SessionIndex {
    pub session_id: String,
    /// Ids of the resources the index was built from, for observability.
    pub source_snapshot: Vec<String>,
    chunks: Vec<IndexedChunk>,
}

impl SessionIndex {
    pub fn new(
        session_id: impl Into<String>,
        source_snapshot: Vec<String>,
        chunks: Vec<IndexedChunk>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            source_snapshot,
            chunks,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The `k` chunks most similar to `query`, best first.
    pub fn top_k(&self, query: &[f32], k: usize) -> Vec<&IndexedChunk> {
        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .chunks
            .iter()
            .map(|c| (cosine_similarity(query, &c.vector), c))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(k).map(|(_, c)| c).collect()
    }

    /// On-disk spill location for a session's vectors.
    pub fn spill_path(index_dir: &Path, session_id: &str) -> PathBuf {
        index_dir.join(format!("{}.vec", session_id))
    }

    /// Write the vectors to the index store. Format: `count: u32 LE`,
    /// `dims: u32 LE`, then `count × dims` little-endian f32 values.
    pub fn persist(&self, index_dir: &Path) -> io::Result<PathBuf> {
        fs::create_dir_all(index_dir)?;
        let dims = self.chunks.first().map(|c| c.vector.len()).unwrap_or(0);
        let mut bytes = Vec::with_capacity(8 + self.chunks.len() * dims * 4);
        bytes.extend_from_slice(&(self.chunks.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&(dims as u32).to_le_bytes());
        for chunk in &self.chunks {
            bytes.extend_from_slice(&vec_to_blob(&chunk.vector));
        }
        let path = Self::spill_path(index_dir, &self.session_id);
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

/// Encode a float vector as little-endian f32 bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian f32 bytes back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, vector: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            text: text.to_string(),
            source: "a.pdf".to_string(),
            vector,
        }
    }

    #[test]
    fn test_top_k_orders_by_similarity() {
        let index = SessionIndex::new(
            "s1",
            vec!["a.pdf".to_string()],
            vec![
                chunk("east", vec![0.0, 1.0]),
                chunk("north", vec![1.0, 0.0]),
                chunk("northish", vec![0.9, 0.1]),
            ],
        );
        let hits = index.top_k(&[1.0, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "north");
        assert_eq!(hits[1].text, "northish");
    }

    #[test]
    fn test_top_k_smaller_index() {
        let index = SessionIndex::new("s1", vec![], vec![chunk("only", vec![1.0])]);
        assert_eq!(index.top_k(&[1.0], 3).len(), 1);
    }

    #[test]
    fn test_cosine_identical_and_orthogonal() {
        assert!((cosine_similarity(&[1.0, 2.0], &[1.0, 2.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_blob_roundtrip() {
        let v = vec![1.0f32, -2.5, 3.125, 0.0];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    #[test]
    fn test_persist_writes_spill_file() {
        let tmp = tempfile::tempdir().unwrap();
        let index = SessionIndex::new(
            "s1",
            vec![],
            vec![chunk("a", vec![1.0, 2.0]), chunk("b", vec![3.0, 4.0])],
        );
        let path = index.persist(tmp.path()).unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[0..4], &2u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &2u32.to_le_bytes());
        assert_eq!(blob_to_vec(&bytes[8..]), vec![1.0, 2.0, 3.0, 4.0]);
    }
}
