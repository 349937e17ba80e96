//! PDF text extraction.
//!
//! The only retained format is PDF; extraction turns stored bytes into plain
//! UTF-8 text for chunking. Failures are per-file: the query path logs and
//! skips an unreadable file rather than failing the whole request, and only
//! errors if nothing at all could be extracted.

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Extract plain text from PDF bytes.
pub fn extract_text(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Read a stored file and extract its text.
pub fn extract_file(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Read {
        path: path.display().to_string(),
        source: e,
    })?;
    extract_text(&bytes)
}
