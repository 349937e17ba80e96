//! Request-path error taxonomy.
//!
//! Every error a request handler can observe maps onto one of these variants;
//! the HTTP layer translates them into status codes and the JSON error
//! contract (see [`crate::server`]). Teardown failures in background tasks are
//! deliberately *not* represented here — they are logged and swallowed so a
//! failed eviction can never surface on a request.

use thiserror::Error;

/// Errors surfaced on the request path.
#[derive(Debug, Error)]
pub enum DocdropError {
    /// Bad input from the caller: missing or invalid file, empty question,
    /// nothing uploaded yet. Mapped to 400, never retried.
    #[error("{0}")]
    Validation(String),

    /// Operation on an id that is not currently retained. Mapped to 404.
    #[error("{0}")]
    NotFound(String),

    /// Required external credentials are missing. Detected once at startup
    /// and surfaced on every dependent request. Mapped to 500.
    #[error("{0}")]
    Configuration(String),

    /// Derived-index construction failed. No partial index state survives
    /// this error. Mapped to 500.
    #[error("index build failed: {0}")]
    Build(String),

    /// The upstream embedding or chat-completion call failed after the index
    /// was built; the index is evicted before this propagates. Mapped to 500.
    #[error("{0}")]
    Upstream(String),

    /// Local file I/O failed during upload or delete. Mapped to 500.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocdropError {
    pub fn validation(msg: impl Into<String>) -> Self {
        DocdropError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        DocdropError::NotFound(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, DocdropError>;
