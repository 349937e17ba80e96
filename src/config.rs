//! TOML configuration parsing and validation.
//!
//! Every field has a default matching the behavior of a bare deployment:
//! PDFs up to 16 MiB, a 10-minute file TTL, a 60-second sweep cadence, and a
//! 60-second post-response index cleanup delay. A missing config file is not
//! an error — `Config::default()` is a complete, valid configuration.
//!
//! Upstream QA credentials are *not* part of the file; they come from the
//! environment and are probed once at startup (see [`crate::qa`]).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub qa: QaConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding raw uploaded files.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Directory holding spilled derived-index vectors.
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            index_dir: default_index_dir(),
            max_file_bytes: default_max_file_bytes(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("docs")
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("embeddings")
}
fn default_max_file_bytes() -> u64 {
    16 * 1024 * 1024
}
fn default_allowed_extensions() -> Vec<String> {
    vec!["pdf".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    /// Lifetime of an uploaded file.
    #[serde(default = "default_file_ttl_secs")]
    pub file_ttl_secs: u64,
    /// Delay between a query response and eviction of its derived index.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Sweeper cadence.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    /// Hard ceiling for derived indexes whose eviction was never scheduled
    /// (e.g. the client vanished mid-request).
    #[serde(default = "default_session_max_age_secs")]
    pub session_max_age_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            file_ttl_secs: default_file_ttl_secs(),
            session_ttl_secs: default_session_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            session_max_age_secs: default_session_max_age_secs(),
        }
    }
}

fn default_file_ttl_secs() -> u64 {
    600
}
fn default_session_ttl_secs() -> u64 {
    60
}
fn default_sweep_interval_secs() -> u64 {
    60
}
fn default_session_max_age_secs() -> u64 {
    600
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    #[serde(default = "default_overlap_chars")]
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            overlap_chars: default_overlap_chars(),
        }
    }
}

fn default_chunk_chars() -> usize {
    1000
}
fn default_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct QaConfig {
    /// Number of chunks retrieved per question.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Excerpt truncation length in characters.
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
    /// Embedding deployment name on the Azure endpoint.
    #[serde(default = "default_embedding_deployment")]
    pub embedding_deployment: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            excerpt_chars: default_excerpt_chars(),
            embedding_deployment: default_embedding_deployment(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_excerpt_chars() -> usize {
    200
}
fn default_embedding_deployment() -> String {
    "text-embedding-ada-002".to_string()
}
fn default_temperature() -> f64 {
    0.1
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    5
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_chars == 0 {
        anyhow::bail!("chunking.chunk_chars must be > 0");
    }
    if config.chunking.overlap_chars >= config.chunking.chunk_chars {
        anyhow::bail!("chunking.overlap_chars must be < chunking.chunk_chars");
    }
    if config.retention.file_ttl_secs == 0 {
        anyhow::bail!("retention.file_ttl_secs must be > 0");
    }
    if config.retention.sweep_interval_secs == 0 {
        anyhow::bail!("retention.sweep_interval_secs must be > 0");
    }
    if config.storage.max_file_bytes == 0 {
        anyhow::bail!("storage.max_file_bytes must be > 0");
    }
    if config.storage.allowed_extensions.is_empty() {
        anyhow::bail!("storage.allowed_extensions must not be empty");
    }
    if config.qa.top_k == 0 {
        anyhow::bail!("qa.top_k must be > 0");
    }
    Ok(())
}
