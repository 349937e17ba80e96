//! # docdrop
//!
//! A transient document question-answering service. Uploaded PDFs are
//! retained for a bounded lifetime, questions are answered against the
//! currently-retained set, and everything — files, derived search indexes,
//! on-disk vector spills — is reclaimed automatically.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐     ┌───────────────┐     ┌──────────────────┐
//! │   HTTP    │────▶│  Coordinator  │────▶│ Retention Ledger │
//! │  (axum)   │     │ (AppContext)  │     ├──────────────────┤
//! └──────────┘     └──────┬────────┘     │  Index Registry  │
//!                          │              └────────▲─────────┘
//!                          ▼                       │
//!                   ┌──────────────┐        ┌──────┴──────┐
//!                   │  QA backend  │        │   Sweeper   │
//!                   │ (Azure OpenAI)│       │ (periodic)  │
//!                   └──────────────┘        └─────────────┘
//! ```
//!
//! Every uploaded file gets a fixed TTL in the retention ledger. Each query
//! builds a session-scoped derived index (extract → chunk → embed) that lives
//! only briefly past its response. The sweeper evicts both on its own cadence;
//! a new upload proactively invalidates all live indexes.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Request-path error taxonomy |
//! | [`ledger`] | Retention ledger (file TTLs) |
//! | [`registry`] | Derived-index registry (session lifecycle) |
//! | [`sweeper`] | Periodic background evictor |
//! | [`coordinator`] | Request-facing façade and owned context |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Character-window chunking |
//! | [`index`] | Session vector index and cosine retrieval |
//! | [`qa`] | Embedding/QA backend trait and Azure implementation |
//! | [`server`] | JSON HTTP API |

pub mod chunk;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod extract;
pub mod index;
pub mod ledger;
pub mod models;
pub mod qa;
pub mod registry;
pub mod server;
pub mod sweeper;
