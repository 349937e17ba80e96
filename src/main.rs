//! # docdrop server binary
//!
//! Starts the transient document QA service:
//!
//! ```bash
//! docdrop serve --config ./config/docdrop.toml
//! ```
//!
//! A missing config file is not an error — defaults match a bare deployment.
//! Azure OpenAI credentials are read from the environment
//! (`AZURE_OPENAI_API_KEY`, `AZURE_OPENAI_ENDPOINT`, `AZURE_OPENAI_DEPLOYMENT`,
//! `AZURE_OPENAI_VERSION`); when absent the service still starts and `/api/ask`
//! returns a configuration error.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docdrop::config::{load_config, Config};
use docdrop::coordinator::AppContext;
use docdrop::qa::{AzureCredentials, AzureQaBackend, QaBackend};
use docdrop::server::run_server;

/// docdrop — a transient document question-answering service.
#[derive(Parser)]
#[command(
    name = "docdrop",
    about = "Transient document QA service with TTL-bounded retention",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply if the file is
    /// absent.
    #[arg(long, global = true, default_value = "./config/docdrop.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server. Runs until SIGINT.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("docdrop=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        load_config(&cli.config)?
    } else {
        info!(path = %cli.config.display(), "no config file found, using defaults");
        Config::default()
    };

    match cli.command {
        Commands::Serve => {
            let backend = match AzureCredentials::from_env() {
                Ok(creds) => match AzureQaBackend::new(creds, config.qa.clone()) {
                    Ok(backend) => Ok(Arc::new(backend) as Arc<dyn QaBackend>),
                    Err(e) => Err(e.to_string()),
                },
                Err(e) => {
                    warn!(error = %e, "Azure OpenAI credentials unavailable");
                    Err(e.to_string())
                }
            };

            let ctx = AppContext::new(config, backend)?;
            run_server(ctx).await
        }
    }
}
