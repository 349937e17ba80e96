//! Opaque embedding and question-answering backend.
//!
//! The lifecycle core treats embedding and generation as external
//! collaborators behind the [`QaBackend`] trait, so tests inject counting or
//! failing stubs. The production implementation talks to Azure OpenAI:
//! `POST .../embeddings` for vectors and `POST .../chat/completions` for the
//! answer, with the same retry discipline for both — 429 and 5xx retry with
//! exponential backoff (1s, 2s, 4s, ... capped at 2^5), other 4xx fail fast.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::config::QaConfig;

/// Embedding + answer generation, as seen by the coordinator.
#[async_trait]
pub trait QaBackend: Send + Sync {
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Answer `question` using only the given context excerpts.
    async fn answer(&self, question: &str, excerpts: &[String]) -> Result<String>;
}

/// Credentials and endpoint for the Azure OpenAI services, read from the
/// environment once at startup.
#[derive(Debug, Clone)]
pub struct AzureCredentials {
    pub api_key: String,
    pub endpoint: String,
    /// Chat-completion deployment name.
    pub deployment: String,
    pub api_version: String,
}

impl AzureCredentials {
    /// Probe the environment for all required variables. The error message
    /// names every missing variable so a misconfigured deployment is
    /// diagnosable from a single request.
    pub fn from_env() -> Result<Self> {
        let mut missing = Vec::new();
        let mut var = |name: &'static str| match std::env::var(name) {
            Ok(v) if !v.trim().is_empty() => Some(v),
            _ => {
                missing.push(name);
                None
            }
        };

        let api_key = var("AZURE_OPENAI_API_KEY");
        let endpoint = var("AZURE_OPENAI_ENDPOINT");
        let deployment = var("AZURE_OPENAI_DEPLOYMENT");
        let api_version = var("AZURE_OPENAI_VERSION");

        if !missing.is_empty() {
            bail!(
                "Missing required environment variables: {}",
                missing.join(", ")
            );
        }

        Ok(Self {
            api_key: api_key.unwrap(),
            endpoint: endpoint.unwrap(),
            deployment: deployment.unwrap(),
            api_version: api_version.unwrap(),
        })
    }
}

/// Azure OpenAI implementation of [`QaBackend`].
pub struct AzureQaBackend {
    creds: AzureCredentials,
    config: QaConfig,
    client: reqwest::Client,
}

impl AzureQaBackend {
    pub fn new(creds: AzureCredentials, config: QaConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            creds,
            config,
            client,
        })
    }

    fn deployment_url(&self, deployment: &str, operation: &str) -> String {
        format!(
            "{}/openai/deployments/{}/{}?api-version={}",
            self.creds.endpoint.trim_end_matches('/'),
            deployment,
            operation,
            self.creds.api_version
        )
    }

    /// POST with retry/backoff. 429 and 5xx are retried; other client errors
    /// and exhausted retries fail.
    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(url, attempt, ?delay, "retrying upstream call");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(url)
                .header("api-key", &self.creds.api_key)
                .header("Content-Type", "application/json")
                .json(body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow::anyhow!(
                            "Azure OpenAI error {}: {}",
                            status,
                            body_text
                        ));
                        continue;
                    }
                    bail!("Azure OpenAI error {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("upstream call failed after retries")))
    }
}

#[async_trait]
impl QaBackend for AzureQaBackend {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.deployment_url(&self.config.embedding_deployment, "embeddings");
        let body = serde_json::json!({ "input": texts });
        let json = self.post_json(&url, &body).await?;
        parse_embedding_response(&json, texts.len())
    }

    async fn answer(&self, question: &str, excerpts: &[String]) -> Result<String> {
        let url = self.deployment_url(&self.creds.deployment, "chat/completions");
        let context = excerpts.join("\n\n---\n\n");
        let body = serde_json::json!({
            "messages": [
                {
                    "role": "system",
                    "content": "You answer questions using only the provided document excerpts. \
                                If the excerpts do not contain the answer, say so.",
                },
                {
                    "role": "user",
                    "content": format!("Excerpts:\n{}\n\nQuestion: {}", context, question),
                },
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });
        let json = self.post_json(&url, &body).await?;
        json.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
    }
}

/// Parse the embeddings API response, preserving input order via the
/// per-item `index` field.
fn parse_embedding_response(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing data array"))?;

    let mut embeddings: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);
        let vector: Vec<f32> = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing embedding"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();
        embeddings.push((index, vector));
    }

    if embeddings.len() != expected {
        bail!(
            "Embedding response count mismatch: expected {}, got {}",
            expected,
            embeddings.len()
        );
    }

    embeddings.sort_by_key(|(i, _)| *i);
    Ok(embeddings.into_iter().map(|(_, v)| v).collect())
}
