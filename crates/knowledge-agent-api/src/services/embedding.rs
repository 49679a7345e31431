use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::search::models::EMBEDDING_DIMENSION;

/// Upstream limit on texts per embedding call.
pub const MAX_EMBED_BATCH: usize = 16;

#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub token_count: usize,
}

/// Text-to-vector boundary. Output is the same length and order as input;
/// zero inputs produce zero outputs without an upstream call.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>>;

    async fn embed(&self, text: &str) -> Result<Embedding>;
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
    usage: EmbeddingUsage,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingUsage {
    prompt_tokens: usize,
}

pub struct AzureEmbeddingClient {
    http: Client,
    config: OpenAiConfig,
}

impl AzureEmbeddingClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    async fn request_batch(&self, batch: &[String]) -> Result<Vec<Embedding>> {
        let url = format!(
            "{}/openai/deployments/{}/embeddings?api-version={}",
            self.config.endpoint, self.config.embedding_deployment, self.config.api_version
        );

        let response = self
            .http
            .post(&url)
            .header("api-key", &self.config.api_key)
            .json(&json!({ "input": batch }))
            .send()
            .await
            .context("embedding request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            bail!("embedding endpoint returned {status}: {body}");
        }

        let mut payload: EmbeddingResponse = response
            .json()
            .await
            .context("failed to parse embedding response")?;

        if payload.data.len() != batch.len() {
            bail!(
                "embedding endpoint returned {} vectors for {} inputs",
                payload.data.len(),
                batch.len()
            );
        }

        payload.data.sort_by_key(|d| d.index);

        let token_count = amortize_tokens(payload.usage.prompt_tokens, batch.len());
        let mut embeddings = Vec::with_capacity(batch.len());
        for data in payload.data {
            if data.embedding.len() != EMBEDDING_DIMENSION {
                bail!(
                    "embedding dimension mismatch: expected {}, got {}",
                    EMBEDDING_DIMENSION,
                    data.embedding.len()
                );
            }
            embeddings.push(Embedding {
                vector: data.embedding,
                token_count,
            });
        }
        Ok(embeddings)
    }
}

/// Per-batch token usage is amortized evenly across the batch's items.
fn amortize_tokens(total: usize, items: usize) -> usize {
    total / items.max(1)
}

#[async_trait]
impl Embedder for AzureEmbeddingClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all = Vec::with_capacity(texts.len());
        for (batch_index, batch) in texts.chunks(MAX_EMBED_BATCH).enumerate() {
            let embeddings = self
                .request_batch(batch)
                .await
                .with_context(|| format!("embedding batch {batch_index} failed"))?;
            all.extend(embeddings);
        }

        debug!(texts = texts.len(), "generated embeddings");
        Ok(all)
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let mut embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .pop()
            .context("embedding endpoint returned no vector")
    }
}
