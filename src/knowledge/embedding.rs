//! Embedding client for the OpenAI-compatible `/embeddings` endpoint.
//!
//! Texts are sent in batches, results re-ordered by `index` and
//! L2-normalized so cosine similarity reduces to a dot product.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::config::{EmbeddingConfig, EMBEDDING_KEY_ENV};

use super::errors::KnowledgeError;

// ─── Embedder ───────────────────────────────────────────────────────────────

/// Turns texts into normalized vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError>;

    /// Embed a single query string.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, KnowledgeError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors.pop().ok_or(KnowledgeError::CountMismatch { expected: 1, got: 0 })
    }
}

// ─── Wire Types ─────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: u32,
    encoding_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

// ─── EmbeddingClient ────────────────────────────────────────────────────────

pub struct EmbeddingClient {
    http: HttpClient,
    config: EmbeddingConfig,
}

impl EmbeddingClient {
    /// Fails with `MissingApiKey` when no key is configured.
    pub fn from_config(config: EmbeddingConfig) -> Result<Self, KnowledgeError> {
        if config.api_key.trim().is_empty() {
            return Err(KnowledgeError::MissingApiKey {
                var: EMBEDDING_KEY_ENV.to_string(),
            });
        }

        let http = HttpClient::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| KnowledgeError::RequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { http, config })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
            dimensions: self.config.dimensions,
            encoding_format: "float",
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| KnowledgeError::RequestFailed {
                reason: format!("embedding request to {url}: {e}"),
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body_text = response.text().await.unwrap_or_else(|_| "unknown".to_string());
            return Err(KnowledgeError::HttpError { status, body: body_text });
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| KnowledgeError::RequestFailed {
            reason: format!("failed to parse embedding response: {e}"),
        })?;

        order_and_normalize(parsed.data, texts.len())
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, KnowledgeError> {
        let batch_size = self.config.batch_size.max(1);
        let mut out = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(batch_size).enumerate() {
            tracing::debug!(batch = i, size = batch.len(), model = %self.config.model, "embedding batch");
            out.extend(self.embed_batch(batch).await?);
        }
        Ok(out)
    }
}

// ─── Vector Helpers ─────────────────────────────────────────────────────────

fn order_and_normalize(mut items: Vec<EmbeddingItem>, expected: usize) -> Result<Vec<Vec<f32>>, KnowledgeError> {
    if items.len() != expected {
        return Err(KnowledgeError::CountMismatch {
            expected,
            got: items.len(),
        });
    }
    items.sort_by_key(|item| item.index);
    Ok(items.into_iter().map(|item| l2_normalize(item.embedding)).collect())
}

/// L2-normalize a vector. Zero vectors are returned unchanged.
pub fn l2_normalize(vec: Vec<f32>) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vec.into_iter().map(|v| v / norm).collect()
    } else {
        vec
    }
}

/// Cosine similarity. Inputs need not be normalized.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
