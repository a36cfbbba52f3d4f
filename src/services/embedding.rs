//! Embedding gateway: text in, fixed-dimension vectors out.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::EmbeddingError;
use crate::models::EmbeddingConfig;
use crate::utils::retry::Backoff;

/// Maps text to embedding vectors.
///
/// Failures are reported as `None`; implementations log the cause.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a single query text.
    async fn embed(&self, text: &str) -> Option<Vec<f32>>;

    /// Embed a batch of document texts, pairing each text with its vector.
    async fn embed_batch(&self, texts: &[String]) -> Option<Vec<(String, Vec<f32>)>>;
}

/// Scale `v` to unit length so that dot product equals cosine similarity.
/// Zero vectors are returned unchanged.
pub fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Instruction type for embedding generation.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstructionType {
    /// For indexing documents
    Document,
    /// For search queries
    Query,
}

/// Request body for the /embed endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    truncate: Option<bool>,
    instruction_type: InstructionType,
}

/// Response from the /embed endpoint.
#[derive(Debug, Deserialize)]
struct EmbedResponse(Vec<Vec<f32>>);

/// Client for a text-embeddings-inference style `/embed` endpoint.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingClient {
    client: Client,
    base_url: String,
    batch_size: usize,
    backoff: Backoff,
}

impl HttpEmbeddingClient {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EmbeddingError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            batch_size: config.batch_size.max(1) as usize,
            backoff: Backoff::from_config(config),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Embed texts, splitting into server-sized batches.
    pub async fn try_embed(
        &self,
        texts: &[String],
        instruction_type: InstructionType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            let embeddings = self
                .backoff
                .run(|| self.embed_single_batch(batch, instruction_type))
                .await?;

            if embeddings.len() != batch.len() {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embeddings.len()
                )));
            }
            all_embeddings.extend(embeddings);
        }

        Ok(all_embeddings)
    }

    async fn embed_single_batch(
        &self,
        texts: &[String],
        instruction_type: InstructionType,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!("{}/embed", self.base_url);
        let request = EmbedRequest {
            inputs: texts,
            truncate: Some(true),
            instruction_type,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EmbeddingError::Timeout
                } else if e.is_connect() {
                    EmbeddingError::ConnectionError(e.to_string())
                } else {
                    EmbeddingError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::ServerError(format!(
                "status {}: {}",
                status, body
            )));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        Ok(embed_response.0)
    }
}

#[async_trait]
impl Embedder for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let texts = [text.to_string()];
        match self.try_embed(&texts, InstructionType::Query).await {
            Ok(mut embeddings) => embeddings.pop().filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!(target: "embedding", "query embedding failed: {e}");
                None
            }
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Option<Vec<(String, Vec<f32>)>> {
        match self.try_embed(texts, InstructionType::Document).await {
            Ok(embeddings) => Some(texts.iter().cloned().zip(embeddings).collect()),
            Err(e) => {
                tracing::warn!(
                    target: "embedding",
                    "batch embedding of {} texts failed: {e}",
                    texts.len()
                );
                None
            }
        }
    }
}
