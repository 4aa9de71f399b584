use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::models::*;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Client;
use std::time::{Duration, Instant};

/// Turns texts into vectors, one per input, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<EmbeddingVector>>;

    /// Dimension every returned vector is guaranteed to have.
    fn dimension(&self) -> usize;

    fn default_model(&self) -> &str;
}

/// HTTP client for an Ollama-style `/api/embeddings` service.
///
/// Each text is sent as its own request. Up to `concurrency` requests are in
/// flight at once; connection failures are retried per text, any other failure
/// fails the whole call.
pub struct EmbeddingClient {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
    concurrency: usize,
    timeout: Duration,
    retry: RetryPolicy,
}

impl EmbeddingClient {
    pub fn new(client: Client, config: &RagConfig) -> Self {
        Self {
            client,
            base_url: config.embedding_base_url(),
            model: config.embedding_model.clone(),
            dimension: config.embedding_dimension,
            concurrency: config.embedding_concurrency.max(1),
            timeout: config.embedding_timeout,
            retry: RetryPolicy::with_retry_count(config.retry_count),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn embed_one(&self, text: &str, model: &str) -> Result<EmbeddingVector> {
        let url = format!("{}/api/embeddings", self.base_url);
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&UpstreamEmbeddingRequest { model, prompt: text })
            .send()
            .await
            .map_err(|e| RagError::from_transport(e, started.elapsed(), "embedding request"))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RagError::from_transport(e, started.elapsed(), "embedding response"))?;

        if !status.is_success() {
            log::error!("Embedding service returned {}", status);
            return Err(RagError::upstream(status.as_u16(), &body));
        }

        let parsed: UpstreamEmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::Decode(format!("embedding response is not valid JSON: {}", e)))?;

        if parsed.embedding.len() != self.dimension {
            return Err(RagError::Validation(format!(
                "embedding has dimension {}, expected {}",
                parsed.embedding.len(),
                self.dimension
            )));
        }

        Ok(parsed.embedding)
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, texts: &[String], model: &str) -> Result<Vec<EmbeddingVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(position) = texts.iter().position(|t| t.trim().is_empty()) {
            return Err(RagError::Validation(format!(
                "text at position {} is empty",
                position
            )));
        }

        let started = Instant::now();
        // Futures are built up front (they are lazy) so the stream type holds no
        // higher-ranked closure, which keeps the async_trait future `Send`.
        let requests: Vec<_> = texts
            .iter()
            .map(|text| self.retry.run("Embedding", move || self.embed_one(text, model)))
            .collect();
        let vectors: Vec<EmbeddingVector> = stream::iter(requests)
            .buffered(self.concurrency)
            .try_collect()
            .await?;

        log::debug!(
            "Embedded {} texts with {} in {} ms",
            vectors.len(),
            model,
            started.elapsed().as_millis()
        );
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}
