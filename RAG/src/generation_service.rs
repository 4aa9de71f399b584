use crate::config::RagConfig;
use crate::error::{RagError, Result};
use crate::models::*;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use std::time::{Duration, Instant};

#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a trimmed, newline-terminated answer within `timeout`.
    async fn generate(
        &self,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<GenerationResponse>;
}

/// Incremental decoder for newline-delimited JSON generation fragments.
///
/// Bytes are fed as they arrive; every complete line that parses yields its
/// `response` piece, lines that do not parse are counted and skipped. One decoder
/// serves one response body.
#[derive(Debug, Default)]
pub struct FragmentDecoder {
    buffer: Vec<u8>,
    skipped: usize,
}

impl FragmentDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut pieces = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(piece) = self.decode_line(&line[..line.len() - 1]) {
                pieces.push(piece);
            }
        }
        pieces
    }

    /// Decode whatever is left after the body ends without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        self.decode_line(&rest)
    }

    pub fn skipped(&self) -> usize {
        self.skipped
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<String> {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        match serde_json::from_str::<UpstreamGenerationFragment>(text) {
            Ok(fragment) => fragment.response,
            Err(e) => {
                self.skipped += 1;
                log::debug!("Skipping undecodable stream fragment: {}", e);
                None
            }
        }
    }
}

/// Trim the raw answer and terminate it with exactly one newline.
pub fn finish_answer(raw: &str) -> Result<GenerationResponse> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RagError::Decode(
            "generation service returned an empty answer".to_string(),
        ));
    }
    Ok(GenerationResponse {
        response: format!("{}\n", trimmed),
    })
}

/// Client for an Ollama-style `/api/generate` endpoint.
///
/// Holds a clone of the process-wide pooled `reqwest::Client`.
pub struct GenerationClient {
    client: Client,
    base_url: String,
    retry: RetryPolicy,
}

impl GenerationClient {
    pub fn new(client: Client, config: &RagConfig) -> Self {
        Self {
            client,
            base_url: config.generation_base_url.trim_end_matches('/').to_string(),
            retry: RetryPolicy::with_retry_count(config.retry_count),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn attempt(&self, request: &GenerationRequest, started: Instant) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| RagError::from_transport(e, started.elapsed(), "generation request"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.map_err(|e| {
                RagError::from_transport(e, started.elapsed(), "generation error body")
            })?;
            log::error!("Generation service returned {}", status);
            return Err(RagError::upstream(status.as_u16(), &body));
        }

        if request.stream {
            let mut decoder = FragmentDecoder::new();
            let mut answer = String::new();
            let mut body = response.bytes_stream();

            while let Some(chunk) = body.next().await {
                let bytes = chunk.map_err(|e| {
                    RagError::from_transport(e, started.elapsed(), "generation stream")
                })?;
                for piece in decoder.feed(&bytes) {
                    answer.push_str(&piece);
                }
            }
            if let Some(piece) = decoder.finish() {
                answer.push_str(&piece);
            }
            if decoder.skipped() > 0 {
                log::warn!("Skipped {} malformed stream fragments", decoder.skipped());
            }
            Ok(answer)
        } else {
            let body = response
                .text()
                .await
                .map_err(|e| RagError::from_transport(e, started.elapsed(), "generation response"))?;
            let parsed: UpstreamGenerationFragment = serde_json::from_str(&body).map_err(|e| {
                RagError::Decode(format!("generation response is not valid JSON: {}", e))
            })?;
            parsed.response.ok_or_else(|| {
                RagError::Decode("generation response has no `response` field".to_string())
            })
        }
    }
}

#[async_trait]
impl Generator for GenerationClient {
    async fn generate(
        &self,
        request: &GenerationRequest,
        timeout: Duration,
    ) -> Result<GenerationResponse> {
        let started = Instant::now();

        let attempts = self
            .retry
            .run("Generation", || self.attempt(request, started));
        let raw = match tokio::time::timeout(timeout, attempts).await {
            Ok(result) => result?,
            Err(_) => {
                log::error!("Generation with {} timed out", request.model);
                return Err(RagError::Timeout {
                    elapsed: started.elapsed(),
                    context: format!("generation with model {}", request.model),
                });
            }
        };

        log::info!(
            "Generated {} chars with {} in {} ms",
            raw.len(),
            request.model,
            started.elapsed().as_millis()
        );
        finish_answer(&raw)
    }
}
