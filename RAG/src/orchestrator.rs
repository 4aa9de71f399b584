//! Question answering over the index: embed → search → prompt → generate.
//!
//! Each request walks an explicit [`Stage`] sequence. A failure is reported
//! together with the stage it happened in; nothing is retried across stages.

use crate::config::RagConfig;
use crate::document_processor::{duplicate_ids, DocumentProcessor};
use crate::embedding_service::Embedder;
use crate::error::{RagError, Result};
use crate::generation_service::Generator;
use crate::models::*;
use crate::vector_index::VectorIndex;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

pub const NO_CONTEXT_MARKER: &str = "[NO CONTEXT FOUND]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    EmbeddingQuery,
    Searching,
    BuildingPrompt,
    Generating,
    Done,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Idle => "idle",
            Stage::EmbeddingQuery => "embedding_query",
            Stage::Searching => "searching",
            Stage::BuildingPrompt => "building_prompt",
            Stage::Generating => "generating",
            Stage::Done => "done",
            Stage::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub source: RagError,
}

/// Per-request overrides; unset fields fall back to the orchestrator settings.
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    pub model: Option<String>,
    pub collection: Option<String>,
    pub top_k: Option<usize>,
    pub stream: bool,
    /// Caller deadline, applied to every network call of the request.
    pub deadline: Option<Instant>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub response: String,
    pub hits: RetrievalResult,
    pub prompt: String,
    /// Stages visited, `Idle` first.
    pub trace: Vec<Stage>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub collection: String,
    pub default_model: String,
    pub top_k: usize,
    pub embedding_timeout: Duration,
    pub generation_timeout: Duration,
}

impl From<&RagConfig> for OrchestratorSettings {
    fn from(config: &RagConfig) -> Self {
        Self {
            collection: config.collection_name.clone(),
            default_model: config.default_model.clone(),
            top_k: config.top_k,
            embedding_timeout: config.embedding_timeout,
            generation_timeout: config.request_timeout,
        }
    }
}

/// Tracks the current stage of one request.
struct Run {
    stage: Stage,
    trace: Vec<Stage>,
}

impl Run {
    fn new() -> Self {
        Self {
            stage: Stage::Idle,
            trace: vec![Stage::Idle],
        }
    }

    fn advance(&mut self, next: Stage) {
        log::debug!("Pipeline {} -> {}", self.stage, next);
        self.stage = next;
        self.trace.push(next);
    }

    fn fail(&mut self, source: RagError) -> PipelineError {
        let stage = self.stage;
        log::error!("Pipeline failed during {}: {}", stage, source);
        self.stage = Stage::Error;
        self.trace.push(Stage::Error);
        PipelineError { stage, source }
    }
}

/// Run `fut`, failing with a timeout once `deadline` passes.
async fn within<T, F>(deadline: Option<Instant>, context: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let Some(deadline) = deadline else {
        return fut.await;
    };
    let started = Instant::now();
    match tokio::time::timeout_at(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(RagError::Timeout {
            elapsed: started.elapsed(),
            context: format!("{} past caller deadline", context),
        }),
    }
}

pub struct RetrievalOrchestrator {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    generator: Arc<dyn Generator>,
    processor: DocumentProcessor,
    settings: OrchestratorSettings,
}

impl RetrievalOrchestrator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn Generator>,
        processor: DocumentProcessor,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            generator,
            processor,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub async fn answer(
        &self,
        question: &str,
        options: &AskOptions,
    ) -> std::result::Result<Answer, PipelineError> {
        let started = Instant::now();
        let mut run = Run::new();

        let question = question.trim();
        if question.is_empty() {
            return Err(run.fail(RagError::Validation("question must not be empty".into())));
        }
        let top_k = options.top_k.unwrap_or(self.settings.top_k);
        if top_k == 0 {
            return Err(run.fail(RagError::Validation("top_k must be greater than zero".into())));
        }
        let collection = options
            .collection
            .as_deref()
            .unwrap_or(&self.settings.collection);
        let model = options
            .model
            .as_deref()
            .unwrap_or(&self.settings.default_model);

        run.advance(Stage::EmbeddingQuery);
        let query_vector = self
            .embed_question(question, options.deadline)
            .await
            .map_err(|e| run.fail(e))?;

        run.advance(Stage::Searching);
        let hits = within(
            options.deadline,
            "search",
            self.index.search(collection, &query_vector, top_k),
        )
        .await
        .map_err(|e| run.fail(e))?;
        if hits.is_empty() {
            log::warn!("No context found in {} for the question", collection);
        }

        run.advance(Stage::BuildingPrompt);
        let prompt = build_prompt(question, &hits);

        run.advance(Stage::Generating);
        let request = GenerationRequest::new(model, prompt.clone(), options.stream);
        let timeout = self.generation_timeout(options.deadline);
        let generated = within(
            options.deadline,
            "generation",
            self.generator.generate(&request, timeout),
        )
        .await
        .map_err(|e| run.fail(e))?;

        run.advance(Stage::Done);
        log::info!(
            "Answered with {} using {} segments in {} ms",
            model,
            hits.len(),
            started.elapsed().as_millis()
        );

        Ok(Answer {
            response: generated.response,
            hits,
            prompt,
            trace: run.trace,
        })
    }

    async fn embed_question(
        &self,
        question: &str,
        deadline: Option<Instant>,
    ) -> Result<EmbeddingVector> {
        let texts = [question.to_string()];
        let model = self.embedder.default_model().to_string();
        let embed = async {
            tokio::time::timeout(
                self.settings.embedding_timeout,
                self.embedder.embed(&texts, &model),
            )
            .await
            .map_err(|_| RagError::Timeout {
                elapsed: self.settings.embedding_timeout,
                context: "query embedding".to_string(),
            })?
        };
        let mut vectors = within(deadline, "query embedding", embed).await?;

        if vectors.len() != 1 {
            return Err(RagError::Validation(format!(
                "expected one query vector, got {}",
                vectors.len()
            )));
        }
        let vector = vectors.remove(0);
        if vector.len() != self.embedder.dimension() {
            return Err(RagError::Validation(format!(
                "query vector has dimension {}, expected {}",
                vector.len(),
                self.embedder.dimension()
            )));
        }
        Ok(vector)
    }

    /// The configured generation timeout, shortened to fit the caller deadline.
    fn generation_timeout(&self, deadline: Option<Instant>) -> Duration {
        match deadline {
            Some(deadline) => self
                .settings
                .generation_timeout
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.settings.generation_timeout,
        }
    }

    /// Chunk, embed and upsert documents into `collection`.
    ///
    /// Every entry is validated before anything is written, so a failure leaves
    /// the collection untouched.
    pub async fn ingest(&self, documents: &[Document], collection: &str) -> Result<Vec<Segment>> {
        let segments = self.processor.segment_all(documents);
        if segments.is_empty() {
            return Ok(segments);
        }
        for id in duplicate_ids(&segments) {
            log::warn!(
                "Segment id {} occurs more than once; later segments overwrite earlier ones in {}",
                id,
                collection
            );
        }

        let texts: Vec<String> = segments.iter().map(|s| s.text.clone()).collect();
        let model = self.embedder.default_model().to_string();
        let vectors = self.embedder.embed(&texts, &model).await?;
        if vectors.len() != segments.len() {
            return Err(RagError::Validation(format!(
                "got {} vectors for {} segments",
                vectors.len(),
                segments.len()
            )));
        }

        let dimension = self.embedder.dimension();
        let entries: Vec<IndexEntry> = segments
            .iter()
            .zip(vectors)
            .map(|(segment, vector)| IndexEntry {
                id: segment.id.clone(),
                vector,
                text: segment.text.clone(),
                subject: Some(segment.source_document_id.clone()),
            })
            .collect();
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dimension) {
            return Err(RagError::Validation(format!(
                "segment {} has dimension {}, expected {}",
                bad.id,
                bad.vector.len(),
                dimension
            )));
        }

        self.index.ensure_collection(collection, dimension).await?;
        let inserted = self.index.insert(collection, &entries).await?;
        log::info!("Ingested {} segments into {}", inserted, collection);
        Ok(segments)
    }
}

/// Assemble the grounded prompt for `question` from retrieved segments.
pub fn build_prompt(question: &str, hits: &[RetrievalHit]) -> String {
    let context = if hits.is_empty() {
        format!(
            "{} No relevant documentation was retrieved for this question.",
            NO_CONTEXT_MARKER
        )
    } else {
        hits.iter()
            .map(|hit| format!("[{}]\n{}", hit.id, hit.text.trim()))
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    format!(
        r#"You are an expert assistant that answers questions using only the documentation fragments provided below.

INSTRUCTIONS:
1. In each fragment, find the information most relevant to the question.
2. Combine the relevant fragments into a single coherent answer instead of answering fragment by fragment.
3. Be clear, direct and focused on resolving the question.
4. Base the answer exclusively on the context. Do not invent information or use outside knowledge.
5. If the context does not contain the information needed, say so clearly.

CONTEXT:
{context}

QUESTION: {question}

ANSWER:"#
    )
}
