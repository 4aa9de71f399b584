pub mod chunker;
pub mod config;
pub mod document_processor;
pub mod embedding_service;
pub mod error;
pub mod generation_service;
pub mod milvus_index;
pub mod models;
pub mod orchestrator;
pub mod retry;
pub mod vector_index;

pub use config::{RagConfig, VectorBackend};
pub use document_processor::DocumentProcessor;
pub use embedding_service::{Embedder, EmbeddingClient};
pub use error::{RagError, Result};
pub use generation_service::{FragmentDecoder, GenerationClient, Generator};
pub use milvus_index::MilvusIndex;
pub use models::*;
pub use orchestrator::{
    AskOptions, Answer, OrchestratorSettings, PipelineError, RetrievalOrchestrator, Stage,
};
pub use retry::RetryPolicy;
pub use vector_index::{InMemoryVectorIndex, VectorIndex};

use std::sync::Arc;

/// The pooled HTTP client shared by every upstream adapter.
pub fn build_http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .pool_max_idle_per_host(16)
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()
        .map_err(|e| RagError::Config(format!("could not build HTTP client: {}", e)))
}

fn build_vector_index(client: reqwest::Client, config: &RagConfig) -> Arc<dyn VectorIndex> {
    match config.vector_backend {
        VectorBackend::Memory => Arc::new(InMemoryVectorIndex::new()),
        VectorBackend::Milvus => Arc::new(MilvusIndex::new(
            client,
            config.milvus_url.clone(),
            config.embedding_timeout,
        )),
    }
}

/// Every long-lived collaborator, constructed once at process start.
pub struct RagLibrary {
    pub config: Arc<RagConfig>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub index: Arc<dyn VectorIndex>,
    pub orchestrator: Arc<RetrievalOrchestrator>,
}

impl RagLibrary {
    pub fn new(config: RagConfig) -> Result<Self> {
        config.validate()?;
        log::info!(
            "Initializing RAG library (index backend {:?}, collection {})",
            config.vector_backend,
            config.collection_name
        );

        let client = build_http_client()?;
        let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingClient::new(client.clone(), &config));
        let generator: Arc<dyn Generator> =
            Arc::new(GenerationClient::new(client.clone(), &config));
        let index = build_vector_index(client, &config);

        Ok(Self::from_parts(config, embedder, generator, index))
    }

    /// Wire already-built collaborators together.
    pub fn from_parts(
        config: RagConfig,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        let orchestrator = Arc::new(RetrievalOrchestrator::new(
            embedder.clone(),
            index.clone(),
            generator.clone(),
            DocumentProcessor::new(config.chunk_max_length, config.chunk_overlap),
            OrchestratorSettings::from(&config),
        ));

        Self {
            config: Arc::new(config),
            embedder,
            generator,
            index,
            orchestrator,
        }
    }
}
