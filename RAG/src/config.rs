use crate::error::{RagError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorBackend {
    Memory,
    Milvus,
}

impl FromStr for VectorBackend {
    type Err = RagError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Ok(VectorBackend::Memory),
            "milvus" => Ok(VectorBackend::Milvus),
            other => Err(RagError::Config(format!("unknown vector backend '{}'", other))),
        }
    }
}

/// Runtime settings, read once at process start.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub embedding_host: String,
    pub embedding_port: u16,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    /// Upper bound on in-flight embedding requests for one `embed` call.
    pub embedding_concurrency: usize,
    pub embedding_timeout: Duration,
    pub generation_base_url: String,
    pub default_model: String,
    pub chunk_max_length: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub request_timeout: Duration,
    pub retry_count: u32,
    pub vector_backend: VectorBackend,
    pub milvus_url: String,
    pub collection_name: String,
    pub bind_addr: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            embedding_host: "localhost".to_string(),
            embedding_port: 11434,
            embedding_model: "nomic-embed-text".to_string(),
            embedding_dimension: 768,
            embedding_concurrency: 4,
            embedding_timeout: Duration::from_secs(30),
            generation_base_url: "http://localhost:11434".to_string(),
            default_model: "qwen2.5:3b".to_string(),
            chunk_max_length: 512,
            chunk_overlap: 100,
            top_k: 5,
            request_timeout: Duration::from_secs(500),
            retry_count: 3,
            vector_backend: VectorBackend::Memory,
            milvus_url: "http://localhost:19530".to_string(),
            collection_name: "documents".to_string(),
            bind_addr: "0.0.0.0:5000".to_string(),
        }
    }
}

impl RagConfig {
    /// Build the configuration from environment variables, falling back to defaults.
    ///
    /// Callers load `.env` with `dotenv` before calling this.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            embedding_host: env_or("EMBEDDING_HOST", defaults.embedding_host)?,
            embedding_port: env_or("EMBEDDING_PORT", defaults.embedding_port)?,
            embedding_model: env_or("EMBEDDING_MODEL", defaults.embedding_model)?,
            embedding_dimension: env_or("EMBEDDING_DIMENSION", defaults.embedding_dimension)?,
            embedding_concurrency: env_or("EMBEDDING_CONCURRENCY", defaults.embedding_concurrency)?,
            embedding_timeout: Duration::from_secs(env_or(
                "EMBEDDING_TIMEOUT_SECS",
                defaults.embedding_timeout.as_secs(),
            )?),
            generation_base_url: env_or("GENERATION_BASE_URL", defaults.generation_base_url)?,
            default_model: env_or("DEFAULT_MODEL", defaults.default_model)?,
            chunk_max_length: env_or("CHUNK_MAX_LENGTH", defaults.chunk_max_length)?,
            chunk_overlap: env_or("CHUNK_OVERLAP", defaults.chunk_overlap)?,
            top_k: env_or("TOP_K", defaults.top_k)?,
            request_timeout: Duration::from_secs(env_or(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            retry_count: env_or("RETRY_COUNT", defaults.retry_count)?,
            vector_backend: env_or("VECTOR_BACKEND", defaults.vector_backend)?,
            milvus_url: env_or("MILVUS_URL", defaults.milvus_url)?,
            collection_name: env_or("COLLECTION_NAME", defaults.collection_name)?,
            bind_addr: env_or("BIND_ADDR", defaults.bind_addr)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_max_length == 0 {
            return Err(RagError::Config("CHUNK_MAX_LENGTH must be greater than zero".into()));
        }
        if self.chunk_overlap >= self.chunk_max_length {
            return Err(RagError::Config(format!(
                "CHUNK_OVERLAP ({}) must be less than CHUNK_MAX_LENGTH ({})",
                self.chunk_overlap, self.chunk_max_length
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("TOP_K must be greater than zero".into()));
        }
        if self.embedding_dimension == 0 {
            return Err(RagError::Config("EMBEDDING_DIMENSION must be greater than zero".into()));
        }
        if self.embedding_concurrency == 0 {
            return Err(RagError::Config("EMBEDDING_CONCURRENCY must be greater than zero".into()));
        }
        if self.request_timeout <= self.embedding_timeout {
            return Err(RagError::Config(format!(
                "REQUEST_TIMEOUT_SECS ({}) must exceed EMBEDDING_TIMEOUT_SECS ({})",
                self.request_timeout.as_secs(),
                self.embedding_timeout.as_secs()
            )));
        }
        Ok(())
    }

    pub fn embedding_base_url(&self) -> String {
        format!("http://{}:{}", self.embedding_host, self.embedding_port)
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| RagError::Config(format!("invalid value for {}: {}", key, e))),
        _ => Ok(default),
    }
}
