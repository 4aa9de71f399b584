use serde::{Deserialize, Serialize};

pub type EmbeddingVector = Vec<f32>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub id: String,
    pub text: String,
    pub source_document_id: String,
}

impl Segment {
    /// Segment ids follow the record convention: the first segment keeps the
    /// document id, later ones get a 1-based `_n` suffix.
    pub fn derive_id(document_id: &str, index: usize) -> String {
        if index == 0 {
            document_id.to_string()
        } else {
            format!("{}_{}", document_id, index + 1)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub vector: EmbeddingVector,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

/// One search hit. Lower distance means closer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub id: String,
    pub distance: f32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
}

/// Hits ordered by ascending distance, at most top-k long.
pub type RetrievalResult = Vec<RetrievalHit>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub stream: bool,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, stream: bool) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            stream,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub response: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpstreamEmbeddingRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UpstreamEmbeddingResponse {
    pub embedding: Vec<f32>,
}

/// A generation payload or a single streamed fragment of one.
#[derive(Debug, Deserialize)]
pub(crate) struct UpstreamGenerationFragment {
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: String,
    pub error: String,
    pub message: String,
}
