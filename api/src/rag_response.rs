use grounded_rag::{Answer, RetrievalHit};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Source {
    pub id: String,
    pub distance: f32,
    pub text: String,
}

impl From<RetrievalHit> for Source {
    fn from(hit: RetrievalHit) -> Self {
        Self {
            id: hit.id,
            distance: hit.distance,
            text: hit.text,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RagResponse {
    pub answer: String,
    pub sources: Vec<Source>,
}

impl From<Answer> for RagResponse {
    fn from(answer: Answer) -> Self {
        Self {
            answer: answer.response,
            sources: answer.hits.into_iter().map(Source::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub collection: String,
    pub segments: Vec<String>,
}
