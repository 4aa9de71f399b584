use grounded_rag::{EmbeddingVector, IndexEntry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsertRow {
    /// Generated when absent.
    pub id: Option<String>,
    pub vector: EmbeddingVector,
    pub text: String,
    pub subject: Option<String>,
}

impl InsertRow {
    pub fn into_entry(self) -> IndexEntry {
        IndexEntry {
            id: self
                .id
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            vector: self.vector,
            text: self.text,
            subject: self.subject,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InsertRequest {
    pub collection: Option<String>,
    pub data: Vec<InsertRow>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CollectionQuery {
    pub collection: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InsertResponse {
    pub collection: String,
    pub inserted: usize,
}

#[derive(Debug, Serialize)]
pub struct CollectionStatus {
    pub collection: String,
    pub exists: bool,
    pub dimension: Option<usize>,
}
