//! [`VectorIndex`] over the Milvus v2 REST API.
//!
//! Collections are created through the quick-setup path with a `VarChar`
//! primary key, a float vector field and the COSINE metric; text and subject
//! travel as dynamic fields. Milvus reports cosine *similarity*, which is
//! converted to distance before results leave this module.

use crate::error::{RagError, Result};
use crate::models::*;
use crate::vector_index::{check_dimensions, VectorIndex};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

const ID_FIELD: &str = "q_id";
const VECTOR_FIELD: &str = "q_vector";
const TEXT_FIELD: &str = "q_chunk";
const SUBJECT_FIELD: &str = "subject";
const ID_MAX_LENGTH: usize = 64;

#[derive(Debug, Deserialize)]
struct MilvusEnvelope {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct HasCollection {
    has: bool,
}

/// Dimension of the vector field in a `collections/describe` payload.
fn vector_dimension(description: &Value) -> Result<usize> {
    let fields = description
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| RagError::Decode("Milvus description without fields".to_string()))?;
    let field = fields
        .iter()
        .find(|f| f.get("name").and_then(Value::as_str) == Some(VECTOR_FIELD))
        .or_else(|| {
            fields.iter().find(|f| {
                f.get("type")
                    .and_then(Value::as_str)
                    .is_some_and(|t| t.ends_with("Vector"))
            })
        })
        .ok_or_else(|| RagError::Decode("Milvus collection has no vector field".to_string()))?;

    let dim = field
        .get("params")
        .and_then(Value::as_array)
        .and_then(|params| {
            params
                .iter()
                .find(|p| p.get("key").and_then(Value::as_str) == Some("dim"))
        })
        .and_then(|p| p.get("value"))
        .ok_or_else(|| RagError::Decode("Milvus vector field has no dim".to_string()))?;

    let parsed = match dim {
        Value::Number(n) => n.as_u64().map(|n| n as usize),
        Value::String(s) => s.parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| RagError::Decode(format!("Milvus vector dim is not a number: {}", dim)))
}

fn hit_from_value(hit: &Value) -> Result<RetrievalHit> {
    let id = match hit.get(ID_FIELD).or_else(|| hit.get("id")) {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => return Err(RagError::Decode("Milvus hit without an id".to_string())),
    };
    let similarity = hit
        .get("distance")
        .and_then(Value::as_f64)
        .ok_or_else(|| RagError::Decode(format!("Milvus hit {} without a distance", id)))?;
    let text_of = |field: &str| hit.get(field).and_then(Value::as_str).map(str::to_string);

    Ok(RetrievalHit {
        distance: 1.0 - similarity as f32,
        text: text_of(TEXT_FIELD).unwrap_or_default(),
        subject: text_of(SUBJECT_FIELD),
        id,
    })
}

pub struct MilvusIndex {
    client: Client,
    base_url: String,
    timeout: Duration,
    /// Dimensions of collections this process created or described.
    dimensions: RwLock<HashMap<String, usize>>,
}

impl MilvusIndex {
    pub fn new(client: Client, base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            dimensions: RwLock::new(HashMap::new()),
        }
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<T> {
        let url = format!("{}/v2/vectordb/{}", self.base_url, path);
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::from_transport(e, started.elapsed(), path))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| RagError::from_transport(e, started.elapsed(), path))?;
        if !status.is_success() {
            return Err(RagError::upstream(status.as_u16(), &text));
        }

        let envelope: MilvusEnvelope = serde_json::from_str(&text)
            .map_err(|e| RagError::Decode(format!("Milvus {} response: {}", path, e)))?;
        if envelope.code != 0 {
            // Milvus reports failures in the envelope with an HTTP 200.
            return Err(RagError::Upstream {
                status: status.as_u16(),
                body: format!(
                    "Milvus code {}: {}",
                    envelope.code,
                    envelope.message.unwrap_or_default()
                ),
            });
        }

        serde_json::from_value(envelope.data)
            .map_err(|e| RagError::Decode(format!("Milvus {} payload: {}", path, e)))
    }

    async fn has_collection(&self, name: &str) -> Result<bool> {
        let has: HasCollection = self
            .call("collections/has", json!({ "collectionName": name }))
            .await?;
        Ok(has.has)
    }

    /// Read the vector dimension of an existing collection from the server.
    async fn describe_dimension(&self, name: &str) -> Result<usize> {
        let description: Value = self
            .call("collections/describe", json!({ "collectionName": name }))
            .await?;
        let dimension = vector_dimension(&description)?;
        self.dimensions
            .write()
            .await
            .insert(name.to_string(), dimension);
        Ok(dimension)
    }

    async fn require_dimension(&self, name: &str) -> Result<usize> {
        self.collection_dimension(name)
            .await?
            .ok_or_else(|| RagError::Validation(format!("collection '{}' does not exist", name)))
    }
}

#[async_trait]
impl VectorIndex for MilvusIndex {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(RagError::Validation("dimension must be greater than zero".into()));
        }
        if self.has_collection(name).await? {
            let existing = self.describe_dimension(name).await?;
            if existing != dimension {
                return Err(RagError::Validation(format!(
                    "collection '{}' already exists with dimension {}",
                    name, existing
                )));
            }
            return Ok(());
        }

        log::info!("Creating Milvus collection {} (dimension {})", name, dimension);
        let _: Value = self
            .call(
                "collections/create",
                json!({
                    "collectionName": name,
                    "dimension": dimension,
                    "metricType": "COSINE",
                    "idType": "VarChar",
                    "primaryFieldName": ID_FIELD,
                    "vectorFieldName": VECTOR_FIELD,
                    "params": { "max_length": ID_MAX_LENGTH },
                }),
            )
            .await?;
        self.dimensions
            .write()
            .await
            .insert(name.to_string(), dimension);
        Ok(())
    }

    async fn insert(&self, name: &str, entries: &[IndexEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let dimension = self.require_dimension(name).await?;
        check_dimensions(entries, dimension)?;

        let data: Vec<Value> = entries
            .iter()
            .map(|entry| {
                let mut row = json!({
                    ID_FIELD: entry.id,
                    VECTOR_FIELD: entry.vector,
                    TEXT_FIELD: entry.text,
                });
                if let Some(subject) = &entry.subject {
                    row[SUBJECT_FIELD] = json!(subject);
                }
                row
            })
            .collect();

        let _: Value = self
            .call(
                "entities/upsert",
                json!({ "collectionName": name, "data": data }),
            )
            .await?;
        log::info!("Upserted {} entries into {}", entries.len(), name);
        Ok(entries.len())
    }

    async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<RetrievalResult> {
        let dimension = self.require_dimension(name).await?;
        if dimension != query_vector.len() {
            return Err(RagError::Validation(format!(
                "query has dimension {}, collection '{}' expects {}",
                query_vector.len(),
                name,
                dimension
            )));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let raw: Vec<Value> = self
            .call(
                "entities/search",
                json!({
                    "collectionName": name,
                    "data": [query_vector],
                    "annsField": VECTOR_FIELD,
                    "limit": top_k,
                    "outputFields": [TEXT_FIELD, SUBJECT_FIELD],
                    "searchParams": { "metricType": "COSINE" },
                }),
            )
            .await?;

        let mut hits = raw
            .iter()
            .map(hit_from_value)
            .collect::<Result<Vec<RetrievalHit>>>()?;
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn collection_dimension(&self, name: &str) -> Result<Option<usize>> {
        if let Some(dimension) = self.dimensions.read().await.get(name).copied() {
            return Ok(Some(dimension));
        }
        if !self.has_collection(name).await? {
            return Ok(None);
        }
        self.describe_dimension(name).await.map(Some)
    }
}
