use crate::error::{RagError, Result};
use crate::models::*;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Narrow contract the pipeline needs from a vector database.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection if it does not exist yet.
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// Upsert entries by id. Entries with a mismatched dimension are rejected
    /// and nothing is written.
    async fn insert(&self, name: &str, entries: &[IndexEntry]) -> Result<usize>;

    /// Up to `top_k` closest entries by cosine distance, closest first.
    async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<RetrievalResult>;

    /// Dimension of an existing collection, `None` when it is unknown.
    async fn collection_dimension(&self, name: &str) -> Result<Option<usize>>;
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// `1 - cosine_similarity`, in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

pub(crate) fn check_dimensions(entries: &[IndexEntry], dimension: usize) -> Result<()> {
    for entry in entries {
        if entry.vector.len() != dimension {
            return Err(RagError::Validation(format!(
                "entry {} has dimension {}, collection expects {}",
                entry.id,
                entry.vector.len(),
                dimension
            )));
        }
        if entry.id.trim().is_empty() {
            return Err(RagError::Validation("entry id must not be empty".to_string()));
        }
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Collection {
    dimension: usize,
    entries: HashMap<String, IndexEntry>,
}

/// Process-local index with brute-force cosine search.
#[derive(Debug, Default)]
pub struct InMemoryVectorIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn missing(name: &str) -> RagError {
        RagError::Validation(format!("collection '{}' does not exist", name))
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if dimension == 0 {
            return Err(RagError::Validation("dimension must be greater than zero".into()));
        }
        let mut collections = self.collections.write().await;
        match collections.get(name) {
            Some(existing) if existing.dimension != dimension => {
                Err(RagError::Validation(format!(
                    "collection '{}' already exists with dimension {}",
                    name, existing.dimension
                )))
            }
            Some(_) => Ok(()),
            None => {
                log::info!("Creating collection {} (dimension {})", name, dimension);
                collections.insert(
                    name.to_string(),
                    Collection {
                        dimension,
                        entries: HashMap::new(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn insert(&self, name: &str, entries: &[IndexEntry]) -> Result<usize> {
        let mut collections = self.collections.write().await;
        let collection = collections.get_mut(name).ok_or_else(|| Self::missing(name))?;

        check_dimensions(entries, collection.dimension)?;
        for entry in entries {
            collection.entries.insert(entry.id.clone(), entry.clone());
        }
        Ok(entries.len())
    }

    async fn search(
        &self,
        name: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Result<RetrievalResult> {
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| Self::missing(name))?;

        if query_vector.len() != collection.dimension {
            return Err(RagError::Validation(format!(
                "query has dimension {}, collection '{}' expects {}",
                query_vector.len(),
                name,
                collection.dimension
            )));
        }

        let mut hits: Vec<RetrievalHit> = collection
            .entries
            .values()
            .map(|entry| RetrievalHit {
                id: entry.id.clone(),
                distance: cosine_distance(query_vector, &entry.vector),
                text: entry.text.clone(),
                subject: entry.subject.clone(),
            })
            .collect();

        // Ties break on id so equal inputs give equal output.
        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn collection_dimension(&self, name: &str) -> Result<Option<usize>> {
        let collections = self.collections.read().await;
        Ok(collections.get(name).map(|c| c.dimension))
    }
}
