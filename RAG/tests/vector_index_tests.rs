use grounded_rag::vector_index::{cosine_distance, InMemoryVectorIndex, VectorIndex};
use grounded_rag::{IndexEntry, RagError};
use proptest::prelude::*;

fn entry(id: &str, vector: Vec<f32>, text: &str) -> IndexEntry {
    IndexEntry {
        id: id.to_string(),
        vector,
        text: text.to_string(),
        subject: None,
    }
}

async fn index_with(entries: &[IndexEntry], dimension: usize) -> InMemoryVectorIndex {
    let index = InMemoryVectorIndex::new();
    index.ensure_collection("docs", dimension).await.unwrap();
    index.insert("docs", entries).await.unwrap();
    index
}

#[tokio::test]
async fn search_returns_closest_first() {
    let index = index_with(
        &[
            entry("far", vec![0.0, 1.0, 0.0], "far"),
            entry("near", vec![1.0, 0.1, 0.0], "near"),
            entry("exact", vec![2.0, 0.0, 0.0], "exact"),
        ],
        3,
    )
    .await;

    let hits = index.search("docs", &[1.0, 0.0, 0.0], 3).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["exact", "near", "far"]);
    assert!(hits[0].distance.abs() < 1e-6);
    assert!((hits[2].distance - 1.0).abs() < 1e-6);
}

#[tokio::test]
async fn search_is_bounded_by_top_k() {
    let entries: Vec<IndexEntry> = (0..10)
        .map(|i| entry(&format!("e{i}"), vec![1.0, i as f32], "t"))
        .collect();
    let index = index_with(&entries, 2).await;

    assert_eq!(index.search("docs", &[1.0, 0.0], 4).await.unwrap().len(), 4);
    assert_eq!(index.search("docs", &[1.0, 0.0], 50).await.unwrap().len(), 10);
    assert!(index.search("docs", &[1.0, 0.0], 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_collection_returns_no_hits() {
    let index = InMemoryVectorIndex::new();
    index.ensure_collection("docs", 2).await.unwrap();

    assert!(index.search("docs", &[1.0, 0.0], 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn mismatched_dimension_rejects_the_whole_batch() {
    let index = index_with(&[entry("a", vec![1.0, 0.0], "a")], 2).await;

    let err = index
        .insert(
            "docs",
            &[entry("b", vec![0.0, 1.0], "b"), entry("c", vec![1.0], "c")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));

    let hits = index.search("docs", &[1.0, 0.0], 10).await.unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["a"]);
}

#[tokio::test]
async fn insert_replaces_entries_with_the_same_id() {
    let index = index_with(&[entry("a", vec![1.0, 0.0], "old")], 2).await;
    index
        .insert("docs", &[entry("a", vec![0.0, 1.0], "new")])
        .await
        .unwrap();

    let hits = index.search("docs", &[0.0, 1.0], 10).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].text, "new");
    assert!(hits[0].distance.abs() < 1e-6);
}

#[tokio::test]
async fn query_with_wrong_dimension_is_rejected() {
    let index = index_with(&[entry("a", vec![1.0, 0.0], "a")], 2).await;

    let err = index.search("docs", &[1.0, 0.0, 0.0], 1).await.unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));
}

#[tokio::test]
async fn missing_collection_is_an_error() {
    let index = InMemoryVectorIndex::new();

    assert!(index.search("nope", &[1.0], 1).await.is_err());
    assert!(index.insert("nope", &[entry("a", vec![1.0], "a")]).await.is_err());
    assert_eq!(index.collection_dimension("nope").await.unwrap(), None);
}

#[tokio::test]
async fn ensure_collection_is_idempotent_but_keeps_its_dimension() {
    let index = InMemoryVectorIndex::new();
    index.ensure_collection("docs", 4).await.unwrap();
    index.ensure_collection("docs", 4).await.unwrap();

    assert_eq!(index.collection_dimension("docs").await.unwrap(), Some(4));
    assert!(index.ensure_collection("docs", 8).await.is_err());
    assert!(index.ensure_collection("other", 0).await.is_err());
}

fn vector(dimension: usize) -> impl Strategy<Value = Vec<f32>> {
    prop::collection::vec(-10.0f32..10.0, dimension)
}

proptest! {
    #[test]
    fn search_results_are_sorted_and_bounded(
        vectors in prop::collection::vec(vector(4), 1..30),
        query in vector(4),
        top_k in 1usize..40,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let entries: Vec<IndexEntry> = vectors
            .iter()
            .enumerate()
            .map(|(i, v)| entry(&format!("e{i}"), v.clone(), "t"))
            .collect();

        let hits = runtime.block_on(async {
            let index = index_with(&entries, 4).await;
            index.search("docs", &query, top_k).await.unwrap()
        });

        prop_assert_eq!(hits.len(), top_k.min(entries.len()));
        for pair in hits.windows(2) {
            prop_assert!(pair[0].distance <= pair[1].distance);
        }
        for hit in &hits {
            let stored = &entries.iter().find(|e| e.id == hit.id).unwrap().vector;
            prop_assert!((hit.distance - cosine_distance(&query, stored)).abs() < 1e-5);
        }
    }
}
