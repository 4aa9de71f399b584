use crate::answer_request::AnswerRequest;
use crate::api_error::ApiError;
use crate::embeddings_request::{EmbeddingsRequest, EmbeddingsResponse};
use crate::insert_request::{
    CollectionQuery, CollectionStatus, InsertRequest, InsertResponse, InsertRow,
};
use crate::query_payload::{AskPayload, IngestPayload};
use crate::rag_response::{IngestResponse, RagResponse};
use crate::state::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use grounded_rag::{
    AskOptions, Document, Embedder, GenerationRequest, GenerationResponse, Generator,
    IndexEntry, RagError, VectorIndex,
};
use serde_json::json;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/get_answer/", post(get_answer))
        .route("/generate-embeddings/", post(generate_embeddings))
        .route("/mv_insert", get(collection_status).post(insert_vectors))
        .route("/ask", post(ask))
        .route("/ingest", post(ingest))
        .with_state(state)
        .layer(cors)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let config = &state.rag.config;
    Json(json!({
        "status": "ok",
        "service": "rag_api",
        "collection": config.collection_name,
        "default_model": config.default_model,
    }))
}

async fn get_answer(
    State(state): State<AppState>,
    payload: Result<Json<AnswerRequest>, JsonRejection>,
) -> ApiResult<GenerationResponse> {
    let Json(body) = payload?;
    if body.prompt.trim().is_empty() {
        return Err(RagError::Validation("prompt must not be empty".into()).into());
    }

    let config = &state.rag.config;
    let model = body.model.unwrap_or_else(|| config.default_model.clone());
    let request = GenerationRequest::new(model, body.prompt, body.stream);
    let started = Instant::now();
    let response = state
        .rag
        .generator
        .generate(&request, config.request_timeout)
        .await?;

    log::info!(
        "Generated answer with {} in {} ms",
        request.model,
        started.elapsed().as_millis()
    );
    Ok(Json(response))
}

async fn generate_embeddings(
    State(state): State<AppState>,
    payload: Result<Json<EmbeddingsRequest>, JsonRejection>,
) -> ApiResult<EmbeddingsResponse> {
    let Json(body) = payload?;
    let embedder = &state.rag.embedder;
    let model = body
        .model
        .unwrap_or_else(|| embedder.default_model().to_string());

    let embeddings = embedder.embed(&body.texts, &model).await?;
    Ok(Json(EmbeddingsResponse { embeddings }))
}

async fn collection_status(
    State(state): State<AppState>,
    query: Result<Query<CollectionQuery>, QueryRejection>,
) -> ApiResult<CollectionStatus> {
    let Query(query) = query?;
    let collection = query
        .collection
        .unwrap_or_else(|| state.rag.config.collection_name.clone());

    let dimension = state.rag.index.collection_dimension(&collection).await?;
    Ok(Json(CollectionStatus {
        exists: dimension.is_some(),
        dimension,
        collection,
    }))
}

async fn insert_vectors(
    State(state): State<AppState>,
    payload: Result<Json<InsertRequest>, JsonRejection>,
) -> ApiResult<InsertResponse> {
    let Json(body) = payload?;
    if body.data.is_empty() {
        return Err(RagError::Validation("data must contain at least one row".into()).into());
    }
    if let Some(row) = body.data.iter().find(|row| row.text.trim().is_empty()) {
        return Err(RagError::Validation(format!(
            "row {} has empty text",
            row.id.as_deref().unwrap_or("without id")
        ))
        .into());
    }

    let rag = &state.rag;
    let collection = body
        .collection
        .unwrap_or_else(|| rag.config.collection_name.clone());
    let entries: Vec<IndexEntry> = body.data.into_iter().map(InsertRow::into_entry).collect();

    rag.index
        .ensure_collection(&collection, rag.config.embedding_dimension)
        .await?;
    let inserted = rag.index.insert(&collection, &entries).await?;
    Ok(Json(InsertResponse {
        collection,
        inserted,
    }))
}

async fn ask(
    State(state): State<AppState>,
    payload: Result<Json<AskPayload>, JsonRejection>,
) -> ApiResult<RagResponse> {
    let Json(body) = payload?;
    let options = AskOptions {
        model: body.model,
        collection: body.collection,
        stream: body.stream,
        ..AskOptions::default()
    };

    let answer = state.rag.orchestrator.answer(&body.question, &options).await?;
    Ok(Json(RagResponse::from(answer)))
}

async fn ingest(
    State(state): State<AppState>,
    payload: Result<Json<IngestPayload>, JsonRejection>,
) -> ApiResult<IngestResponse> {
    let Json(body) = payload?;
    if body.document_id.trim().is_empty() {
        return Err(RagError::Validation("document_id must not be empty".into()).into());
    }
    if body.text.trim().is_empty() {
        return Err(RagError::Validation("text must not be empty".into()).into());
    }

    let collection = body
        .collection
        .unwrap_or_else(|| state.rag.config.collection_name.clone());
    let document = Document::new(body.document_id.trim(), body.text);
    let segments = state.rag.orchestrator.ingest(&[document], &collection).await?;

    Ok(Json(IngestResponse {
        collection,
        segments: segments.into_iter().map(|s| s.id).collect(),
    }))
}
