mod answer_request;
mod api_error;
mod embeddings_request;
mod insert_request;
mod query_payload;
mod rag_response;
mod routes;
mod state;

use anyhow::{Context, Result};
use grounded_rag::{RagConfig, RagLibrary};
use routes::app_router;
use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment variables and logging
    dotenv::dotenv().ok();
    env_logger::init();

    let config = RagConfig::from_env().context("loading configuration")?;
    let bind_addr = config.bind_addr.clone();
    let collection = config.collection_name.clone();
    let dimension = config.embedding_dimension;

    let rag = RagLibrary::new(config).context("initializing RAG library")?;
    rag.index
        .ensure_collection(&collection, dimension)
        .await
        .with_context(|| format!("preparing collection {}", collection))?;
    log::info!("RAG library initialized, collection {} ready", collection);

    let app = app_router(AppState::new(rag));
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {}", bind_addr))?;
    log::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
    }
}
