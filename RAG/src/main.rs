use anyhow::{Context, Result};
use clap::Parser;
use grounded_rag::chunker::char_len;
use grounded_rag::document_processor::duplicate_ids;
use grounded_rag::{DocumentProcessor, RagConfig, RagLibrary, VectorBackend};
use std::path::PathBuf;

/// Chunk documents and load them into the configured vector index.
#[derive(Debug, Parser)]
#[command(name = "rag_ingest", version)]
struct Cli {
    /// An `ID:` record file, or a directory of .txt/.pdf documents.
    source: PathBuf,

    /// Target collection (defaults to COLLECTION_NAME).
    #[arg(long)]
    collection: Option<String>,

    /// Maximum segment length in characters (defaults to CHUNK_MAX_LENGTH).
    #[arg(long)]
    max_length: Option<usize>,

    /// Overlap in characters (defaults to CHUNK_OVERLAP).
    #[arg(long)]
    overlap: Option<usize>,

    /// Chunk and report only; nothing is embedded or inserted.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    let mut config = RagConfig::from_env().context("loading configuration")?;
    if let Some(max_length) = cli.max_length {
        config.chunk_max_length = max_length;
    }
    if let Some(overlap) = cli.overlap {
        config.chunk_overlap = overlap;
    }
    if let Some(collection) = &cli.collection {
        config.collection_name = collection.clone();
    }
    config.validate()?;

    let processor = DocumentProcessor::new(config.chunk_max_length, config.chunk_overlap);
    let documents = if cli.source.is_dir() {
        processor.process_documents(&cli.source).await?
    } else {
        processor.load_records(&cli.source).await?
    };
    println!("Loaded {} documents from {}", documents.len(), cli.source.display());

    if cli.dry_run {
        let segments = processor.segment_all(&documents);
        println!("Created {} segments", segments.len());

        for id in duplicate_ids(&segments) {
            println!("  duplicate segment id {} (later segments overwrite earlier ones)", id);
        }

        let over_length = processor.over_length(&segments);
        if over_length.is_empty() {
            println!("All segments are within {} characters", processor.max_length());
        } else {
            println!("Segments over {} characters:", processor.max_length());
            for segment in over_length {
                println!("  {}: {} characters", segment.id, char_len(&segment.text));
            }
        }
        return Ok(());
    }

    if config.vector_backend == VectorBackend::Memory {
        log::warn!("VECTOR_BACKEND is memory; inserted segments are lost when this process exits");
    }

    let collection = config.collection_name.clone();
    let library = RagLibrary::new(config)?;
    let segments = library
        .orchestrator
        .ingest(&documents, &collection)
        .await
        .with_context(|| format!("ingesting into {}", collection))?;

    println!("Inserted {} segments into {}", segments.len(), collection);
    Ok(())
}
