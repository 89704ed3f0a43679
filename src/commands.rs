use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::backfill::BackfillJob;
use crate::config::Config;
use crate::database::mongo::MongoDocumentStore;
use crate::openai::OpenAiClient;
use crate::rag::RagEngine;
use crate::server;

async fn connect_store(config: &Config) -> Result<Arc<MongoDocumentStore>> {
    let store =
        MongoDocumentStore::connect(&config.mongodb, config.openai.embedding_dimensions)
            .await
            .context("Failed to connect to the document store")?;
    Ok(Arc::new(store))
}

/// Start the HTTP chat server.
#[inline]
pub async fn serve(config: Config) -> Result<()> {
    let store = connect_store(&config).await?;
    let openai = Arc::new(OpenAiClient::new(&config.openai)?);

    let engine = RagEngine::new(Arc::<OpenAiClient>::clone(&openai), store, openai);

    info!("Starting chat server on {}", config.server.bind_address());
    server::serve(&config.server, Arc::new(engine))
        .await
        .context("Server error")?;
    Ok(())
}

/// Populate `contentVector` on every stored document from `field`.
#[inline]
pub async fn backfill(config: Config, field: String) -> Result<()> {
    let store = connect_store(&config).await?;
    let openai = Arc::new(OpenAiClient::new(&config.openai)?);

    let total = store.count_documents().await?;
    info!("Backfilling embeddings for {} documents", total);

    let job = BackfillJob::new(store, openai);
    let stats = job.run(&field).await.context("Backfill job failed")?;

    println!(
        "Backfill complete: {} documents processed, {} batches flushed, {} batches failed",
        stats.documents_processed, stats.batches_flushed, stats.batches_failed
    );
    Ok(())
}

/// Create the cosine similarity index over `contentVector`.
#[inline]
pub async fn create_index(config: Config) -> Result<()> {
    let store = connect_store(&config).await?;
    store
        .create_vector_index()
        .await
        .context("Index creation failed")?;
    println!("Vector index created.");
    Ok(())
}

/// Drop the vector search index.
#[inline]
pub async fn drop_index(config: Config) -> Result<()> {
    let store = connect_store(&config).await?;
    store
        .drop_vector_index()
        .await
        .context("Index deletion failed")?;
    println!("Vector index dropped.");
    Ok(())
}

/// Run a similarity search and print each hit.
#[inline]
pub async fn search(config: Config, query: String, limit: usize) -> Result<()> {
    let store = connect_store(&config).await?;
    let openai = Arc::new(OpenAiClient::new(&config.openai)?);

    let engine = RagEngine::new(Arc::<OpenAiClient>::clone(&openai), store, openai);
    let hits = engine.similarity_search(&query, limit).await?;

    if hits.is_empty() {
        println!("No matching documents.");
        return Ok(());
    }

    for hit in &hits {
        println!("Similarity Score: {}", hit.similarity_score);
        println!("Title: {}", hit.document.title);
        println!("Content: {}\n", hit.document.desc);
    }
    Ok(())
}
