
use async_trait::async_trait;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use mongodb::bson::{self, Bson};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::database::mongo::VectorUpdate;
use crate::rag::EmbeddingProvider;
use crate::Result;

/// Upserts are flushed in bulk batches of this size; the server-side cursor
/// uses the same figure for its fetch batches.
pub const BACKFILL_BATCH_SIZE: usize = 50;

/// Raw documents drained from the store, in store order.
pub type DocumentStream = BoxStream<'static, Result<bson::Document>>;

/// Store surface the job runs against: a full collection scan plus bulk
/// vector writes.
#[async_trait]
pub trait BackfillStore: Send + Sync {
    async fn all_documents(&self, batch_size: u32) -> Result<DocumentStream>;
    async fn bulk_set_vectors(&self, updates: Vec<VectorUpdate>) -> Result<u64>;
}

/// Counts reported by a completed backfill run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillStats {
    pub documents_processed: usize,
    pub batches_flushed: usize,
    pub batches_failed: usize,
}

/// Batch job that populates `contentVector` on every document from a
/// designated source field.
///
/// At-least-once: each write is an idempotent full overwrite keyed by `_id`,
/// so an interrupted or repeated run never corrupts the field. Concurrent
/// runs are not coordinated.
pub struct BackfillJob {
    store: Arc<dyn BackfillStore>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl BackfillJob {
    #[inline]
    pub fn new(store: Arc<dyn BackfillStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedder }
    }

    /// Walk the whole collection and recompute `contentVector` from `field`.
    ///
    /// A bulk write failure is logged and iteration continues with the next
    /// batch; any other error aborts the job. Dropping the stream on any exit
    /// path releases the underlying server-side cursor.
    #[inline]
    pub async fn run(&self, field: &str) -> Result<BackfillStats> {
        info!("Starting embedding backfill for field '{}'", field);

        let batch_size = u32::try_from(BACKFILL_BATCH_SIZE).unwrap_or(u32::MAX);
        let mut documents = self.store.all_documents(batch_size).await?;

        let mut stats = BackfillStats::default();
        let mut pending: Vec<VectorUpdate> = Vec::with_capacity(BACKFILL_BATCH_SIZE);

        while let Some(document) = documents.try_next().await? {
            let Some(id) = document.get("_id").cloned() else {
                warn!("Skipping document without _id");
                continue;
            };

            let content = canonical_text(document.get(field));
            let vector = self.embedder.embed(&content).await?;

            pending.push(VectorUpdate { id, vector });
            stats.documents_processed += 1;

            if pending.len() >= BACKFILL_BATCH_SIZE {
                self.flush(&mut pending, &mut stats).await;
            }
        }

        if !pending.is_empty() {
            self.flush(&mut pending, &mut stats).await;
        }

        info!(
            "Backfill finished: {} documents, {} batches flushed, {} batches failed",
            stats.documents_processed, stats.batches_flushed, stats.batches_failed
        );
        Ok(stats)
    }

    async fn flush(&self, pending: &mut Vec<VectorUpdate>, stats: &mut BackfillStats) {
        let batch = std::mem::take(pending);
        let batch_len = batch.len();

        match self.store.bulk_set_vectors(batch).await {
            Ok(written) => {
                stats.batches_flushed += 1;
                info!(
                    "Bulk update completed for {} documents ({} written)",
                    stats.documents_processed, written
                );
            }
            Err(e) => {
                stats.batches_failed += 1;
                error!("Bulk write of {} documents failed: {}", batch_len, e);
            }
        }
    }
}

/// Canonical serialization of a document field for embedding.
///
/// The value is rendered as JSON with sorted map keys; BSON types without a
/// JSON equivalent go through relaxed extended JSON. A missing field embeds
/// as the JSON empty string, so re-running the job over unchanged documents
/// always reproduces the same input text.
#[inline]
pub fn canonical_text(value: Option<&Bson>) -> String {
    let json = value
        .cloned()
        .unwrap_or_else(|| Bson::String(String::new()))
        .into_relaxed_extjson();
    serde_json::to_string(&json).unwrap_or_default()
}
