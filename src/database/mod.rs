// Document store module
// Typed document records and the MongoDB-backed vector store

pub mod mongo;

use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};

/// A reference document held in the store.
///
/// Ingestion writes these; the backfill job populates `contentVector`; the
/// core never deletes them. Unknown fields on stored documents are ignored on
/// read and never written back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Store-assigned identifier. Opaque to the core: any BSON value the
    /// store uses as `_id` is carried through unchanged.
    #[serde(rename = "_id")]
    pub id: Bson,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub desc: String,
    /// Embedding of the designated content field. Fixed length per embedding
    /// model; absent until the backfill job has visited the document.
    #[serde(rename = "contentVector", skip_serializing_if = "Option::is_none")]
    pub content_vector: Option<Vec<f32>>,
}

/// One similarity search result: a document and its score.
///
/// Sequences of hits are ordered by descending `similarity_score` as returned
/// by the store; ties keep the store's order.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    #[serde(rename = "similarityScore")]
    pub similarity_score: f64,
    pub document: Document,
}
