
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use mongodb::bson::{self, Bson, doc};
use mongodb::error::ErrorKind;
use mongodb::options::{FindOptions, UpdateOneModel, WriteModel};
use mongodb::{Client, Collection, Cursor, Database, Namespace};
use tracing::{debug, info};

use crate::backfill::{BackfillStore, DocumentStream};
use crate::config::MongoConfig;
use crate::database::SearchHit;
use crate::rag::DocumentRetriever;
use crate::{RagError, Result};

pub const VECTOR_INDEX_NAME: &str = "VectorSearchIndex";
pub const VECTOR_FIELD: &str = "contentVector";

/// MongoDB-backed document store with cosine vector search.
///
/// Search and index administration go through Cosmos DB's `cosmosSearch`
/// extensions; everything else is plain driver calls.
pub struct MongoDocumentStore {
    client: Client,
    database: Database,
    collection: Collection<bson::Document>,
    embedding_dimensions: u32,
}

impl MongoDocumentStore {
    /// Connect to the configured account and open the collection, creating it
    /// when it does not exist yet.
    #[inline]
    pub async fn connect(config: &MongoConfig, embedding_dimensions: u32) -> Result<Self> {
        let uri = config.connection_string();
        debug!("Connecting to MongoDB at {}", config.servername);

        let client = Client::with_uri_str(&uri)
            .await
            .map_err(|e| RagError::Store(format!("Failed to connect to MongoDB: {}", e)))?;

        let database = client.database(&config.database);

        let collection_names = database
            .list_collection_names()
            .await
            .map_err(|e| RagError::Store(format!("Failed to list collections: {}", e)))?;

        if !collection_names.contains(&config.collection) {
            database
                .create_collection(&config.collection)
                .await
                .map_err(|e| RagError::Store(format!("Failed to create collection: {}", e)))?;
            info!("Created collection '{}'", config.collection);
        } else {
            info!("Using collection '{}'", config.collection);
        }

        let collection = database.collection::<bson::Document>(&config.collection);

        Ok(Self {
            client,
            database,
            collection,
            embedding_dimensions,
        })
    }

    /// Nearest-neighbor search over `contentVector` by cosine similarity.
    ///
    /// Returns at most `k` hits ordered by descending similarity score; an
    /// empty collection yields an empty vector.
    #[inline]
    pub async fn vector_search(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        debug!("Running vector search with k = {}", k);

        let pipeline = search_pipeline(query_vector, k);

        let mut cursor = self
            .collection
            .aggregate(pipeline)
            .await
            .map_err(|e| RagError::Store(format!("Vector search failed: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(document) = cursor
            .try_next()
            .await
            .map_err(|e| RagError::Store(format!("Failed to read search results: {}", e)))?
        {
            let hit = bson::from_document::<SearchHit>(document)
                .map_err(|e| RagError::Store(format!("Malformed search result: {}", e)))?;
            hits.push(hit);
        }

        debug!("Vector search returned {} hits", hits.len());
        Ok(hits)
    }

    /// Create the named cosine similarity index over `contentVector`.
    ///
    /// Issuing this when the index already exists surfaces the server's
    /// AlreadyExists error to the caller; it is never swallowed or retried.
    #[inline]
    pub async fn create_vector_index(&self) -> Result<()> {
        let command = create_index_command(self.collection.name(), self.embedding_dimensions);

        let result = self
            .database
            .run_command(command)
            .await
            .map_err(|e| RagError::Index(format!("Failed to create vector index: {}", e)))?;

        info!("Created index '{}': {:?}", VECTOR_INDEX_NAME, result);
        Ok(())
    }

    /// Drop the named vector index. Fails if the index is absent.
    #[inline]
    pub async fn drop_vector_index(&self) -> Result<()> {
        self.collection
            .drop_index(VECTOR_INDEX_NAME)
            .await
            .map_err(|e| RagError::Index(format!("Failed to drop vector index: {}", e)))?;

        info!("Dropped index '{}'", VECTOR_INDEX_NAME);
        Ok(())
    }

    /// Open a server-side cursor over every document in the collection.
    ///
    /// The cursor has no server-side idle timeout so long-running jobs can
    /// drain it at their own pace; it is released when dropped.
    #[inline]
    pub async fn all_documents(&self, batch_size: u32) -> Result<Cursor<bson::Document>> {
        let options = FindOptions::builder()
            .no_cursor_timeout(true)
            .batch_size(batch_size)
            .build();

        self.collection
            .find(doc! {})
            .with_options(options)
            .await
            .map_err(|e| RagError::Store(format!("Failed to open document cursor: {}", e)))
    }

    /// Write a batch of vectors in one bulk operation.
    ///
    /// Each write is an idempotent `$set` of `contentVector` keyed by `_id`,
    /// so replays overwrite rather than duplicate. On partial failure the
    /// per-write details are returned inside the error for the caller to log.
    #[inline]
    pub async fn bulk_set_vectors(&self, updates: Vec<VectorUpdate>) -> Result<u64> {
        if updates.is_empty() {
            return Ok(0);
        }

        let namespace = self.namespace();
        let models: Vec<WriteModel> = updates
            .into_iter()
            .map(|update| {
                let vector = vector_to_bson(&update.vector);
                WriteModel::UpdateOne(
                    UpdateOneModel::builder()
                        .namespace(namespace.clone())
                        .filter(doc! { "_id": update.id })
                        .update(doc! { "$set": { VECTOR_FIELD: vector } })
                        .upsert(true)
                        .build(),
                )
            })
            .collect();

        let result = self
            .client
            .bulk_write(models)
            .await
            .map_err(|e| match e.kind.as_ref() {
                ErrorKind::BulkWrite(failure) => RagError::Store(format!(
                    "Bulk write completed with errors: {:?}",
                    failure.write_errors
                )),
                _ => RagError::Store(format!("Bulk write failed: {}", e)),
            })?;

        Ok(u64::try_from(result.modified_count + result.upserted_count).unwrap_or_default())
    }

    /// Count all documents in the collection.
    #[inline]
    pub async fn count_documents(&self) -> Result<u64> {
        self.collection
            .count_documents(doc! {})
            .await
            .map_err(|e| RagError::Store(format!("Failed to count documents: {}", e)))
    }

    fn namespace(&self) -> Namespace {
        self.collection.namespace()
    }
}

#[async_trait]
impl DocumentRetriever for MongoDocumentStore {
    async fn nearest(&self, query_vector: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        self.vector_search(query_vector, k).await
    }
}

#[async_trait]
impl BackfillStore for MongoDocumentStore {
    async fn all_documents(&self, batch_size: u32) -> Result<DocumentStream> {
        let cursor = MongoDocumentStore::all_documents(self, batch_size).await?;
        Ok(cursor
            .map_err(|e| RagError::Store(format!("Failed to read document cursor: {}", e)))
            .boxed())
    }

    async fn bulk_set_vectors(&self, updates: Vec<VectorUpdate>) -> Result<u64> {
        MongoDocumentStore::bulk_set_vectors(self, updates).await
    }
}

/// A queued `contentVector` write for one document.
#[derive(Debug, Clone)]
pub struct VectorUpdate {
    pub id: Bson,
    pub vector: Vec<f32>,
}

fn vector_to_bson(vector: &[f32]) -> Bson {
    Bson::Array(
        vector
            .iter()
            .map(|v| Bson::Double(f64::from(*v)))
            .collect(),
    )
}

fn search_pipeline(query_vector: &[f32], k: usize) -> Vec<bson::Document> {
    vec![
        doc! {
            "$search": {
                "cosmosSearch": {
                    "vector": vector_to_bson(query_vector),
                    "path": VECTOR_FIELD,
                    "k": i64::try_from(k).unwrap_or(i64::MAX),
                },
                "returnStoredSource": true,
            }
        },
        doc! {
            "$project": {
                "similarityScore": { "$meta": "searchScore" },
                "document": "$$ROOT",
            }
        },
    ]
}

fn create_index_command(collection_name: &str, dimensions: u32) -> bson::Document {
    doc! {
        "createIndexes": collection_name,
        "indexes": [
            {
                "name": VECTOR_INDEX_NAME,
                "key": { VECTOR_FIELD: "cosmosSearch" },
                "cosmosSearchOptions": {
                    "kind": "vector-ivf",
                    "numLists": 1,
                    "similarity": "COS",
                    "dimensions": i64::from(dimensions),
                }
            }
        ]
    }
}
