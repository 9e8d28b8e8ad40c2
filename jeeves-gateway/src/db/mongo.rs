//! MongoDB client and collection wrapper

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::{
    error::{ErrorKind, WriteFailure},
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::db::schemas::Metadata;
use crate::types::GatewayError;

/// Server error code for a unique index violation
const DUPLICATE_KEY_CODE: i32 = 11000;

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping
    pub async fn new(uri: &str, db_name: &str) -> Result<Self, GatewayError> {
        info!(db = %db_name, "Connecting to MongoDB");

        // Fail fast instead of hanging on an unreachable server
        let timeout_uri = if uri.contains('?') {
            format!("{}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        } else {
            format!("{}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000", uri)
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| GatewayError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection, applying its indexes
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>, GatewayError>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    async fn new(client: &Client, db_name: &str, collection_name: &str) -> Result<Self, GatewayError> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<(), GatewayError> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| GatewayError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps
    ///
    /// A unique index violation comes back as [`GatewayError::DuplicateKey`].
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId, GatewayError> {
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(DateTime::now());
        metadata.updated_at = Some(DateTime::now());

        let result = self.inner.insert_one(item).await.map_err(|e| {
            if is_duplicate_key(&e) {
                GatewayError::DuplicateKey(e.to_string())
            } else {
                GatewayError::Database(format!("Insert failed: {}", e))
            }
        })?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| GatewayError::Database("Failed to get inserted ID".into()))
    }

    /// Find one live (not soft-deleted) document
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>, GatewayError> {
        let mut full_filter = filter;
        full_filter.insert("metadata.is_deleted", doc! { "$ne": true });

        self.inner
            .find_one(full_filter)
            .await
            .map_err(|e| GatewayError::Database(format!("Find failed: {}", e)))
    }

    /// Update one document
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult, GatewayError> {
        self.inner
            .update_one(filter, update.into())
            .await
            .map_err(|e| GatewayError::Database(format!("Update failed: {}", e)))
    }
}

fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    matches!(
        error.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(we)) if we.code == DUPLICATE_KEY_CODE
    )
}
