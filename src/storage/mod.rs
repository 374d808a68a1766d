// Storage backend contract consumed by the gateway

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::document::Document;
use crate::filter::{Query, SortSpec};

pub use memory::MemoryStore;

/// Where a request's documents live
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    pub connection: String,
    pub database: String,
    pub collection: String,
}

impl CollectionRef {
    pub fn new(connection: impl Into<String>, database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            connection: connection.into(),
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.database, self.collection)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub sort: SortSpec,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteResult {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage call timed out after {0}ms")]
    Timeout(u64),

    #[error("Storage rejected the request: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn find(&self, target: &CollectionRef, query: &Query, options: &FindOptions) -> Result<Vec<Document>, BackendError>;

    async fn count(&self, target: &CollectionRef, query: &Query) -> Result<u64, BackendError>;

    /// Insert, or replace the record with the same `_id`; returns the stored document
    async fn save(&self, target: &CollectionRef, document: Document) -> Result<Document, BackendError>;

    /// Replace the first record matching `query`
    async fn update_one(&self, target: &CollectionRef, query: &Query, document: Document) -> Result<WriteResult, BackendError>;

    /// Remove every record matching `query`
    async fn remove(&self, target: &CollectionRef, query: &Query) -> Result<WriteResult, BackendError>;
}
