//! Record store boundary
//!
//! The pipeline treats persistence as an abstract keyed document store with
//! a per-record `processed` flag. The trait below is the whole contract the
//! router and synchronizer rely on; the SQLite implementation lives in
//! `sqlite` and anything else (in-memory mocks in tests) can stand in.

pub mod sqlite;

use crate::pipeline::types::Record;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Errors surfaced by a record store backend.
#[derive(Debug)]
pub enum StoreError {
    /// Store could not be opened or its schema prepared.
    Open(String),
    /// A read or write against the store failed.
    Query(String),
    /// Collection name contains characters the backend cannot accept.
    InvalidCollection(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Open(msg) => write!(f, "store open error: {}", msg),
            StoreError::Query(msg) => write!(f, "store query error: {}", msg),
            StoreError::InvalidCollection(name) => {
                write!(f, "invalid collection name: {}", name)
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// One fetched record together with its store key.
#[derive(Debug, Clone)]
pub struct StoredRecord {
    pub id: i64,
    pub record: Record,
}

/// Abstract keyed document store with a per-record processed flag.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert one record.
    async fn insert(&self, record: &Record) -> Result<(), StoreError>;

    /// Insert many records at once. An empty slice is a warned no-op.
    async fn insert_batch(&self, records: &[Record]) -> Result<(), StoreError>;

    /// All records with `processed = false` captured at or after `since`,
    /// in insertion order.
    async fn fetch_unprocessed(&self, since: DateTime<Utc>) -> Result<Vec<StoredRecord>, StoreError>;

    /// Flip `processed` to true for the given keys in one batched update.
    /// Monotonic and idempotent: keys already processed stay processed.
    async fn mark_processed(&self, ids: &[i64]) -> Result<(), StoreError>;
}
