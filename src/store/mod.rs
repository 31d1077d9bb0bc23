// src/store/mod.rs
// =============================================================================
// The record store: where address records live between runs.
//
// The core only needs three operations:
// - bulk_insert: create many records at once (Seeder)
// - scan: stream every record with its store identity (Prober)
// - update: merge a partial document into one record (Prober)
//
// Implementations:
// - MemoryStore: in-process map, used by tests and small runs
// - ElasticStore: Elasticsearch over its REST API
//
// The index a store writes to is fixed when the handle is built, so callers
// never pass it around.
// =============================================================================

mod elastic;
mod memory;

pub use elastic::ElasticStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::StoreError;
use crate::record::{AddressRecord, Snapshot};

/// A record together with the identity the store assigned to it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub record: AddressRecord,
}

/// Per-item tally of one bulk insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub created: usize,
    /// Items whose key already existed; left untouched
    pub already_present: usize,
    /// Items the store refused for any other reason
    pub failed: usize,
}

/// Document store holding one record per address.
///
/// Keys are the address strings. `bulk_insert` has create semantics: an
/// existing key is never overwritten or duplicated.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Creates many records in one request.
    async fn bulk_insert(&self, records: Vec<AddressRecord>) -> Result<BulkOutcome, StoreError>;

    /// Streams every record (match-all).
    fn scan(&self) -> BoxStream<'_, Result<StoredRecord, StoreError>>;

    /// Merges `snapshot` into the record stored under `id`.
    async fn update(&self, id: &str, snapshot: &Snapshot) -> Result<(), StoreError>;
}
