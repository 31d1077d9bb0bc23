// src/store/memory.rs
// =============================================================================
// An in-memory RecordStore.
//
// Records are kept in a BTreeMap keyed by address, behind a tokio RwLock so
// many workers can insert and update at the same time. A scan takes a copy of
// the records at the moment it starts, like a point-in-time scroll would.
// =============================================================================

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::{BulkOutcome, RecordStore, StoredRecord};
use crate::error::StoreError;
use crate::record::{AddressRecord, Snapshot};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<BTreeMap<String, AddressRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub async fn get(&self, id: &str) -> Option<AddressRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// Puts a record in place regardless of what was there.
    pub async fn put(&self, record: AddressRecord) {
        self.records
            .write()
            .await
            .insert(record.id().to_string(), record);
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn bulk_insert(&self, records: Vec<AddressRecord>) -> Result<BulkOutcome, StoreError> {
        let mut outcome = BulkOutcome::default();
        let mut map = self.records.write().await;

        for record in records {
            if map.contains_key(record.id()) {
                outcome.already_present += 1;
            } else {
                map.insert(record.id().to_string(), record);
                outcome.created += 1;
            }
        }

        Ok(outcome)
    }

    fn scan(&self) -> BoxStream<'_, Result<StoredRecord, StoreError>> {
        stream::once(async move {
            let map = self.records.read().await;
            map.iter()
                .map(|(id, record)| {
                    Ok(StoredRecord {
                        id: id.clone(),
                        record: record.clone(),
                    })
                })
                .collect::<Vec<_>>()
        })
        .flat_map(stream::iter)
        .boxed()
    }

    async fn update(&self, id: &str, snapshot: &Snapshot) -> Result<(), StoreError> {
        let mut map = self.records.write().await;
        let record = map
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        record.apply(snapshot);
        Ok(())
    }
}
