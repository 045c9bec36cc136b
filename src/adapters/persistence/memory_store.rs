//! Implements RecordStore in memory. Used by tests and when no data directory is configured.
//!
//! Writes for selected owners can be made to fail, to exercise partial fan-out failure.

use crate::domain::{DomainError, ParticipantId};
use crate::ports::RecordStore;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct StoreData {
    collections: HashMap<(ParticipantId, String), Vec<serde_json::Value>>,
    next_id: u64,
}

#[derive(Default)]
pub struct MemoryRecordStore {
    data: RwLock<StoreData>,
    failing_owners: RwLock<HashSet<ParticipantId>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent write to `owner_id` fails with `DomainError::Write`.
    pub async fn fail_writes_for(&self, owner_id: impl Into<ParticipantId>) {
        self.failing_owners.write().await.insert(owner_id.into());
    }

    pub async fn count(&self, owner_id: &ParticipantId, collection: &str) -> usize {
        self.data
            .read()
            .await
            .collections
            .get(&(owner_id.clone(), collection.to_string()))
            .map_or(0, Vec::len)
    }
}

#[async_trait::async_trait]
impl RecordStore for MemoryRecordStore {
    async fn write(
        &self,
        owner_id: &ParticipantId,
        collection: &str,
        record: serde_json::Value,
    ) -> Result<String, DomainError> {
        if self.failing_owners.read().await.contains(owner_id) {
            return Err(DomainError::Write(format!(
                "{}/{} rejected the write",
                owner_id, collection
            )));
        }
        let mut data = self.data.write().await;
        data.next_id += 1;
        let id = format!("rec-{}", data.next_id);
        data.collections
            .entry((owner_id.clone(), collection.to_string()))
            .or_default()
            .push(record);
        debug!(owner = %owner_id, collection, record_id = %id, "record written (memory)");
        Ok(id)
    }

    async fn list(
        &self,
        owner_id: &ParticipantId,
        collection: &str,
    ) -> Result<Vec<serde_json::Value>, DomainError> {
        Ok(self
            .data
            .read()
            .await
            .collections
            .get(&(owner_id.clone(), collection.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}
