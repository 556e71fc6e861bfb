//! In-memory acceptance store.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use packgate_protocol::PlayerId;
use parking_lot::RwLock;

use crate::{AcceptanceRecord, PersistenceStore, StoreError};

/// A [`PersistenceStore`] that keeps records in a `HashMap`.
///
/// Nothing survives a restart, so this is for tests and for running
/// the bridge with `data_dir` unset. Writes take the lock briefly; the
/// critical sections never call back out.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<PlayerId, AcceptanceRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

impl PersistenceStore for MemoryStore {
    fn record(&self, player: PlayerId) -> Result<Option<AcceptanceRecord>, StoreError> {
        Ok(self.records.read().get(&player).cloned())
    }

    fn set_accepted(
        &self,
        player: PlayerId,
        accepted: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.records
            .write()
            .insert(player, AcceptanceRecord::new(player, accepted, at));
        Ok(())
    }

    fn remove(&self, player: PlayerId) -> Result<bool, StoreError> {
        Ok(self.records.write().remove(&player).is_some())
    }

    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, record| record.last_updated >= cutoff);
        Ok(before - records.len())
    }
}
