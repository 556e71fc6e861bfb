//! redb-backed acceptance store.
//!
//! # Schema
//!
//! ```text
//! PLAYER_PACK_ACCEPTANCE: player uuid (hyphenated) -> AcceptanceRecord (json)
//! ```

use std::path::Path;

use chrono::{DateTime, Utc};
use packgate_protocol::{Codec, JsonCodec, PlayerId};
use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
};
use tracing::{debug, info};

use crate::{AcceptanceRecord, PersistenceStore, StoreError};

const PLAYER_PACK_ACCEPTANCE: TableDefinition<&str, &[u8]> =
    TableDefinition::new("player_pack_acceptance");

/// Acceptance records in a single redb file.
///
/// redb commits are durable by default (fsync on commit), which is what
/// the "survives a restart" contract needs. Readers never block writers,
/// so the gating-path lookup stays fast even while another player's
/// acceptance is being written.
pub struct RedbStore {
    db: Database,
    codec: JsonCodec,
}

impl RedbStore {
    /// Opens (or creates) the database at `path`, creating parent
    /// directories and the table as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::create(path)?;

        // Read transactions fail on a table that was never created, so
        // make sure it exists before the first lookup.
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PLAYER_PACK_ACCEPTANCE)?;
        }
        write_txn.commit()?;

        info!(path = %path.display(), "acceptance store opened");
        Ok(Self {
            db,
            codec: JsonCodec,
        })
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize, StoreError> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PLAYER_PACK_ACCEPTANCE)?;
        Ok(table.len()? as usize)
    }

    /// Returns `true` if no records are stored.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }
}

impl PersistenceStore for RedbStore {
    fn record(&self, player: PlayerId) -> Result<Option<AcceptanceRecord>, StoreError> {
        let key = player.to_string();
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PLAYER_PACK_ACCEPTANCE)?;

        match table.get(key.as_str())? {
            Some(value) => Ok(Some(self.codec.decode(value.value())?)),
            None => Ok(None),
        }
    }

    fn set_accepted(
        &self,
        player: PlayerId,
        accepted: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let key = player.to_string();
        let value = self
            .codec
            .encode(&AcceptanceRecord::new(player, accepted, at))?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(PLAYER_PACK_ACCEPTANCE)?;
            table.insert(key.as_str(), value.as_slice())?;
        }
        write_txn.commit()?;

        debug!(%player, accepted, "acceptance record written");
        Ok(())
    }

    fn remove(&self, player: PlayerId) -> Result<bool, StoreError> {
        let key = player.to_string();
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(PLAYER_PACK_ACCEPTANCE)?;
            table.remove(key.as_str())?.is_some()
        };
        write_txn.commit()?;

        if removed {
            debug!(%player, "acceptance record removed");
        }
        Ok(removed)
    }

    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let write_txn = self.db.begin_write()?;
        let mut evicted = 0;
        {
            let mut table = write_txn.open_table(PLAYER_PACK_ACCEPTANCE)?;

            // Mutating while iterating isn't allowed; collect first.
            let mut stale = Vec::new();
            for item in table.iter()? {
                let (key, value) = item?;
                let record: AcceptanceRecord = self.codec.decode(value.value())?;
                if record.last_updated < cutoff {
                    stale.push(key.value().to_string());
                }
            }

            for key in stale {
                if table.remove(key.as_str())?.is_some() {
                    evicted += 1;
                }
            }
        }
        write_txn.commit()?;

        if evicted > 0 {
            info!(evicted, %cutoff, "evicted stale acceptance records");
        }
        Ok(evicted)
    }
}
