//! The `PersistenceStore` trait: the seam between the state machine and
//! whatever keeps acceptance records on disk.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use packgate_protocol::PlayerId;

use crate::{AcceptanceRecord, StoreError};

/// Durable mapping from player to [`AcceptanceRecord`].
///
/// # Contract
///
/// - A lookup miss is `Ok(None)` / `Ok(false)`, never an error.
/// - [`set_accepted`](Self::set_accepted) is an upsert: calling it twice
///   with the same arguments leaves the same final state, and a later
///   call replaces the timestamp.
/// - A write that returns `Ok` survives a process restart.
/// - Keys are independent. Implementations only need per-key
///   consistency; there are no cross-player transactions.
///
/// Methods are synchronous on purpose: every call is a local, indexed
/// lookup, and the state machine calls them while holding a per-player
/// lock, where an `.await` would be out of place.
pub trait PersistenceStore: Send + Sync + 'static {
    /// Returns the stored record for `player`, if any.
    fn record(&self, player: PlayerId) -> Result<Option<AcceptanceRecord>, StoreError>;

    /// Upserts the record for `player`.
    fn set_accepted(
        &self,
        player: PlayerId,
        accepted: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Deletes the record for `player`. Returns `true` if one existed.
    ///
    /// Only used for explicit data-removal requests; the acceptance flow
    /// never deletes.
    fn remove(&self, player: PlayerId) -> Result<bool, StoreError>;

    /// Deletes every record last updated before `cutoff`. Returns how
    /// many were removed.
    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Returns `true` iff a record exists and says `accepted`.
    fn has_accepted(&self, player: PlayerId) -> Result<bool, StoreError> {
        Ok(self.record(player)?.is_some_and(|record| record.accepted))
    }
}

/// Shared stores: the bridge hands one `Arc<RedbStore>` to every host
/// link's state machine.
impl<S: PersistenceStore + ?Sized> PersistenceStore for Arc<S> {
    fn record(&self, player: PlayerId) -> Result<Option<AcceptanceRecord>, StoreError> {
        (**self).record(player)
    }

    fn set_accepted(
        &self,
        player: PlayerId,
        accepted: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        (**self).set_accepted(player, accepted, at)
    }

    fn remove(&self, player: PlayerId) -> Result<bool, StoreError> {
        (**self).remove(player)
    }

    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        (**self).evict_older_than(cutoff)
    }

    fn has_accepted(&self, player: PlayerId) -> Result<bool, StoreError> {
        (**self).has_accepted(player)
    }
}
