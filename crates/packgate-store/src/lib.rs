//! Persistence for packgate: who has already accepted the pack.
//!
//! The state machine only needs three operations (look up, upsert,
//! delete) keyed by [`PlayerId`](packgate_protocol::PlayerId), so the
//! seam is the small [`PersistenceStore`] trait. Two implementations:
//!
//! - [`RedbStore`]: an embedded, crash-safe redb database file. Reads
//!   are local B-tree lookups, cheap enough to sit on the connection
//!   gating path.
//! - [`MemoryStore`]: a map behind a lock, for tests and for running
//!   without a data directory.

mod error;
mod memory;
mod record;
mod redb_store;
mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use record::AcceptanceRecord;
pub use redb_store::RedbStore;
pub use store::PersistenceStore;
