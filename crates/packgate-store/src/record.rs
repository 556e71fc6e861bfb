//! The persisted acceptance record.

use chrono::{DateTime, Utc};
use packgate_protocol::PlayerId;
use serde::{Deserialize, Serialize};

/// One player's last-known pack acceptance.
///
/// Created on the first successful download, then upserted (newest
/// write wins). Declines and failed downloads never create one, so a
/// missing record simply means "not accepted".
///
/// `last_updated` is stored as Unix milliseconds, the same resolution
/// the proxy's own clock reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceRecord {
    pub player: PlayerId,
    pub accepted: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_updated: DateTime<Utc>,
}

impl AcceptanceRecord {
    pub fn new(player: PlayerId, accepted: bool, last_updated: DateTime<Utc>) -> Self {
        Self {
            player,
            accepted,
            last_updated,
        }
    }
}
