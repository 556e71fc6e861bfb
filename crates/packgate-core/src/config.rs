//! Pack configuration and offer policy.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OfferPolicy
// ---------------------------------------------------------------------------

/// When the pack is offered during a session.
///
/// Proxy pack plugins come in two flavours that don't agree with each
/// other, so the choice is explicit:
///
/// - **Login**: offer once, right after proxy login. Every backend
///   connection attempt is denied until the offer resolves; on success
///   the player is moved on to the backend they were trying to reach.
/// - **EverySwitch**: offer at login, and again on every later backend
///   switch unless the player already accepted. Switch-time offers don't
///   deny the switch itself; gating only applies while an offer from an
///   earlier event is still outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferPolicy {
    #[default]
    Login,
    EverySwitch,
}

// ---------------------------------------------------------------------------
// PackConfig
// ---------------------------------------------------------------------------

/// What to offer and how to react to the answer.
///
/// Loaded once at startup and read-only afterwards. Every field has a
/// default, so a config file only needs the fields it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// Download URL handed to the client.
    pub url: String,

    /// SHA-1 of the pack as 40 lowercase hex digits. Empty means "don't
    /// verify". A malformed value is ignored with a warning.
    pub sha1: String,

    /// Prompt text shown with the offer.
    pub prompt: String,

    /// Kick the player if they decline.
    pub kick_on_decline: bool,

    /// Kick the player if the download fails.
    pub kick_on_failed_download: bool,

    /// Kick message for a decline.
    pub decline_message: String,

    /// Kick message for a failed download.
    pub failure_message: String,

    /// Skip the offer for players whose stored record says they already
    /// accepted in an earlier session.
    pub offer_only_once: bool,

    /// When offers are made; see [`OfferPolicy`].
    pub policy: OfferPolicy,

    /// After a successful download, move the player to the backend they
    /// were denied (or the first registered one if they never reached a
    /// backend). When off, the next attempt is simply let through.
    pub reconnect_on_success: bool,
}

impl PackConfig {
    /// Whether the client should treat the offer as mandatory. A pack
    /// the player can't refuse without being kicked is a forced pack.
    pub fn force(&self) -> bool {
        self.kick_on_decline || self.kick_on_failed_download
    }
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            url: "https://example.com/resourcepack.zip".to_string(),
            sha1: String::new(),
            prompt: "§aPlease accept the resource pack to play!".to_string(),
            kick_on_decline: true,
            kick_on_failed_download: true,
            decline_message: "§cYou must accept the resource pack to play!".to_string(),
            failure_message: "§cResource pack download failed!".to_string(),
            offer_only_once: true,
            policy: OfferPolicy::Login,
            reconnect_on_success: true,
        }
    }
}
