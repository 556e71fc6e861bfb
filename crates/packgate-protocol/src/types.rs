//! Core types shared by every packgate layer.
//!
//! Everything here either travels over the host bridge or ends up in the
//! persistence store, so every type derives `Serialize`/`Deserialize`
//! and the JSON shape is pinned down by the tests at the bottom.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A globally unique, stable player identifier.
///
/// Proxies identify players by a UUID that survives reconnects and
/// server switches, so that is exactly what we store. It is the only key
/// used by both the session tracker and the persistence store.
///
/// On the wire and in the database the id is written in the usual
/// hyphenated form (`"069a79f4-44e9-4726-a5be-fca90e38aaf5"`). Parsing
/// also accepts the 32-digit form without hyphens, which is what some
/// account APIs hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Builds an id from its 128-bit value.
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for PlayerId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(PlayerId)
            .map_err(|_| ProtocolError::InvalidPlayerId(s.to_string()))
    }
}

impl From<Uuid> for PlayerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// The registered name of a backend server behind the proxy
/// (`"lobby"`, `"survival"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerName(pub String);

impl ServerName {
    /// Creates a server name from anything string-like.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a `&str`.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// PackStatus
// ---------------------------------------------------------------------------

/// What a client reported about the pack it was offered.
///
/// ```text
/// offer ──→ Accepted ──→ Successful
///   │           └──────→ FailedDownload
///   └─────→ Declined
/// ```
///
/// `Accepted` only means "the player clicked yes"; the download is still
/// running. `Successful`, `Declined` and `FailedDownload` are terminal.
///
/// Proxies report a few more statuses (`DOWNLOADED`, `INVALID_URL`,
/// `DISCARDED`, ...). Those all deserialize into [`PackStatus::Unknown`]
/// and the state machine ignores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PackStatus {
    /// The player agreed to download; the download has not finished.
    Accepted,
    /// The pack downloaded and applied.
    Successful,
    /// The player refused the pack.
    Declined,
    /// The player agreed but the download failed.
    FailedDownload,
    /// Any status this version doesn't know about.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for PackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Accepted => "ACCEPTED",
            Self::Successful => "SUCCESSFUL",
            Self::Declined => "DECLINED",
            Self::FailedDownload => "FAILED_DOWNLOAD",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// PackOffer
// ---------------------------------------------------------------------------

/// A fully built pack offer, ready for the proxy to forward to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackOffer {
    /// Where the client downloads the pack from.
    pub url: String,

    /// Raw SHA-1 digest (20 bytes) the client verifies the download
    /// against. `None` means the pack is sent unverified.
    pub hash: Option<Vec<u8>>,

    /// Text shown on the client's prompt. Legacy `§` colour codes are
    /// passed through untouched; rendering is the proxy's job.
    pub prompt: String,

    /// Whether the client must accept to stay connected.
    pub force: bool,
}

// ---------------------------------------------------------------------------
// BridgeMessage
// ---------------------------------------------------------------------------

/// Every message exchanged with the proxy plugin over the host bridge.
///
/// Internally tagged (`{"type": "ProxyLogin", "player": "..."}`) so the
/// plugin side can switch on a single field.
///
/// Direction is fixed per variant; the bridge answers a packgate → host
/// message arriving from the host with an `Error` (see
/// [`is_from_host`](Self::is_from_host)).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    // -- Link lifecycle --

    /// Host → packgate: first message on a link. `proxy` names the proxy
    /// instance for logging; `token` is the optional shared secret.
    Handshake {
        version: u32,
        proxy: String,
        token: Option<String>,
    },

    /// packgate → host: the link is ready.
    HandshakeAck { server_time: u64 },

    /// Host → packgate: keep-alive.
    Heartbeat { client_time: u64 },

    /// packgate → host: keep-alive reply echoing the host's clock.
    HeartbeatAck { client_time: u64, server_time: u64 },

    /// Host → packgate: the current backend server registry, in the
    /// proxy's preferred connection order.
    ServerList { servers: Vec<ServerName> },

    // -- Player lifecycle events (host → packgate) --

    /// A player finished logging in to the proxy.
    ProxyLogin { player: PlayerId },

    /// A player is about to connect to a backend. Answered by exactly
    /// one `Verdict` whose `reply_to` is this envelope's `seq`.
    ConnectionAttempt { player: PlayerId, server: ServerName },

    /// The client reported a pack status.
    PackStatus { player: PlayerId, status: PackStatus },

    /// A player left the proxy entirely.
    Disconnect { player: PlayerId },

    /// An operator asked for a player's stored acceptance to be erased.
    ForgetPlayer { player: PlayerId },

    // -- Commands (packgate → host) --

    /// Allow or veto the `ConnectionAttempt` with sequence `reply_to`.
    Verdict { reply_to: u64, allowed: bool },

    /// Send this pack offer to the player.
    SendOffer { player: PlayerId, offer: PackOffer },

    /// Disconnect the player from the proxy with this message.
    Kick { player: PlayerId, message: String },

    /// Move the player to this backend server.
    Connect { player: PlayerId, server: ServerName },

    // -- Errors --

    /// packgate → host: something went wrong. HTTP-style `code`
    /// (400 bad request, 401 unauthorized).
    Error { code: u16, message: String },
}

impl BridgeMessage {
    /// Returns `true` for messages only the host may send.
    pub fn is_from_host(&self) -> bool {
        matches!(
            self,
            Self::Handshake { .. }
                | Self::Heartbeat { .. }
                | Self::ServerList { .. }
                | Self::ProxyLogin { .. }
                | Self::ConnectionAttempt { .. }
                | Self::PackStatus { .. }
                | Self::Disconnect { .. }
                | Self::ForgetPlayer { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// The top-level bridge frame.
///
/// `seq` is per-sender and strictly increasing; packgate uses the host's
/// `seq` of a `ConnectionAttempt` to correlate the `Verdict`.
/// `timestamp` is milliseconds since the sender's link started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub seq: u64,
    pub timestamp: u64,
    pub message: BridgeMessage,
}
