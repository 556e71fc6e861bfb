//! Session types: what we remember about one player's proxy connection.

use std::fmt;
use std::time::Instant;

use packgate_protocol::{PlayerId, ServerName};

// ---------------------------------------------------------------------------
// AcceptanceState
// ---------------------------------------------------------------------------

/// Where a player stands with respect to the pack, within one session.
///
/// ```text
///               ┌──(history says accepted)──────────────┐
///               │                                       ▼
/// NotOffered ──(offer)──→ OfferSent ──(SUCCESSFUL)──→ Accepted
///                             │  ▲
///                 (DECLINED / │  │ (re-offer on a backend switch,
///                  FAILED)    ▼  │  every-switch policy only)
///                         Declined / Failed
/// ```
///
/// - **NotOffered**: no offer this session. Also the implicit state of a
///   player with no session at all.
/// - **OfferSent**: an offer is outstanding. Every backend connection
///   attempt is denied while here.
/// - **Accepted**: the pack is on the client. Terminal for the session.
/// - **Declined** / **Failed**: the offer ended badly. Usually followed
///   by a kick, which ends the session anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcceptanceState {
    #[default]
    NotOffered,
    OfferSent,
    Accepted,
    Declined,
    Failed,
}

impl AcceptanceState {
    /// Returns `true` if an offer is outstanding.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::OfferSent)
    }

    /// Returns `true` if moving to `target` is a legal transition.
    pub fn can_transition_to(self, target: Self) -> bool {
        use AcceptanceState::*;
        matches!(
            (self, target),
            (NotOffered, OfferSent)
                | (NotOffered, Accepted)
                | (OfferSent, Accepted)
                | (OfferSent, Declined)
                | (OfferSent, Failed)
                | (OfferSent, NotOffered)
                | (Declined, OfferSent)
                | (Failed, OfferSent)
        )
    }
}

impl fmt::Display for AcceptanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotOffered => write!(f, "NotOffered"),
            Self::OfferSent => write!(f, "OfferSent"),
            Self::Accepted => write!(f, "Accepted"),
            Self::Declined => write!(f, "Declined"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Transient, per-connection state for one player.
///
/// Lives from proxy login to proxy disconnect. A leaked entry would gate
/// the player with stale state on their next login, so the tracker drops
/// it unconditionally on disconnect.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Whose session this is.
    pub player: PlayerId,

    /// Acceptance progress. "Offer outstanding" is `stage == OfferSent`.
    pub stage: AcceptanceState,

    /// Set at login, cleared by the first backend connection attempt
    /// that is let through. While set, the player has not reached any
    /// backend yet.
    pub first_join: bool,

    /// The backend the player last tried (and was denied) while the
    /// offer was outstanding. Used to resume them after a success.
    pub intended_server: Option<ServerName>,

    /// When the session was opened.
    pub opened_at: Instant,
}

impl SessionState {
    /// A fresh session: nothing offered, nothing consumed.
    pub fn new(player: PlayerId) -> Self {
        Self {
            player,
            stage: AcceptanceState::NotOffered,
            first_join: false,
            intended_server: None,
            opened_at: Instant::now(),
        }
    }

    /// Returns `true` while an offer is outstanding.
    pub fn is_pending(&self) -> bool {
        self.stage.is_pending()
    }

    /// Marks an offer as outstanding.
    pub fn mark_pending(&mut self) {
        self.stage = AcceptanceState::OfferSent;
    }

    /// Clears an outstanding offer without resolving it (e.g. the offer
    /// could not be delivered). Returns `true` if one was outstanding.
    pub fn clear_pending(&mut self) -> bool {
        if self.stage.is_pending() {
            self.stage = AcceptanceState::NotOffered;
            true
        } else {
            false
        }
    }

    /// Records that this connection is the session's first join.
    pub fn mark_first_join(&mut self) {
        self.first_join = true;
    }

    /// Test-and-clear of the first-join flag.
    pub fn consume_first_join(&mut self) -> bool {
        std::mem::take(&mut self.first_join)
    }
}
