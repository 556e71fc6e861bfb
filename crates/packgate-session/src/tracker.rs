//! The session tracker: every connected player's transient state.
//!
//! # Concurrency
//!
//! Lifecycle events for one player can arrive on different tasks at
//! nearly the same time (a pack status racing a server switch). The
//! tracker therefore uses a two-level lock:
//!
//! 1. A sharded `DashMap` from `PlayerId` to a [`SessionHandle`]. Shard
//!    locks are only held long enough to clone the handle out.
//! 2. A `parking_lot::Mutex` per player inside the handle. Everything
//!    that reads or mutates one player's state goes through it.
//!
//! Two operations on the same player serialize on (2). Operations on
//! different players only meet at (1), and only for a map lookup.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use packgate_protocol::PlayerId;
use parking_lot::{Mutex, MutexGuard};

use crate::SessionState;

/// Shared, lockable handle to one player's [`SessionState`].
///
/// Cheap to clone (an `Arc`). Holding the guard returned by
/// [`lock`](Self::lock) is how the state machine makes a whole
/// transition atomic for that player.
#[derive(Debug, Clone)]
pub struct SessionHandle(Arc<Mutex<SessionState>>);

impl SessionHandle {
    fn new(player: PlayerId) -> Self {
        Self(Arc::new(Mutex::new(SessionState::new(player))))
    }

    /// Locks this player's session.
    pub fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.0.lock()
    }
}

/// Tracks the session of every player currently connected to the proxy.
///
/// ```text
/// open() ──→ [mark/clear pending, first join ...] ──→ drop_session()
///   ▲                                                      │
///   └──────────────(next login: a fresh session)───────────┘
/// ```
///
/// Invariant: at most one entry per connected player, and no entry for
/// a player who has left.
#[derive(Debug, Default)]
pub struct SessionTracker {
    sessions: DashMap<PlayerId, SessionHandle>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a session for `player`, or returns the one already open.
    ///
    /// The `bool` is `true` if a new session was created. A `false`
    /// means a duplicate login event; callers must not treat it as a
    /// fresh connection.
    pub fn open(&self, player: PlayerId) -> (SessionHandle, bool) {
        match self.sessions.entry(player) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let handle = SessionHandle::new(player);
                entry.insert(handle.clone());
                tracing::debug!(%player, "session opened");
                (handle, true)
            }
        }
    }

    /// Returns a handle to the player's session, if one is open.
    ///
    /// The map shard is released before this returns, so the caller can
    /// hold the per-player lock for as long as it needs.
    pub fn get(&self, player: PlayerId) -> Option<SessionHandle> {
        self.sessions.get(&player).map(|entry| entry.value().clone())
    }

    /// Marks an offer as outstanding. Returns `false` if no session.
    pub fn mark_pending(&self, player: PlayerId) -> bool {
        self.with(player, |state| state.mark_pending()).is_some()
    }

    /// Clears an outstanding offer. Returns `true` if one was pending.
    pub fn clear_pending(&self, player: PlayerId) -> bool {
        self.with(player, |state| state.clear_pending())
            .unwrap_or(false)
    }

    /// Returns `true` if the player has an outstanding offer. A player
    /// without a session never does.
    pub fn is_pending(&self, player: PlayerId) -> bool {
        self.with(player, |state| state.is_pending())
            .unwrap_or(false)
    }

    /// Flags the current connection as the session's first join.
    /// Returns `false` if no session.
    pub fn mark_first_join(&self, player: PlayerId) -> bool {
        self.with(player, |state| state.mark_first_join()).is_some()
    }

    /// Atomically reads and clears the first-join flag.
    ///
    /// Exactly one of any number of concurrent callers for the same
    /// player sees `true`.
    pub fn consume_first_join(&self, player: PlayerId) -> bool {
        self.with(player, |state| state.consume_first_join())
            .unwrap_or(false)
    }

    /// Removes every trace of the player's session. Returns `true` if
    /// there was one.
    pub fn drop_session(&self, player: PlayerId) -> bool {
        let dropped = self.sessions.remove(&player).is_some();
        if dropped {
            tracing::debug!(%player, "session dropped");
        }
        dropped
    }

    /// Drops every session, e.g. when the proxy link goes away.
    /// Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }

    /// Returns `true` if the player has an open session.
    pub fn contains(&self, player: PlayerId) -> bool {
        self.sessions.contains_key(&player)
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Runs `f` under the player's lock, if they have a session.
    fn with<R>(&self, player: PlayerId, f: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        let handle = self.get(player)?;
        let mut state = handle.lock();
        Some(f(&mut state))
    }
}

// =========================================================================
// Tests
// =========================================================================
