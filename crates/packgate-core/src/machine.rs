//! [`AcceptanceStateMachine`]: the impure shell around [`transition::step`].
//!
//! For each event it:
//!
//! 1. finds (or, on login, opens) the player's session handle,
//! 2. locks it,
//! 3. computes the transition, consulting the store only if asked,
//! 4. writes the new session state back,
//! 5. carries out the effects, still under the lock.
//!
//! Holding the lock through step 5 is what makes each event atomic per
//! player: a `SUCCESSFUL` racing a connection attempt either lands
//! entirely before it or entirely after it.

use chrono::Utc;
use packgate_protocol::{PackOffer, PackStatus, PlayerId, ServerName};
use packgate_session::{SessionState, SessionTracker};
use packgate_store::{PersistenceStore, StoreError};

use crate::transition::{self, Effect, LifecycleEvent, Step, Verdict};
use crate::{PackConfig, PackOfferChannel, ServerDirectory, build_offer};

/// Gates players behind the resource pack.
///
/// Generic over its three collaborators so tests can swap any of them:
///
/// - `S`: where acceptance is remembered across sessions
/// - `C`: how offers and kicks reach the player
/// - `D`: the proxy's backend registry
///
/// # Example
///
/// ```ignore
/// let machine = AcceptanceStateMachine::new(config, store, channel, directory);
///
/// machine.on_proxy_login(player);                     // offer sent
/// assert!(!machine.on_connection_attempt(player, &lobby).is_allowed());
/// machine.on_pack_status(player, PackStatus::Successful); // moved to lobby
/// ```
pub struct AcceptanceStateMachine<S, C, D> {
    config: PackConfig,
    offer: PackOffer,
    store: S,
    sessions: SessionTracker,
    channel: C,
    directory: D,
}

impl<S, C, D> AcceptanceStateMachine<S, C, D>
where
    S: PersistenceStore,
    C: PackOfferChannel,
    D: ServerDirectory,
{
    /// Creates a state machine with no open sessions.
    ///
    /// The offer is built from `config` once, here; a bad checksum is
    /// reported a single time instead of on every login.
    pub fn new(config: PackConfig, store: S, channel: C, directory: D) -> Self {
        let offer = build_offer(&config);
        Self {
            config,
            offer,
            store,
            sessions: SessionTracker::new(),
            channel,
            directory,
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle events
    // -----------------------------------------------------------------------

    /// The player logged in to the proxy.
    ///
    /// Opens a session, then either marks the player as already accepted
    /// (offer-once with a stored acceptance) or sends the offer. A second
    /// login for an already open session does nothing.
    pub fn on_proxy_login(&self, player: PlayerId) {
        let (handle, created) = self.sessions.open(player);
        if !created {
            tracing::debug!(%player, "duplicate login ignored");
            return;
        }
        let mut state = handle.lock();

        let step = transition::step(
            &self.config,
            player,
            None,
            &LifecycleEvent::ProxyLogin,
            || self.previously_accepted(player),
        );
        commit(&mut state, step.next);
        if step.effects.is_empty() {
            tracing::info!(%player, "pack already accepted, not offering");
        }
        self.apply(player, &mut state, step.effects);
    }

    /// The player is about to connect to `server`. Denied while an offer
    /// is outstanding.
    pub fn on_connection_attempt(&self, player: PlayerId, server: &ServerName) -> Verdict {
        let event = LifecycleEvent::ConnectionAttempt {
            server: server.clone(),
        };

        let Some(handle) = self.sessions.get(player) else {
            return Verdict::Allow;
        };
        let mut state = handle.lock();

        let step = self.step_locked(player, &state, &event);
        let verdict = step.verdict.unwrap_or(Verdict::Allow);
        if !verdict.is_allowed() {
            tracing::debug!(%player, %server, "connection denied, offer outstanding");
        }

        commit(&mut state, step.next);
        self.apply(player, &mut state, step.effects);
        verdict
    }

    /// The client reported a pack status.
    pub fn on_pack_status(&self, player: PlayerId, status: PackStatus) {
        let Some(handle) = self.sessions.get(player) else {
            tracing::debug!(%player, %status, "status for untracked player ignored");
            return;
        };
        let mut state = handle.lock();

        let step = self.step_locked(player, &state, &LifecycleEvent::PackStatus(status));
        if step.effects.is_empty() && !state.is_pending() {
            tracing::debug!(%player, %status, "status without outstanding offer ignored");
        }

        let before = state.stage;
        commit(&mut state, step.next);
        if before != state.stage {
            tracing::info!(%player, %status, from = %before, to = %state.stage, "pack status");
        }
        self.apply(player, &mut state, step.effects);
    }

    /// The player left the proxy. Drops every trace of the session and
    /// leaves the persisted record alone.
    pub fn on_disconnect(&self, player: PlayerId) {
        if let Some(handle) = self.sessions.get(player) {
            // Waits out any transition in flight for this player.
            let state = handle.lock();
            self.sessions.drop_session(player);
            tracing::debug!(
                %player,
                stage = %state.stage,
                secs = state.opened_at.elapsed().as_secs(),
                "session closed"
            );
        }
    }

    /// Dispatches any lifecycle event. Returns the verdict for
    /// connection attempts and `None` for everything else.
    pub fn handle(&self, player: PlayerId, event: LifecycleEvent) -> Option<Verdict> {
        match event {
            LifecycleEvent::ProxyLogin => {
                self.on_proxy_login(player);
                None
            }
            LifecycleEvent::ConnectionAttempt { server } => {
                Some(self.on_connection_attempt(player, &server))
            }
            LifecycleEvent::PackStatus(status) => {
                self.on_pack_status(player, status);
                None
            }
            LifecycleEvent::Disconnect => {
                self.on_disconnect(player);
                None
            }
        }
    }

    // -----------------------------------------------------------------------
    // Administration
    // -----------------------------------------------------------------------

    /// Deletes the player's stored acceptance. Their next login gets the
    /// offer again. An open session is left as is.
    pub fn forget(&self, player: PlayerId) -> Result<bool, StoreError> {
        let removed = self.store.remove(player)?;
        tracing::info!(%player, removed, "acceptance record removed");
        Ok(removed)
    }

    /// Drops every open session. Returns how many were open.
    pub fn shutdown(&self) -> usize {
        let count = self.sessions.clear();
        if count > 0 {
            tracing::info!(sessions = count, "dropped open sessions");
        }
        count
    }

    pub fn sessions(&self) -> &SessionTracker {
        &self.sessions
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &PackConfig {
        &self.config
    }

    /// The offer sent to every player.
    pub fn offer(&self) -> &PackOffer {
        &self.offer
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn step_locked(&self, player: PlayerId, state: &SessionState, event: &LifecycleEvent) -> Step {
        transition::step(&self.config, player, Some(state), event, || {
            self.previously_accepted(player)
        })
    }

    /// Store lookup for the offer-once check. An unreadable store counts
    /// as "not accepted": the player sees the offer again, which is the
    /// safe direction.
    fn previously_accepted(&self, player: PlayerId) -> bool {
        match self.store.has_accepted(player) {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(%player, error = %e, "acceptance lookup failed, offering anyway");
                false
            }
        }
    }

    /// Carries out `effects` in order. Called with the player's lock held.
    fn apply(&self, player: PlayerId, state: &mut SessionState, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::SendOffer => match self.channel.send_offer(player, &self.offer) {
                    Ok(()) => tracing::info!(%player, url = %self.offer.url, "pack offered"),
                    Err(e) => {
                        tracing::warn!(%player, error = %e, "offer not delivered, un-gating player");
                        state.clear_pending();
                    }
                },

                Effect::RecordAcceptance => {
                    if let Err(e) = self.store.set_accepted(player, true, Utc::now()) {
                        tracing::error!(%player, error = %e, "failed to persist acceptance");
                    }
                }

                Effect::Disconnect { message } => {
                    if let Err(e) = self.channel.disconnect(player, &message) {
                        tracing::warn!(%player, error = %e, "kick not delivered");
                    }
                }

                Effect::Connect { server } => {
                    let target = match server {
                        Some(server) => server,
                        None => match self.directory.servers().into_iter().next() {
                            Some(first) => first,
                            None => {
                                tracing::warn!(%player, "no servers available to connect to");
                                continue;
                            }
                        },
                    };
                    match self.directory.connect(player, &target) {
                        Ok(()) => tracing::info!(%player, server = %target, "resuming connection"),
                        Err(e) => {
                            tracing::warn!(%player, server = %target, error = %e, "connect failed")
                        }
                    }
                }
            }
        }
    }
}

/// Writes the next session state back, if the transition produced one.
fn commit(state: &mut SessionState, next: Option<SessionState>) {
    if let Some(next) = next {
        debug_assert!(
            state.stage == next.stage || state.stage.can_transition_to(next.stage),
            "illegal stage change {} -> {}",
            state.stage,
            next.stage
        );
        *state = next;
    }
}

// =========================================================================
// Tests
// =========================================================================
