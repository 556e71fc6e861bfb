//! The acceptance state machine as a pure function.
//!
//! [`step`] takes the current session (if any), one lifecycle event and
//! the configuration, and returns the next session plus the side effects
//! to perform. It never touches a store, a lock or the proxy, so every
//! rule can be tested by calling it directly.
//!
//! [`AcceptanceStateMachine`](crate::AcceptanceStateMachine) is the
//! impure shell: it locks the player, calls `step`, stores the result
//! and carries out the effects.

use packgate_protocol::{PackStatus, PlayerId, ServerName};
use packgate_session::{AcceptanceState, SessionState};

use crate::{OfferPolicy, PackConfig};

/// A player lifecycle event, as delivered by the proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The player logged in to the proxy, before reaching any backend.
    ProxyLogin,
    /// The player is about to connect to `server`. Vetoable.
    ConnectionAttempt { server: ServerName },
    /// The client reported a pack status.
    PackStatus(PackStatus),
    /// The player left the proxy.
    Disconnect,
}

/// The answer to a [`LifecycleEvent::ConnectionAttempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny,
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// A side effect the state machine must carry out after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Offer the pack. If delivery fails, the offer must be un-marked.
    SendOffer,
    /// Persist `accepted = true` with the current time.
    RecordAcceptance,
    /// Kick the player with this message.
    Disconnect { message: String },
    /// Move the player to `server`, or to the first registered backend
    /// when `None`.
    Connect { server: Option<ServerName> },
}

/// Result of one transition.
#[derive(Debug, Clone)]
pub struct Step {
    /// The session after the event. `None` means "no session": either
    /// there never was one (stray event) or it ends here (disconnect).
    pub next: Option<SessionState>,

    /// Set only for connection attempts.
    pub verdict: Option<Verdict>,

    /// Side effects, in order.
    pub effects: Vec<Effect>,
}

impl Step {
    fn unchanged(session: Option<&SessionState>) -> Self {
        Self {
            next: session.cloned(),
            verdict: None,
            effects: Vec::new(),
        }
    }

    /// Returns `true` if the transition did nothing.
    pub fn is_noop(&self) -> bool {
        self.effects.is_empty() && self.verdict.is_none()
    }
}

/// Computes the transition for `event`.
///
/// `previously_accepted` reports whether the persistence store says the
/// player accepted in an earlier session. It is only called when the
/// answer matters (the offer-once check), so the caller can back it with
/// a store lookup without paying for it on every event.
pub fn step<F>(
    config: &PackConfig,
    player: PlayerId,
    session: Option<&SessionState>,
    event: &LifecycleEvent,
    previously_accepted: F,
) -> Step
where
    F: FnOnce() -> bool,
{
    match event {
        LifecycleEvent::ProxyLogin => on_login(config, player, session, previously_accepted),
        LifecycleEvent::ConnectionAttempt { server } => {
            on_attempt(config, session, server, previously_accepted)
        }
        LifecycleEvent::PackStatus(status) => on_status(config, session, *status),
        LifecycleEvent::Disconnect => Step {
            next: None,
            verdict: None,
            effects: Vec::new(),
        },
    }
}

fn on_login<F: FnOnce() -> bool>(
    config: &PackConfig,
    player: PlayerId,
    session: Option<&SessionState>,
    previously_accepted: F,
) -> Step {
    // Login events are delivered at least once. A second one for an open
    // session must not send a second offer.
    if session.is_some() {
        return Step::unchanged(session);
    }

    let mut next = SessionState::new(player);
    next.mark_first_join();

    let mut effects = Vec::new();
    if config.offer_only_once && previously_accepted() {
        next.stage = AcceptanceState::Accepted;
    } else {
        next.mark_pending();
        effects.push(Effect::SendOffer);
    }

    Step {
        next: Some(next),
        verdict: None,
        effects,
    }
}

fn on_attempt<F: FnOnce() -> bool>(
    config: &PackConfig,
    session: Option<&SessionState>,
    server: &ServerName,
    previously_accepted: F,
) -> Step {
    // No session: nothing was offered, nothing to gate on.
    let Some(current) = session else {
        return Step {
            next: None,
            verdict: Some(Verdict::Allow),
            effects: Vec::new(),
        };
    };

    let mut next = current.clone();

    if next.is_pending() {
        next.intended_server = Some(server.clone());
        return Step {
            next: Some(next),
            verdict: Some(Verdict::Deny),
            effects: Vec::new(),
        };
    }

    let initial = next.consume_first_join();
    let mut effects = Vec::new();

    if config.policy == OfferPolicy::EverySwitch
        && !initial
        && next.stage != AcceptanceState::Accepted
        && !(config.offer_only_once && previously_accepted())
    {
        next.mark_pending();
        effects.push(Effect::SendOffer);
    }

    Step {
        next: Some(next),
        verdict: Some(Verdict::Allow),
        effects,
    }
}

fn on_status(config: &PackConfig, session: Option<&SessionState>, status: PackStatus) -> Step {
    // Stray or duplicate status: only an outstanding offer can resolve.
    let Some(current) = session.filter(|s| s.is_pending()) else {
        return Step::unchanged(session);
    };

    let mut next = current.clone();
    let mut effects = Vec::new();

    match status {
        PackStatus::Accepted | PackStatus::Unknown => return Step::unchanged(session),

        PackStatus::Successful => {
            next.stage = AcceptanceState::Accepted;
            effects.push(Effect::RecordAcceptance);

            let target = next.intended_server.take();
            if config.reconnect_on_success && (target.is_some() || next.first_join) {
                effects.push(Effect::Connect { server: target });
            }
        }

        PackStatus::Declined => {
            next.stage = AcceptanceState::Declined;
            next.intended_server = None;
            if config.kick_on_decline {
                effects.push(Effect::Disconnect {
                    message: config.decline_message.clone(),
                });
            }
        }

        PackStatus::FailedDownload => {
            next.stage = AcceptanceState::Failed;
            next.intended_server = None;
            if config.kick_on_failed_download {
                effects.push(Effect::Disconnect {
                    message: config.failure_message.clone(),
                });
            }
        }
    }

    Step {
        next: Some(next),
        verdict: None,
        effects,
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! One test per rule. `step` is pure, so no mocks are needed: build
    //! a session, feed an event, look at the result.

    use super::*;

    const P: PlayerId = PlayerId::from_u128(7);

    fn lobby() -> ServerName {
        ServerName::new("lobby")
    }

    fn never() -> bool {
        panic!("history lookup not expected here")
    }

    fn attempt(server: ServerName) -> LifecycleEvent {
        LifecycleEvent::ConnectionAttempt { server }
    }

    /// A session right after a login that sent an offer.
    fn pending_session() -> SessionState {
        let mut s = SessionState::new(P);
        s.mark_first_join();
        s.mark_pending();
        s
    }

    /// A session whose offer succeeded and which has reached a backend.
    fn accepted_session() -> SessionState {
        let mut s = SessionState::new(P);
        s.stage = AcceptanceState::Accepted;
        s
    }

    // =====================================================================
    // ProxyLogin
    // =====================================================================

    #[test]
    fn test_login_fresh_player_sends_offer() {
        let config = PackConfig::default();

        let step = step(&config, P, None, &LifecycleEvent::ProxyLogin, || false);

        let next = step.next.unwrap();
        assert!(next.is_pending());
        assert!(next.first_join);
        assert_eq!(step.effects, vec![Effect::SendOffer]);
    }

    #[test]
    fn test_login_returning_player_with_offer_once_skips_offer() {
        let config = PackConfig::default();

        let step = step(&config, P, None, &LifecycleEvent::ProxyLogin, || true);

        let next = step.next.unwrap();
        assert_eq!(next.stage, AcceptanceState::Accepted);
        assert!(next.first_join);
        assert!(step.effects.is_empty());
    }

    #[test]
    fn test_login_without_offer_once_ignores_history() {
        let config = PackConfig {
            offer_only_once: false,
            ..PackConfig::default()
        };

        let step = step(&config, P, None, &LifecycleEvent::ProxyLogin, never);

        assert_eq!(step.effects, vec![Effect::SendOffer]);
    }

    #[test]
    fn test_login_duplicate_event_is_noop() {
        let config = PackConfig::default();
        let current = pending_session();

        let step = step(&config, P, Some(&current), &LifecycleEvent::ProxyLogin, never);

        assert!(step.is_noop());
        assert!(step.next.unwrap().is_pending());
    }

    // =====================================================================
    // ConnectionAttempt
    // =====================================================================

    #[test]
    fn test_attempt_while_pending_is_denied_and_remembered() {
        let config = PackConfig::default();
        let current = pending_session();

        let step = step(&config, P, Some(&current), &attempt(lobby()), never);

        assert_eq!(step.verdict, Some(Verdict::Deny));
        let next = step.next.unwrap();
        assert_eq!(next.intended_server, Some(lobby()));
        assert!(next.first_join, "denied attempts don't consume the first join");
    }

    #[test]
    fn test_attempt_without_session_is_allowed() {
        let config = PackConfig::default();

        let step = step(&config, P, None, &attempt(lobby()), never);

        assert_eq!(step.verdict, Some(Verdict::Allow));
        assert!(step.next.is_none(), "attempts never create sessions");
    }

    #[test]
    fn test_attempt_after_accept_is_allowed_and_consumes_first_join() {
        let config = PackConfig::default();
        let mut current = accepted_session();
        current.first_join = true;

        let step = step(&config, P, Some(&current), &attempt(lobby()), never);

        assert_eq!(step.verdict, Some(Verdict::Allow));
        assert!(!step.next.unwrap().first_join);
        assert!(step.effects.is_empty());
    }

    #[test]
    fn test_attempt_login_policy_never_reoffers_on_switch() {
        let config = PackConfig {
            kick_on_decline: false,
            ..PackConfig::default()
        };
        let mut current = SessionState::new(P);
        current.stage = AcceptanceState::Declined;

        let step = step(&config, P, Some(&current), &attempt(lobby()), never);

        assert_eq!(step.verdict, Some(Verdict::Allow));
        assert!(step.effects.is_empty());
    }

    #[test]
    fn test_attempt_every_switch_reoffers_after_decline() {
        let config = PackConfig {
            policy: OfferPolicy::EverySwitch,
            kick_on_decline: false,
            ..PackConfig::default()
        };
        let mut current = SessionState::new(P);
        current.stage = AcceptanceState::Declined;

        let step = step(&config, P, Some(&current), &attempt(lobby()), || false);

        assert_eq!(step.verdict, Some(Verdict::Allow), "switch itself goes through");
        assert_eq!(step.effects, vec![Effect::SendOffer]);
        assert!(step.next.unwrap().is_pending());
    }

    #[test]
    fn test_attempt_every_switch_first_join_does_not_reoffer() {
        let config = PackConfig {
            policy: OfferPolicy::EverySwitch,
            ..PackConfig::default()
        };
        let mut current = SessionState::new(P);
        current.mark_first_join();
        current.stage = AcceptanceState::Declined;

        let step = step(&config, P, Some(&current), &attempt(lobby()), never);

        assert!(step.effects.is_empty(), "login already made this session's offer");
    }

    #[test]
    fn test_attempt_every_switch_skips_accepted_player() {
        let config = PackConfig {
            policy: OfferPolicy::EverySwitch,
            ..PackConfig::default()
        };
        let current = accepted_session();

        let step = step(&config, P, Some(&current), &attempt(lobby()), never);

        assert!(step.effects.is_empty());
    }

    #[test]
    fn test_attempt_every_switch_respects_history() {
        let config = PackConfig {
            policy: OfferPolicy::EverySwitch,
            ..PackConfig::default()
        };
        let current = SessionState::new(P);

        let step = step(&config, P, Some(&current), &attempt(lobby()), || true);

        assert!(step.effects.is_empty());
    }

    // =====================================================================
    // PackStatus
    // =====================================================================

    #[test]
    fn test_status_without_pending_offer_is_ignored() {
        let config = PackConfig::default();
        let current = accepted_session();

        for status in [
            PackStatus::Successful,
            PackStatus::Declined,
            PackStatus::FailedDownload,
        ] {
            let step = step(
                &config,
                P,
                Some(&current),
                &LifecycleEvent::PackStatus(status),
                never,
            );
            assert!(step.is_noop(), "{status} must be ignored");
            assert_eq!(step.next.unwrap().stage, AcceptanceState::Accepted);
        }
    }

    #[test]
    fn test_status_for_untracked_player_is_ignored() {
        let config = PackConfig::default();

        let step = step(
            &config,
            P,
            None,
            &LifecycleEvent::PackStatus(PackStatus::Successful),
            never,
        );

        assert!(step.is_noop());
        assert!(step.next.is_none());
    }

    #[test]
    fn test_status_accepted_keeps_offer_outstanding() {
        let config = PackConfig::default();
        let current = pending_session();

        let step = step(
            &config,
            P,
            Some(&current),
            &LifecycleEvent::PackStatus(PackStatus::Accepted),
            never,
        );

        assert!(step.is_noop());
        assert!(step.next.unwrap().is_pending());
    }

    #[test]
    fn test_status_unknown_is_ignored() {
        let config = PackConfig::default();
        let current = pending_session();

        let step = step(
            &config,
            P,
            Some(&current),
            &LifecycleEvent::PackStatus(PackStatus::Unknown),
            never,
        );

        assert!(step.is_noop());
        assert!(step.next.unwrap().is_pending());
    }

    #[test]
    fn test_status_successful_records_and_resumes_to_denied_server() {
        let config = PackConfig::default();
        let mut current = pending_session();
        current.intended_server = Some(ServerName::new("survival"));

        let step = step(
            &config,
            P,
            Some(&current),
            &LifecycleEvent::PackStatus(PackStatus::Successful),
            never,
        );

        let next = step.next.unwrap();
        assert_eq!(next.stage, AcceptanceState::Accepted);
        assert!(next.intended_server.is_none());
        assert_eq!(
            step.effects,
            vec![
                Effect::RecordAcceptance,
                Effect::Connect {
                    server: Some(ServerName::new("survival"))
                },
            ]
        );
    }

    #[test]
    fn test_status_successful_before_any_attempt_connects_to_first_server() {
        let config = PackConfig::default();
        let current = pending_session();

        let step = step(
            &config,
            P,
            Some(&current),
            &LifecycleEvent::PackStatus(PackStatus::Successful),
            never,
        );

        assert_eq!(
            step.effects,
            vec![Effect::RecordAcceptance, Effect::Connect { server: None }]
        );
    }

    #[test]
    fn test_status_successful_mid_session_does_not_reconnect() {
        // Every-switch offer made while the player is on a backend.
        let config = PackConfig::default();
        let mut current = SessionState::new(P);
        current.mark_pending();

        let step = step(
            &config,
            P,
            Some(&current),
            &LifecycleEvent::PackStatus(PackStatus::Successful),
            never,
        );

        assert_eq!(step.effects, vec![Effect::RecordAcceptance]);
    }

    #[test]
    fn test_status_successful_without_reconnect_only_records() {
        let config = PackConfig {
            reconnect_on_success: false,
            ..PackConfig::default()
        };
        let mut current = pending_session();
        current.intended_server = Some(lobby());

        let step = step(
            &config,
            P,
            Some(&current),
            &LifecycleEvent::PackStatus(PackStatus::Successful),
            never,
        );

        assert_eq!(step.effects, vec![Effect::RecordAcceptance]);
    }

    #[test]
    fn test_status_declined_kicks_with_decline_message() {
        let config = PackConfig::default();
        let current = pending_session();

        let step = step(
            &config,
            P,
            Some(&current),
            &LifecycleEvent::PackStatus(PackStatus::Declined),
            never,
        );

        assert_eq!(step.next.unwrap().stage, AcceptanceState::Declined);
        assert_eq!(
            step.effects,
            vec![Effect::Disconnect {
                message: config.decline_message.clone()
            }]
        );
    }

    #[test]
    fn test_status_declined_without_kick_leaves_player_connectable() {
        let config = PackConfig {
            kick_on_decline: false,
            ..PackConfig::default()
        };
        let current = pending_session();

        let step = step(
            &config,
            P,
            Some(&current),
            &LifecycleEvent::PackStatus(PackStatus::Declined),
            never,
        );

        let next = step.next.unwrap();
        assert!(!next.is_pending());
        assert!(step.effects.is_empty(), "no kick, no record");
    }

    #[test]
    fn test_status_failed_download_uses_failure_flag_and_message() {
        let config = PackConfig {
            kick_on_decline: false,
            ..PackConfig::default()
        };
        let current = pending_session();

        let step = step(
            &config,
            P,
            Some(&current),
            &LifecycleEvent::PackStatus(PackStatus::FailedDownload),
            never,
        );

        assert_eq!(step.next.unwrap().stage, AcceptanceState::Failed);
        assert_eq!(
            step.effects,
            vec![Effect::Disconnect {
                message: config.failure_message.clone()
            }]
        );
    }

    // =====================================================================
    // Disconnect
    // =====================================================================

    #[test]
    fn test_disconnect_ends_session_in_any_state() {
        let config = PackConfig::default();
        for current in [pending_session(), accepted_session(), SessionState::new(P)] {
            let step = step(
                &config,
                P,
                Some(&current),
                &LifecycleEvent::Disconnect,
                never,
            );
            assert!(step.next.is_none());
            assert!(step.effects.is_empty());
        }
    }
}
