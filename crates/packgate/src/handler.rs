//! Per-link handler: handshake, event dispatch, and cleanup.
//!
//! Each accepted host link gets its own Tokio task running this handler.
//! The flow is:
//!   1. Receive Handshake → validate version and secret → send HandshakeAck
//!   2. Spawn the writer task that drains the link's outbox
//!   3. Loop: receive envelopes → feed player events to this link's
//!      state machine, answer connection attempts with a Verdict
//!   4. On close or idle timeout, drop every session the link owned
//!
//! Player events run off the read loop, one lane per player: events for
//! the same player are applied in the order the host sent them, while
//! different players never wait on each other.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use packgate_core::{AcceptanceStateMachine, PackConfig};
use packgate_protocol::{BridgeMessage, Codec, Envelope, JsonCodec, PlayerId};
use packgate_store::PersistenceStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::bridge::{BridgeChannel, BridgeDirectory, Outbox};
use crate::link::{HostLink, LinkId, LinkReceiver, LinkSender};
use crate::server::PROTOCOL_VERSION;
use crate::{LinkError, PackgateError};

/// The host must complete the handshake within this long.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// A link with no traffic for this long is dropped. Hosts heartbeat
/// well inside it.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared server state passed to each link handler task.
pub(crate) struct BridgeState<S> {
    pub(crate) store: S,
    pub(crate) pack: PackConfig,
    pub(crate) secret: Option<String>,
    pub(crate) codec: JsonCodec,
}

type LinkMachine<S> = AcceptanceStateMachine<S, BridgeChannel, BridgeDirectory>;

/// Drop guard that clears the link's sessions when the handler exits,
/// including when the task is aborted at shutdown.
struct LinkGuard<S: PersistenceStore> {
    link_id: LinkId,
    machine: Arc<LinkMachine<S>>,
}

impl<S: PersistenceStore> Drop for LinkGuard<S> {
    fn drop(&mut self) {
        let dropped = self.machine.shutdown();
        tracing::info!(link_id = %self.link_id, sessions = dropped, "host link closed");
    }
}

/// Everything the read loop needs to handle one envelope.
struct LinkContext<S: PersistenceStore> {
    link_id: LinkId,
    machine: Arc<LinkMachine<S>>,
    directory: BridgeDirectory,
    outbox: Outbox,
}

/// A spawned task that is aborted when its handle is dropped.
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Per-player task chains.
///
/// Each pushed job is spawned right away but first waits for the job
/// pushed before it for the same player. Only the tail of each chain is
/// kept here; every job owns its predecessor, so dropping the lanes
/// aborts every chain from the tail down.
#[derive(Default)]
struct PlayerLanes {
    tails: HashMap<PlayerId, AbortOnDrop>,
}

impl PlayerLanes {
    /// Runs `job` after every job already queued for `player`.
    fn push<F>(&mut self, player: PlayerId, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let previous = self.tails.remove(&player);
        let task = tokio::spawn(async move {
            if let Some(mut previous) = previous {
                // A cancelled predecessor still counts as done.
                let _ = (&mut previous.0).await;
            }
            job.await;
        });
        self.tails.insert(player, AbortOnDrop(task));
    }

    /// Forgets chains that have run to completion.
    fn prune(&mut self) {
        self.tails.retain(|_, tail| !tail.0.is_finished());
    }

    fn len(&self) -> usize {
        self.tails.len()
    }
}

/// Handles a single host link from upgrade to close.
pub(crate) async fn handle_link<S>(
    link: HostLink,
    state: Arc<BridgeState<S>>,
) -> Result<(), PackgateError>
where
    S: PersistenceStore + Clone,
{
    let link_id = link.id();
    let peer = link.peer_addr();
    let (mut sink, mut stream) = link.split();
    let start = Instant::now();

    // --- Step 1: Handshake ---
    let proxy = perform_handshake(&mut sink, &mut stream, &state, &start).await?;
    tracing::info!(%link_id, %peer, %proxy, "host linked");

    // --- Step 2: Writer task and per-link state machine ---
    let (outbox, inbox) = mpsc::unbounded_channel();
    tokio::spawn(write_loop(link_id, sink, inbox, state.codec, start));

    let directory = BridgeDirectory::new(outbox.clone());
    let machine = Arc::new(AcceptanceStateMachine::new(
        state.pack.clone(),
        state.store.clone(),
        BridgeChannel::new(outbox.clone()),
        directory.clone(),
    ));
    let _guard = LinkGuard {
        link_id,
        machine: Arc::clone(&machine),
    };
    let ctx = Arc::new(LinkContext {
        link_id,
        machine,
        directory,
        outbox,
    });
    // Declared after the guard so queued jobs are aborted before the
    // sessions are cleared.
    let mut lanes = PlayerLanes::default();

    // --- Step 3: Event loop ---
    loop {
        let data = match tokio::time::timeout(IDLE_TIMEOUT, stream.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => {
                tracing::info!(%link_id, "host closed link");
                break;
            }
            Ok(Err(e)) => {
                tracing::debug!(%link_id, error = %e, "recv error");
                break;
            }
            Err(_) => {
                tracing::warn!(%link_id, "host link idle, dropping");
                break;
            }
        };

        let envelope: Envelope = match state.codec.decode(&data) {
            Ok(env) => env,
            Err(e) => {
                tracing::debug!(%link_id, error = %e, "failed to decode envelope");
                ctx.reply(BridgeMessage::Error {
                    code: 400,
                    message: format!("invalid envelope: {e}"),
                });
                continue;
            }
        };

        handle_message(&ctx, &mut lanes, envelope);
    }

    // lanes drop here → queued jobs aborted, then _guard → sessions
    // cleared. The writer task ends once the last outbox clone is gone.
    Ok(())
}

/// Receives and validates the host's Handshake, then sends HandshakeAck.
/// Returns the proxy name the host announced.
async fn perform_handshake<S>(
    sink: &mut LinkSender,
    stream: &mut LinkReceiver,
    state: &BridgeState<S>,
    start: &Instant,
) -> Result<String, PackgateError> {
    let data = match tokio::time::timeout(HANDSHAKE_TIMEOUT, stream.recv()).await {
        Ok(Ok(Some(data))) => data,
        Ok(Ok(None)) => {
            return Err(LinkError::Closed("closed before handshake".into()).into());
        }
        Ok(Err(e)) => return Err(e.into()),
        Err(_) => return Err(LinkError::Handshake("handshake timed out".into()).into()),
    };

    let message = state
        .codec
        .decode::<Envelope>(&data)
        .map(|envelope| envelope.message);

    let (version, proxy, token) = match message {
        Ok(BridgeMessage::Handshake {
            version,
            proxy,
            token,
        }) => (version, proxy, token),
        _ => {
            send_error(sink, &state.codec, 400, "expected Handshake", start).await?;
            return Err(LinkError::Handshake("first message must be Handshake".into()).into());
        }
    };

    if version != PROTOCOL_VERSION {
        send_error(
            sink,
            &state.codec,
            400,
            &format!("version mismatch: expected {PROTOCOL_VERSION}, got {version}"),
            start,
        )
        .await?;
        return Err(LinkError::Handshake("protocol version mismatch".into()).into());
    }

    if let Some(secret) = &state.secret {
        if token.as_deref() != Some(secret.as_str()) {
            send_error(sink, &state.codec, 401, "unauthorized", start).await?;
            return Err(LinkError::Handshake(format!("bad secret from proxy {proxy}")).into());
        }
    }

    let ack = frame(
        &state.codec,
        0,
        start,
        BridgeMessage::HandshakeAck {
            server_time: wall_clock_millis(),
        },
    )?;
    sink.send(ack).await?;

    Ok(proxy)
}

/// Handles one envelope from the host.
///
/// Link housekeeping is answered inline. Player events are queued on the
/// player's lane and answered from there.
fn handle_message<S>(ctx: &Arc<LinkContext<S>>, lanes: &mut PlayerLanes, envelope: Envelope)
where
    S: PersistenceStore + Clone,
{
    let link_id = ctx.link_id;
    if !envelope.message.is_from_host() {
        tracing::debug!(%link_id, msg = ?envelope.message, "ignoring message not sent by hosts");
        ctx.reply(BridgeMessage::Error {
            code: 400,
            message: "unexpected message from host".into(),
        });
        return;
    }

    match envelope.message {
        BridgeMessage::Heartbeat { client_time } => {
            ctx.reply(BridgeMessage::HeartbeatAck {
                client_time,
                server_time: wall_clock_millis(),
            });
            lanes.prune();
            tracing::trace!(%link_id, lanes = lanes.len(), "heartbeat");
        }

        BridgeMessage::ServerList { servers } => {
            tracing::debug!(%link_id, count = servers.len(), "server list updated");
            ctx.directory.set_servers(servers);
        }

        BridgeMessage::Handshake { .. } => {
            ctx.reply(BridgeMessage::Error {
                code: 400,
                message: "already linked".into(),
            });
        }

        BridgeMessage::ProxyLogin { player } => {
            let ctx = Arc::clone(ctx);
            lanes.push(player, async move {
                ctx.run(move |m| m.on_proxy_login(player)).await;
            });
        }

        BridgeMessage::ConnectionAttempt { player, server } => {
            let ctx = Arc::clone(ctx);
            let reply_to = envelope.seq;
            lanes.push(player, async move {
                // A crashed transition lets the player through rather than
                // leaving the proxy waiting on a verdict.
                let allowed = ctx
                    .run(move |m| m.on_connection_attempt(player, &server))
                    .await
                    .is_none_or(|verdict| verdict.is_allowed());
                ctx.reply(BridgeMessage::Verdict { reply_to, allowed });
            });
        }

        BridgeMessage::PackStatus { player, status } => {
            let ctx = Arc::clone(ctx);
            lanes.push(player, async move {
                ctx.run(move |m| m.on_pack_status(player, status)).await;
            });
        }

        BridgeMessage::Disconnect { player } => {
            lanes.prune();
            let ctx = Arc::clone(ctx);
            lanes.push(player, async move {
                ctx.run(move |m| m.on_disconnect(player)).await;
            });
        }

        BridgeMessage::ForgetPlayer { player } => {
            let ctx = Arc::clone(ctx);
            lanes.push(player, async move {
                if let Some(Err(e)) = ctx.run(move |m| m.forget(player)).await {
                    tracing::error!(link_id = %ctx.link_id, %player, error = %e, "failed to forget player");
                    ctx.reply(BridgeMessage::Error {
                        code: 500,
                        message: format!("failed to forget {player}: {e}"),
                    });
                }
            });
        }

        // packgate → host messages, rejected above.
        _ => {}
    }
}

impl<S> LinkContext<S>
where
    S: PersistenceStore + Clone,
{
    /// Queues a message for the host. A closed outbox means the writer
    /// already gave up on the socket; the read loop will notice shortly.
    fn reply(&self, message: BridgeMessage) {
        if self.outbox.send(message).is_err() {
            tracing::debug!(link_id = %self.link_id, "outbox closed, reply dropped");
        }
    }

    /// Runs a state machine call on the blocking pool. Store reads and
    /// writes are synchronous disk I/O. Returns `None` if the call
    /// panicked.
    async fn run<R, F>(&self, f: F) -> Option<R>
    where
        R: Send + 'static,
        F: FnOnce(&LinkMachine<S>) -> R + Send + 'static,
    {
        let machine = Arc::clone(&self.machine);
        match tokio::task::spawn_blocking(move || f(&machine)).await {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::error!(link_id = %self.link_id, error = %e, "state machine call failed");
                None
            }
        }
    }
}

/// Drains the outbox onto the socket, numbering frames from 1.
async fn write_loop(
    link_id: LinkId,
    mut sink: LinkSender,
    mut inbox: mpsc::UnboundedReceiver<BridgeMessage>,
    codec: JsonCodec,
    start: Instant,
) {
    let mut seq: u64 = 1;
    while let Some(message) = inbox.recv().await {
        let bytes = match frame(&codec, next_seq(&mut seq), &start, message) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(%link_id, error = %e, "failed to encode message");
                continue;
            }
        };
        if let Err(e) = sink.send(bytes).await {
            tracing::debug!(%link_id, error = %e, "send failed, stopping writer");
            return;
        }
    }
    let _ = sink.close().await;
}

/// Sends a BridgeMessage::Error straight to the socket. Only used before
/// the writer task exists.
async fn send_error(
    sink: &mut LinkSender,
    codec: &JsonCodec,
    code: u16,
    message: &str,
    start: &Instant,
) -> Result<(), PackgateError> {
    let bytes = frame(
        codec,
        0,
        start,
        BridgeMessage::Error {
            code,
            message: message.to_string(),
        },
    )?;
    sink.send(bytes).await?;
    Ok(())
}

fn frame(
    codec: &JsonCodec,
    seq: u64,
    start: &Instant,
    message: BridgeMessage,
) -> Result<Vec<u8>, packgate_protocol::ProtocolError> {
    codec.encode(&Envelope {
        seq,
        timestamp: start.elapsed().as_millis() as u64,
        message,
    })
}

fn wall_clock_millis() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

/// Increments and returns the next sequence number.
fn next_seq(seq: &mut u64) -> u64 {
    let current = *seq;
    *seq += 1;
    current
}
