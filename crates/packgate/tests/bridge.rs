//! End-to-end tests for the host bridge: a real server on a random port
//! and a tokio-tungstenite client playing the proxy plugin.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use packgate::prelude::*;
use packgate_store::{AcceptanceRecord, StoreError};
use tokio_tungstenite::tungstenite::Message;

type Client = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

const STEVE: PlayerId = PlayerId::from_u128(0x069a_79f4_44e9_4726_a5be_fca9_0e38_aaf5);
const ALEX: PlayerId = PlayerId::from_u128(0x0c0f_fee0);

// =========================================================================
// Helpers
// =========================================================================

/// Starts a bridge on 127.0.0.1:0 and returns its address.
async fn start_server<S>(builder: PackgateServerBuilder, store: S) -> String
where
    S: PersistenceStore + Clone,
{
    let server = builder
        .bind("127.0.0.1:0")
        .build(store)
        .await
        .expect("server should bind");
    let addr = server.local_addr().unwrap().to_string();
    tokio::spawn(server.run());
    addr
}

async fn connect(addr: &str) -> Client {
    let (ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
        .await
        .expect("client should connect");
    ws
}

async fn send(ws: &mut Client, seq: u64, message: BridgeMessage) {
    let envelope = Envelope {
        seq,
        timestamp: 0,
        message,
    };
    let text = serde_json::to_string(&envelope).unwrap();
    ws.send(Message::Text(text.into())).await.unwrap();
}

async fn recv(ws: &mut Client) -> BridgeMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("link ended")
            .expect("websocket error");
        match frame {
            Message::Text(text) => {
                let envelope: Envelope = serde_json::from_str(text.as_str()).unwrap();
                return envelope.message;
            }
            Message::Binary(data) => {
                let envelope: Envelope = serde_json::from_slice(&data).unwrap();
                return envelope.message;
            }
            _ => continue,
        }
    }
}

fn handshake(token: Option<&str>) -> BridgeMessage {
    BridgeMessage::Handshake {
        version: PROTOCOL_VERSION,
        proxy: "velocity-1".into(),
        token: token.map(str::to_string),
    }
}

/// Connects and completes the handshake.
async fn linked(addr: &str, token: Option<&str>) -> Client {
    let mut ws = connect(addr).await;
    send(&mut ws, 0, handshake(token)).await;
    assert!(matches!(recv(&mut ws).await, BridgeMessage::HandshakeAck { .. }));
    ws
}

/// A memory store whose writes take `delay`, like a slow disk commit.
struct SlowStore {
    inner: MemoryStore,
    delay: Duration,
}

impl PersistenceStore for SlowStore {
    fn record(&self, player: PlayerId) -> Result<Option<AcceptanceRecord>, StoreError> {
        self.inner.record(player)
    }

    fn set_accepted(
        &self,
        player: PlayerId,
        accepted: bool,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        std::thread::sleep(self.delay);
        self.inner.set_accepted(player, accepted, at)
    }

    fn remove(&self, player: PlayerId) -> Result<bool, StoreError> {
        self.inner.remove(player)
    }

    fn evict_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.inner.evict_older_than(cutoff)
    }
}

fn servers() -> BridgeMessage {
    BridgeMessage::ServerList {
        servers: vec![ServerName::new("lobby"), ServerName::new("survival")],
    }
}

// =========================================================================
// Handshake
// =========================================================================

#[tokio::test]
async fn test_handshake_with_secret_is_acknowledged() {
    let addr = start_server(
        PackgateServerBuilder::new().secret("s3cret"),
        Arc::new(MemoryStore::new()),
    )
    .await;

    linked(&addr, Some("s3cret")).await;
}

#[tokio::test]
async fn test_handshake_wrong_secret_is_unauthorized() {
    let addr = start_server(
        PackgateServerBuilder::new().secret("s3cret"),
        Arc::new(MemoryStore::new()),
    )
    .await;
    let mut ws = connect(&addr).await;

    send(&mut ws, 0, handshake(Some("guess"))).await;

    assert!(matches!(
        recv(&mut ws).await,
        BridgeMessage::Error { code: 401, .. }
    ));
}

#[tokio::test]
async fn test_handshake_version_mismatch_is_rejected() {
    let addr = start_server(PackgateServerBuilder::new(), Arc::new(MemoryStore::new())).await;
    let mut ws = connect(&addr).await;

    send(
        &mut ws,
        0,
        BridgeMessage::Handshake {
            version: PROTOCOL_VERSION + 1,
            proxy: "velocity-1".into(),
            token: None,
        },
    )
    .await;

    match recv(&mut ws).await {
        BridgeMessage::Error { code, message } => {
            assert_eq!(code, 400);
            assert!(message.contains("version mismatch"));
        }
        other => panic!("expected Error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_event_before_handshake_is_rejected() {
    let addr = start_server(PackgateServerBuilder::new(), Arc::new(MemoryStore::new())).await;
    let mut ws = connect(&addr).await;

    send(&mut ws, 0, BridgeMessage::ProxyLogin { player: STEVE }).await;

    assert!(matches!(
        recv(&mut ws).await,
        BridgeMessage::Error { code: 400, .. }
    ));
}

// =========================================================================
// Acceptance flow over the bridge
// =========================================================================

#[tokio::test]
async fn test_login_gate_accept_resume() {
    let store = Arc::new(MemoryStore::new());
    let addr = start_server(PackgateServerBuilder::new(), Arc::clone(&store)).await;
    let mut ws = linked(&addr, None).await;
    send(&mut ws, 1, servers()).await;

    send(&mut ws, 2, BridgeMessage::ProxyLogin { player: STEVE }).await;
    match recv(&mut ws).await {
        BridgeMessage::SendOffer { player, offer } => {
            assert_eq!(player, STEVE);
            assert_eq!(offer.url, PackConfig::default().url);
            assert!(offer.force);
        }
        other => panic!("expected SendOffer, got {other:?}"),
    }

    send(
        &mut ws,
        3,
        BridgeMessage::ConnectionAttempt {
            player: STEVE,
            server: ServerName::new("survival"),
        },
    )
    .await;
    assert_eq!(
        recv(&mut ws).await,
        BridgeMessage::Verdict {
            reply_to: 3,
            allowed: false
        }
    );

    send(
        &mut ws,
        4,
        BridgeMessage::PackStatus {
            player: STEVE,
            status: PackStatus::Successful,
        },
    )
    .await;
    assert_eq!(
        recv(&mut ws).await,
        BridgeMessage::Connect {
            player: STEVE,
            server: ServerName::new("survival")
        }
    );
    assert!(store.has_accepted(STEVE).unwrap());

    send(
        &mut ws,
        5,
        BridgeMessage::ConnectionAttempt {
            player: STEVE,
            server: ServerName::new("survival"),
        },
    )
    .await;
    assert_eq!(
        recv(&mut ws).await,
        BridgeMessage::Verdict {
            reply_to: 5,
            allowed: true
        }
    );
}

#[tokio::test]
async fn test_returning_player_is_let_straight_through() {
    let store = Arc::new(MemoryStore::new());
    store.set_accepted(STEVE, true, Utc::now()).unwrap();
    let addr = start_server(PackgateServerBuilder::new(), store).await;
    let mut ws = linked(&addr, None).await;

    send(&mut ws, 1, BridgeMessage::ProxyLogin { player: STEVE }).await;
    send(
        &mut ws,
        2,
        BridgeMessage::ConnectionAttempt {
            player: STEVE,
            server: ServerName::new("lobby"),
        },
    )
    .await;

    // No offer queued ahead of the verdict.
    assert_eq!(
        recv(&mut ws).await,
        BridgeMessage::Verdict {
            reply_to: 2,
            allowed: true
        }
    );
}

#[tokio::test]
async fn test_decline_kicks_player() {
    let store = Arc::new(MemoryStore::new());
    let addr = start_server(PackgateServerBuilder::new(), Arc::clone(&store)).await;
    let mut ws = linked(&addr, None).await;

    send(&mut ws, 1, BridgeMessage::ProxyLogin { player: STEVE }).await;
    assert!(matches!(recv(&mut ws).await, BridgeMessage::SendOffer { .. }));

    send(
        &mut ws,
        2,
        BridgeMessage::PackStatus {
            player: STEVE,
            status: PackStatus::Declined,
        },
    )
    .await;

    assert_eq!(
        recv(&mut ws).await,
        BridgeMessage::Kick {
            player: STEVE,
            message: PackConfig::default().decline_message
        }
    );
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_forget_player_brings_back_the_offer() {
    let store = Arc::new(MemoryStore::new());
    store.set_accepted(STEVE, true, Utc::now()).unwrap();
    let addr = start_server(PackgateServerBuilder::new(), Arc::clone(&store)).await;
    let mut ws = linked(&addr, None).await;

    send(&mut ws, 1, BridgeMessage::ForgetPlayer { player: STEVE }).await;
    send(&mut ws, 2, BridgeMessage::ProxyLogin { player: STEVE }).await;

    assert!(matches!(
        recv(&mut ws).await,
        BridgeMessage::SendOffer { player, .. } if player == STEVE
    ));
    assert!(!store.has_accepted(STEVE).unwrap());
}

#[tokio::test]
async fn test_custom_pack_config_reaches_offer() {
    let pack = PackConfig {
        url: "https://cdn.example.net/v7.zip".into(),
        sha1: "da39a3ee5e6b4b0d3255bfef95601890afd80709".into(),
        kick_on_decline: false,
        kick_on_failed_download: false,
        ..PackConfig::default()
    };
    let addr = start_server(
        PackgateServerBuilder::new().pack(pack),
        Arc::new(MemoryStore::new()),
    )
    .await;
    let mut ws = linked(&addr, None).await;

    send(&mut ws, 1, BridgeMessage::ProxyLogin { player: STEVE }).await;

    match recv(&mut ws).await {
        BridgeMessage::SendOffer { offer, .. } => {
            assert_eq!(offer.url, "https://cdn.example.net/v7.zip");
            assert_eq!(offer.hash.map(|h| h.len()), Some(20));
            assert!(!offer.force);
        }
        other => panic!("expected SendOffer, got {other:?}"),
    }
}

#[tokio::test]
async fn test_slow_store_write_does_not_hold_up_other_players() {
    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
        delay: Duration::from_secs(1),
    });
    let addr = start_server(PackgateServerBuilder::new(), Arc::clone(&store)).await;
    let mut ws = linked(&addr, None).await;
    send(&mut ws, 1, servers()).await;

    send(&mut ws, 2, BridgeMessage::ProxyLogin { player: STEVE }).await;
    assert!(matches!(recv(&mut ws).await, BridgeMessage::SendOffer { .. }));

    send(
        &mut ws,
        3,
        BridgeMessage::PackStatus {
            player: STEVE,
            status: PackStatus::Successful,
        },
    )
    .await;
    let started = Instant::now();
    send(
        &mut ws,
        4,
        BridgeMessage::ConnectionAttempt {
            player: ALEX,
            server: ServerName::new("lobby"),
        },
    )
    .await;
    send(
        &mut ws,
        5,
        BridgeMessage::ConnectionAttempt {
            player: STEVE,
            server: ServerName::new("survival"),
        },
    )
    .await;

    // ALEX is answered while STEVE's acceptance is still being written.
    assert_eq!(
        recv(&mut ws).await,
        BridgeMessage::Verdict {
            reply_to: 4,
            allowed: true
        }
    );
    assert!(started.elapsed() < Duration::from_millis(500));

    // STEVE's own events stay in order behind the write.
    assert_eq!(
        recv(&mut ws).await,
        BridgeMessage::Connect {
            player: STEVE,
            server: ServerName::new("lobby")
        }
    );
    assert_eq!(
        recv(&mut ws).await,
        BridgeMessage::Verdict {
            reply_to: 5,
            allowed: true
        }
    );
    assert!(store.inner.has_accepted(STEVE).unwrap());
}

// =========================================================================
// Link housekeeping
// =========================================================================

#[tokio::test]
async fn test_heartbeat_echoes_client_time() {
    let addr = start_server(PackgateServerBuilder::new(), Arc::new(MemoryStore::new())).await;
    let mut ws = linked(&addr, None).await;

    send(&mut ws, 1, BridgeMessage::Heartbeat { client_time: 1234 }).await;

    assert!(matches!(
        recv(&mut ws).await,
        BridgeMessage::HeartbeatAck {
            client_time: 1234,
            ..
        }
    ));
}

#[tokio::test]
async fn test_garbage_frame_is_reported_and_link_survives() {
    let addr = start_server(PackgateServerBuilder::new(), Arc::new(MemoryStore::new())).await;
    let mut ws = linked(&addr, None).await;

    ws.send(Message::Text("{not json".to_string().into()))
        .await
        .unwrap();
    assert!(matches!(
        recv(&mut ws).await,
        BridgeMessage::Error { code: 400, .. }
    ));

    send(&mut ws, 2, BridgeMessage::Heartbeat { client_time: 1 }).await;
    assert!(matches!(
        recv(&mut ws).await,
        BridgeMessage::HeartbeatAck { .. }
    ));
}

#[tokio::test]
async fn test_command_sent_by_host_is_rejected() {
    let addr = start_server(PackgateServerBuilder::new(), Arc::new(MemoryStore::new())).await;
    let mut ws = linked(&addr, None).await;

    send(
        &mut ws,
        1,
        BridgeMessage::Kick {
            player: STEVE,
            message: "hi".into(),
        },
    )
    .await;

    assert!(matches!(
        recv(&mut ws).await,
        BridgeMessage::Error { code: 400, .. }
    ));
}

#[tokio::test]
async fn test_sessions_are_per_link() {
    let addr = start_server(PackgateServerBuilder::new(), Arc::new(MemoryStore::new())).await;
    let mut first = linked(&addr, None).await;
    let mut second = linked(&addr, None).await;

    send(&mut first, 1, BridgeMessage::ProxyLogin { player: STEVE }).await;
    assert!(matches!(recv(&mut first).await, BridgeMessage::SendOffer { .. }));

    // The other proxy has never seen this player: nothing to gate on.
    send(
        &mut second,
        1,
        BridgeMessage::ConnectionAttempt {
            player: STEVE,
            server: ServerName::new("lobby"),
        },
    )
    .await;
    assert_eq!(
        recv(&mut second).await,
        BridgeMessage::Verdict {
            reply_to: 1,
            allowed: true
        }
    );
}

#[tokio::test]
async fn test_run_until_returns_on_shutdown() {
    let server = PackgateServerBuilder::new()
        .bind("127.0.0.1:0")
        .build(Arc::new(MemoryStore::new()))
        .await
        .unwrap();
    let addr = server.local_addr().unwrap().to_string();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let running = tokio::spawn(server.run_until(async move {
        let _ = stop_rx.await;
    }));
    let _ws = linked(&addr, None).await;

    stop_tx.send(()).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("server should stop")
        .expect("server task should not panic");
    assert!(result.is_ok());
}
