//! The proxy-side capabilities, implemented over a host link.
//!
//! Both types turn state machine effects into [`BridgeMessage`]s on the
//! link's outbox. Sending is a non-blocking queue push; the writer task
//! owns the socket.

use std::sync::Arc;

use packgate_core::{ChannelError, PackOfferChannel, ServerDirectory};
use packgate_protocol::{BridgeMessage, PackOffer, PlayerId, ServerName};
use parking_lot::RwLock;
use tokio::sync::mpsc;

/// Queue of messages waiting for the link's writer task.
pub(crate) type Outbox = mpsc::UnboundedSender<BridgeMessage>;

fn push(outbox: &Outbox, message: BridgeMessage) -> Result<(), ChannelError> {
    outbox.send(message).map_err(|_| ChannelError::Closed)
}

/// Offers and kicks, forwarded to the proxy plugin.
#[derive(Debug, Clone)]
pub(crate) struct BridgeChannel {
    outbox: Outbox,
}

impl BridgeChannel {
    pub(crate) fn new(outbox: Outbox) -> Self {
        Self { outbox }
    }
}

impl PackOfferChannel for BridgeChannel {
    fn send_offer(&self, player: PlayerId, offer: &PackOffer) -> Result<(), ChannelError> {
        push(
            &self.outbox,
            BridgeMessage::SendOffer {
                player,
                offer: offer.clone(),
            },
        )
    }

    fn disconnect(&self, player: PlayerId, message: &str) -> Result<(), ChannelError> {
        push(
            &self.outbox,
            BridgeMessage::Kick {
                player,
                message: message.to_string(),
            },
        )
    }
}

/// The backend registry as last reported by the host's `ServerList`.
///
/// Clones share the list, so the read loop can update it while the
/// state machine owns another clone.
#[derive(Debug, Clone)]
pub(crate) struct BridgeDirectory {
    outbox: Outbox,
    servers: Arc<RwLock<Vec<ServerName>>>,
}

impl BridgeDirectory {
    pub(crate) fn new(outbox: Outbox) -> Self {
        Self {
            outbox,
            servers: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Replaces the registry.
    pub(crate) fn set_servers(&self, servers: Vec<ServerName>) {
        *self.servers.write() = servers;
    }
}

impl ServerDirectory for BridgeDirectory {
    fn servers(&self) -> Vec<ServerName> {
        self.servers.read().clone()
    }

    fn connect(&self, player: PlayerId, server: &ServerName) -> Result<(), ChannelError> {
        push(
            &self.outbox,
            BridgeMessage::Connect {
                player,
                server: server.clone(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer() -> PackOffer {
        PackOffer {
            url: "https://example.com/pack.zip".into(),
            hash: None,
            prompt: "please".into(),
            force: true,
        }
    }

    #[test]
    fn test_send_offer_queues_send_offer_message() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = BridgeChannel::new(tx);

        channel.send_offer(PlayerId::from_u128(1), &offer()).unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            BridgeMessage::SendOffer {
                player: PlayerId::from_u128(1),
                offer: offer()
            }
        );
    }

    #[test]
    fn test_disconnect_queues_kick() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = BridgeChannel::new(tx);

        channel.disconnect(PlayerId::from_u128(1), "bye").unwrap();

        assert!(matches!(
            rx.try_recv().unwrap(),
            BridgeMessage::Kick { message, .. } if message == "bye"
        ));
    }

    #[test]
    fn test_send_after_link_gone_is_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let channel = BridgeChannel::new(tx);

        assert!(matches!(
            channel.send_offer(PlayerId::from_u128(1), &offer()),
            Err(ChannelError::Closed)
        ));
    }

    #[test]
    fn test_directory_clones_share_server_list() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let directory = BridgeDirectory::new(tx);
        let held_by_machine = directory.clone();

        directory.set_servers(vec![ServerName::new("lobby"), ServerName::new("pvp")]);

        assert_eq!(
            held_by_machine.servers(),
            vec![ServerName::new("lobby"), ServerName::new("pvp")]
        );
    }

    #[test]
    fn test_directory_connect_queues_connect() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let directory = BridgeDirectory::new(tx);

        directory
            .connect(PlayerId::from_u128(3), &ServerName::new("lobby"))
            .unwrap();

        assert_eq!(
            rx.try_recv().unwrap(),
            BridgeMessage::Connect {
                player: PlayerId::from_u128(3),
                server: ServerName::new("lobby")
            }
        );
    }
}
