//! What the proxy must provide to the state machine.
//!
//! The state machine never touches the proxy directly. It is handed two
//! narrow capabilities at construction:
//!
//! - [`PackOfferChannel`]: talk to one player (offer, kick).
//! - [`ServerDirectory`]: the backend registry (list, move a player).
//!
//! The host bridge implements both by queueing commands to the proxy
//! plugin; tests implement them with recording mocks.

use std::sync::Arc;

use packgate_protocol::{PackOffer, PlayerId, ServerName};

use crate::ChannelError;

/// Sends pack offers and disconnects players.
///
/// Called while the player's session lock is held, so implementations
/// must not block on the network. Queue the command and return.
pub trait PackOfferChannel: Send + Sync + 'static {
    /// Offers the pack to the player.
    ///
    /// # Errors
    /// Any error means the offer was not delivered; the state machine
    /// then un-gates the player instead of waiting for an answer that
    /// will never come.
    fn send_offer(&self, player: PlayerId, offer: &PackOffer) -> Result<(), ChannelError>;

    /// Disconnects the player from the proxy with `message`.
    fn disconnect(&self, player: PlayerId, message: &str) -> Result<(), ChannelError>;
}

/// The proxy's backend server registry.
pub trait ServerDirectory: Send + Sync + 'static {
    /// Registered backends in the proxy's preferred order.
    fn servers(&self) -> Vec<ServerName>;

    /// Asks the proxy to move the player to `server`. Fire-and-forget:
    /// the move shows up later as an ordinary connection attempt.
    fn connect(&self, player: PlayerId, server: &ServerName) -> Result<(), ChannelError>;
}

impl<T: PackOfferChannel + ?Sized> PackOfferChannel for Arc<T> {
    fn send_offer(&self, player: PlayerId, offer: &PackOffer) -> Result<(), ChannelError> {
        (**self).send_offer(player, offer)
    }

    fn disconnect(&self, player: PlayerId, message: &str) -> Result<(), ChannelError> {
        (**self).disconnect(player, message)
    }
}

impl<T: ServerDirectory + ?Sized> ServerDirectory for Arc<T> {
    fn servers(&self) -> Vec<ServerName> {
        (**self).servers()
    }

    fn connect(&self, player: PlayerId, server: &ServerName) -> Result<(), ChannelError> {
        (**self).connect(player, server)
    }
}
