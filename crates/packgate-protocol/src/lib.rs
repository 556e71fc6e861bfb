//! Shared vocabulary for packgate.
//!
//! This crate defines the types every other layer speaks:
//!
//! - **Identity** ([`PlayerId`], [`ServerName`]): who a player is and
//!   which backend they want to reach.
//! - **Pack types** ([`PackStatus`], [`PackOffer`]): what the client
//!   reports about a pack, and what we ask it to download.
//! - **Bridge wire format** ([`Envelope`], [`BridgeMessage`]): the JSON
//!   messages exchanged with the proxy plugin over the host bridge.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how those values become
//!   bytes, both on the wire and in the persistence store.
//!
//! ```text
//! Proxy plugin ⇄ Bridge (Envelope) → State machine (PlayerId, PackStatus)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    BridgeMessage, Envelope, PackOffer, PackStatus, PlayerId, ServerName,
};
