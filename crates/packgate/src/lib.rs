//! # packgate
//!
//! Resource pack gate for game proxies.
//!
//! A proxy plugin (the host) links to packgate over a WebSocket and
//! forwards player lifecycle events. packgate decides when to offer the
//! server's resource pack, vetoes backend connections while an offer is
//! outstanding, and remembers who already accepted so returning players
//! aren't asked again.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use packgate::prelude::*;
//!
//! # async fn start() -> Result<(), PackgateError> {
//! let settings = Settings::load_or_create("packgate.toml")?;
//! let store = Arc::new(MemoryStore::new());
//! let server = PackgateServerBuilder::new()
//!     .settings(&settings)
//!     .build(store)
//!     .await?;
//! server.run().await
//! # }
//! ```

mod bridge;
mod error;
mod handler;
mod link;
mod server;
mod settings;

pub use error::{LinkError, PackgateError, SettingsError};
pub use link::{HostLink, LinkId, LinkListener, LinkReceiver, LinkSender};
pub use server::{PROTOCOL_VERSION, PackgateServer, PackgateServerBuilder};
pub use settings::{BridgeSettings, Settings};

/// Everything needed to run a bridge or talk to one.
pub mod prelude {
    pub use crate::{
        BridgeSettings, LinkError, PROTOCOL_VERSION, PackgateError, PackgateServer,
        PackgateServerBuilder, Settings, SettingsError,
    };
    pub use packgate_core::{
        AcceptanceState, AcceptanceStateMachine, OfferPolicy, PackConfig, PackOfferChannel,
        ServerDirectory, Verdict,
    };
    pub use packgate_protocol::{
        BridgeMessage, Codec, Envelope, JsonCodec, PackOffer, PackStatus, PlayerId, ServerName,
    };
    pub use packgate_store::{MemoryStore, PersistenceStore, RedbStore};
}
