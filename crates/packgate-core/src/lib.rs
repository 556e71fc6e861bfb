//! The pack acceptance state machine.
//!
//! Every lifecycle event a proxy reports for a player (login, backend
//! connection attempt, pack status, disconnect) goes through
//! [`AcceptanceStateMachine`], which decides whether to offer the pack,
//! whether to let the player through to a backend, and what to do when
//! the client answers.
//!
//! # Key types
//!
//! - [`AcceptanceStateMachine`]: applies transitions under a per-player lock
//! - [`transition::step`]: the pure `(event, state) → (state, effects)` function
//! - [`PackConfig`] / [`OfferPolicy`]: what to offer and when
//! - [`PackOfferChannel`] / [`ServerDirectory`]: what the proxy must provide

mod channel;
mod checksum;
mod config;
mod error;
mod machine;
pub mod transition;

pub use channel::{PackOfferChannel, ServerDirectory};
pub use checksum::{build_offer, decode_sha1};
pub use config::{OfferPolicy, PackConfig};
pub use error::{ChannelError, ChecksumError};
pub use machine::AcceptanceStateMachine;
pub use packgate_session::AcceptanceState;
pub use transition::{Effect, LifecycleEvent, Step, Verdict};
