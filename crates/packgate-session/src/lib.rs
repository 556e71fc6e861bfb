//! Session tracking for packgate.
//!
//! A session is one continuous proxy connection: it starts at proxy
//! login, survives any number of backend switches, and ends when the
//! player leaves the proxy. For that lifetime we remember whether a pack
//! offer is outstanding and whether the player has reached a backend yet.
//!
//! # How it fits in the stack
//!
//! ```text
//! Acceptance state machine (above)  ← locks one player's session per event
//!     ↕
//! Session layer (this crate)        ← SessionTracker, SessionState
//!     ↕
//! Protocol layer (below)            ← PlayerId, ServerName
//! ```

mod session;
mod tracker;

pub use session::{AcceptanceState, SessionState};
pub use tracker::{SessionHandle, SessionTracker};
