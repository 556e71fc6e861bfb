//! Error types for the bridge crate, plus the unified [`PackgateError`].

use std::path::PathBuf;

use packgate_protocol::ProtocolError;
use packgate_store::StoreError;

/// Errors on a host link (the WebSocket to the proxy plugin).
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The link was closed, or closed before it could be used.
    #[error("link closed: {0}")]
    Closed(String),

    /// Sending a frame failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving a frame failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// Binding the listener or accepting a link failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The host broke the handshake rules (wrong first message, bad
    /// version, bad secret, too slow).
    #[error("handshake rejected: {0}")]
    Handshake(String),
}

/// Errors loading or writing `packgate.toml`.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Top-level error that wraps all crate-specific errors.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum PackgateError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Link(#[from] LinkError),
}
