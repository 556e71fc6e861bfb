//! Error types for the protocol layer.

/// Errors that can occur while parsing identities or encoding/decoding
/// messages.
///
/// Each packgate crate defines its own error enum, so a `ProtocolError`
/// always means "the bytes or text were wrong", never "the database is
/// down" or "the socket closed".
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed: malformed JSON, a missing field, or an
    /// unknown message type.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A player identifier was not a UUID (hyphenated or 32 bare hex
    /// digits).
    #[error("invalid player id: {0:?}")]
    InvalidPlayerId(String),
}
