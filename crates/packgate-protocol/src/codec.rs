//! Codec trait and the JSON implementation.
//!
//! A codec turns Rust values into bytes and back. Two places in packgate
//! need that: the host bridge (envelopes on the WebSocket) and the
//! persistence store (acceptance records inside redb). Both go through
//! the same [`Codec`] trait so the format can change in one place.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes values to bytes and decodes bytes back to values.
///
/// `Send + Sync + 'static` because a codec lives inside long-running
/// Tokio tasks and is shared between them.
///
/// `decode` asks for `DeserializeOwned`: the decoded value must not
/// borrow from the input buffer, so the buffer can be dropped (or the
/// redb read transaction closed) right after decoding.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` on malformed or mismatched input.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// The proxy plugin on the other end of the bridge is usually written
/// for a JVM proxy, where JSON is the path of least resistance. Stored
/// records are JSON too, which keeps the database inspectable.
///
/// ```rust
/// use packgate_protocol::{Codec, JsonCodec, PackStatus};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&PackStatus::Successful).unwrap();
/// assert_eq!(bytes, b"\"SUCCESSFUL\"");
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{BridgeMessage, Envelope, PlayerId};

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<Envelope, _> = JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_decode_unknown_message_type_returns_decode_error() {
        let data = br#"{"seq":1,"timestamp":0,"message":{"type":"Teleport"}}"#;
        let result: Result<Envelope, _> = JsonCodec.decode(data);
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_encode_envelope_is_decodable() {
        let envelope = Envelope {
            seq: 9,
            timestamp: 120,
            message: BridgeMessage::Disconnect {
                player: PlayerId::from_u128(7),
            },
        };
        let bytes = JsonCodec.encode(&envelope).unwrap();
        let decoded: Envelope = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(decoded, envelope);
    }
}
