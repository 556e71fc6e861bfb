//! Error types for the acceptance layer.

/// Errors reported by a [`PackOfferChannel`](crate::PackOfferChannel) or
/// [`ServerDirectory`](crate::ServerDirectory) implementation.
///
/// The state machine never propagates these: a failed offer clears the
/// pending flag, a failed kick or connect is logged.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The link to the proxy is gone.
    #[error("proxy channel closed")]
    Closed,
}

/// A configured pack checksum that can't be used.
#[derive(Debug, thiserror::Error)]
pub enum ChecksumError {
    /// Not a hex string.
    #[error("checksum is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),

    /// Valid hex, but not a 20-byte SHA-1 digest.
    #[error("checksum is {0} bytes, expected 20")]
    WrongLength(usize),
}
