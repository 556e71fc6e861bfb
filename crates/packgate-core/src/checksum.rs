//! Turning the configured pack checksum into the bytes a client expects.

use packgate_protocol::PackOffer;

use crate::{ChecksumError, PackConfig};

/// Length of a SHA-1 digest in bytes.
const SHA1_LEN: usize = 20;

/// Decodes a hex SHA-1 into its 20 raw bytes.
///
/// Blank input means "no checksum" and is `Ok(None)`.
///
/// # Errors
/// [`ChecksumError::InvalidHex`] for non-hex or odd-length input,
/// [`ChecksumError::WrongLength`] for hex that isn't 20 bytes.
pub fn decode_sha1(hex: &str) -> Result<Option<Vec<u8>>, ChecksumError> {
    let hex = hex.trim();
    if hex.is_empty() {
        return Ok(None);
    }

    let bytes = hex::decode(hex)?;
    if bytes.len() != SHA1_LEN {
        return Err(ChecksumError::WrongLength(bytes.len()));
    }
    Ok(Some(bytes))
}

/// Builds the offer sent to every player.
///
/// A bad checksum never stops the offer: it is logged once and the pack
/// goes out unverified.
pub fn build_offer(config: &PackConfig) -> PackOffer {
    let hash = match decode_sha1(&config.sha1) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::warn!(
                sha1 = %config.sha1,
                error = %e,
                "invalid pack checksum in config, sending pack unverified"
            );
            None
        }
    };

    PackOffer {
        url: config.url.clone(),
        hash,
        prompt: config.prompt.clone(),
        force: config.force(),
    }
}
