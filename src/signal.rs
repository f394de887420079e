//! Signaling payload codec
//!
//! Offers and answers travel over the HTTP signaling surface as a session
//! description serialized to canonical JSON and wrapped in standard base64,
//! the same encoding in both directions. `decode` is the exact inverse of
//! `encode`.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::{Error, Result};

/// Encode a session description for the wire: canonical JSON, then base64.
pub fn encode(description: &RTCSessionDescription) -> Result<String> {
    let json = serde_json::to_vec(description)
        .map_err(|e| Error::Other(anyhow::Error::new(e).context("serializing description")))?;
    Ok(STANDARD.encode(json))
}

/// Decode a wire payload back into a session description.
///
/// Fails with [`Error::MalformedPayload`] when the input is not valid base64
/// or does not contain a session-description JSON object.
pub fn decode(text: &str) -> Result<RTCSessionDescription> {
    let json = STANDARD
        .decode(text.trim())
        .map_err(|e| Error::MalformedPayload(format!("invalid base64: {}", e)))?;

    serde_json::from_slice(&json)
        .map_err(|e| Error::MalformedPayload(format!("invalid session description: {}", e)))
}
