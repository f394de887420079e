//! WebRTC echo relay
//!
//! This crate answers a single remote peer's offer and relays that peer's
//! own video stream straight back to it. Packets are forwarded verbatim
//! except for one field: the stream-source identifier is rewritten to the
//! session's outbound identifier. While the relay is active the publisher
//! is periodically asked for a fresh keyframe so the echoed stream recovers
//! quickly from loss.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Browser peer                                        │
//! │  ↓ (offer/answer over HTTP, base64-encoded JSON)     │
//! │  RelayHttpServer                                     │
//! │  └─ SessionManager (single lock-guarded session)     │
//! │      ├─ negotiation: accept the offered codecs,      │
//! │      │  echo on the first offered video capability   │
//! │      ├─ relay worker (RTP in → SSRC rewrite → out)   │
//! │      └─ keyframe heartbeat (periodic PLI)            │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! The relay never decodes media; ICE, DTLS and SRTP are handled by the
//! underlying `webrtc` stack.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use mirrorweb_relay::{RelayConfig, RelayHttpServer, SessionManager};
//!
//! # async fn example() -> mirrorweb_relay::Result<()> {
//! let config = RelayConfig::default();
//! config.validate()?;
//!
//! let manager = Arc::new(SessionManager::new(config));
//! RelayHttpServer::new("127.0.0.1:8000".to_string(), manager)
//!     .serve()
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

// Public modules
pub mod config;
pub mod error;
pub mod server;
pub mod signal;

// Internal modules
mod negotiate;
mod session;

// Re-exports for public API
pub use config::{RelayConfig, TurnServerConfig};
pub use error::{Error, Result};
pub use server::RelayHttpServer;
pub use session::SessionManager;

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
    }
}
