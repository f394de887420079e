//! Configuration types for the echo relay

use serde::{Deserialize, Serialize};

/// Main configuration for the relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// STUN server URLs. May be empty, in which case only host candidates
    /// are gathered (LAN-only operation).
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Interval between keyframe-recovery requests sent to the publisher,
    /// in seconds (default: 3)
    pub keyframe_interval_secs: u64,

    /// Capacity of the inbound-track queue between the transport callbacks
    /// and the relay worker (default: 4)
    pub track_queue_size: usize,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: Vec::new(),
            keyframe_interval_secs: 3,
            track_queue_size: 4,
        }
    }
}

impl RelayConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `keyframe_interval_secs` is zero
    /// - `track_queue_size` is zero
    /// - a TURN server is missing a username or credential
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.keyframe_interval_secs == 0 {
            return Err(Error::InvalidConfig(
                "keyframe_interval_secs must be non-zero".to_string(),
            ));
        }

        if self.track_queue_size == 0 {
            return Err(Error::InvalidConfig(
                "track_queue_size must be non-zero".to_string(),
            ));
        }

        for turn in &self.turn_servers {
            if turn.username.is_empty() || turn.credential.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "TURN server {} requires a username and credential",
                    turn.url
                )));
            }
        }

        Ok(())
    }
}
