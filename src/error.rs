//! Error types for the echo relay

/// Result type alias using the relay Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in relay operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The signaling payload is not validly encoded (bad base64 or bad
    /// session-description JSON/SDP inside it)
    #[error("malformed signaling payload: {0}")]
    MalformedPayload(String),

    /// The offer advertised no video capability the relay can echo
    #[error("offer contained no usable video capability")]
    NoUsableVideoCapability,

    /// A relay session already exists; it must be closed before a new one
    /// can be opened
    #[error("a relay session is already active; close it before opening another")]
    SessionAlreadyActive,

    /// No relay session exists to close
    #[error("no relay session is active")]
    NoActiveSession,

    /// Invalid configuration parameter
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// WebRTC transport construction or negotiation failure
    #[error("WebRTC error: {0}")]
    WebRtc(String),

    /// Read/write failure inside the relay pipeline; terminates that
    /// session's pipeline only and is never surfaced to the request layer
    #[error("relay pipeline I/O error: {0}")]
    PipelineIo(String),

    /// Keyframe-request send failure; logged and retried on the next tick
    #[error("keyframe request failed: {0}")]
    ControlSend(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error was caused by the request rather than the relay.
    ///
    /// The HTTP layer reports request errors as 400 with the display message
    /// as the plain-text reason; everything else becomes a 500.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            Error::MalformedPayload(_)
                | Error::NoUsableVideoCapability
                | Error::SessionAlreadyActive
                | Error::NoActiveSession
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }
}
