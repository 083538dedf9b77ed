//! Signaling errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignalingError {
    /// Caller-supplied options violate a mandatory precondition
    #[error("Rejected input: {0}")]
    RejectedInput(String),

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    /// A candidate batch referenced a media kind with no negotiated transport
    #[error("No transport for {0} candidates")]
    MissingEndpoint(String),

    /// A transport did not become writable before its deadline
    #[error("Transport timeout: {0}")]
    TransportTimeout(String),

    #[error("Media section index {index} out of range ({count} sections)")]
    MediaSectionOutOfRange { index: usize, count: usize },

    #[error("SDP parse error: {0}")]
    Parse(String),

    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Session closed")]
    SessionClosed,
}
