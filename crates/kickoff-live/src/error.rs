use thiserror::Error;

/// Errors surfaced by the live-update client.
///
/// Only `connect()` and payload encoding return these to callers; everything
/// else (dropped frames, queued sends) is reported through logs.
#[derive(Debug, Clone, Error)]
pub enum LiveError {
    /// The transport could not be opened or failed mid-session.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The broker answered CONNECT with an ERROR frame or garbage.
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("Timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// The link closed before the operation completed.
    #[error("Connection closed")]
    Closed,

    /// `disconnect()` or a newer `connect()` superseded this attempt.
    #[error("Connection attempt cancelled")]
    Cancelled,

    #[error("Failed to encode payload: {0}")]
    Encode(String),
}

impl LiveError {
    pub fn code(&self) -> &'static str {
        match self {
            LiveError::ConnectionFailed(_) => "CONNECTION_FAILED",
            LiveError::HandshakeRejected(_) => "HANDSHAKE_REJECTED",
            LiveError::Timeout { .. } => "TIMEOUT",
            LiveError::Closed => "CLOSED",
            LiveError::Cancelled => "CANCELLED",
            LiveError::Encode(_) => "ENCODE_ERROR",
        }
    }
}

impl From<serde_json::Error> for LiveError {
    fn from(e: serde_json::Error) -> Self {
        LiveError::Encode(e.to_string())
    }
}

impl From<LiveError> for kickoff_core::KickoffError {
    fn from(e: LiveError) -> Self {
        match e {
            LiveError::Encode(msg) => kickoff_core::KickoffError::Protocol(msg),
            other => kickoff_core::KickoffError::Internal(other.to_string()),
        }
    }
}
