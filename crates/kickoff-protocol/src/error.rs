use thiserror::Error;

/// Errors raised while decoding or encoding wire frames and message bodies.
#[derive(Debug, Error)]
pub enum FrameError {
    /// The frame did not start with a complete command line.
    #[error("Empty frame")]
    Empty,

    /// The command line is not a STOMP command this client understands.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// A header line had no `:` separator or an invalid escape sequence.
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// The body was not terminated by NUL or was shorter than `content-length`.
    #[error("Truncated body")]
    TruncatedBody,

    /// The body was not a JSON object.
    #[error("Invalid body: {0}")]
    InvalidBody(#[from] serde_json::Error),

    /// The JSON body carried no string `type` field.
    #[error("Missing message discriminator")]
    MissingDiscriminator,
}

impl From<FrameError> for kickoff_core::KickoffError {
    fn from(e: FrameError) -> Self {
        kickoff_core::KickoffError::Protocol(e.to_string())
    }
}
