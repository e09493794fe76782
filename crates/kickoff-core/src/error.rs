use thiserror::Error;

#[derive(Debug, Error)]
pub enum KickoffError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl KickoffError {
    /// Short error code string, stable across releases (used in logs).
    pub fn code(&self) -> &'static str {
        match self {
            KickoffError::Config(_) => "CONFIG_ERROR",
            KickoffError::Protocol(_) => "PROTOCOL_ERROR",
            KickoffError::Serialization(_) => "SERIALIZATION_ERROR",
            KickoffError::Io(_) => "IO_ERROR",
            KickoffError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, KickoffError>;
