//! Error types for SandeshIO

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// SandeshIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error (image files, config file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration is semantically invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Codec failure (structured text or compact binary)
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Compression or decompression failure
    #[error("Compression error: {0}")]
    Compression(String),

    /// Broker handshake failed
    #[error("Connect failed: {0}")]
    Connect(String),

    /// Operation requires a live broker session
    #[error("Not connected to broker")]
    NotConnected,

    /// Transport refused or failed an operation
    #[error("Transport error: {0}")]
    Transport(String),

    /// Decoded inbound payload lacks the `{type, data}` shape
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
