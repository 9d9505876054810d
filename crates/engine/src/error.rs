/// Crate-wide result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed engine errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Engine construction/handshake failed; the session never came up.
    #[error("protocol engine failure: {message}")]
    Protocol { message: String },

    /// The requested session has no live engine connection.
    #[error("session not connected: {session_key}")]
    NotConnected { session_key: String },

    /// The engine could not fetch and decrypt a media payload.
    #[error("media download failed: {message}")]
    MediaDownload { message: String },

    /// Underlying sidecar transport failure.
    #[error(transparent)]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON (de)serialization failed.
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    /// Filesystem failure while reading outbound media.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_connected(session_key: impl Into<String>) -> Self {
        Self::NotConnected {
            session_key: session_key.into(),
        }
    }

    #[must_use]
    pub fn media_download(message: impl Into<String>) -> Self {
        Self::MediaDownload {
            message: message.into(),
        }
    }
}
