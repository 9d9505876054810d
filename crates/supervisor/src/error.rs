/// Crate-wide result type for supervisor operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The session key is already active.
    #[error(transparent)]
    Conflict(#[from] zapgate_registry::Error),

    /// Engine construction or send failure.
    #[error(transparent)]
    Engine(#[from] zapgate_engine::Error),

    /// No live engine handle under this key.
    #[error("session not connected: {session_key}")]
    NotConnected { session_key: String },
}

impl Error {
    #[must_use]
    pub fn not_connected(session_key: impl Into<String>) -> Self {
        Self::NotConnected {
            session_key: session_key.into(),
        }
    }
}
