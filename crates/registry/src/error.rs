/// Crate-wide result type for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The session key is already registered and live.
    #[error("session already active: {session_key}")]
    Conflict { session_key: String },
}

impl Error {
    #[must_use]
    pub fn conflict(session_key: impl Into<String>) -> Self {
        Self::Conflict {
            session_key: session_key.into(),
        }
    }
}
