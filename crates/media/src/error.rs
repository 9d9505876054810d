/// Crate-wide result type for media operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The engine could not fetch or decrypt the payload.
    #[error(transparent)]
    Engine(#[from] zapgate_engine::Error),

    /// Writing the materialized file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A stored row's content did not parse back into a message payload.
    #[error("stored content is not a message payload: {0}")]
    InvalidContent(#[from] serde_json::Error),

    /// The message carries no media variant.
    #[error("message {message_id} has no media payload")]
    NoMedia { message_id: String },
}

impl Error {
    #[must_use]
    pub fn no_media(message_id: impl Into<String>) -> Self {
        Self::NoMedia {
            message_id: message_id.into(),
        }
    }
}
