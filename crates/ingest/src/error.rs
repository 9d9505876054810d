/// Crate-wide result type for ingestion.
pub type Result<T> = std::result::Result<T, Error>;

/// Infrastructure failures. Business states (duplicate, stale, invalid)
/// are outcomes, never errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] zapgate_storage::Error),
}
