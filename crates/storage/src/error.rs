/// Crate-wide result type for storage operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Underlying database failure.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}
